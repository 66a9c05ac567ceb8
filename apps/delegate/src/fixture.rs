use std::{fs, path::Path};

use anyhow::{Context, Result};
use live_query::InMemoryLiveQuery;
use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::{DelegationTarget, WalletAddress},
    protocol::{DACS_COLLECTION, DONATIONS_COLLECTION},
};

/// A snapshot of the two collections plus the delegation destination.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub owner_address: Option<WalletAddress>,
    /// Wallet balance in the smallest unit; absent means the check is skipped.
    #[serde(default)]
    pub wallet_balance: Option<String>,
    pub destination: DelegationTarget,
    #[serde(default)]
    pub dacs: Vec<Value>,
    #[serde(default)]
    pub donations: Vec<Value>,
}

impl Fixture {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("fixture is not valid JSON for a delegation")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture '{}'", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid fixture '{}'", path.display()))
    }

    pub fn wallet_balance(&self) -> Result<Option<u128>> {
        self.wallet_balance
            .as_deref()
            .map(|text| {
                text.trim()
                    .parse::<u128>()
                    .with_context(|| format!("wallet balance '{text}' is not a whole number"))
            })
            .transpose()
    }

    pub async fn seed(&self, store: &InMemoryLiveQuery) {
        store.upsert_many(DACS_COLLECTION, self.dacs.clone()).await;
        store
            .upsert_many(DONATIONS_COLLECTION, self.donations.clone())
            .await;
    }
}
