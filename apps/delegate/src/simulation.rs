//! Local stand-ins for the wallet and the on-chain delegation call.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use delegation_core::{
    units::to_display, DelegationAction, PendingDelegation, SubmissionRequest, WalletBalanceGate,
};
use live_query::InMemoryLiveQuery;
use rust_decimal::Decimal;
use serde_json::json;
use shared::{
    domain::{FundingRecord, RecordId, TxLink, WalletAddress},
    protocol::DONATIONS_COLLECTION,
};
use tracing::{info, warn};
use uuid::Uuid;

/// How much each record gives up, oldest record first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spend {
    pub record_id: RecordId,
    pub taken: u128,
    pub remaining: u128,
}

/// Draws `amount` from `records` in order. `None` when the records do not cover it.
pub fn plan_spending(records: &[FundingRecord], amount: u128) -> Option<Vec<Spend>> {
    let mut left = amount;
    let mut plan = Vec::new();
    for record in records {
        if left == 0 {
            break;
        }
        let taken = left.min(record.amount_remaining);
        if taken == 0 {
            continue;
        }
        left -= taken;
        plan.push(Spend {
            record_id: record.id.clone(),
            taken,
            remaining: record.amount_remaining - taken,
        });
    }
    (left == 0).then_some(plan)
}

/// Accepts after `accept_delay`, writes the reduced remainders back into the
/// store and confirms after a further `confirm_delay`.
pub struct SimulatedDelegationAction {
    store: InMemoryLiveQuery,
    explorer_url: String,
    accept_delay: Duration,
    confirm_delay: Duration,
}

impl SimulatedDelegationAction {
    pub fn new(
        store: InMemoryLiveQuery,
        explorer_url: impl Into<String>,
        accept_delay: Duration,
        confirm_delay: Duration,
    ) -> Self {
        Self {
            store,
            explorer_url: explorer_url.into(),
            accept_delay,
            confirm_delay,
        }
    }

    fn tx_link(&self) -> TxLink {
        TxLink::new(format!(
            "{}/tx/0x{}",
            self.explorer_url.trim_end_matches('/'),
            Uuid::new_v4().simple()
        ))
    }
}

#[async_trait]
impl DelegationAction for SimulatedDelegationAction {
    async fn delegate_multiple(&self, request: SubmissionRequest) -> Result<PendingDelegation> {
        let plan = plan_spending(&request.records, request.amount_smallest_unit);
        let (mut milestones, pending) = PendingDelegation::channel();
        let store = self.store.clone();
        let tx_link = self.tx_link();
        let accept_delay = self.accept_delay;
        let confirm_delay = self.confirm_delay;

        tokio::spawn(async move {
            tokio::time::sleep(accept_delay).await;
            let Some(plan) = plan else {
                warn!(amount = %request.amount, "simulation: records do not cover the amount");
                milestones.fail("the selected donations do not cover the requested amount");
                return;
            };
            for spend in &plan {
                let fields = json!({ "amountRemaining": spend.remaining.to_string() });
                if !store
                    .patch(DONATIONS_COLLECTION, spend.record_id.as_str(), fields)
                    .await
                {
                    warn!(record_id = %spend.record_id, "simulation: donation vanished before spending");
                }
            }
            info!(
                tx_link = %tx_link,
                spent_records = plan.len(),
                destination = %request.destination.id(),
                "simulation: delegation accepted"
            );
            milestones.accept(tx_link.clone());

            tokio::time::sleep(confirm_delay).await;
            milestones.confirm(tx_link);
        });

        Ok(pending)
    }
}

/// Rejects wallets whose configured balance is not positive.
pub struct FixtureBalanceGate {
    balance: Option<u128>,
}

impl FixtureBalanceGate {
    pub fn new(balance: Option<u128>) -> Self {
        Self { balance }
    }
}

#[async_trait]
impl WalletBalanceGate for FixtureBalanceGate {
    async fn check(&self, wallet: &WalletAddress) -> Result<()> {
        match self.balance {
            None => Ok(()),
            Some(0) => Err(anyhow!("wallet {wallet} has no balance to pay for transactions")),
            Some(balance) => {
                let shown = to_display(balance).unwrap_or(Decimal::MAX);
                info!(%wallet, balance = %shown, "simulation: wallet funded");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/simulation_tests.rs"]
mod tests;
