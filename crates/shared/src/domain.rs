use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceKindError;

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

macro_rules! numeric_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id_newtype!(SourceId);
string_id_newtype!(RecordId);
string_id_newtype!(WalletAddress);
string_id_newtype!(TxLink);

numeric_id_newtype!(DelegateId);
numeric_id_newtype!(ProjectId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Grouping,
    Direct,
}

impl FromStr for SourceKind {
    type Err = SourceKindError;

    /// Accepts both the engine names and the collection names the sources come from.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grouping" | "dac" => Ok(Self::Grouping),
            "direct" | "campaign" => Ok(Self::Direct),
            other => Err(SourceKindError::Unsupported(other.to_string())),
        }
    }
}

/// An aggregating entity whose donations are waiting for direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingSource {
    pub id: SourceId,
    pub name: String,
    pub owner_address: WalletAddress,
    pub delegate_id: DelegateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_entity: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<serde_json::Value>,
}

/// A project that already holds committed funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectSource {
    pub id: SourceId,
    pub name: String,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_entity: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FundingSource {
    Grouping(GroupingSource),
    Direct(DirectSource),
}

impl FundingSource {
    pub fn id(&self) -> &SourceId {
        match self {
            Self::Grouping(source) => &source.id,
            Self::Direct(source) => &source.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Grouping(source) => &source.name,
            Self::Direct(source) => &source.name,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Grouping(_) => SourceKind::Grouping,
            Self::Direct(_) => SourceKind::Direct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DonationStatus {
    Waiting,
    Committed,
    #[serde(untagged)]
    Other(String),
}

impl DonationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "Waiting",
            Self::Committed => "Committed",
            Self::Other(status) => status,
        }
    }
}

/// An unspent donation. `amount_remaining` is in the smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub id: RecordId,
    pub amount_remaining: u128,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRef {
    pub id: SourceId,
    pub title: String,
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTarget {
    pub id: SourceId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneTarget {
    pub id: SourceId,
    pub title: String,
    /// Remaining capacity of the milestone, as decimal text. Unparseable values are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_entity: Option<serde_json::Value>,
    pub campaign: CampaignRef,
}

/// Where delegated funds go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelegationTarget {
    Campaign(CampaignTarget),
    Milestone(MilestoneTarget),
}

impl DelegationTarget {
    pub fn id(&self) -> &SourceId {
        match self {
            Self::Campaign(target) => &target.id,
            Self::Milestone(target) => &target.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Campaign(target) => &target.title,
            Self::Milestone(target) => &target.title,
        }
    }

    /// The synthetic direct source a milestone destination contributes to the catalog.
    pub fn direct_source(&self) -> Option<FundingSource> {
        match self {
            Self::Campaign(_) => None,
            Self::Milestone(milestone) => Some(FundingSource::Direct(DirectSource {
                id: milestone.campaign.id.clone(),
                name: milestone.campaign.title.clone(),
                project_id: milestone.campaign.project_id,
                owner_entity: milestone.owner_entity.clone(),
            })),
        }
    }

    pub fn ceiling_text(&self) -> Option<&str> {
        match self {
            Self::Campaign(_) => None,
            Self::Milestone(milestone) => milestone.max_amount.as_deref(),
        }
    }
}
