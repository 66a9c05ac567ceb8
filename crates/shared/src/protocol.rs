//! Document shapes of the `dacs` and `donations` collections and their
//! conversion into domain values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{
        DelegateId, DonationStatus, FundingRecord, FundingSource, GroupingSource, ProjectId,
        RecordId, SourceId, WalletAddress,
    },
    error::DocumentError,
};

pub const DACS_COLLECTION: &str = "dacs";
pub const DONATIONS_COLLECTION: &str = "donations";

pub const DAC_PROJECTION: [&str; 6] = [
    "ownerAddress",
    "title",
    "_id",
    "delegateId",
    "delegateEntity",
    "delegate",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DacDocument {
    #[serde(rename = "_id")]
    pub id: SourceId,
    pub title: String,
    pub owner_address: WalletAddress,
    pub delegate_id: DelegateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_entity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<Value>,
}

impl From<DacDocument> for FundingSource {
    fn from(value: DacDocument) -> Self {
        FundingSource::Grouping(GroupingSource {
            id: value.id,
            name: value.title,
            owner_address: value.owner_address,
            delegate_id: value.delegate_id,
            delegate_entity: value.delegate_entity,
            delegate: value.delegate,
        })
    }
}

/// A donation as stored. Amounts travel as decimal strings of the smallest unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationDocument {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub amount_remaining: String,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_id: Option<DelegateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_type_id: Option<SourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type_id: Option<SourceId>,
}

impl TryFrom<DonationDocument> for FundingRecord {
    type Error = DocumentError;

    fn try_from(value: DonationDocument) -> Result<Self, Self::Error> {
        let amount_remaining =
            value
                .amount_remaining
                .trim()
                .parse::<u128>()
                .map_err(|_| DocumentError::InvalidAmount {
                    id: value.id.0.clone(),
                    value: value.amount_remaining.clone(),
                })?;
        Ok(FundingRecord {
            id: value.id,
            amount_remaining,
            status: value.status,
            created_at: value.created_at,
        })
    }
}

pub fn decode_dac(document: Value) -> Result<FundingSource, DocumentError> {
    serde_json::from_value::<DacDocument>(document)
        .map(FundingSource::from)
        .map_err(|err| DocumentError::Malformed {
            collection: DACS_COLLECTION,
            message: err.to_string(),
        })
}

pub fn decode_donation(document: Value) -> Result<FundingRecord, DocumentError> {
    let document = serde_json::from_value::<DonationDocument>(document).map_err(|err| {
        DocumentError::Malformed {
            collection: DONATIONS_COLLECTION,
            message: err.to_string(),
        }
    })?;
    FundingRecord::try_from(document)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_dac_into_grouping_source() {
        let source = decode_dac(json!({
            "_id": "dac-1",
            "title": "Climate",
            "ownerAddress": "0xabc",
            "delegateId": 7,
        }))
        .expect("dac");

        let FundingSource::Grouping(grouping) = source else {
            panic!("expected grouping source");
        };
        assert_eq!(grouping.delegate_id, DelegateId(7));
        assert_eq!(grouping.name, "Climate");
    }

    #[test]
    fn decodes_large_remaining_amounts_exactly() {
        let record = decode_donation(json!({
            "_id": "d-1",
            "amountRemaining": "340282366920938463463374607431768211455",
            "status": "Waiting",
            "createdAt": "2018-03-01T10:00:00Z",
        }))
        .expect("donation");

        assert_eq!(record.amount_remaining, u128::MAX);
        assert_eq!(record.status, DonationStatus::Waiting);
    }

    #[test]
    fn keeps_unknown_statuses() {
        let record = decode_donation(json!({
            "_id": "d-2",
            "amountRemaining": "1",
            "status": "Paid",
            "createdAt": "2018-03-01T10:00:00Z",
        }))
        .expect("donation");

        assert_eq!(record.status, DonationStatus::Other("Paid".into()));
    }

    #[test]
    fn rejects_non_numeric_amounts() {
        let err = decode_donation(json!({
            "_id": "d-3",
            "amountRemaining": "1.5",
            "status": "Committed",
            "createdAt": "2018-03-01T10:00:00Z",
        }))
        .expect_err("fractional smallest unit");

        assert!(matches!(err, DocumentError::InvalidAmount { .. }));
    }
}
