use std::sync::Arc;

use live_query::{Query, ResultSet};
use shared::{
    domain::{DonationStatus, FundingRecord, FundingSource},
    error::DocumentError,
    protocol::decode_donation,
};

/// Unspent donations of `source`, oldest first.
pub fn record_query(source: &FundingSource) -> Query {
    let query = Query::new().ne("amountRemaining", 0);
    let query = match source {
        FundingSource::Grouping(grouping) => query
            .eq("delegateId", grouping.delegate_id.0)
            .eq("delegateTypeId", grouping.id.as_str())
            .eq("status", DonationStatus::Waiting.as_str()),
        FundingSource::Direct(direct) => query
            .eq("ownerId", direct.project_id.0)
            .eq("ownerTypeId", direct.id.as_str())
            .eq("status", DonationStatus::Committed.as_str()),
    };
    query.sort_ascending("createdAt")
}

/// Decodes a whole tick, oldest first. One bad document fails the tick so a
/// partial list is never shown.
pub fn decode_records(result: ResultSet) -> Result<Arc<[FundingRecord]>, DocumentError> {
    let mut records = result
        .data
        .into_iter()
        .map(decode_donation)
        .collect::<Result<Vec<_>, _>>()?;
    // The service orders `createdAt` as text; offsets and fractional seconds need the parsed instant.
    records.sort_by_key(|record| record.created_at);
    Ok(Arc::from(records))
}
