use live_query::{Query, ResultSet};
use shared::{
    domain::{DelegationTarget, FundingSource, WalletAddress},
    protocol::{decode_dac, DAC_PROJECTION},
};
use tracing::warn;

/// Grouping sources owned by `owner` that have an on-chain delegate.
pub fn catalog_query(owner: &WalletAddress) -> Query {
    Query::new()
        .gt("delegateId", "0")
        .eq("ownerAddress", owner.as_str())
        .select(DAC_PROJECTION)
}

/// Builds the full source list for one catalog tick. Grouping sources keep the
/// service order; a milestone destination appends its campaign as the last entry.
pub fn build_source_list(result: ResultSet, destination: &DelegationTarget) -> Vec<FundingSource> {
    let mut sources: Vec<FundingSource> = result
        .data
        .into_iter()
        .filter_map(|document| match decode_dac(document) {
            Ok(source) => Some(source),
            Err(err) => {
                warn!(%err, "catalog: skipping undecodable source");
                None
            }
        })
        .collect();
    sources.extend(destination.direct_source());
    sources
}
