use shared::domain::{FundingSource, SourceId};

/// What a selection change asks the engine to do with the record subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionDecision {
    /// Zero or several ids: no records are loaded.
    Clear,
    Load(FundingSource),
    Unknown(SourceId),
}

pub fn resolve_selection(ids: &[SourceId], sources: &[FundingSource]) -> SelectionDecision {
    let [id] = ids else {
        return SelectionDecision::Clear;
    };
    sources
        .iter()
        .find(|source| source.id() == id)
        .cloned()
        .map(SelectionDecision::Load)
        .unwrap_or_else(|| SelectionDecision::Unknown(id.clone()))
}

/// The single source a catalog list auto-selects, if any.
pub fn auto_selection(sources: &[FundingSource]) -> Option<SourceId> {
    match sources {
        [only] => Some(only.id().clone()),
        _ => None,
    }
}
