use shared::{
    domain::SourceId,
    error::{ErrorCode, ReportedError},
};
use thiserror::Error;

use crate::{reconcile::AmountValidationError, units::UnitError};

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("wallet balance check failed: {0}")]
    WalletRejected(String),
    #[error("source {0} is not in the current catalog")]
    UnknownSource(SourceId),
    #[error("select exactly one source to delegate from")]
    NoSelection,
    #[error("donations for the selected source are still loading")]
    RecordsLoading,
    #[error("there are no donations in the selected source that can be delegated")]
    NoRecords,
    #[error(transparent)]
    Validation(#[from] AmountValidationError),
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error("a delegation is already being submitted")]
    SubmissionInFlight,
    #[error("delegation did not complete: {0}")]
    SubmissionFailed(String),
}

impl DelegationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::WalletRejected(_) => ErrorCode::Rejected,
            Self::UnknownSource(_)
            | Self::NoSelection
            | Self::NoRecords
            | Self::Validation(_)
            | Self::Unit(_) => ErrorCode::Validation,
            Self::RecordsLoading | Self::SubmissionInFlight => ErrorCode::Unavailable,
            Self::SubmissionFailed(_) => ErrorCode::Internal,
        }
    }
}

impl From<&DelegationError> for ReportedError {
    fn from(value: &DelegationError) -> Self {
        ReportedError::new(value.code(), value.to_string())
    }
}
