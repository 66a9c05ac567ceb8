use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::domain::{DelegationTarget, FundingRecord, TxLink};
use tokio::sync::oneshot;
use tracing::info;

/// One user-initiated delegation. The record list is the snapshot taken at submit time.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    pub records: Arc<[FundingRecord]>,
    pub amount: Decimal,
    pub amount_smallest_unit: u128,
    pub destination: DelegationTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Pending,
    Accepted(TxLink),
    Confirmed(TxLink),
    Failed(String),
}

/// Receiving half of a started delegation: acceptance and confirmation arrive independently.
pub struct PendingDelegation {
    pub accepted: oneshot::Receiver<Result<TxLink>>,
    pub confirmed: oneshot::Receiver<TxLink>,
}

/// Sending half handed to whatever drives the delegation.
pub struct DelegationMilestones {
    accepted: Option<oneshot::Sender<Result<TxLink>>>,
    confirmed: Option<oneshot::Sender<TxLink>>,
}

impl PendingDelegation {
    pub fn channel() -> (DelegationMilestones, PendingDelegation) {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (confirmed_tx, confirmed_rx) = oneshot::channel();
        (
            DelegationMilestones {
                accepted: Some(accepted_tx),
                confirmed: Some(confirmed_tx),
            },
            PendingDelegation {
                accepted: accepted_rx,
                confirmed: confirmed_rx,
            },
        )
    }
}

impl DelegationMilestones {
    /// Returns false if acceptance was already reported or nobody is listening.
    pub fn accept(&mut self, tx_link: TxLink) -> bool {
        self.accepted
            .take()
            .is_some_and(|sender| sender.send(Ok(tx_link)).is_ok())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.accepted
            .take()
            .is_some_and(|sender| sender.send(Err(anyhow!(reason))).is_ok())
    }

    pub fn confirm(&mut self, tx_link: TxLink) -> bool {
        self.confirmed
            .take()
            .is_some_and(|sender| sender.send(tx_link).is_ok())
    }
}

#[async_trait]
pub trait DelegationAction: Send + Sync {
    /// Starts delegating `request.amount_smallest_unit` from `request.records`, oldest first.
    async fn delegate_multiple(&self, request: SubmissionRequest) -> Result<PendingDelegation>;
}

pub struct MissingDelegationAction;

#[async_trait]
impl DelegationAction for MissingDelegationAction {
    async fn delegate_multiple(&self, _request: SubmissionRequest) -> Result<PendingDelegation> {
        Err(anyhow!("delegation action is unavailable"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Delegated { tx_link: TxLink },
    Confirmed { tx_link: TxLink },
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Delegated { .. } => "Delegated!",
            Self::Confirmed { .. } => "Your donation has been confirmed!",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Delegated { tx_link } => format!(
                "The donations have been delegated, view the transaction here: {tx_link}. \
                 Please note the Giver may have 3 days to reject your delegation before the money gets committed."
            ),
            Self::Confirmed { tx_link } => format!("View transaction: {tx_link}"),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        info!(title = notice.title(), message = %notice.message(), "delegation: notice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn milestones_deliver_independently() {
        let (mut milestones, pending) = PendingDelegation::channel();
        assert!(milestones.confirm(TxLink::new("tx-1")));
        assert!(milestones.accept(TxLink::new("tx-1")));
        assert!(!milestones.accept(TxLink::new("tx-2")));

        assert_eq!(pending.confirmed.await.expect("confirmed"), TxLink::new("tx-1"));
        let accepted = pending.accepted.await.expect("accepted").expect("ok");
        assert_eq!(accepted, TxLink::new("tx-1"));
    }

    #[tokio::test]
    async fn failure_is_reported_through_acceptance() {
        let (mut milestones, pending) = PendingDelegation::channel();
        assert!(milestones.fail("out of gas"));
        let err = pending
            .accepted
            .await
            .expect("delivered")
            .expect_err("failure");
        assert_eq!(err.to_string(), "out of gas");
    }

    #[test]
    fn delegated_notice_mentions_the_rejection_window() {
        let notice = Notice::Delegated {
            tx_link: TxLink::new("https://etherscan.io/tx/0x1"),
        };
        assert!(notice.message().contains("3 days"));
        assert!(notice.message().contains("https://etherscan.io/tx/0x1"));
    }
}
