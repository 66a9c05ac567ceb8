use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use live_query::{LiveQueryService, ResultStream};
use rust_decimal::Decimal;
use shared::{
    domain::{DelegationTarget, FundingRecord, FundingSource, SourceId, TxLink, WalletAddress},
    error::{ErrorCode, ReportedError},
    protocol::{DACS_COLLECTION, DONATIONS_COLLECTION},
};
use tokio::{
    sync::{broadcast, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod catalog;
pub mod error;
pub mod reconcile;
pub mod records;
pub mod selection;
pub mod submit;
pub mod units;

pub use error::DelegationError;
pub use reconcile::{AmountValidationError, ReconciledAmount};
pub use submit::{
    DelegationAction, DelegationMilestones, MissingDelegationAction, Notice, Notifier,
    PendingDelegation, SubmissionOutcome, SubmissionRequest, TracingNotifier,
};

use catalog::{build_source_list, catalog_query};
use reconcile::{parse_ceiling, reconcile, slide_amount, validate_amount};
use records::{decode_records, record_query};
use selection::{auto_selection, resolve_selection, SelectionDecision};
use units::to_smallest_unit;

const EVENT_BUFFER: usize = 256;

#[async_trait]
pub trait WalletBalanceGate: Send + Sync {
    async fn check(&self, wallet: &WalletAddress) -> Result<()>;
}

pub struct AlwaysFundedGate;

#[async_trait]
impl WalletBalanceGate for AlwaysFundedGate {
    async fn check(&self, _wallet: &WalletAddress) -> Result<()> {
        Ok(())
    }
}

/// Who is delegating and where the funds go.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub owner_address: WalletAddress,
    pub wallet: WalletAddress,
    pub destination: DelegationTarget,
}

pub struct EngineDependencies {
    live_query: Arc<dyn LiveQueryService>,
    action: Arc<dyn DelegationAction>,
    gate: Arc<dyn WalletBalanceGate>,
    notifier: Arc<dyn Notifier>,
}

impl EngineDependencies {
    pub fn new(live_query: Arc<dyn LiveQueryService>, action: Arc<dyn DelegationAction>) -> Self {
        Self {
            live_query,
            action,
            gate: Arc::new(AlwaysFundedGate),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn WalletBalanceGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    SourcesUpdated(Arc<[FundingSource]>),
    SelectionChanged(Vec<SourceId>),
    RecordsUpdated {
        source_id: SourceId,
        records: Arc<[FundingRecord]>,
        amount: ReconciledAmount,
    },
    RecordsFailed {
        source_id: SourceId,
        error: ReportedError,
    },
    SubmissionStarted,
    SubmissionAccepted(TxLink),
    SubmissionConfirmed(TxLink),
    SubmissionFailed(ReportedError),
}

#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub sources: Arc<[FundingSource]>,
    pub selected_ids: Vec<SourceId>,
    pub loading_donations: bool,
    pub records: Arc<[FundingRecord]>,
    pub amount: Option<ReconciledAmount>,
    pub requested_amount: String,
    pub is_saving: bool,
    pub last_submission: Option<SubmissionOutcome>,
}

struct EngineState {
    sources: Arc<[FundingSource]>,
    selected_ids: Vec<SourceId>,
    loading_donations: bool,
    records: Arc<[FundingRecord]>,
    amount: Option<ReconciledAmount>,
    requested_amount: String,
    is_saving: bool,
    last_submission: Option<SubmissionOutcome>,
    record_generation: u64,
}

impl EngineState {
    fn effective_amount(&self) -> Decimal {
        self.amount
            .map(|amount| amount.effective)
            .unwrap_or(Decimal::ZERO)
    }
}

struct RecordSubscription {
    generation: u64,
    source_id: SourceId,
    task: JoinHandle<()>,
}

impl RecordSubscription {
    /// Returns once the watching task, and with it the stream, is gone.
    async fn unsubscribe(self) {
        debug!(
            generation = self.generation,
            source_id = %self.source_id,
            "records: unsubscribing"
        );
        self.task.abort();
        let _ = self.task.await;
    }
}

pub struct DelegationEngine {
    context: EngineContext,
    ceiling: Option<Decimal>,
    live_query: Arc<dyn LiveQueryService>,
    action: Arc<dyn DelegationAction>,
    gate: Arc<dyn WalletBalanceGate>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<EngineState>,
    catalog_subscription: Mutex<Option<JoinHandle<()>>>,
    record_subscription: Mutex<Option<RecordSubscription>>,
    events: broadcast::Sender<EngineEvent>,
}

impl DelegationEngine {
    pub fn new(context: EngineContext, dependencies: EngineDependencies) -> Arc<Self> {
        let ceiling = parse_ceiling(context.destination.ceiling_text());
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            context,
            ceiling,
            live_query: dependencies.live_query,
            action: dependencies.action,
            gate: dependencies.gate,
            notifier: dependencies.notifier,
            inner: Mutex::new(EngineState {
                sources: Arc::from(Vec::new()),
                selected_ids: Vec::new(),
                loading_donations: false,
                records: Arc::from(Vec::new()),
                amount: None,
                requested_amount: String::new(),
                is_saving: false,
                last_submission: None,
                record_generation: 0,
            }),
            catalog_subscription: Mutex::new(None),
            record_subscription: Mutex::new(None),
            events,
        })
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn ceiling(&self) -> Option<Decimal> {
        self.ceiling
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Checks the wallet and starts watching the source catalog. Opening an
    /// already open engine only repeats the wallet check.
    pub async fn open(self: &Arc<Self>) -> Result<(), DelegationError> {
        if let Err(err) = self.gate.check(&self.context.wallet).await {
            warn!(wallet = %self.context.wallet, "delegation: wallet check rejected opening: {err:#}");
            return Err(DelegationError::WalletRejected(format!("{err:#}")));
        }

        let mut slot = self.catalog_subscription.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let query = catalog_query(&self.context.owner_address);
        match self.live_query.watch(DACS_COLLECTION, query).await {
            Ok(stream) => {
                *slot = Some(self.spawn_catalog_task(stream));
                info!(
                    owner = %self.context.owner_address,
                    destination = %self.context.destination.id(),
                    ceiling = ?self.ceiling,
                    "delegation: engine opened"
                );
            }
            // The catalog is best effort; the caller just sees no sources.
            Err(err) => warn!(%err, "catalog: subscription failed, no sources available"),
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.inner.lock().await;
        EngineSnapshot {
            sources: Arc::clone(&state.sources),
            selected_ids: state.selected_ids.clone(),
            loading_donations: state.loading_donations,
            records: Arc::clone(&state.records),
            amount: state.amount,
            requested_amount: state.requested_amount.clone(),
            is_saving: state.is_saving,
            last_submission: state.last_submission.clone(),
        }
    }

    /// Changes the selection. Only a single known id opens a record subscription;
    /// the previous one is always torn down first.
    pub async fn select(self: &Arc<Self>, ids: Vec<SourceId>) -> Result<(), DelegationError> {
        let mut slot = self.record_subscription.lock().await;
        if let Some(previous) = slot.take() {
            previous.unsubscribe().await;
        }

        let (decision, generation) = {
            let mut state = self.inner.lock().await;
            state.record_generation += 1;
            state.selected_ids = ids.clone();
            let decision = resolve_selection(&ids, &state.sources);
            // Records belong to one source; never show another source's list.
            state.records = Arc::from(Vec::new());
            state.amount = None;
            state.requested_amount.clear();
            state.loading_donations = matches!(decision, SelectionDecision::Load(_));
            (decision, state.record_generation)
        };
        let _ = self.events.send(EngineEvent::SelectionChanged(ids));

        match decision {
            SelectionDecision::Clear => Ok(()),
            SelectionDecision::Unknown(id) => {
                warn!(source_id = %id, "selection: unknown source");
                Err(DelegationError::UnknownSource(id))
            }
            SelectionDecision::Load(source) => {
                let source_id = source.id().clone();
                info!(
                    source_id = %source_id,
                    kind = ?source.kind(),
                    generation,
                    "records: subscribing"
                );
                match self
                    .live_query
                    .watch(DONATIONS_COLLECTION, record_query(&source))
                    .await
                {
                    Ok(stream) => {
                        let task = self.spawn_record_task(generation, source_id.clone(), stream);
                        *slot = Some(RecordSubscription {
                            generation,
                            source_id,
                            task,
                        });
                    }
                    Err(err) => {
                        self.apply_record_failure(generation, &source_id, err.to_string())
                            .await
                    }
                }
                Ok(())
            }
        }
    }

    /// Stores the entered text and validates it against the current maximum.
    /// The text is kept even when invalid.
    pub async fn set_requested_amount(
        &self,
        text: impl Into<String>,
    ) -> Result<Decimal, AmountValidationError> {
        let mut state = self.inner.lock().await;
        state.requested_amount = text.into();
        validate_amount(&state.requested_amount, state.effective_amount())
    }

    pub async fn slide_requested_amount(&self, position: Decimal) -> Decimal {
        let mut state = self.inner.lock().await;
        let amount = slide_amount(position, state.effective_amount());
        state.requested_amount = amount.to_string();
        amount
    }

    pub async fn validate_requested_amount(&self) -> Result<Decimal, AmountValidationError> {
        let state = self.inner.lock().await;
        validate_amount(&state.requested_amount, state.effective_amount())
    }

    /// Delegates the requested amount from the loaded records. Resolves once the
    /// action is accepted or has failed; confirmation is reported later as an event.
    pub async fn submit(self: &Arc<Self>) -> Result<SubmissionOutcome, DelegationError> {
        let request = {
            let mut state = self.inner.lock().await;
            if state.is_saving {
                debug!("delegation: submit ignored while a submission is in flight");
                return Err(DelegationError::SubmissionInFlight);
            }
            if state.selected_ids.len() != 1 {
                return Err(DelegationError::NoSelection);
            }
            if state.loading_donations {
                return Err(DelegationError::RecordsLoading);
            }
            let Some(reconciled) = state.amount else {
                return Err(DelegationError::NoRecords);
            };
            if state.records.is_empty() {
                return Err(DelegationError::NoRecords);
            }
            let amount = validate_amount(&state.requested_amount, reconciled.effective)?;
            let amount_smallest_unit = to_smallest_unit(amount)?;

            state.is_saving = true;
            state.last_submission = Some(SubmissionOutcome::Pending);
            SubmissionRequest {
                records: Arc::clone(&state.records),
                amount,
                amount_smallest_unit,
                destination: self.context.destination.clone(),
            }
        };

        info!(
            records = request.records.len(),
            amount = %request.amount,
            destination = %request.destination.id(),
            "delegation: submitting"
        );
        let _ = self.events.send(EngineEvent::SubmissionStarted);

        // Detached so a dropped caller cannot leave the engine stuck in the saving state.
        let engine = Arc::clone(self);
        match tokio::spawn(async move { engine.run_submission(request).await }).await {
            Ok(result) => result,
            Err(err) => Err(self.fail_submission(err.to_string()).await),
        }
    }

    /// Stops both subscriptions.
    pub async fn shutdown(&self) {
        let catalog = self.catalog_subscription.lock().await.take();
        if let Some(task) = catalog {
            task.abort();
            let _ = task.await;
        }
        let records = self.record_subscription.lock().await.take();
        if let Some(subscription) = records {
            subscription.unsubscribe().await;
        }
        {
            let mut state = self.inner.lock().await;
            state.record_generation += 1;
            state.loading_donations = false;
        }
        info!("delegation: engine shut down");
    }

    fn spawn_catalog_task(self: &Arc<Self>, mut stream: ResultStream) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let destination = self.context.destination.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                match item {
                    Ok(result) => {
                        let sources = build_source_list(result, &destination);
                        engine.apply_sources(sources).await;
                    }
                    Err(err) => {
                        warn!(%err, "catalog: subscription ended, keeping last known sources");
                        break;
                    }
                }
            }
        })
    }

    async fn apply_sources(self: &Arc<Self>, sources: Vec<FundingSource>) {
        let sources: Arc<[FundingSource]> = Arc::from(sources);
        {
            let mut state = self.inner.lock().await;
            state.sources = Arc::clone(&sources);
        }
        debug!(count = sources.len(), "catalog: sources updated");
        let _ = self
            .events
            .send(EngineEvent::SourcesUpdated(Arc::clone(&sources)));

        if let Some(id) = auto_selection(&sources) {
            info!(source_id = %id, "catalog: auto-selecting the only source");
            if let Err(err) = self.select(vec![id]).await {
                warn!(%err, "catalog: auto-selection failed");
            }
        }
    }

    fn spawn_record_task(
        self: &Arc<Self>,
        generation: u64,
        source_id: SourceId,
        mut stream: ResultStream,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                let decoded = item
                    .map_err(|err| err.to_string())
                    .and_then(|result| decode_records(result).map_err(|err| err.to_string()));
                match decoded {
                    Ok(records) => engine.apply_records(generation, &source_id, records).await,
                    Err(reason) => {
                        engine
                            .apply_record_failure(generation, &source_id, reason)
                            .await
                    }
                }
            }
            debug!(generation, source_id = %source_id, "records: stream ended");
        })
    }

    async fn apply_records(
        &self,
        generation: u64,
        source_id: &SourceId,
        records: Arc<[FundingRecord]>,
    ) {
        let amount = {
            let mut state = self.inner.lock().await;
            if state.record_generation != generation {
                debug!(generation, "records: dropping emission of a superseded subscription");
                return;
            }
            match reconcile(&records, self.ceiling) {
                Ok(amount) => {
                    state.records = Arc::clone(&records);
                    state.amount = Some(amount);
                    state.requested_amount = amount.effective.to_string();
                    state.loading_donations = false;
                    Ok(amount)
                }
                Err(err) => Err(err),
            }
        };

        match amount {
            Ok(amount) => {
                debug!(
                    source_id = %source_id,
                    count = records.len(),
                    effective = %amount.effective,
                    "records: reconciled"
                );
                let _ = self.events.send(EngineEvent::RecordsUpdated {
                    source_id: source_id.clone(),
                    records,
                    amount,
                });
            }
            Err(err) => {
                self.apply_record_failure(generation, source_id, err.to_string())
                    .await
            }
        }
    }

    /// Ends the loading state but keeps whatever records were already shown.
    async fn apply_record_failure(&self, generation: u64, source_id: &SourceId, reason: String) {
        {
            let mut state = self.inner.lock().await;
            if state.record_generation != generation {
                return;
            }
            state.loading_donations = false;
        }
        warn!(source_id = %source_id, %reason, "records: subscription error, keeping previous donations");
        let _ = self.events.send(EngineEvent::RecordsFailed {
            source_id: source_id.clone(),
            error: ReportedError::new(ErrorCode::Unavailable, reason),
        });
    }

    async fn run_submission(
        self: Arc<Self>,
        request: SubmissionRequest,
    ) -> Result<SubmissionOutcome, DelegationError> {
        let pending = match self.action.delegate_multiple(request).await {
            Ok(pending) => pending,
            Err(err) => return Err(self.fail_submission(format!("{err:#}")).await),
        };
        let PendingDelegation {
            accepted,
            confirmed,
        } = pending;

        let tx_link = match accepted.await {
            Ok(Ok(tx_link)) => tx_link,
            Ok(Err(err)) => return Err(self.fail_submission(format!("{err:#}")).await),
            Err(_) => {
                return Err(self
                    .fail_submission("delegation action dropped before acceptance".into())
                    .await)
            }
        };

        if let Err(err) = self.select(Vec::new()).await {
            warn!(%err, "delegation: failed to reset selection after acceptance");
        }
        {
            let mut state = self.inner.lock().await;
            state.is_saving = false;
            state.last_submission = Some(SubmissionOutcome::Accepted(tx_link.clone()));
        }
        info!(tx_link = %tx_link, "delegation: accepted");
        self.notifier.notify(Notice::Delegated {
            tx_link: tx_link.clone(),
        });
        let _ = self
            .events
            .send(EngineEvent::SubmissionAccepted(tx_link.clone()));
        self.spawn_confirmation_watch(confirmed);

        Ok(SubmissionOutcome::Accepted(tx_link))
    }

    fn spawn_confirmation_watch(self: &Arc<Self>, confirmed: oneshot::Receiver<TxLink>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Ok(tx_link) = confirmed.await else {
                debug!("delegation: no confirmation reported");
                return;
            };
            let Some(engine) = weak.upgrade() else {
                return;
            };
            info!(tx_link = %tx_link, "delegation: confirmed");
            engine.notifier.notify(Notice::Confirmed {
                tx_link: tx_link.clone(),
            });
            {
                let mut state = engine.inner.lock().await;
                if state.last_submission == Some(SubmissionOutcome::Accepted(tx_link.clone())) {
                    state.last_submission = Some(SubmissionOutcome::Confirmed(tx_link.clone()));
                }
            }
            let _ = engine.events.send(EngineEvent::SubmissionConfirmed(tx_link));
        });
    }

    async fn fail_submission(&self, reason: String) -> DelegationError {
        {
            let mut state = self.inner.lock().await;
            state.is_saving = false;
            state.last_submission = Some(SubmissionOutcome::Failed(reason.clone()));
        }
        warn!(%reason, "delegation: submission failed");
        let err = DelegationError::SubmissionFailed(reason);
        let _ = self
            .events
            .send(EngineEvent::SubmissionFailed(ReportedError::from(&err)));
        err
    }
}

impl Drop for DelegationEngine {
    fn drop(&mut self) {
        if let Some(task) = self.catalog_subscription.get_mut().take() {
            task.abort();
        }
        if let Some(subscription) = self.record_subscription.get_mut().take() {
            subscription.task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
