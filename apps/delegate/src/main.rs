use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use delegation_core::{
    units::to_display, DelegationEngine, EngineContext, EngineDependencies, EngineEvent,
    EngineSnapshot,
};
use live_query::InMemoryLiveQuery;
use rust_decimal::Decimal;
use shared::{
    domain::{FundingSource, SourceId, SourceKind, WalletAddress},
    protocol::DONATIONS_COLLECTION,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod fixture;
mod simulation;

use config::{load_settings, Settings, DEFAULT_CONFIG_PATH};
use fixture::Fixture;
use simulation::{FixtureBalanceGate, SimulatedDelegationAction};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(about = "Delegate waiting donations from a fixture snapshot")]
struct Args {
    /// JSON snapshot with `destination`, `dacs` and `donations`.
    #[arg(long)]
    fixture: PathBuf,
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Overrides the owner address from the settings and the fixture.
    #[arg(long)]
    owner: Option<String>,
    /// Source to delegate from, as `id` or `kind:id` (kind is `dac` or `campaign`).
    #[arg(long)]
    source: Option<String>,
    /// Amount to delegate; defaults to the full delegatable amount.
    #[arg(long, conflicts_with = "slide")]
    amount: Option<String>,
    /// Slider position; rounded to two decimals and clamped to the maximum.
    #[arg(long)]
    slide: Option<Decimal>,
    /// Stop after showing the delegatable amount.
    #[arg(long)]
    dry_run: bool,
}

/// `--source` as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceArg {
    kind: Option<SourceKind>,
    id: SourceId,
}

impl FromStr for SourceArg {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        let (kind, id) = match text.split_once(':') {
            Some((kind, id)) => (Some(SourceKind::from_str(kind)?), id.trim()),
            None => (None, text),
        };
        if id.is_empty() {
            bail!("source id must not be empty");
        }
        Ok(Self {
            kind,
            id: SourceId::new(id),
        })
    }
}

impl SourceArg {
    fn resolve(&self, sources: &[FundingSource]) -> Result<SourceId> {
        let source = sources
            .iter()
            .find(|source| source.id() == &self.id)
            .ok_or_else(|| anyhow!("source {} is not available to this owner", self.id))?;
        match self.kind {
            Some(kind) if kind != source.kind() => bail!(
                "source {} is a {:?} source, not {:?}",
                self.id,
                source.kind(),
                kind
            ),
            _ => Ok(source.id().clone()),
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_owner(args: &Args, settings: &Settings, fixture: &Fixture) -> Result<WalletAddress> {
    args.owner
        .clone()
        .or_else(|| settings.owner_address.clone())
        .map(WalletAddress::new)
        .or_else(|| fixture.owner_address.clone())
        .ok_or_else(|| anyhow!("no owner address: pass --owner, set owner_address or APP__OWNER_ADDRESS"))
}

async fn wait_for_snapshot<F>(
    engine: &Arc<DelegationEngine>,
    timeout: Duration,
    what: &str,
    ready: F,
) -> Result<EngineSnapshot>
where
    F: Fn(&EngineSnapshot) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            let snapshot = engine.snapshot().await;
            if ready(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {what}"))
}

async fn wait_for_sources(
    events: &mut broadcast::Receiver<EngineEvent>,
    timeout: Duration,
) -> Result<Arc<[FundingSource]>> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::SourcesUpdated(sources)) => return Ok(sources),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("engine stopped before listing sources"))
                }
            }
        }
    })
    .await
    .context("timed out waiting for the source catalog")?
}

fn print_sources(sources: &[FundingSource]) {
    println!("Sources:");
    for source in sources {
        println!("  {:?} {} ({})", source.kind(), source.id(), source.name());
    }
}

fn print_records(snapshot: &EngineSnapshot) -> Result<()> {
    println!("Donations (oldest first):");
    for record in snapshot.records.iter() {
        println!(
            "  {} {} remaining={} created={}",
            record.id,
            record.status.as_str(),
            to_display(record.amount_remaining)?,
            record.created_at.to_rfc3339()
        );
    }
    if let Some(amount) = snapshot.amount {
        match amount.ceiling {
            Some(ceiling) => println!(
                "Available {} (milestone accepts up to {ceiling}), delegatable {}",
                amount.raw, amount.effective
            ),
            None => println!("Available {}, delegatable {}", amount.raw, amount.effective),
        }
    }
    Ok(())
}

async fn wait_for_confirmation(
    events: &mut broadcast::Receiver<EngineEvent>,
    timeout: Duration,
) -> Option<String> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::SubmissionConfirmed(link)) => return Some(link.to_string()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args.config)?;
    init_tracing(&settings);

    let fixture = Fixture::load(&args.fixture)?;
    let owner = resolve_owner(&args, &settings, &fixture)?;
    let source_arg = args.source.as_deref().map(SourceArg::from_str).transpose()?;

    let store = InMemoryLiveQuery::new();
    fixture.seed(&store).await;

    let action = SimulatedDelegationAction::new(
        store.clone(),
        settings.explorer_url.clone(),
        settings.accept_delay(),
        settings.confirm_delay(),
    );
    let gate = FixtureBalanceGate::new(fixture.wallet_balance()?);
    let engine = DelegationEngine::new(
        EngineContext {
            owner_address: owner.clone(),
            wallet: owner,
            destination: fixture.destination.clone(),
        },
        EngineDependencies::new(Arc::new(store.clone()), Arc::new(action)).with_gate(Arc::new(gate)),
    );
    let mut events = engine.subscribe_events();

    engine.open().await?;
    println!(
        "Delegating to {} ({})",
        fixture.destination.title(),
        fixture.destination.id()
    );

    let sources = wait_for_sources(&mut events, settings.wait_timeout()).await?;
    print_sources(&sources);

    match &source_arg {
        Some(source_arg) => engine.select(vec![source_arg.resolve(&sources)?]).await?,
        None if sources.len() == 1 => {}
        None => {
            println!("Several sources are available; pick one with --source.");
            engine.shutdown().await;
            return Ok(());
        }
    }

    let snapshot = wait_for_snapshot(&engine, settings.wait_timeout(), "donations", |s| {
        s.selected_ids.len() == 1 && !s.loading_donations
    })
    .await?;
    if snapshot.records.is_empty() {
        println!("There are no donations in this source that can be delegated.");
        engine.shutdown().await;
        return Ok(());
    }
    print_records(&snapshot)?;

    if let Some(position) = args.slide {
        let amount = engine.slide_requested_amount(position).await;
        println!("Slider set to {amount}");
    }
    if let Some(amount) = &args.amount {
        engine.set_requested_amount(amount.as_str()).await?;
    }
    let amount = engine.validate_requested_amount().await?;

    if args.dry_run {
        println!("Would delegate {amount}");
        engine.shutdown().await;
        return Ok(());
    }

    info!(%amount, "delegate: submitting");
    let outcome = engine.submit().await?;
    println!("Submitted: {outcome:?}");

    match wait_for_confirmation(&mut events, settings.wait_timeout()).await {
        Some(link) => println!("Confirmed: {link}"),
        None => println!("No confirmation yet; the transaction is still pending."),
    }

    println!("Donations after delegation:");
    for document in store.documents(DONATIONS_COLLECTION).await {
        println!("  {document}");
    }

    engine.shutdown().await;
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
