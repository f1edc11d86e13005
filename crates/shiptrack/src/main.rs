use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use log::{error, info, warn};
use tokio::sync::broadcast;

use shiptrack::config::{default_config_path, load_config, Config};
use shiptrack::db::{default_database_path, Database};
use shiptrack::{
    logging, notifier, CarrierSet, RefreshOrchestrator, RefreshScheduler, SessionContext,
    ShipmentStore,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Explicit path from the first argument, else `$SHIPTRACK_CONFIG`, else the
/// default location (which may not exist yet).
fn resolve_config() -> Result<Config, BoxError> {
    if let Some(path) = std::env::args_os().nth(1) {
        return Ok(load_config(PathBuf::from(path))?);
    }

    match default_config_path() {
        Some(path) if path.exists() => Ok(load_config(path)?),
        _ => Ok(Config::default()),
    }
}

fn build_orchestrator(config: &Config) -> Result<Arc<RefreshOrchestrator>, BoxError> {
    let db_path = match &config.database.path {
        Some(path) => path.clone(),
        None => default_database_path().ok_or("could not determine the home directory")?,
    };
    let db = Database::open(&db_path)?;

    let store = ShipmentStore::new(db, &config.database);
    let carriers = CarrierSet::from_config(&config.carriers)?;
    let notifier = notifier::from_config(&config.telegram)?;
    let session = SessionContext::from_config(&config.session);

    Ok(Arc::new(RefreshOrchestrator::new(
        store,
        carriers,
        notifier,
        session,
        &config.refresh,
    )))
}

fn run() -> Result<(), BoxError> {
    let config = resolve_config()?;
    logging::init(&config.logging)?;

    info!("Starting shiptrackd v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = build_orchestrator(&config)?;

    if !config.scheduler.enabled {
        info!("Scheduler disabled; running a single refresh");
        let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        let report = rt.block_on(orchestrator.refresh_all(true))?;
        if !report.failures.is_empty() {
            warn!("{} shipments could not be refreshed", report.failures.len());
        }
        return Ok(());
    }

    let scheduler = RefreshScheduler::new(Arc::clone(&orchestrator), config.scheduler.interval());
    let (trigger_tx, trigger_rx) = broadcast::channel(16);
    let handle = scheduler.start(trigger_rx)?;
    info!(
        "Refreshing auto-poll shipments every {}s",
        config.scheduler.interval_secs
    );

    // Refresh once at startup instead of waiting a full interval.
    let _ = trigger_tx.send(());

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    let _ = stop_rx.recv();

    info!("Shutting down");
    scheduler.stop();
    let _ = trigger_tx.send(());
    if handle.join().is_err() {
        error!("Scheduler thread panicked");
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be initialized yet.
            eprintln!("shiptrackd: {}", e);
            ExitCode::FAILURE
        }
    }
}
