// Tracing setup and lifecycle logging
use crate::event::WeakEventBus;
use crate::events::{EngineEvent, EngineEventKind, SpeechManagerEvent, WorkerEvent};
use crate::{Result, VoxlineError};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| VoxlineError::Config(format!("tracing already initialized: {}", e)))?;
    Ok(())
}

/// Logs backend lifecycle events. Keep the returned handle alive; the bus only
/// holds it weakly.
pub struct LifecycleLog;

impl LifecycleLog {
    pub fn attach(bus: &WeakEventBus) -> Result<Arc<Self>> {
        let log = Arc::new(LifecycleLog);
        bus.register(&log, 0, |_: &LifecycleLog, e: &EngineEvent| match e.kind {
            EngineEventKind::Crashed | EngineEventKind::StartFailed => {
                warn!(target = "engine", engine = %e.engine, kind = ?e.kind, "Engine lifecycle")
            }
            _ => info!(target = "engine", engine = %e.engine, kind = ?e.kind, "Engine lifecycle"),
        })?;
        bus.register(&log, 0, |_: &LifecycleLog, e: &WorkerEvent| {
            info!(target = "engine", engine = %e.engine, worker = e.worker, kind = ?e.kind, "Worker lifecycle")
        })?;
        bus.register(&log, 0, |_: &LifecycleLog, e: &SpeechManagerEvent| {
            info!(target = "engine", event = ?e, "Speech lifecycle")
        })?;
        Ok(log)
    }
}
