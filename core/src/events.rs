// Lifecycle events posted on the WeakEventBus
use crate::engine::StartResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    Starting,
    Started,
    StartNotInstalled,
    StartDisabled,
    StartFailed,
    Crashed,
    Stopped,
}

/// A backend changed lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub engine: String,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(engine: impl Into<String>, kind: EngineEventKind) -> Self {
        Self {
            engine: engine.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEventKind {
    Spawned,
    Died,
    Crashed,
}

/// A synthesis worker inside a pooled backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub engine: String,
    pub worker: usize,
    pub kind: WorkerEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechManagerEvent {
    Starting,
    Started,
    /// No backend reached `Running`; carries the aggregated result.
    StartFailed(StartResult),
    Stopped,
}
