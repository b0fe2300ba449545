//! Dispatch across the configured backends.
//!
//! The manager never substitutes voices: a voice that no running backend
//! serves is dropped and logged. Substitution is resolution's job.

use super::{Backend, EngineContext, EngineState, LinePredicate, SpeakStatus, SpeechEngine, StartResult};
use crate::audio::GainSupplier;
use crate::entity::EntityID;
use crate::events::SpeechManagerEvent;
use crate::recorder::Recorder;
use crate::voice_id::VoiceID;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub struct SpeechManager {
    ctx: EngineContext,
    backends: RwLock<Vec<Arc<Backend>>>,
    recorder: Option<Arc<Recorder>>,
}

impl SpeechManager {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            backends: RwLock::new(Vec::new()),
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn add(&self, backend: Backend) -> Arc<Backend> {
        let backend = Arc::new(backend);
        info!(target = "engine", engine = %backend.name(), kind = backend.kind(), "Added backend");
        self.write().push(Arc::clone(&backend));
        backend
    }

    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.read().clone()
    }

    pub fn backend(&self, name: &str) -> Option<Arc<Backend>> {
        self.read().iter().find(|b| b.name() == name).cloned()
    }

    /// The running backend serving `voice`, if any.
    pub fn backend_for(&self, voice: &VoiceID) -> Option<Arc<Backend>> {
        self.read().iter().find(|b| b.contains(voice)).cloned()
    }

    /// Starts every stopped backend and reports the aggregate outcome.
    pub async fn start_all(&self) -> StartResult {
        self.ctx.bus.post(&SpeechManagerEvent::Starting);
        let mut results = Vec::new();
        for backend in self.backends() {
            let result = match backend.state() {
                EngineState::Running => StartResult::Success,
                _ => backend.start().await,
            };
            debug!(target = "engine", engine = %backend.name(), result = ?result, "Backend start finished");
            results.push(result);
        }

        let result = aggregate(&results);
        info!(target = "engine", result = ?result, backends = results.len(), "Speech started");
        match result {
            StartResult::Success => self.ctx.bus.post(&SpeechManagerEvent::Started),
            other => self.ctx.bus.post(&SpeechManagerEvent::StartFailed(other)),
        };
        result
    }

    pub async fn stop_all(&self) {
        for backend in self.backends() {
            backend.stop().await;
        }
        self.ctx.mixer.close_all();
        info!(target = "engine", "Speech stopped");
        self.ctx.bus.post(&SpeechManagerEvent::Stopped);
    }

    pub fn speak(&self, voice: &VoiceID, text: &str, gain: GainSupplier, line: &str) -> SpeakStatus {
        match self.backend_for(voice) {
            Some(backend) => backend.speak(voice, text, gain, line),
            None => {
                warn!(target = "engine", voice = %voice, line = %line, "No running backend serves voice; dropping utterance");
                SpeakStatus::Reject
            }
        }
    }

    /// Resolves the speaker, then dispatches.
    pub fn speak_entity(&self, entity: &EntityID, text: &str, gain: GainSupplier, line: &str) -> SpeakStatus {
        let Some((voice, reason)) = self.ctx.voices.resolve_with_reason(entity) else {
            debug!(target = "voice", entity = %entity, "No voice for speaker; dropping utterance");
            return SpeakStatus::Reject;
        };
        let status = self.speak(&voice, text, gain, line);
        if status == SpeakStatus::Accept {
            if let Some(recorder) = &self.recorder {
                recorder.record(entity, &voice, reason);
            }
        }
        status
    }

    pub fn silence(&self, predicate: LinePredicate<'_>) {
        for backend in self.backends() {
            backend.silence(predicate);
        }
    }

    pub fn silence_all(&self) {
        for backend in self.backends() {
            backend.silence_all();
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Backend>>> {
        match self.backends.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<Backend>>> {
        match self.backends.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Folds per-backend start results into one.
pub fn aggregate(results: &[StartResult]) -> StartResult {
    let all = |pred: fn(&StartResult) -> bool| results.iter().all(pred);
    if all(|r| *r == StartResult::Disabled) {
        StartResult::Disabled
    } else if results.contains(&StartResult::Success) {
        StartResult::Success
    } else if all(|r| *r == StartResult::NotInstalled) {
        StartResult::NotInstalled
    } else if all(|r| matches!(r, StartResult::Disabled | StartResult::NotInstalled)) {
        StartResult::Disabled
    } else {
        StartResult::Failure
    }
}
