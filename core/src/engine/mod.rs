//! Speech backends and dispatch.
//!
//! Every backend satisfies [`SpeechEngine`]: it owns a set of voices while it is
//! running and either accepts an utterance (synthesizing asynchronously and
//! handing PCM to the mixer) or rejects it. The set of backend kinds is closed,
//! see [`Backend`].

pub mod bridge;
pub mod espeak;
pub mod manager;
pub mod piper;
pub mod pooled;
pub mod process;
pub mod text;

pub use bridge::{BridgeFactory, HelperProcessBridge, SpeechBridge};
pub use espeak::EspeakFactory;
pub use manager::SpeechManager;
pub use piper::PiperFactory;
pub use pooled::{PooledEngine, Synthesizer, SynthesizerFactory};

use crate::audio::{AudioLineMixer, GainSupplier};
use crate::event::WeakEventBus;
use crate::voice_id::VoiceID;
use crate::voice_manager::VoiceManager;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    Success,
    NotInstalled,
    Disabled,
    Failure,
}

/// `NotStarted -> Starting -> Running -> Stopping -> NotStarted`; a crash
/// goes straight from `Running` to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Starting,
    Running,
    Stopping,
}

/// Line-name predicate used by `silence`.
pub type LinePredicate<'a> = &'a (dyn Fn(&str) -> bool + Send + Sync);

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> EngineState;
    /// Voices served right now; empty unless running.
    fn voices(&self) -> Vec<VoiceID>;
    fn contains(&self, voice: &VoiceID) -> bool;
    /// Never blocks on synthesis.
    fn speak(&self, voice: &VoiceID, text: &str, gain: GainSupplier, line: &str) -> SpeakStatus;
    async fn start(&self) -> StartResult;
    async fn stop(&self);
    fn silence(&self, predicate: LinePredicate<'_>);
    fn silence_all(&self);
}

/// Shared collaborators handed to every backend.
#[derive(Clone)]
pub struct EngineContext {
    pub voices: Arc<VoiceManager>,
    pub mixer: Arc<AudioLineMixer>,
    pub bus: Arc<WeakEventBus>,
}

/// The closed set of backend kinds.
pub enum Backend {
    /// Local neural voices, one persistent Piper process per worker.
    Piper(PooledEngine<PiperFactory>),
    /// The OS speech synthesizer, one espeak-ng invocation per utterance.
    OsNative(PooledEngine<EspeakFactory>),
    /// A platform speech API reached through a bridge.
    ApiBridge(PooledEngine<BridgeFactory>),
}

macro_rules! each_backend {
    ($self:ident, $engine:ident => $body:expr) => {
        match $self {
            Backend::Piper($engine) => $body,
            Backend::OsNative($engine) => $body,
            Backend::ApiBridge($engine) => $body,
        }
    };
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Piper(_) => "piper",
            Backend::OsNative(_) => "os-native",
            Backend::ApiBridge(_) => "api-bridge",
        }
    }
}

#[async_trait]
impl SpeechEngine for Backend {
    fn name(&self) -> &str {
        each_backend!(self, e => e.name())
    }

    fn state(&self) -> EngineState {
        each_backend!(self, e => e.state())
    }

    fn voices(&self) -> Vec<VoiceID> {
        each_backend!(self, e => e.voices())
    }

    fn contains(&self, voice: &VoiceID) -> bool {
        each_backend!(self, e => e.contains(voice))
    }

    fn speak(&self, voice: &VoiceID, text: &str, gain: GainSupplier, line: &str) -> SpeakStatus {
        each_backend!(self, e => e.speak(voice, text, gain, line))
    }

    async fn start(&self) -> StartResult {
        each_backend!(self, e => e.start().await)
    }

    async fn stop(&self) {
        each_backend!(self, e => e.stop().await)
    }

    fn silence(&self, predicate: LinePredicate<'_>) {
        each_backend!(self, e => e.silence(predicate))
    }

    fn silence_all(&self) {
        each_backend!(self, e => e.silence_all())
    }
}
