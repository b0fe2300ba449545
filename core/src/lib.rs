// Voxline Core Library
// Speaker-aware text-to-speech orchestration runtime

pub mod assignment;
pub mod audio;
pub mod config;
pub mod engine;
pub mod entity;
pub mod event;
pub mod events;
pub mod gendered;
pub mod mute;
pub mod persistence;
pub mod recorder;
pub mod telemetry;
pub mod voice_id;
pub mod voice_manager;

// Export core types
pub use assignment::VoiceAssignmentStore;
pub use audio::{AudioLineMixer, GainSupplier, PcmFormat, PcmStream};
pub use engine::{Backend, SpeakStatus, SpeechEngine, SpeechManager, StartResult};
pub use entity::{EntityID, EntityKind, Gender};
pub use event::WeakEventBus;
pub use gendered::GenderedVoiceRegistry;
pub use mute::MuteManager;
pub use recorder::Recorder;
pub use voice_id::VoiceID;
pub use voice_manager::VoiceManager;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlineError {
    #[error("Invalid entity id used as a key")]
    InvalidEntity,

    #[error("Invalid voice id: {0}")]
    InvalidVoiceId(String),

    #[error("Recorder is already recording")]
    RecorderBusy,

    #[error("Recorder is not recording")]
    RecorderIdle,

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, VoxlineError>;
