// Audio output: PCM streams, gain control, and the line mixer

pub mod gain;
pub mod lines;
pub mod mixer;
pub mod pcm;
pub mod sink;
pub mod wav;

#[cfg(feature = "playback")]
pub mod cpal_sink;

#[cfg(feature = "playback")]
pub use cpal_sink::CpalSinkFactory;

pub use mixer::AudioLineMixer;
pub use pcm::{PcmFormat, PcmStream, PcmWriter};
pub use sink::{AudioSink, NullSinkFactory, SinkFactory};

use std::sync::Arc;

/// Live linear amplitude for a line, sampled on every playback tick.
pub type GainSupplier = Arc<dyn Fn() -> f32 + Send + Sync>;
