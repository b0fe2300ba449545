// Audio output sinks
use super::pcm::PcmFormat;
use crate::Result;
use std::time::Duration;

/// Blocking PCM16 output.
///
/// A sink is opened on the playback thread that drives it and never leaves
/// that thread, so implementations may hold non-`Send` device handles.
pub trait AudioSink {
    /// Blocks until `samples` have been accepted by the device.
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Blocks until queued audio has been played out.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens one sink per playback.
pub trait SinkFactory: Send + Sync {
    fn open(&self, line: &str, format: PcmFormat) -> Result<Box<dyn AudioSink>>;
}

/// Discards audio. When `paced`, each write sleeps for the duration of the
/// samples so playback takes real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSinkFactory {
    pub paced: bool,
}

impl NullSinkFactory {
    pub fn paced() -> Self {
        Self { paced: true }
    }
}

impl SinkFactory for NullSinkFactory {
    fn open(&self, _line: &str, format: PcmFormat) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(NullSink {
            format,
            paced: self.paced,
        }))
    }
}

struct NullSink {
    format: PcmFormat,
    paced: bool,
}

impl AudioSink for NullSink {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.paced {
            std::thread::sleep(self.format.duration_of(samples.len()));
        }
        Ok(())
    }
}

pub(crate) const TICK: Duration = Duration::from_millis(20);
