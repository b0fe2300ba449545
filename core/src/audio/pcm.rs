//! PCM streams handed from backends to the mixer.
//!
//! Samples are signed 16-bit, interleaved when stereo. A stream is either a
//! finished buffer or a channel that a backend keeps feeding while it
//! synthesizes. An optional teardown hook runs if the stream is dropped before
//! it was played to the end, letting the backend abandon the job behind it.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// Piper and the bridge helper both emit 22050 Hz mono.
    pub const MONO_22K: PcmFormat = PcmFormat {
        sample_rate: 22_050,
        channels: 1,
    };

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Interleaved samples covering `d`, rounded down to whole frames.
    pub fn samples_for(&self, d: Duration) -> usize {
        let frames = (self.sample_rate as u128 * d.as_millis() / 1000) as usize;
        frames.max(1) * self.channels.max(1) as usize
    }

    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = samples / self.channels.max(1) as usize;
        Duration::from_micros(frames as u64 * 1_000_000 / self.sample_rate.max(1) as u64)
    }
}

/// Result of pulling from a stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Pull {
    Samples(Vec<i16>),
    Pending,
    Finished,
}

enum Source {
    Buffer { samples: Vec<i16>, pos: usize },
    Channel { rx: Receiver<Vec<i16>>, carry: Vec<i16> },
}

pub struct PcmStream {
    format: PcmFormat,
    source: Source,
    teardown: Option<Box<dyn FnOnce() + Send>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl PcmStream {
    pub fn from_samples(format: PcmFormat, samples: Vec<i16>) -> Self {
        Self {
            format,
            source: Source::Buffer { samples, pos: 0 },
            teardown: None,
            on_close: None,
        }
    }

    /// A stream fed incrementally through the returned writer. The stream ends
    /// once the writer is dropped and everything written has been pulled.
    pub fn channel(format: PcmFormat) -> (PcmWriter, PcmStream) {
        let (tx, rx) = channel::unbounded();
        let stream = Self {
            format,
            source: Source::Channel {
                rx,
                carry: Vec::new(),
            },
            teardown: None,
            on_close: None,
        };
        (PcmWriter { tx }, stream)
    }

    /// Runs `hook` if this stream is dropped before [`Pull::Finished`] was observed.
    pub fn with_teardown<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.teardown = Some(Box::new(hook));
        self
    }

    /// Runs `hook` when this stream is dropped, whether it finished or not.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Pulls up to `max` samples, waiting at most `wait` for a streaming source.
    pub(crate) fn pull(&mut self, max: usize, wait: Duration) -> Pull {
        let pulled = match &mut self.source {
            Source::Buffer { samples, pos } => {
                if *pos >= samples.len() {
                    Pull::Finished
                } else {
                    let end = (*pos + max).min(samples.len());
                    let chunk = samples[*pos..end].to_vec();
                    *pos = end;
                    Pull::Samples(chunk)
                }
            }
            Source::Channel { rx, carry } => {
                if carry.is_empty() {
                    match rx.recv_timeout(wait) {
                        Ok(segment) => *carry = segment,
                        Err(RecvTimeoutError::Timeout) => return Pull::Pending,
                        Err(RecvTimeoutError::Disconnected) => {
                            self.teardown = None;
                            return Pull::Finished;
                        }
                    }
                }
                if carry.is_empty() {
                    Pull::Pending
                } else {
                    let take = max.min(carry.len());
                    Pull::Samples(carry.drain(..take).collect())
                }
            }
        };
        if pulled == Pull::Finished {
            self.teardown = None;
        }
        pulled
    }
}

impl Drop for PcmStream {
    fn drop(&mut self) {
        if let Some(hook) = self.teardown.take() {
            hook();
        }
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

/// Producer half of [`PcmStream::channel`].
#[derive(Clone)]
pub struct PcmWriter {
    tx: Sender<Vec<i16>>,
}

impl PcmWriter {
    /// Returns false once the consuming stream has been dropped.
    pub fn write(&self, samples: Vec<i16>) -> bool {
        self.tx.send(samples).is_ok()
    }
}
