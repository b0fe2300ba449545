//! Named playback lines.
//!
//! Each line plays at most one stream. Playback runs on its own thread, pulling
//! the stream in [`TICK`]-sized chunks and sampling the line's gain supplier
//! for every chunk, so gain changes and cancellation take effect within one
//! tick. A new `play` on a busy line preempts the running stream.

use super::gain::{apply_gain, db_to_linear, volume_to_db, MAX_GAIN_DB};
use super::pcm::{PcmStream, Pull};
use super::sink::{SinkFactory, TICK};
use super::GainSupplier;
use crate::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct LineHandle {
    playback_id: u64,
    cancel: Arc<AtomicBool>,
}

/// Master volume and mute, shared with every playback thread.
struct Master {
    gain_bits: AtomicU32,
    muted: AtomicBool,
}

impl Master {
    fn gain(&self) -> f32 {
        if self.muted.load(Ordering::Relaxed) {
            0.0
        } else {
            f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
        }
    }
}

pub struct AudioLineMixer {
    lines: Arc<DashMap<String, LineHandle>>,
    sinks: Arc<dyn SinkFactory>,
    master: Arc<Master>,
    next_playback: AtomicU64,
}

impl AudioLineMixer {
    pub fn new(sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            lines: Arc::new(DashMap::new()),
            sinks,
            master: Arc::new(Master {
                gain_bits: AtomicU32::new(1.0f32.to_bits()),
                muted: AtomicBool::new(false),
            }),
            next_playback: AtomicU64::new(1),
        }
    }

    /// Master volume slider, 0-100.
    pub fn set_master_volume(&self, volume: u8) {
        let linear = db_to_linear(volume_to_db(volume));
        self.master.gain_bits.store(linear.to_bits(), Ordering::Relaxed);
        info!(target = "mixer", volume, "Master volume set");
    }

    pub fn set_muted(&self, muted: bool) {
        self.master.muted.store(muted, Ordering::Relaxed);
        info!(target = "mixer", muted, "Master mute set");
    }

    pub fn is_muted(&self) -> bool {
        self.master.muted.load(Ordering::Relaxed)
    }

    /// Start `stream` on `line`, preempting whatever that line was playing.
    pub fn play(&self, line: &str, stream: PcmStream, gain: GainSupplier) -> Result<()> {
        let playback_id = self.next_playback.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));

        if let Some(prev) = self.lines.insert(
            line.to_string(),
            LineHandle {
                playback_id,
                cancel: Arc::clone(&cancel),
            },
        ) {
            prev.cancel.store(true, Ordering::SeqCst);
            debug!(target = "mixer", line = %line, "Preempted running playback");
        }

        let job = Playback {
            line: line.to_string(),
            playback_id,
            cancel,
            stream,
            gain,
            master: Arc::clone(&self.master),
            lines: Arc::clone(&self.lines),
            sinks: Arc::clone(&self.sinks),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("voxline-line-{}", line))
            .spawn(move || job.run());
        if let Err(e) = spawned {
            // The job (and its stream teardown) was dropped with the closure.
            self.lines
                .remove_if(line, |_, h| h.playback_id == playback_id);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn close(&self, line: &str) -> bool {
        match self.lines.remove(line) {
            Some((_, handle)) => {
                handle.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Stop and remove every line whose name matches.
    pub fn close_conditional<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let names: Vec<String> = self
            .lines
            .iter()
            .filter(|e| predicate(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let closed = names.iter().filter(|name| self.close(name)).count();
        if closed > 0 {
            debug!(target = "mixer", closed, "Closed lines");
        }
        closed
    }

    pub fn close_all(&self) -> usize {
        self.close_conditional(|_| true)
    }

    pub fn is_playing(&self, line: &str) -> bool {
        self.lines.contains_key(line)
    }

    pub fn active_lines(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Drop for AudioLineMixer {
    fn drop(&mut self) {
        self.close_all();
    }
}

struct Playback {
    line: String,
    playback_id: u64,
    cancel: Arc<AtomicBool>,
    stream: PcmStream,
    gain: GainSupplier,
    master: Arc<Master>,
    lines: Arc<DashMap<String, LineHandle>>,
    sinks: Arc<dyn SinkFactory>,
}

impl Playback {
    fn run(mut self) {
        let format = self.stream.format();
        let chunk = format.samples_for(TICK);
        let max_gain = db_to_linear(MAX_GAIN_DB);

        match self.sinks.open(&self.line, format) {
            Ok(mut sink) => loop {
                if self.cancel.load(Ordering::SeqCst) {
                    debug!(target = "mixer", line = %self.line, "Playback cancelled");
                    break;
                }
                match self.stream.pull(chunk, TICK) {
                    Pull::Samples(mut samples) => {
                        let g = ((self.gain)() * self.master.gain()).clamp(0.0, max_gain);
                        apply_gain(&mut samples, g);
                        if let Err(e) = sink.write(&samples) {
                            warn!(target = "mixer", line = %self.line, error = %e, "Sink write failed");
                            break;
                        }
                    }
                    Pull::Pending => continue,
                    Pull::Finished => {
                        if let Err(e) = sink.drain() {
                            warn!(target = "mixer", line = %self.line, error = %e, "Sink drain failed");
                        }
                        break;
                    }
                }
            },
            Err(e) => error!(target = "mixer", line = %self.line, error = %e, "Failed to open sink"),
        }

        let id = self.playback_id;
        self.lines.remove_if(&self.line, |_, h| h.playback_id == id);
        // Dropping `self` drops the stream, which fires its teardown if unfinished.
    }
}
