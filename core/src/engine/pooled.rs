//! Worker-pool engine shared by every backend kind.
//!
//! A [`SynthesizerFactory`] describes one backend: whether it is installed,
//! which voices it serves, and how to spawn a [`Synthesizer`]. The pool runs one
//! synthesizer per worker thread and feeds them from a bounded job queue, so a
//! worker only ever synthesizes one text at a time and a full queue rejects new
//! work. Accepted jobs stream PCM into the mixer segment by segment; closing
//! the line cancels the job.

use super::text;
use super::{EngineContext, EngineState, LinePredicate, SpeakStatus, SpeechEngine, StartResult};
use crate::audio::{GainSupplier, PcmFormat, PcmStream, PcmWriter};
use crate::entity::Gender;
use crate::events::{EngineEvent, EngineEventKind, WorkerEvent, WorkerEventKind};
use crate::voice_id::VoiceID;
use crate::Result;
use async_trait::async_trait;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Workers get this long to finish their current job on stop before they are
/// detached.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// One synthesis worker. Lives on, and never leaves, its worker thread.
pub trait Synthesizer: Send {
    /// Blocking synthesis of one segment into PCM16 in the factory's format.
    fn synthesize(&mut self, voice: &VoiceID, text: &str) -> Result<Vec<i16>>;

    /// Consulted after a failed job; a dead synthesizer crashes the engine.
    fn is_alive(&mut self) -> bool {
        true
    }

    fn shutdown(&mut self) {}
}

pub trait SynthesizerFactory: Send + Sync + 'static {
    fn engine_name(&self) -> &str;
    fn format(&self) -> PcmFormat;

    fn enabled(&self) -> bool {
        true
    }

    /// Blocking install check; anything but `Success` aborts the start.
    fn detect(&self) -> StartResult;
    fn voices(&self) -> Result<Vec<(VoiceID, Gender)>>;
    fn workers(&self) -> usize;
    fn spawn(&self, worker: usize) -> Result<Box<dyn Synthesizer>>;
}

struct Job {
    id: u64,
    voice: VoiceID,
    segments: Vec<String>,
    writer: PcmWriter,
    cancel: Arc<AtomicBool>,
}

struct Inflight {
    line: String,
    cancel: Arc<AtomicBool>,
}

struct Shared {
    name: String,
    format: PcmFormat,
    ctx: EngineContext,
    state: Mutex<EngineState>,
    voices: DashMap<VoiceID, Gender>,
    queue: Mutex<Option<Sender<Job>>>,
    inflight: DashMap<u64, Inflight>,
    // Lines this backend feeds, by job id, until their playback ends.
    playing: DashMap<u64, String>,
    next_job: AtomicU64,
    // Bumped on every start so late crash reports from an older run are ignored.
    generation: AtomicU64,
}

impl Shared {
    fn state(&self) -> EngineState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: EngineState) {
        match self.state.lock() {
            Ok(mut s) => *s = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn transition(&self, from: EngineState, to: EngineState) -> bool {
        let mut s = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *s == from {
            *s = to;
            true
        } else {
            false
        }
    }

    fn post(&self, kind: EngineEventKind) {
        self.ctx.bus.post(&EngineEvent::new(self.name.clone(), kind));
    }

    fn post_worker(&self, worker: usize, kind: WorkerEventKind) {
        self.ctx.bus.post(&WorkerEvent {
            engine: self.name.clone(),
            worker,
            kind,
        });
    }

    fn sender(&self) -> Option<Sender<Job>> {
        match self.queue.lock() {
            Ok(q) => q.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_sender(&self, tx: Option<Sender<Job>>) {
        match self.queue.lock() {
            Ok(mut q) => *q = tx,
            Err(poisoned) => *poisoned.into_inner() = tx,
        }
    }

    /// Cancels matching jobs and closes every matching line this backend
    /// feeds, including lines whose synthesis already finished.
    fn silence_where(&self, predicate: LinePredicate<'_>) -> usize {
        let mut lines: Vec<String> = self
            .inflight
            .iter()
            .filter(|e| predicate(e.line.as_str()))
            .map(|e| {
                e.cancel.store(true, Ordering::SeqCst);
                e.line.clone()
            })
            .collect();
        lines.extend(
            self.playing
                .iter()
                .filter(|e| predicate(e.value().as_str()))
                .map(|e| e.value().clone()),
        );
        lines.sort();
        lines.dedup();
        lines.iter().filter(|line| self.ctx.mixer.close(line)).count()
    }

    /// Closes the queue, cancels every job and line, and withdraws voices.
    fn release(&self) {
        self.set_sender(None);

        let closed = self.silence_where(&|_: &str| true);
        self.inflight.clear();
        self.playing.clear();
        if closed > 0 {
            debug!(target = "engine", engine = %self.name, closed, "Closed lines on release");
        }

        let voices: Vec<VoiceID> = self.voices.iter().map(|e| e.key().clone()).collect();
        self.voices.clear();
        for voice in &voices {
            self.ctx.voices.unregister(voice);
        }
    }

    fn crash(&self, generation: u64, worker: usize) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if !self.transition(EngineState::Running, EngineState::NotStarted) {
            return;
        }
        error!(target = "engine", engine = %self.name, worker, "Synthesis worker died; engine stopped");
        self.release();
        self.post_worker(worker, WorkerEventKind::Crashed);
        self.post(EngineEventKind::Crashed);
    }

    /// Returns false if the synthesizer died while running the job.
    fn run_job(&self, synth: &mut dyn Synthesizer, job: Job) -> bool {
        let Job {
            id,
            voice,
            segments,
            writer,
            cancel,
        } = job;

        let mut alive = true;
        for segment in &segments {
            if cancel.load(Ordering::SeqCst) {
                debug!(target = "engine", engine = %self.name, job = id, "Job cancelled");
                break;
            }
            match synth.synthesize(&voice, segment) {
                Ok(samples) => {
                    if cancel.load(Ordering::SeqCst) || !writer.write(samples) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(target = "engine", engine = %self.name, voice = %voice, error = %e, "Synthesis failed");
                    alive = synth.is_alive();
                    break;
                }
            }
        }
        self.inflight.remove(&id);
        alive
    }
}

fn worker_loop(
    shared: Arc<Shared>,
    generation: u64,
    index: usize,
    mut synth: Box<dyn Synthesizer>,
    jobs: Receiver<Job>,
) {
    while let Ok(job) = jobs.recv() {
        if !shared.run_job(synth.as_mut(), job) {
            synth.shutdown();
            shared.crash(generation, index);
            return;
        }
    }
    synth.shutdown();
    shared.post_worker(index, WorkerEventKind::Died);
}

pub struct PooledEngine<F: SynthesizerFactory> {
    factory: Arc<F>,
    shared: Arc<Shared>,
    // Held across start/stop so lifecycle transitions never interleave.
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<F: SynthesizerFactory> PooledEngine<F> {
    pub fn new(factory: F, ctx: EngineContext) -> Self {
        let shared = Shared {
            name: factory.engine_name().to_string(),
            format: factory.format(),
            ctx,
            state: Mutex::new(EngineState::NotStarted),
            voices: DashMap::new(),
            queue: Mutex::new(None),
            inflight: DashMap::new(),
            playing: DashMap::new(),
            next_job: AtomicU64::new(1),
            generation: AtomicU64::new(0),
        };
        Self {
            factory: Arc::new(factory),
            shared: Arc::new(shared),
            workers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Jobs accepted but not yet finished or cancelled.
    pub fn inflight_jobs(&self) -> usize {
        self.shared.inflight.len()
    }

    /// Lines this backend is still feeding, sorted.
    pub fn playing_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.shared.playing.iter().map(|e| e.value().clone()).collect();
        lines.sort();
        lines.dedup();
        lines
    }

    fn fail_start(&self, result: StartResult) {
        self.shared.set_state(EngineState::NotStarted);
        let kind = match result {
            StartResult::NotInstalled => EngineEventKind::StartNotInstalled,
            StartResult::Disabled => EngineEventKind::StartDisabled,
            _ => EngineEventKind::StartFailed,
        };
        self.shared.post(kind);
    }
}

type Prepared = (Vec<(VoiceID, Gender)>, Vec<Box<dyn Synthesizer>>);

#[async_trait]
impl<F: SynthesizerFactory> SpeechEngine for PooledEngine<F> {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn state(&self) -> EngineState {
        self.shared.state()
    }

    fn voices(&self) -> Vec<VoiceID> {
        let mut voices: Vec<VoiceID> = self.shared.voices.iter().map(|e| e.key().clone()).collect();
        voices.sort();
        voices
    }

    fn contains(&self, voice: &VoiceID) -> bool {
        self.shared.state() == EngineState::Running && self.shared.voices.contains_key(voice)
    }

    fn speak(&self, voice: &VoiceID, text: &str, gain: GainSupplier, line: &str) -> SpeakStatus {
        let shared = &self.shared;
        if !self.contains(voice) {
            debug!(target = "engine", engine = %shared.name, voice = %voice, "Voice not served; rejecting");
            return SpeakStatus::Reject;
        }
        let segments = text::segments(text);
        if segments.is_empty() {
            return SpeakStatus::Reject;
        }
        let Some(queue) = shared.sender() else {
            return SpeakStatus::Reject;
        };

        let id = shared.next_job.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        let (writer, stream) = PcmStream::channel(shared.format);
        shared.inflight.insert(
            id,
            Inflight {
                line: line.to_string(),
                cancel: Arc::clone(&cancel),
            },
        );

        let job = Job {
            id,
            voice: voice.clone(),
            segments,
            writer,
            cancel: Arc::clone(&cancel),
        };
        match queue.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                shared.inflight.remove(&id);
                debug!(target = "engine", engine = %shared.name, "All workers busy; rejecting");
                return SpeakStatus::Reject;
            }
            Err(TrySendError::Disconnected(_)) => {
                shared.inflight.remove(&id);
                return SpeakStatus::Reject;
            }
        }

        shared.playing.insert(id, line.to_string());
        let weak: Weak<Shared> = Arc::downgrade(shared);
        let closed = Weak::clone(&weak);
        let stream = stream
            .with_teardown(move || {
                cancel.store(true, Ordering::SeqCst);
                if let Some(shared) = weak.upgrade() {
                    shared.inflight.remove(&id);
                }
            })
            .on_close(move || {
                if let Some(shared) = closed.upgrade() {
                    shared.playing.remove(&id);
                }
            });

        if let Err(e) = shared.ctx.mixer.play(line, stream, gain) {
            warn!(target = "engine", engine = %shared.name, line = %line, error = %e, "Failed to start playback");
            return SpeakStatus::Reject;
        }
        debug!(target = "engine", engine = %shared.name, voice = %voice, line = %line, job = id, "Accepted utterance");
        SpeakStatus::Accept
    }

    async fn start(&self) -> StartResult {
        let mut workers = self.workers.lock().await;
        let shared = &self.shared;

        if !shared.transition(EngineState::NotStarted, EngineState::Starting) {
            warn!(target = "engine", engine = %shared.name, state = ?shared.state(), "Start requested while not stopped");
            return StartResult::Failure;
        }
        if !self.factory.enabled() {
            info!(target = "engine", engine = %shared.name, "Engine disabled; skipping");
            self.fail_start(StartResult::Disabled);
            return StartResult::Disabled;
        }
        shared.post(EngineEventKind::Starting);

        let factory = Arc::clone(&self.factory);
        let name = shared.name.clone();
        let prepared = task::spawn_blocking(move || -> std::result::Result<Prepared, StartResult> {
            match factory.detect() {
                StartResult::Success => {}
                other => return Err(other),
            }
            let voices = factory.voices().map_err(|e| {
                warn!(target = "engine", engine = %name, error = %e, "Failed to list voices");
                StartResult::Failure
            })?;
            if voices.is_empty() {
                warn!(target = "engine", engine = %name, "Engine offers no voices");
                return Err(StartResult::Failure);
            }
            let mut synths = Vec::new();
            for i in 0..factory.workers().max(1) {
                match factory.spawn(i) {
                    Ok(s) => synths.push(s),
                    Err(e) => warn!(target = "engine", engine = %name, worker = i, error = %e, "Failed to spawn worker"),
                }
            }
            if synths.is_empty() {
                return Err(StartResult::Failure);
            }
            Ok((voices, synths))
        })
        .await;

        let (voices, synths) = match prepared {
            Ok(Ok(p)) => p,
            Ok(Err(result)) => {
                info!(target = "engine", engine = %shared.name, result = ?result, "Engine did not start");
                self.fail_start(result);
                return result;
            }
            Err(e) => {
                error!(target = "engine", engine = %shared.name, error = %e, "Start task failed");
                self.fail_start(StartResult::Failure);
                return StartResult::Failure;
            }
        };

        // Handles from a crashed run exit on their own once their queue closed.
        workers.clear();
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = channel::bounded::<Job>(synths.len() * 2);
        for (i, synth) in synths.into_iter().enumerate() {
            let worker_shared = Arc::clone(shared);
            let rx = rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("voxline-{}-{}", shared.name, i))
                .spawn(move || worker_loop(worker_shared, generation, i, synth, rx));
            match spawned {
                Ok(handle) => {
                    workers.push(handle);
                    shared.post_worker(i, WorkerEventKind::Spawned);
                }
                Err(e) => warn!(target = "engine", engine = %shared.name, worker = i, error = %e, "Failed to spawn worker thread"),
            }
        }
        if workers.is_empty() {
            self.fail_start(StartResult::Failure);
            return StartResult::Failure;
        }

        shared.set_sender(Some(tx));
        shared.set_state(EngineState::Running);
        for (voice, gender) in &voices {
            shared.voices.insert(voice.clone(), *gender);
        }
        shared.ctx.voices.register_all(voices);
        info!(target = "engine", engine = %shared.name, workers = workers.len(), voices = shared.voices.len(), "Engine started");
        shared.post(EngineEventKind::Started);
        StartResult::Success
    }

    async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        let shared = &self.shared;
        if !shared.transition(EngineState::Running, EngineState::Stopping) {
            debug!(target = "engine", engine = %shared.name, "Stop requested while not running");
            return;
        }

        shared.release();
        let handles = std::mem::take(&mut *workers);
        let joined = tokio::time::timeout(
            STOP_GRACE,
            task::spawn_blocking(move || {
                for h in handles {
                    let _ = h.join();
                }
            }),
        )
        .await;
        if joined.is_err() {
            warn!(target = "engine", engine = %shared.name, "Workers still busy after stop; detaching");
        }

        shared.set_state(EngineState::NotStarted);
        info!(target = "engine", engine = %shared.name, "Engine stopped");
        shared.post(EngineEventKind::Stopped);
    }

    fn silence(&self, predicate: LinePredicate<'_>) {
        self.shared.silence_where(predicate);
    }

    fn silence_all(&self) {
        self.silence(&|_: &str| true);
    }
}
