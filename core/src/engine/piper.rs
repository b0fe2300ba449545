//! Piper neural voices.
//!
//! Each worker keeps one `piper` process alive for its model:
//!
//! ```text
//! piper --model <model.onnx> --output-raw --json-input
//! ```
//!
//! Requests are JSON lines on stdin (`{"text": .., "speaker_id": ..}`), audio
//! comes back as raw PCM16 mono at the model's sample rate on stdout, and piper
//! logs a line ending in `" sec)"` on stderr once an utterance is complete.
//!
//! Env overrides:
//! - PIPER_BIN

use super::pooled::{Synthesizer, SynthesizerFactory};
use super::process::{get_from_env_or_path, get_from_path};
use super::StartResult;
use crate::audio::wav::pcm16_from_le_bytes;
use crate::audio::PcmFormat;
use crate::entity::Gender;
use crate::voice_id::VoiceID;
use crate::{Result, VoxlineError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long stdout may stay quiet after piper reported completion before the
/// utterance is considered fully read.
const TAIL_WAIT: Duration = Duration::from_millis(30);

#[derive(Clone, Debug)]
pub struct PiperConfig {
    pub piper_bin: Option<PathBuf>,
    pub model: PathBuf,
    /// Worker processes for this model
    pub processes: usize,
    /// Speaker id (as text) -> gender; unlisted speakers are `Other`
    pub genders: HashMap<String, Gender>,
    pub enabled: bool,
}

impl PiperConfig {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            piper_bin: get_from_env_or_path("PIPER_BIN", "piper"),
            model: model.into(),
            processes: 1,
            genders: HashMap::new(),
            enabled: true,
        }
    }
}

/// The subset of piper's `<model>.onnx.json` the engine reads.
#[derive(Debug, Default, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    audio: ModelAudio,
    #[serde(default)]
    speaker_id_map: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct ModelAudio {
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,
}

impl Default for ModelAudio {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_sample_rate() -> u32 {
    22_050
}

pub struct PiperFactory {
    cfg: PiperConfig,
    engine_name: String,
    model_cfg: ModelConfig,
}

impl PiperFactory {
    /// The engine is named after the model file, e.g. `en_US-libritts-high`.
    pub fn new(cfg: PiperConfig) -> Self {
        let engine_name = model_name(&cfg.model);
        let model_cfg = read_model_config(&cfg.model).unwrap_or_default();
        Self {
            cfg,
            engine_name,
            model_cfg,
        }
    }

    fn bin(&self) -> Option<PathBuf> {
        self.cfg
            .piper_bin
            .clone()
            .filter(|p| p.exists())
            .or_else(|| get_from_path("piper"))
    }
}

impl SynthesizerFactory for PiperFactory {
    fn engine_name(&self) -> &str {
        &self.engine_name
    }

    fn format(&self) -> PcmFormat {
        PcmFormat::new(self.model_cfg.audio.sample_rate, 1)
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    fn detect(&self) -> StartResult {
        if self.bin().is_none() {
            info!(target = "piper", "Piper binary not found");
            return StartResult::NotInstalled;
        }
        if !self.cfg.model.exists() {
            info!(target = "piper", model = ?self.cfg.model, "Piper model not found");
            return StartResult::NotInstalled;
        }
        StartResult::Success
    }

    fn voices(&self) -> Result<Vec<(VoiceID, Gender)>> {
        let gender_of = |id: &str| self.cfg.genders.get(id).copied().unwrap_or(Gender::Other);
        if self.model_cfg.speaker_id_map.is_empty() {
            // Single-speaker models answer to speaker 0.
            return Ok(vec![(VoiceID::new(&self.engine_name, "0")?, gender_of("0"))]);
        }
        let mut ids: Vec<i64> = self.model_cfg.speaker_id_map.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .map(|id| {
                let text = id.to_string();
                Ok((VoiceID::new(&self.engine_name, &text)?, gender_of(&text)))
            })
            .collect()
    }

    fn workers(&self) -> usize {
        self.cfg.processes
    }

    fn spawn(&self, worker: usize) -> Result<Box<dyn Synthesizer>> {
        let bin = self
            .bin()
            .ok_or_else(|| VoxlineError::Engine("Piper binary not found".into()))?;
        let process = PiperProcess::spawn(&bin, &self.cfg.model)?;
        debug!(target = "piper", model = %self.engine_name, worker, pid = process.child.id(), "Spawned piper process");
        Ok(Box::new(process))
    }
}

fn model_name(model: &Path) -> String {
    let file = model
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("piper");
    file.trim_end_matches(".onnx").replace(':', "_")
}

fn read_model_config(model: &Path) -> Option<ModelConfig> {
    let mut json_path = model.as_os_str().to_owned();
    json_path.push(".json");
    let raw = std::fs::read_to_string(PathBuf::from(json_path)).ok()?;
    match serde_json::from_str(&raw) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(target = "piper", model = ?model, error = %e, "Unreadable model config");
            None
        }
    }
}

#[derive(Serialize)]
struct PiperRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker_id: Option<i64>,
}

enum Output {
    Audio(Vec<u8>),
    Done,
}

/// A persistent piper process.
pub struct PiperProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Receiver<Output>,
}

impl PiperProcess {
    pub fn spawn(bin: &Path, model: &Path) -> Result<Self> {
        let mut cmd = Command::new(bin);
        cmd.arg("--model").arg(model);
        cmd.arg("--output-raw");
        cmd.arg("--json-input");
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(target = "piper", command = ?cmd, "Running piper");
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoxlineError::Engine("piper stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| VoxlineError::Engine("piper stderr unavailable".into()))?;

        // Both pipes feed one channel so audio and completion arrive in order
        // of observation.
        let (tx, rx) = channel::unbounded();
        let audio_tx = tx.clone();
        std::thread::Builder::new()
            .name("voxline-piper-stdout".into())
            .spawn(move || {
                let mut stdout = stdout;
                let mut buf = [0u8; 8192];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if audio_tx.send(Output::Audio(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                    }
                }
            })?;
        std::thread::Builder::new()
            .name("voxline-piper-stderr".into())
            .spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    if line.ends_with(" sec)") {
                        if tx.send(Output::Done).is_err() {
                            break;
                        }
                    } else {
                        debug!(target = "piper", "{}", line);
                    }
                }
            })?;

        Ok(Self {
            child,
            stdin,
            output: rx,
        })
    }

    fn send_request(&mut self, voice: &VoiceID, text: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VoxlineError::Engine("piper stdin closed".into()))?;
        let request = PiperRequest {
            text,
            speaker_id: voice.int_id(),
        };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        stdin.write_all(&line)?;
        stdin.flush()?;
        Ok(())
    }
}

impl Synthesizer for PiperProcess {
    fn synthesize(&mut self, voice: &VoiceID, text: &str) -> Result<Vec<i16>> {
        // Discard leftovers from an utterance abandoned mid-read.
        while self.output.try_recv().is_ok() {}

        self.send_request(voice, text)?;

        let mut bytes = Vec::new();
        loop {
            match self.output.recv() {
                Ok(Output::Audio(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(Output::Done) => break,
                Err(_) => return Err(VoxlineError::Engine("piper process exited".into())),
            }
        }
        loop {
            match self.output.recv_timeout(TAIL_WAIT) {
                Ok(Output::Audio(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(Output::Done) | Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(pcm16_from_le_bytes(&bytes))
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn shutdown(&mut self) {
        // Closing stdin lets piper exit on its own; kill covers a hung process.
        self.stdin.take();
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

impl Drop for PiperProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_name_comes_from_model_file() {
        assert_eq!(
            model_name(Path::new("/voices/en_US-libritts-high.onnx")),
            "en_US-libritts-high"
        );
    }

    #[test]
    fn request_line_carries_speaker_id() {
        let req = PiperRequest {
            text: "Hello",
            speaker_id: Some(12),
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"text":"Hello","speaker_id":12}"#
        );
    }

    #[test]
    fn voices_follow_speaker_map() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("libritts.onnx");
        std::fs::write(&model, b"").unwrap();
        std::fs::write(
            dir.path().join("libritts.onnx.json"),
            r#"{"audio":{"sample_rate":22050},"speaker_id_map":{"p84":3,"p90":1}}"#,
        )
        .unwrap();

        let mut cfg = PiperConfig::new(&model);
        cfg.genders.insert("3".into(), Gender::Female);
        let factory = PiperFactory::new(cfg);
        let voices = factory.voices().unwrap();
        assert_eq!(
            voices,
            vec![
                (VoiceID::new("libritts", "1").unwrap(), Gender::Other),
                (VoiceID::new("libritts", "3").unwrap(), Gender::Female),
            ]
        );
        assert_eq!(factory.format(), PcmFormat::MONO_22K);
    }
}
