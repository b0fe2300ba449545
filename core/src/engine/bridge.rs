//! Platform speech APIs reached through a bridge.
//!
//! A [`SpeechBridge`] hides how the platform API is called. The stock
//! [`HelperProcessBridge`] runs a helper executable per utterance, writing
//! `voice\ntext\n` to its stdin and reading raw PCM16 (mono, 22050 Hz unless
//! configured) from its stdout.

use super::pooled::{Synthesizer, SynthesizerFactory};
use super::process::get_from_path;
use super::StartResult;
use crate::audio::wav::pcm16_from_le_bytes;
use crate::audio::PcmFormat;
use crate::entity::Gender;
use crate::voice_id::VoiceID;
use crate::{Result, VoxlineError};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::info;

pub trait SpeechBridge: Send + Sync + 'static {
    /// Engine name used in voice ids.
    fn name(&self) -> &str;

    fn format(&self) -> PcmFormat {
        PcmFormat::MONO_22K
    }

    fn detect(&self) -> StartResult;
    fn voices(&self) -> Result<Vec<(String, Gender)>>;
    /// Blocking synthesis of one segment.
    fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<i16>>;
}

#[derive(Clone, Debug)]
pub struct HelperProcessBridge {
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub voices: Vec<(String, Gender)>,
    /// Format of the PCM the helper writes
    pub format: PcmFormat,
}

impl HelperProcessBridge {
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            voices: Vec::new(),
            format: PcmFormat::MONO_22K,
        }
    }

    fn resolved(&self) -> Option<PathBuf> {
        if self.command.exists() {
            return Some(self.command.clone());
        }
        self.command.to_str().and_then(get_from_path)
    }
}

impl SpeechBridge for HelperProcessBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn detect(&self) -> StartResult {
        if self.resolved().is_none() {
            info!(target = "engine", engine = %self.name, command = ?self.command, "Bridge helper not found");
            return StartResult::NotInstalled;
        }
        StartResult::Success
    }

    fn voices(&self) -> Result<Vec<(String, Gender)>> {
        Ok(self.voices.clone())
    }

    fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<i16>> {
        let command = self
            .resolved()
            .ok_or_else(|| VoxlineError::Engine(format!("bridge helper {:?} not found", self.command)))?;
        let mut child = Command::new(command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // Text is single-line by protocol.
            let text = text.replace(['\r', '\n'], " ");
            stdin.write_all(format!("{}\n{}\n", voice, text).as_bytes())?;
        }
        let out = child.wait_with_output()?;
        if !out.status.success() {
            return Err(VoxlineError::Engine(format!(
                "bridge helper exited with {}",
                out.status
            )));
        }
        Ok(pcm16_from_le_bytes(&out.stdout))
    }
}

pub struct BridgeFactory {
    bridge: Arc<dyn SpeechBridge>,
    workers: usize,
    enabled: bool,
}

impl BridgeFactory {
    pub fn new(bridge: Arc<dyn SpeechBridge>, workers: usize) -> Self {
        Self {
            bridge,
            workers,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl SynthesizerFactory for BridgeFactory {
    fn engine_name(&self) -> &str {
        self.bridge.name()
    }

    fn format(&self) -> PcmFormat {
        self.bridge.format()
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn detect(&self) -> StartResult {
        self.bridge.detect()
    }

    fn voices(&self) -> Result<Vec<(VoiceID, Gender)>> {
        let engine = self.bridge.name();
        self.bridge
            .voices()?
            .into_iter()
            .map(|(voice, gender)| Ok((VoiceID::new(engine, &voice)?, gender)))
            .collect()
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn spawn(&self, _worker: usize) -> Result<Box<dyn Synthesizer>> {
        Ok(Box::new(BridgeSynth {
            bridge: Arc::clone(&self.bridge),
        }))
    }
}

struct BridgeSynth {
    bridge: Arc<dyn SpeechBridge>,
}

impl Synthesizer for BridgeSynth {
    fn synthesize(&mut self, voice: &VoiceID, text: &str) -> Result<Vec<i16>> {
        self.bridge.synthesize(voice.voice(), text)
    }

    fn is_alive(&mut self) -> bool {
        self.bridge.detect() == StartResult::Success
    }
}
