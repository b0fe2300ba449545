//! OS speech synthesizer via espeak-ng.
//!
//! Each segment is one `espeak-ng -v <voice> --stdout --stdin` invocation. The
//! text goes in on stdin, never argv, so it cannot be read as an option. The
//! WAV output is decoded to PCM16.
//!
//! Env overrides:
//! - ESPEAK_BIN

use super::pooled::{Synthesizer, SynthesizerFactory};
use super::process::{get_from_env_or_path, get_from_path};
use super::StartResult;
use crate::audio::wav::decode_pcm16;
use crate::audio::PcmFormat;
use crate::entity::Gender;
use crate::voice_id::VoiceID;
use crate::{Result, VoxlineError};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

pub const ENGINE_NAME: &str = "espeak";

#[derive(Clone, Debug)]
pub struct EspeakConfig {
    pub espeak_bin: Option<PathBuf>,
    /// Voices to expose; empty means every voice `--voices` lists.
    pub voices: Vec<(String, Gender)>,
    pub workers: usize,
    pub enabled: bool,
}

impl Default for EspeakConfig {
    fn default() -> Self {
        Self {
            espeak_bin: get_from_env_or_path("ESPEAK_BIN", "espeak-ng")
                .or_else(|| get_from_path("espeak")),
            voices: Vec::new(),
            workers: 2,
            enabled: true,
        }
    }
}

pub struct EspeakFactory {
    cfg: EspeakConfig,
}

impl EspeakFactory {
    pub fn new(cfg: EspeakConfig) -> Self {
        Self { cfg }
    }

    fn bin(&self) -> Result<PathBuf> {
        self.cfg
            .espeak_bin
            .clone()
            .filter(|p| p.exists())
            .ok_or_else(|| VoxlineError::Engine("espeak-ng binary not found".into()))
    }
}

impl SynthesizerFactory for EspeakFactory {
    fn engine_name(&self) -> &str {
        ENGINE_NAME
    }

    fn format(&self) -> PcmFormat {
        PcmFormat::MONO_22K
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    fn detect(&self) -> StartResult {
        match self.bin() {
            Ok(_) => StartResult::Success,
            Err(_) => {
                info!(target = "engine", engine = ENGINE_NAME, "espeak-ng not installed");
                StartResult::NotInstalled
            }
        }
    }

    fn voices(&self) -> Result<Vec<(VoiceID, Gender)>> {
        let listed = if self.cfg.voices.is_empty() {
            let out = Command::new(self.bin()?)
                .arg("--voices")
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .output()?;
            parse_voice_list(&String::from_utf8_lossy(&out.stdout))
        } else {
            self.cfg.voices.clone()
        };
        listed
            .into_iter()
            .map(|(name, gender)| Ok((VoiceID::new(ENGINE_NAME, &name)?, gender)))
            .collect()
    }

    fn workers(&self) -> usize {
        self.cfg.workers
    }

    fn spawn(&self, _worker: usize) -> Result<Box<dyn Synthesizer>> {
        Ok(Box::new(EspeakSynth { bin: self.bin()? }))
    }
}

struct EspeakSynth {
    bin: PathBuf,
}

impl Synthesizer for EspeakSynth {
    fn synthesize(&mut self, voice: &VoiceID, text: &str) -> Result<Vec<i16>> {
        let mut child = Command::new(&self.bin)
            .args(synth_args(voice.voice()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }
        let out = child.wait_with_output()?;
        if !out.status.success() {
            return Err(VoxlineError::Engine(format!(
                "espeak-ng exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let (format, samples) = decode_pcm16(&out.stdout)?;
        if format != PcmFormat::MONO_22K {
            debug!(target = "engine", engine = ENGINE_NAME, ?format, "Unexpected espeak output format");
        }
        Ok(samples)
    }
}

fn synth_args(voice: &str) -> [&str; 4] {
    ["-v", voice, "--stdout", "--stdin"]
}

/// Parses `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  5  en-us           --/F      English_(America)  gmw/en-US
/// ```
///
/// Voices are addressed by their language column.
fn parse_voice_list(out: &str) -> Vec<(String, Gender)> {
    let mut voices = Vec::new();
    for line in out.lines().skip(1) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 3 {
            continue;
        }
        let gender = match cols[2].rsplit('/').next() {
            Some("M") => Gender::Male,
            Some("F") => Gender::Female,
            _ => Gender::Other,
        };
        let name = cols[1].to_string();
        if !name.contains(':') && !voices.iter().any(|(n, _)| n == &name) {
            voices.push((name, gender));
        }
    }
    voices
}
