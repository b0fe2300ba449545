use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::bridge::{BridgeFactory, HelperProcessBridge};
use crate::engine::espeak::{EspeakConfig, EspeakFactory};
use crate::engine::piper::{PiperConfig, PiperFactory};
use crate::engine::process::get_from_env_or_path;
use crate::engine::{Backend, EngineContext, PooledEngine};
use crate::entity::Gender;
use crate::voice_id::VoiceID;
use crate::{Result, VoxlineError};

/// Everything needed to assemble backends, the mixer and voice settings.
#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub piper: PiperSection,
    pub espeak: EspeakConfig,
    pub bridge: Option<BridgeSection>,
    pub audio: AudioConfig,
    pub voices: VoicesConfig,
}

#[derive(Clone, Debug)]
pub struct PiperSection {
    pub enabled: bool,
    pub bin: Option<PathBuf>,
    /// One backend per model
    pub models: Vec<PathBuf>,
    pub processes: usize,
    pub genders: HashMap<String, Gender>,
}

#[derive(Clone, Debug)]
pub struct BridgeSection {
    pub enabled: bool,
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub voices: Vec<(String, Gender)>,
    pub workers: usize,
}

#[derive(Clone, Debug)]
pub struct AudioConfig {
    /// 0-100
    pub master_volume: u8,
    pub muted: bool,
    /// Output device name substring; default device when unset
    pub device: Option<String>,
    /// Sample rate of bridge helper output
    pub sample_rate: u32,
}

#[derive(Clone, Debug, Default)]
pub struct VoicesConfig {
    pub default_voice: Option<VoiceID>,
    /// Directory holding voice and mute settings documents
    pub settings_dir: Option<PathBuf>,
}

fn default_workers() -> usize {
    std::env::var("VOXLINE_WORKERS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(2)
}

/// `*.onnx` files directly under `dir`, sorted.
fn models_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut models: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "onnx"))
        .collect();
    models.sort();
    models
}

impl Default for PiperSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bin: get_from_env_or_path("PIPER_BIN", "piper"),
            models: std::env::var("PIPER_MODEL_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|dir| models_in(Path::new(&dir)))
                .unwrap_or_default(),
            processes: default_workers(),
            genders: HashMap::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            master_volume: 100,
            muted: false,
            device: None,
            sample_rate: 22_050,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            piper: PiperSection::default(),
            espeak: EspeakConfig {
                workers: default_workers(),
                ..EspeakConfig::default()
            },
            bridge: None,
            audio: AudioConfig::default(),
            voices: VoicesConfig::default(),
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file (path via VOXLINE_CONFIG or ./voxline.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("VOXLINE_CONFIG").unwrap_or_else(|_| "voxline.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::info!(target = "voice", path = ?path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match Self::from_toml_str(&s) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target = "voice", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "voice", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let t = toml::from_str::<SpeechToml>(s).map_err(|e| VoxlineError::Config(e.to_string()))?;
        Ok(t.overlay(Self::default()))
    }

    /// One backend per Piper model, then espeak-ng, then the bridge if configured.
    pub fn build_backends(&self, ctx: &EngineContext) -> Vec<Backend> {
        let mut backends = Vec::new();
        for model in &self.piper.models {
            let cfg = PiperConfig {
                piper_bin: self.piper.bin.clone(),
                model: model.clone(),
                processes: self.piper.processes,
                genders: self.piper.genders.clone(),
                enabled: self.piper.enabled,
            };
            backends.push(Backend::Piper(PooledEngine::new(
                PiperFactory::new(cfg),
                ctx.clone(),
            )));
        }
        backends.push(Backend::OsNative(PooledEngine::new(
            EspeakFactory::new(self.espeak.clone()),
            ctx.clone(),
        )));
        if let Some(b) = &self.bridge {
            let mut helper = HelperProcessBridge::new(b.name.clone(), b.command.clone());
            helper.args = b.args.clone();
            helper.voices = b.voices.clone();
            helper.format.sample_rate = self.audio.sample_rate;
            let mut factory = BridgeFactory::new(Arc::new(helper), b.workers);
            if !b.enabled {
                factory = factory.disabled();
            }
            backends.push(Backend::ApiBridge(PooledEngine::new(factory, ctx.clone())));
        }
        backends
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SpeechToml {
    pub piper: Option<PiperToml>,
    pub espeak: Option<EspeakToml>,
    pub bridge: Option<BridgeToml>,
    pub audio: Option<AudioToml>,
    pub voices: Option<VoicesToml>,
}

impl SpeechToml {
    fn overlay(self, mut base: SpeechConfig) -> SpeechConfig {
        if let Some(p) = self.piper {
            p.apply(&mut base.piper);
        }
        if let Some(e) = self.espeak {
            e.apply(&mut base.espeak);
        }
        if let Some(b) = self.bridge {
            base.bridge = b.into_section(base.espeak.workers);
        }
        if let Some(a) = self.audio {
            a.apply(&mut base.audio);
        }
        if let Some(v) = self.voices {
            v.apply(&mut base.voices);
        }
        base
    }
}

fn parse_voices(voices: HashMap<String, String>) -> Vec<(String, Gender)> {
    let mut out: Vec<(String, Gender)> = voices
        .into_iter()
        .map(|(name, gender)| (name, Gender::parse(&gender)))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PiperToml {
    pub enabled: Option<bool>,
    pub bin: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub models: Option<Vec<PathBuf>>,
    pub processes: Option<usize>,
    /// speaker id -> "male" | "female" | ...
    pub genders: Option<HashMap<String, String>>,
}
impl PiperToml {
    fn apply(self, p: &mut PiperSection) {
        if let Some(x) = self.enabled {
            p.enabled = x;
        }
        if let Some(x) = self.bin {
            p.bin = Some(x);
        }
        if let Some(x) = self.model_dir {
            p.models = models_in(&x);
        }
        if let Some(x) = self.models {
            p.models = x;
        }
        if let Some(x) = self.processes {
            p.processes = x.max(1);
        }
        if let Some(x) = self.genders {
            p.genders = x
                .into_iter()
                .map(|(id, g)| (id, Gender::parse(&g)))
                .collect();
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct EspeakToml {
    pub enabled: Option<bool>,
    pub bin: Option<PathBuf>,
    pub workers: Option<usize>,
    /// voice -> gender; empty lists every installed voice
    pub voices: Option<HashMap<String, String>>,
}
impl EspeakToml {
    fn apply(self, e: &mut EspeakConfig) {
        if let Some(x) = self.enabled {
            e.enabled = x;
        }
        if let Some(x) = self.bin {
            e.espeak_bin = Some(x);
        }
        if let Some(x) = self.workers {
            e.workers = x.max(1);
        }
        if let Some(x) = self.voices {
            e.voices = parse_voices(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct BridgeToml {
    pub enabled: Option<bool>,
    pub name: Option<String>,
    pub command: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub workers: Option<usize>,
    pub voices: Option<HashMap<String, String>>,
}
impl BridgeToml {
    /// A bridge without a command is left unconfigured.
    fn into_section(self, default_workers: usize) -> Option<BridgeSection> {
        let command = self.command?;
        Some(BridgeSection {
            enabled: self.enabled.unwrap_or(true),
            name: self.name.unwrap_or_else(|| "bridge".into()),
            command,
            args: self.args.unwrap_or_default(),
            voices: parse_voices(self.voices.unwrap_or_default()),
            workers: self.workers.unwrap_or(default_workers).max(1),
        })
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct AudioToml {
    pub master_volume: Option<u8>,
    pub muted: Option<bool>,
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
}
impl AudioToml {
    fn apply(self, a: &mut AudioConfig) {
        if let Some(x) = self.master_volume {
            a.master_volume = x.min(100);
        }
        if let Some(x) = self.muted {
            a.muted = x;
        }
        if let Some(x) = self.device {
            a.device = Some(x);
        }
        if let Some(x) = self.sample_rate {
            a.sample_rate = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct VoicesToml {
    pub default_voice: Option<String>,
    pub settings_dir: Option<PathBuf>,
}
impl VoicesToml {
    fn apply(self, v: &mut VoicesConfig) {
        if let Some(x) = self.default_voice {
            match VoiceID::parse(&x) {
                Ok(voice) => v.default_voice = Some(voice),
                Err(e) => tracing::warn!(target = "voice", error = %e, "Ignoring invalid default voice"),
            }
        }
        if let Some(x) = self.settings_dir {
            v.settings_dir = Some(x);
        }
    }
}
