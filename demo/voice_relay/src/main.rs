use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use voxline_core::audio::{gain, lines, SinkFactory};
use voxline_core::config::SpeechConfig;
use voxline_core::engine::EngineContext;
use voxline_core::persistence::{FileStore, Persistence};
use voxline_core::telemetry::{init_tracing, LifecycleLog};
use voxline_core::voice_manager::GameState;
use voxline_core::{
    AudioLineMixer, EntityID, EntityKind, Gender, MuteManager, Recorder, SpeakStatus, SpeechManager, VoiceID,
    VoiceManager, WeakEventBus,
};

/// Genders and NPC names learned from the relayed lines.
#[derive(Default)]
struct RelayGameState {
    genders: Mutex<HashMap<EntityID, Gender>>,
    npc_names: Mutex<HashMap<i32, String>>,
}

impl RelayGameState {
    fn learn(&self, entity: &EntityID, gender: Option<Gender>, npc_name: Option<&str>) {
        if let (Some(g), Ok(mut genders)) = (gender, self.genders.lock()) {
            genders.insert(entity.clone(), g);
        }
        if let (Some(id), Some(name), Ok(mut names)) = (entity.as_id(), npc_name, self.npc_names.lock()) {
            names.insert(id, name.to_string());
        }
    }
}

impl GameState for RelayGameState {
    fn gender(&self, entity: &EntityID) -> Gender {
        self.genders
            .lock()
            .ok()
            .and_then(|g| g.get(entity).copied())
            .unwrap_or(Gender::Other)
    }

    fn npc_name(&self, entity: &EntityID) -> Option<String> {
        let id = entity.as_id()?;
        self.npc_names.lock().ok()?.get(&id).cloned()
    }
}

#[cfg(feature = "playback")]
fn sink_factory(cfg: &SpeechConfig) -> Arc<dyn SinkFactory> {
    Arc::new(voxline_core::audio::CpalSinkFactory::new(cfg.audio.device.clone()))
}

#[cfg(not(feature = "playback"))]
fn sink_factory(_cfg: &SpeechConfig) -> Arc<dyn SinkFactory> {
    Arc::new(voxline_core::audio::NullSinkFactory::paced())
}

struct Relay {
    game: Arc<RelayGameState>,
    voices: Arc<VoiceManager>,
    mixer: Arc<AudioLineMixer>,
    speech: SpeechManager,
    mutes: MuteManager,
}

/// `user:<name>` or `npc:<id>`
fn parse_entity(token: &str) -> Option<EntityID> {
    match token.split_once(':')? {
        ("user", name) => EntityID::name(name).ok(),
        ("npc", id) => id.trim().parse().ok().map(EntityID::id),
        _ => None,
    }
}

impl Relay {
    /// `npc:<id>:<gender>[:<name>[:<distance>]]: <text>` or `user:<name>[:<gender>]: <text>`
    fn relay(&self, header: &str, text: &str) {
        let parts: Vec<&str> = header.split(':').map(str::trim).collect();
        match parts.as_slice() {
            ["npc", id, rest @ ..] => {
                let Ok(id) = id.parse::<i32>() else {
                    warn!(target = "voice_relay", header = %header, "Bad npc id");
                    return;
                };
                let entity = EntityID::id(id);
                let gender = rest.first().map(|g| Gender::parse(g));
                let name = rest.get(1).copied().filter(|n| !n.is_empty());
                self.game.learn(&entity, gender, name);
                if !self.mutes.is_npc_allowed(id, name.unwrap_or_default()) {
                    info!(target = "voice_relay", npc = id, "NPC muted; skipping");
                    return;
                }
                let gain = match rest.get(2).and_then(|d| d.parse::<f32>().ok()) {
                    Some(distance) => gain::constant(gain::distance_gain(distance, gain::NPC_FLOOR)),
                    None => gain::constant(1.0),
                };
                let line = lines::npc(name.unwrap_or(&id.to_string()));
                self.speak(&entity, text, gain, &line);
            }
            ["user", name, rest @ ..] => {
                let Ok(entity) = EntityID::name(name) else {
                    warn!(target = "voice_relay", header = %header, "Bad username");
                    return;
                };
                self.game.learn(&entity, rest.first().map(|g| Gender::parse(g)), None);
                let username = entity.as_name().unwrap_or_default().to_string();
                if !self.mutes.is_username_allowed(&username) {
                    info!(target = "voice_relay", user = %username, "User muted; skipping");
                    return;
                }
                self.speak(&entity, text, gain::constant(1.0), &lines::user(&username));
            }
            ["system"] => self.speak(&EntityID::system(), text, gain::constant(1.0), lines::SYSTEM),
            _ => warn!(target = "voice_relay", header = %header, "Unrecognized speaker"),
        }
    }

    fn speak(&self, entity: &EntityID, text: &str, gain: voxline_core::GainSupplier, line: &str) {
        match self.speech.speak_entity(entity, text, gain, line) {
            SpeakStatus::Accept => info!(target = "voice_relay", entity = %entity, line = %line, "Speaking"),
            SpeakStatus::Reject => warn!(target = "voice_relay", entity = %entity, "Utterance dropped"),
        }
    }

    fn command(&self, cmd: &str, args: &[&str]) -> bool {
        match (cmd, args) {
            ("/voices", _) => {
                for voice in self.voices.active_voices() {
                    println!("{}", voice);
                }
            }
            ("/set", [entity, voice]) => match (parse_entity(entity), VoiceID::parse(voice)) {
                (Some(entity), Ok(voice)) => self.voices.set(entity, voice),
                (_, Err(e)) => warn!(target = "voice_relay", error = %e, "Bad voice"),
                (None, _) => warn!(target = "voice_relay", entity = %entity, "Bad entity"),
            },
            ("/unset", [entity]) => {
                if let Some(entity) = parse_entity(entity) {
                    self.voices.unset(&entity);
                }
            }
            ("/mute", [entity]) => match parse_entity(entity).as_ref().map(EntityID::kind) {
                Some(EntityKind::Name(name)) => {
                    self.mutes.mute_username(name);
                    self.speech.silence(&|line: &str| lines::is_user_line(line, name));
                }
                Some(EntityKind::Id(id)) => self.mutes.mute_npc_id(id),
                None => warn!(target = "voice_relay", entity = %entity, "Bad entity"),
            },
            ("/unmute", [entity]) => match parse_entity(entity).as_ref().map(EntityID::kind) {
                Some(EntityKind::Name(name)) => {
                    self.mutes.unmute_username(name);
                }
                Some(EntityKind::Id(id)) => {
                    self.mutes.unmute_npc_id(id);
                }
                None => warn!(target = "voice_relay", entity = %entity, "Bad entity"),
            },
            ("/volume", [v]) => match v.parse::<u8>() {
                Ok(v) => self.mixer.set_master_volume(v),
                Err(_) => warn!(target = "voice_relay", value = %v, "Volume must be 0-100"),
            },
            ("/silence", _) => self.speech.silence_all(),
            ("/save", _) => {
                if let Err(e) = self.voices.save().and_then(|_| self.mutes.save()) {
                    error!(target = "voice_relay", error = %e, "Failed to save settings");
                }
            }
            ("/quit", _) => return false,
            _ => warn!(target = "voice_relay", command = %cmd, "Unknown command"),
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info,voxline_core=info,voice_relay=info")?;
    info!(target = "voice_relay", "Starting voice relay: stdin → resolve → synthesize → mix");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = SpeechConfig::load();

    let persistence: Option<Arc<dyn Persistence>> = match &cfg.voices.settings_dir {
        Some(dir) => Some(Arc::new(FileStore::new(dir)?)),
        None => None,
    };

    let game = Arc::new(RelayGameState::default());
    let mut voices = VoiceManager::new(game.clone()).with_default_voice(cfg.voices.default_voice.clone());
    let mut mutes = MuteManager::new();
    if let Some(p) = &persistence {
        voices = voices.with_persistence(Arc::clone(p));
        mutes = mutes.with_persistence(Arc::clone(p));
    }
    let voices = Arc::new(voices);
    voices.load()?;
    mutes.load()?;

    let mixer = Arc::new(AudioLineMixer::new(sink_factory(&cfg)));
    mixer.set_master_volume(cfg.audio.master_volume);
    mixer.set_muted(cfg.audio.muted);

    let bus = Arc::new(WeakEventBus::new());
    let _lifecycle = LifecycleLog::attach(&bus)?;

    let ctx = EngineContext {
        voices: Arc::clone(&voices),
        mixer: Arc::clone(&mixer),
        bus,
    };
    let recorder = Arc::new(Recorder::new());
    recorder.start()?;
    let speech = SpeechManager::new(ctx.clone()).with_recorder(Arc::clone(&recorder));
    for backend in cfg.build_backends(&ctx) {
        speech.add(backend);
    }
    let result = speech.start_all().await;
    info!(target = "voice_relay", result = ?result, voices = voices.active_voices().len(), "Backends started");

    let relay = Relay {
        game,
        voices,
        mixer,
        speech,
        mutes,
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(target = "voice_relay", "Ctrl-C received; shutting down");
                break;
            }
            line = input.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.starts_with('/') {
                    let mut words = line.split_whitespace();
                    let cmd = words.next().unwrap_or_default();
                    let args: Vec<&str> = words.collect();
                    if !relay.command(cmd, &args) {
                        break;
                    }
                } else if let Some((header, text)) = line.split_once(": ") {
                    relay.relay(header, text);
                } else {
                    relay.speak(&EntityID::local_user(), line, gain::constant(1.0), lines::LOCAL_USER);
                }
            }
        }
    }

    relay.speech.stop_all().await;
    if let Ok(history) = recorder.stop() {
        info!(target = "voice_relay", utterances = history.len(), "Session finished");
    }
    Ok(())
}
