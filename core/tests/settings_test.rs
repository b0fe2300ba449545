use std::path::PathBuf;
use std::sync::Arc;

use voxline_core::audio::NullSinkFactory;
use voxline_core::config::SpeechConfig;
use voxline_core::engine::EngineContext;
use voxline_core::mute::MuteState;
use voxline_core::persistence::{FileStore, MemoryStore, Persistence, MUTE_SETTINGS_KEY};
use voxline_core::voice_manager::{Resolution, UnknownGameState};
use voxline_core::{
    AudioLineMixer, EntityID, Gender, MuteManager, Recorder, SpeechEngine, VoiceID, VoiceManager,
    VoxlineError, WeakEventBus,
};

fn v(s: &str) -> VoiceID {
    VoiceID::parse(s).unwrap()
}

#[test]
fn recorder_sessions_are_exclusive() {
    let recorder = Recorder::new();
    let npc = EntityID::id(3106);
    assert!(!recorder.record(&npc, &v("piper:1"), Resolution::Rule));
    assert!(matches!(recorder.stop(), Err(VoxlineError::RecorderIdle)));

    recorder.start().unwrap();
    assert!(recorder.is_recording());
    assert!(matches!(recorder.start(), Err(VoxlineError::RecorderBusy)));

    assert!(recorder.record(&npc, &v("piper:1"), Resolution::Rule));
    assert!(recorder.record(&EntityID::system(), &v("espeak:en"), Resolution::Default));
    assert_eq!(recorder.history().len(), 2);

    let history = recorder.stop().unwrap();
    assert!(!recorder.is_recording());
    assert_eq!(history[0].entity, npc);
    assert_eq!(history[1].reason, Resolution::Default);
    assert!(history[0].at <= history[1].at);
    assert!(recorder.history().is_empty());

    // A fresh session starts empty.
    recorder.start().unwrap();
    assert!(recorder.stop().unwrap().is_empty());
}

#[test]
fn mute_mode_blocks_only_muted_speakers() {
    let mutes = MuteManager::new();
    assert!(!mutes.listen_mode());
    assert!(mutes.is_username_allowed("Zezima"));

    mutes.mute_username("Zezima");
    mutes.mute_username("zezima ");
    assert!(!mutes.is_username_allowed("ZEZIMA"));
    assert_eq!(mutes.snapshot().username_mute_list, vec!["zezima"]);

    mutes.mute_npc_id(3106);
    mutes.mute_npc_name("Hans");
    assert!(!mutes.is_npc_allowed(3106, "Banker"));
    assert!(!mutes.is_npc_allowed(1, "hans"));
    assert!(mutes.is_npc_allowed(1, "Banker"));

    assert!(mutes.unmute_username("Zezima"));
    assert!(!mutes.unmute_username("Zezima"));
    assert!(mutes.is_username_allowed("Zezima"));
}

#[test]
fn listen_mode_allows_only_listened_speakers() {
    let mutes = MuteManager::new();
    mutes.set_listen_mode(true);
    assert!(!mutes.is_username_allowed("Zezima"));
    assert!(!mutes.is_npc_allowed(3106, "Banker"));

    mutes.listen_username("Zezima");
    mutes.listen_npc_name("Banker");
    assert!(mutes.is_username_allowed("zezima"));
    assert!(mutes.is_npc_allowed(3106, "banker"));
    assert!(!mutes.is_npc_allowed(3106, "Hans"));

    mutes.listen_npc_id(3106);
    assert!(mutes.is_npc_allowed(3106, "Hans"));
    assert!(mutes.unlisten_npc_id(3106));

    mutes.clear_listens();
    assert!(!mutes.is_username_allowed("Zezima"));
    assert!(mutes.listen_mode());
}

#[test]
fn mute_settings_round_trip_through_store() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
    let mutes = MuteManager::new().with_persistence(Arc::clone(&store));
    mutes.set_listen_mode(true);
    mutes.listen_username("Zezima");
    mutes.mute_npc_id(7);
    mutes.save().unwrap();

    let doc = store.get_raw(MUTE_SETTINGS_KEY).unwrap().unwrap();
    assert!(doc.contains("\"listenMode\": true"));
    assert!(doc.contains("usernameListenList"));

    let restored = MuteManager::new().with_persistence(Arc::clone(&store));
    assert!(restored.load().unwrap());
    assert_eq!(restored.snapshot(), mutes.snapshot());
}

#[test]
fn missing_mute_settings_reset_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Persistence> = Arc::new(FileStore::new(dir.path()).unwrap());
    let mutes = MuteManager::new().with_persistence(store);
    mutes.set_listen_mode(true);
    mutes.mute_username("someone");

    assert!(!mutes.load().unwrap());
    assert_eq!(mutes.snapshot(), MuteState::default());
}

#[test]
fn partial_mute_document_fills_defaults() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_raw(MUTE_SETTINGS_KEY, r#"{"npcIdMuteList":[12,13]}"#)
        .unwrap();
    let mutes = MuteManager::new().with_persistence(store);
    assert!(mutes.load().unwrap());
    assert!(!mutes.listen_mode());
    assert!(!mutes.is_npc_allowed(13, "Goblin"));
    assert!(mutes.is_npc_allowed(14, "Goblin"));
}

#[test]
fn toml_overlays_defaults() {
    let cfg = SpeechConfig::from_toml_str(
        r#"
        [piper]
        models = ["/voices/en_US-libritts-high.onnx", "/voices/en_GB-alan-low.onnx"]
        processes = 3
        genders = { "0" = "female", "1" = "male" }

        [espeak]
        enabled = false
        voices = { "en" = "male", "fr" = "f" }

        [audio]
        master_volume = 250
        muted = true
        device = "USB"

        [voices]
        default_voice = "espeak:en"
        settings_dir = "/tmp/voxline"
        "#,
    )
    .unwrap();

    assert_eq!(cfg.piper.models.len(), 2);
    assert_eq!(cfg.piper.processes, 3);
    assert_eq!(cfg.piper.genders.get("0"), Some(&Gender::Female));
    assert!(!cfg.espeak.enabled);
    assert_eq!(
        cfg.espeak.voices,
        vec![("en".to_string(), Gender::Male), ("fr".to_string(), Gender::Female)]
    );
    assert_eq!(cfg.audio.master_volume, 100);
    assert!(cfg.audio.muted);
    assert_eq!(cfg.audio.device.as_deref(), Some("USB"));
    assert_eq!(cfg.voices.default_voice, Some(v("espeak:en")));
    assert_eq!(cfg.voices.settings_dir, Some(PathBuf::from("/tmp/voxline")));
    assert!(cfg.bridge.is_none());
}

#[test]
fn invalid_default_voice_is_ignored() {
    let cfg = SpeechConfig::from_toml_str("[voices]\ndefault_voice = \"no-colon\"\n").unwrap();
    assert_eq!(cfg.voices.default_voice, None);
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = SpeechConfig::from_toml_str("[audio\nmaster_volume = 1").unwrap_err();
    assert!(matches!(err, VoxlineError::Config(_)));

    let missing = SpeechConfig::load_from(std::path::Path::new("/nonexistent/voxline.toml"));
    assert_eq!(missing.audio.master_volume, 100);
}

#[test]
fn bridge_section_needs_a_command() {
    let cfg = SpeechConfig::from_toml_str("[bridge]\nname = \"sapi\"\n").unwrap();
    assert!(cfg.bridge.is_none());

    let cfg = SpeechConfig::from_toml_str(
        r#"
        [bridge]
        command = "/opt/speech-helper"
        args = ["--raw"]
        workers = 0
        voices = { "david" = "male", "zira" = "female" }
        "#,
    )
    .unwrap();
    let bridge = cfg.bridge.unwrap();
    assert_eq!(bridge.name, "bridge");
    assert!(bridge.enabled);
    assert_eq!(bridge.args, vec!["--raw"]);
    assert_eq!(bridge.workers, 1);
    assert_eq!(bridge.voices[1], ("zira".to_string(), Gender::Female));
}

#[test]
fn backends_follow_configuration_order() {
    let mut cfg = SpeechConfig::from_toml_str(
        r#"
        [piper]
        models = ["/voices/en_US-libritts-high.onnx"]

        [bridge]
        name = "sapi"
        command = "/opt/speech-helper"
        "#,
    )
    .unwrap();
    cfg.espeak.enabled = false;

    let ctx = EngineContext {
        voices: Arc::new(VoiceManager::new(Arc::new(UnknownGameState))),
        mixer: Arc::new(AudioLineMixer::new(Arc::new(NullSinkFactory::default()))),
        bus: Arc::new(WeakEventBus::new()),
    };
    let backends = cfg.build_backends(&ctx);
    let kinds: Vec<&str> = backends.iter().map(|b| b.kind()).collect();
    assert_eq!(kinds, vec!["piper", "os-native", "api-bridge"]);
    assert_eq!(backends[0].name(), "en_US-libritts-high");
    assert_eq!(backends[2].name(), "sapi");
}
