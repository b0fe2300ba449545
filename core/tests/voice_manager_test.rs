use std::collections::HashMap;
use std::sync::Arc;

use voxline_core::persistence::{FileStore, MemoryStore, Persistence, VOICE_SETTINGS_KEY};
use voxline_core::voice_manager::{GameState, Resolution, UnknownGameState};
use voxline_core::{EntityID, Gender, VoiceID, VoiceManager};

fn v(s: &str) -> VoiceID {
    VoiceID::parse(s).unwrap()
}

struct Genders(HashMap<EntityID, Gender>);

impl GameState for Genders {
    fn gender(&self, entity: &EntityID) -> Gender {
        self.0.get(entity).copied().unwrap_or(Gender::Other)
    }

    fn npc_name(&self, entity: &EntityID) -> Option<String> {
        match entity.as_id() {
            Some(41) => Some("Giant Bat".into()),
            _ => None,
        }
    }
}

fn manager() -> VoiceManager {
    VoiceManager::new(Arc::new(UnknownGameState))
}

#[test]
fn no_live_voices_resolves_to_none() {
    let vm = manager();
    let p1 = EntityID::name("p1").unwrap();
    assert_eq!(vm.resolve(&p1), None);

    vm.register(v("alice:1"), Gender::Other);
    vm.register(v("bob:1"), Gender::Other);
    assert!(vm.resolve(&p1).is_some());

    vm.unregister(&v("alice:1"));
    vm.unregister(&v("bob:1"));
    assert_eq!(vm.resolve(&p1), None);
    // Never registered; still fine.
    assert!(!vm.unregister(&v("carol:1")));
}

#[test]
fn gender_fallback_never_crosses_genders() {
    let genders = HashMap::from([(EntityID::id(41), Gender::Male)]);
    let vm = VoiceManager::new(Arc::new(Genders(genders)));
    vm.register(v("p1:alice"), Gender::Male);
    vm.register(v("p1:bob"), Gender::Female);

    let npc = EntityID::id(41);
    assert_eq!(
        vm.resolve_with_reason(&npc),
        Some((v("p1:alice"), Resolution::GenderFallback(Gender::Male)))
    );

    vm.unregister(&v("p1:alice"));
    assert!(vm.is_active(&v("p1:bob")));
    assert_eq!(vm.resolve(&npc), None);
}

#[test]
fn override_beats_rule_until_unset() {
    let vm = manager();
    vm.register(v("libritts:3"), Gender::Male);
    vm.register(v("libritts:7"), Gender::Male);
    let p2 = EntityID::name("p2").unwrap();
    vm.update_store(|s| s.put(&p2, vec![v("libritts:3")]));

    assert_eq!(vm.resolve_with_reason(&p2), Some((v("libritts:3"), Resolution::Rule)));

    vm.set(p2.clone(), v("libritts:7"));
    assert_eq!(vm.resolve_with_reason(&p2), Some((v("libritts:7"), Resolution::Override)));

    assert_eq!(vm.unset(&p2), Some(v("libritts:7")));
    assert_eq!(vm.resolve(&p2), Some(v("libritts:3")));
}

#[test]
fn rule_lists_pick_first_live_voice() {
    let vm = manager();
    let p = EntityID::name("p").unwrap();
    vm.update_store(|s| s.put(&p, vec![v("libritts:1"), v("espeak:en")]));
    vm.register(v("espeak:en"), Gender::Other);
    assert_eq!(vm.resolve(&p), Some(v("espeak:en")));

    vm.register(v("libritts:1"), Gender::Other);
    assert_eq!(vm.resolve(&p), Some(v("libritts:1")));
}

#[test]
fn offline_override_falls_through() {
    let vm = manager();
    vm.register(v("espeak:en"), Gender::Other);
    let p = EntityID::name("p").unwrap();
    vm.set(p.clone(), v("libritts:7"));
    assert_eq!(
        vm.resolve_with_reason(&p),
        Some((v("espeak:en"), Resolution::GenderFallback(Gender::Other)))
    );
}

#[test]
fn gender_fallback_is_deterministic() {
    let mut genders = HashMap::new();
    for i in 0..20 {
        genders.insert(EntityID::id(i), Gender::Female);
    }
    let vm = VoiceManager::new(Arc::new(Genders(genders)));
    for i in 0..5 {
        vm.register(v(&format!("libritts:{}", i)), Gender::Female);
    }
    vm.register(v("libritts:99"), Gender::Male);

    for i in 0..20 {
        let e = EntityID::id(i);
        let first = vm.resolve(&e).unwrap();
        assert_ne!(first, v("libritts:99"));
        assert_eq!(vm.resolve(&e), Some(first));
    }
    // Hash-indexed: ids spread over the bucket.
    assert_ne!(vm.resolve(&EntityID::id(0)), vm.resolve(&EntityID::id(1)));
}

#[test]
fn npc_name_rules_and_global_npc() {
    let vm = VoiceManager::new(Arc::new(Genders(HashMap::new())));
    vm.register(v("libritts:1"), Gender::Other);
    vm.register(v("libritts:2"), Gender::Other);
    vm.register(v("libritts:3"), Gender::Other);

    vm.update_store(|s| s.set_npc_name("*bat", vec![v("libritts:3")]));
    assert_eq!(vm.resolve_with_reason(&EntityID::id(41)), Some((v("libritts:3"), Resolution::Rule)));

    vm.set(EntityID::global_npc(), v("libritts:2"));
    assert_eq!(
        vm.resolve_with_reason(&EntityID::id(42)),
        Some((v("libritts:2"), Resolution::GlobalNpc))
    );
    // Players are not NPCs.
    let player = EntityID::name("someone").unwrap();
    assert_ne!(vm.resolve_with_reason(&player).map(|(_, r)| r), Some(Resolution::GlobalNpc));
}

#[test]
fn blacklisted_voices_skip_fallback_only() {
    let vm = manager();
    vm.register(v("espeak:en"), Gender::Other);
    vm.register(v("espeak:de"), Gender::Other);
    vm.blacklist(v("espeak:en"));
    assert!(vm.is_active(&v("espeak:en")));

    for name in ["a", "b", "c", "d", "e"] {
        assert_eq!(vm.resolve(&EntityID::name(name).unwrap()), Some(v("espeak:de")));
    }
    let p = EntityID::name("p").unwrap();
    vm.set(p.clone(), v("espeak:en"));
    assert_eq!(vm.resolve(&p), Some(v("espeak:en")));
}

#[test]
fn default_voice_only_when_live() {
    let vm = manager().with_default_voice(Some(v("espeak:en")));
    let p = EntityID::name("p").unwrap();
    assert_eq!(vm.resolve(&p), None);

    vm.register(v("espeak:en"), Gender::Male);
    assert_eq!(vm.resolve_with_reason(&p), Some((v("espeak:en"), Resolution::Default)));
}

#[test]
fn duplicate_register_is_ignored() {
    let vm = manager();
    assert!(vm.register(v("espeak:en"), Gender::Male));
    assert!(!vm.register(v("espeak:en"), Gender::Female));
    assert_eq!(vm.active_voices(), vec![v("espeak:en")]);
}

#[test]
fn unregister_engine_drops_only_its_voices() {
    let vm = manager();
    let added = vm.register_all(vec![
        (v("libritts:1"), Gender::Male),
        (v("libritts:2"), Gender::Female),
        (v("espeak:en"), Gender::Other),
    ]);
    assert_eq!(added, 3);
    let dropped = vm.unregister_engine("libritts");
    assert_eq!(dropped.len(), 2);
    assert_eq!(vm.active_voices(), vec![v("espeak:en")]);
}

#[test]
fn save_folds_overrides_and_load_restores() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
    let vm = manager().with_persistence(Arc::clone(&store));
    let p = EntityID::name("p").unwrap();
    vm.set(p.clone(), v("libritts:7"));
    vm.save().unwrap();
    assert!(store.get_raw(VOICE_SETTINGS_KEY).unwrap().is_some());

    let restored = manager().with_persistence(store);
    assert!(restored.load().unwrap());
    restored.register(v("libritts:7"), Gender::Other);
    restored.register(v("libritts:8"), Gender::Other);
    assert_eq!(restored.resolve_with_reason(&p), Some((v("libritts:7"), Resolution::Rule)));
}

#[test]
fn file_store_persists_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let p = EntityID::name("zezima").unwrap();
    {
        let vm = manager().with_persistence(Arc::new(FileStore::new(dir.path()).unwrap()));
        vm.update_store(|s| s.set_npc_id(41, vec![v("libritts:3")]));
        vm.set(p.clone(), v("espeak:en"));
        vm.save().unwrap();
    }
    assert!(dir.path().join("voice_settings.json").exists());

    let vm = manager().with_persistence(Arc::new(FileStore::new(dir.path()).unwrap()));
    assert!(vm.load().unwrap());
    let snapshot = vm.store_snapshot();
    assert_eq!(snapshot.find(&p, None), Some(&[v("espeak:en")][..]));
    assert_eq!(snapshot.find(&EntityID::id(41), None), Some(&[v("libritts:3")][..]));
}

#[test]
fn load_without_document_is_noop() {
    let vm = manager().with_persistence(Arc::new(MemoryStore::new()));
    assert!(!vm.load().unwrap());
    assert!(!manager().load().unwrap());
}
