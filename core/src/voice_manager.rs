//! Live voice registry and speaker-to-voice resolution.
//!
//! Backends register the voices they serve while running. [`VoiceManager::resolve`]
//! maps a speaker to a voice in this order:
//!
//! 1. session override set with [`VoiceManager::set`]
//! 2. persisted rule from the [`VoiceAssignmentStore`]
//! 3. for NPCs (numeric ids), the override or rule on [`EntityID::global_npc`]
//! 4. gender bucket, indexed by a stable hash of the entity
//! 5. the configured default voice
//!
//! Every step only yields voices that are currently live, so resolution follows
//! the live set as backends come and go. Nothing is cached.

use crate::assignment::VoiceAssignmentStore;
use crate::entity::{EntityID, Gender};
use crate::gendered::GenderedVoiceRegistry;
use crate::persistence::{Persistence, VOICE_SETTINGS_KEY};
use crate::voice_id::VoiceID;
use crate::Result;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Game-state lookups the resolver needs but does not own.
pub trait GameState: Send + Sync {
    fn gender(&self, entity: &EntityID) -> Gender;

    /// In-world name for numeric ids, used by NPC name rules.
    fn npc_name(&self, _entity: &EntityID) -> Option<String> {
        None
    }
}

/// Fallback when no game client is attached.
pub struct UnknownGameState;

impl GameState for UnknownGameState {
    fn gender(&self, _entity: &EntityID) -> Gender {
        Gender::Other
    }
}

/// Why a voice was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Override,
    Rule,
    GlobalNpc,
    GenderFallback(Gender),
    Default,
}

#[derive(Default)]
struct LiveVoices {
    active: HashMap<VoiceID, Gender>,
    gendered: GenderedVoiceRegistry,
}

pub struct VoiceManager {
    live: RwLock<LiveVoices>,
    overrides: DashMap<EntityID, VoiceID>,
    blacklist: DashSet<VoiceID>,
    store: RwLock<Arc<VoiceAssignmentStore>>,
    default_voice: Option<VoiceID>,
    game: Arc<dyn GameState>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl VoiceManager {
    pub fn new(game: Arc<dyn GameState>) -> Self {
        Self {
            live: RwLock::new(LiveVoices::default()),
            overrides: DashMap::new(),
            blacklist: DashSet::new(),
            store: RwLock::new(Arc::new(VoiceAssignmentStore::new())),
            default_voice: None,
            game,
            persistence: None,
        }
    }

    pub fn with_default_voice(mut self, voice: Option<VoiceID>) -> Self {
        self.default_voice = voice;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Adds a live voice. Re-registering logs and changes nothing.
    pub fn register(&self, voice: VoiceID, gender: Gender) -> bool {
        let mut live = self.live_write();
        if live.active.contains_key(&voice) {
            warn!(target = "voice", voice = %voice, "Voice already registered; ignoring");
            return false;
        }
        live.gendered.add(voice.clone(), gender);
        live.active.insert(voice.clone(), gender);
        debug!(target = "voice", voice = %voice, gender = %gender, "Registered voice");
        true
    }

    /// Registers a backend's voices; returns how many were new.
    pub fn register_all<I>(&self, voices: I) -> usize
    where
        I: IntoIterator<Item = (VoiceID, Gender)>,
    {
        voices
            .into_iter()
            .filter(|(voice, gender)| self.register(voice.clone(), *gender))
            .count()
    }

    /// Safe to call for voices that were never registered.
    pub fn unregister(&self, voice: &VoiceID) -> bool {
        let mut live = self.live_write();
        live.gendered.remove(voice);
        let removed = live.active.remove(voice).is_some();
        if removed {
            debug!(target = "voice", voice = %voice, "Unregistered voice");
        }
        removed
    }

    /// Drops every live voice owned by `engine`.
    pub fn unregister_engine(&self, engine: &str) -> Vec<VoiceID> {
        let mut live = self.live_write();
        let owned: Vec<VoiceID> = live
            .active
            .keys()
            .filter(|v| v.engine() == engine)
            .cloned()
            .collect();
        for voice in &owned {
            live.active.remove(voice);
            live.gendered.remove(voice);
        }
        if !owned.is_empty() {
            info!(target = "voice", engine = %engine, count = owned.len(), "Unregistered engine voices");
        }
        owned
    }

    pub fn is_active(&self, voice: &VoiceID) -> bool {
        self.live_read().active.contains_key(voice)
    }

    pub fn active_voices(&self) -> Vec<VoiceID> {
        let mut voices: Vec<VoiceID> = self.live_read().active.keys().cloned().collect();
        voices.sort();
        voices
    }

    pub fn resolve(&self, entity: &EntityID) -> Option<VoiceID> {
        self.resolve_with_reason(entity).map(|(voice, _)| voice)
    }

    pub fn resolve_with_reason(&self, entity: &EntityID) -> Option<(VoiceID, Resolution)> {
        let store = self.store_snapshot();
        let live = self.live_read();
        let is_live = |v: &VoiceID| live.active.contains_key(v);

        if let Some(voice) = self.overrides.get(entity).map(|v| v.value().clone()) {
            if is_live(&voice) {
                return Some((voice, Resolution::Override));
            }
            debug!(target = "voice", entity = %entity, voice = %voice, "Override voice is not live");
        }

        let npc_name = if entity.is_npc() {
            self.game.npc_name(entity)
        } else {
            None
        };
        if let Some(voices) = store.find(entity, npc_name.as_deref()) {
            if let Some(voice) = voices.iter().find(|v| is_live(v)) {
                return Some((voice.clone(), Resolution::Rule));
            }
        }

        if entity.is_npc() {
            let global = EntityID::global_npc();
            let global_voice = self
                .overrides
                .get(&global)
                .map(|v| v.value().clone())
                .filter(|v| is_live(v))
                .or_else(|| {
                    store
                        .find(&global, None)
                        .and_then(|voices| voices.iter().find(|v| is_live(v)).cloned())
                });
            if let Some(voice) = global_voice {
                return Some((voice, Resolution::GlobalNpc));
            }
        }

        let gender = self.game.gender(entity);
        if let Some(voice) = live.gendered.pick(gender, entity.stable_hash(), |v| {
            !self.blacklist.contains(v)
        }) {
            return Some((voice, Resolution::GenderFallback(gender)));
        }

        match &self.default_voice {
            Some(voice) if is_live(voice) => Some((voice.clone(), Resolution::Default)),
            _ => {
                debug!(target = "voice", entity = %entity, gender = %gender, "No live voice for entity");
                None
            }
        }
    }

    /// Session override, independent of persisted rules.
    pub fn set(&self, entity: EntityID, voice: VoiceID) {
        info!(target = "voice", entity = %entity, voice = %voice, "Set voice override");
        self.overrides.insert(entity, voice);
    }

    pub fn unset(&self, entity: &EntityID) -> Option<VoiceID> {
        self.overrides.remove(entity).map(|(_, v)| v)
    }

    pub fn get_override(&self, entity: &EntityID) -> Option<VoiceID> {
        self.overrides.get(entity).map(|v| v.value().clone())
    }

    pub fn blacklist(&self, voice: VoiceID) -> bool {
        self.blacklist.insert(voice)
    }

    pub fn unblacklist(&self, voice: &VoiceID) -> bool {
        self.blacklist.remove(voice).is_some()
    }

    pub fn is_blacklisted(&self, voice: &VoiceID) -> bool {
        self.blacklist.contains(voice)
    }

    pub fn store_snapshot(&self) -> Arc<VoiceAssignmentStore> {
        match self.store.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the whole rule set.
    pub fn replace_store(&self, store: VoiceAssignmentStore) {
        let mut guard = match self.store.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(store);
    }

    /// Copy-modify-replace so readers keep their snapshot.
    pub fn update_store<F>(&self, f: F)
    where
        F: FnOnce(&mut VoiceAssignmentStore),
    {
        let mut guard = match self.store.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = VoiceAssignmentStore::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Folds the session overrides into the rule set and persists it.
    pub fn save(&self) -> Result<()> {
        let overrides: Vec<(EntityID, VoiceID)> = self
            .overrides
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.update_store(|store| {
            for (entity, voice) in overrides {
                store.put(&entity, vec![voice]);
            }
        });

        if let Some(persistence) = &self.persistence {
            let doc = self.store_snapshot().to_json()?;
            persistence.put_raw(VOICE_SETTINGS_KEY, &doc)?;
            info!(target = "voice", "Saved voice settings");
        }
        Ok(())
    }

    /// Loads the persisted rule set, if any.
    pub fn load(&self) -> Result<bool> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        match persistence.get_raw(VOICE_SETTINGS_KEY)? {
            Some(doc) => {
                self.replace_store(VoiceAssignmentStore::from_json(&doc)?);
                info!(target = "voice", "Loaded voice settings");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn live_read(&self) -> std::sync::RwLockReadGuard<'_, LiveVoices> {
        match self.live.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn live_write(&self) -> std::sync::RwLockWriteGuard<'_, LiveVoices> {
        match self.live.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
