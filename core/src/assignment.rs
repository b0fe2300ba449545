//! Persisted voice assignment rules.
//!
//! Three rule kinds map a match value to an ordered list of preferred voices:
//! exact player name, exact NPC id, and NPC name pattern. A pattern may carry a
//! leading `*` (suffix match), a trailing `*` (prefix match), or both
//! (substring match). Keys are standardized, so matching ignores case.
//!
//! The document shape on disk:
//!
//! ```json
//! {
//!   "playerNameVoiceConfigData": [{ "playerName": "zezima", "voiceIDs": ["libritts:12"] }],
//!   "npcIDVoiceConfigData":      [{ "npcId": 41, "voiceIDs": ["libritts:3"] }],
//!   "npcNameVoiceConfigData":    [{ "npcName": "*bat", "voiceIDs": ["espeak:en"] }]
//! }
//! ```

use crate::entity::{standardize, EntityID, EntityKind};
use crate::voice_id::VoiceID;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceAssignmentStore {
    players: BTreeMap<String, Vec<VoiceID>>,
    npc_ids: BTreeMap<i32, Vec<VoiceID>>,
    npc_names: BTreeMap<String, Vec<VoiceID>>,
}

impl VoiceAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let doc: RuleDocument = serde_json::from_str(s)?;
        Ok(Self::from(doc))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&RuleDocument::from(self))?)
    }

    pub fn set_player(&mut self, name: &str, voices: Vec<VoiceID>) {
        self.players.insert(standardize(name), voices);
    }

    pub fn remove_player(&mut self, name: &str) -> Option<Vec<VoiceID>> {
        self.players.remove(&standardize(name))
    }

    pub fn set_npc_id(&mut self, id: i32, voices: Vec<VoiceID>) {
        self.npc_ids.insert(id, voices);
    }

    pub fn remove_npc_id(&mut self, id: i32) -> Option<Vec<VoiceID>> {
        self.npc_ids.remove(&id)
    }

    pub fn set_npc_name(&mut self, pattern: &str, voices: Vec<VoiceID>) {
        self.npc_names.insert(standardize(pattern), voices);
    }

    pub fn remove_npc_name(&mut self, pattern: &str) -> Option<Vec<VoiceID>> {
        self.npc_names.remove(&standardize(pattern))
    }

    /// Stores a rule keyed by the entity's own kind: ids become NPC-id rules,
    /// names become player-name rules.
    pub fn put(&mut self, entity: &EntityID, voices: Vec<VoiceID>) {
        match entity.kind() {
            EntityKind::Id(id) => {
                self.npc_ids.insert(id, voices);
            }
            EntityKind::Name(name) => {
                self.players.insert(name.to_string(), voices);
            }
        }
    }

    pub fn remove(&mut self, entity: &EntityID) -> Option<Vec<VoiceID>> {
        match entity.kind() {
            EntityKind::Id(id) => self.npc_ids.remove(&id),
            EntityKind::Name(name) => self.players.remove(name),
        }
    }

    /// Finds the rule for `entity`.
    ///
    /// Name entities only consult player rules. Id entities consult the NPC-id
    /// rule first, then NPC-name rules against `npc_name` (exact before
    /// wildcard, longer patterns before shorter).
    pub fn find(&self, entity: &EntityID, npc_name: Option<&str>) -> Option<&[VoiceID]> {
        match entity.kind() {
            EntityKind::Name(name) => self.players.get(name).map(Vec::as_slice),
            EntityKind::Id(id) => self
                .npc_ids
                .get(&id)
                .map(Vec::as_slice)
                .or_else(|| npc_name.and_then(|n| self.find_npc_name(n))),
        }
    }

    fn find_npc_name(&self, raw_name: &str) -> Option<&[VoiceID]> {
        let name = standardize(raw_name);
        if let Some(exact) = self.npc_names.get(&name) {
            return Some(exact);
        }
        self.npc_names
            .iter()
            .filter(|(pattern, _)| pattern.contains('*') && wildcard_match(pattern, &name))
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(|(_, voices)| voices.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.npc_ids.is_empty() && self.npc_names.is_empty()
    }
}

/// Leading/trailing `*` wildcard match; both sides already standardized.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let leading = pattern.starts_with('*');
    let trailing = pattern.len() > 1 && pattern.ends_with('*');
    let core = pattern.trim_start_matches('*').trim_end_matches('*');
    match (leading, trailing) {
        (true, true) => name.contains(core),
        (true, false) => name.ends_with(core),
        (false, true) => name.starts_with(core),
        (false, false) => name == core,
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleDocument {
    #[serde(rename = "playerNameVoiceConfigData", default)]
    players: Vec<PlayerNameRule>,
    #[serde(rename = "npcIDVoiceConfigData", default)]
    npc_ids: Vec<NpcIdRule>,
    #[serde(rename = "npcNameVoiceConfigData", default)]
    npc_names: Vec<NpcNameRule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlayerNameRule {
    #[serde(rename = "playerName")]
    player_name: String,
    #[serde(rename = "voiceIDs", default)]
    voice_ids: Vec<VoiceID>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NpcIdRule {
    #[serde(rename = "npcId")]
    npc_id: i32,
    #[serde(rename = "voiceIDs", default)]
    voice_ids: Vec<VoiceID>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NpcNameRule {
    #[serde(rename = "npcName")]
    npc_name: String,
    #[serde(rename = "voiceIDs", default)]
    voice_ids: Vec<VoiceID>,
}

impl From<RuleDocument> for VoiceAssignmentStore {
    // Later entries overwrite earlier ones with the same key.
    fn from(doc: RuleDocument) -> Self {
        let mut store = VoiceAssignmentStore::new();
        for r in doc.players {
            store.set_player(&r.player_name, r.voice_ids);
        }
        for r in doc.npc_ids {
            store.set_npc_id(r.npc_id, r.voice_ids);
        }
        for r in doc.npc_names {
            store.set_npc_name(&r.npc_name, r.voice_ids);
        }
        store
    }
}

impl From<&VoiceAssignmentStore> for RuleDocument {
    fn from(store: &VoiceAssignmentStore) -> Self {
        RuleDocument {
            players: store
                .players
                .iter()
                .map(|(k, v)| PlayerNameRule {
                    player_name: k.clone(),
                    voice_ids: v.clone(),
                })
                .collect(),
            npc_ids: store
                .npc_ids
                .iter()
                .map(|(k, v)| NpcIdRule {
                    npc_id: *k,
                    voice_ids: v.clone(),
                })
                .collect(),
            npc_names: store
                .npc_names
                .iter()
                .map(|(k, v)| NpcNameRule {
                    npc_name: k.clone(),
                    voice_ids: v.clone(),
                })
                .collect(),
        }
    }
}
