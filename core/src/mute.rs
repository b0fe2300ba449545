//! Who may speak.
//!
//! In mute mode everyone is heard except what is muted. In listen mode only
//! what is listened to is heard. Names are compared in standardized form.

use crate::entity::standardize;
use crate::persistence::{Persistence, MUTE_SETTINGS_KEY};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Serialized mute settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MuteState {
    pub listen_mode: bool,
    pub username_listen_list: Vec<String>,
    pub username_mute_list: Vec<String>,
    pub npc_id_listen_list: Vec<i32>,
    pub npc_id_mute_list: Vec<i32>,
    pub npc_name_listen_list: Vec<String>,
    pub npc_name_mute_list: Vec<String>,
}

fn add_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    list.retain(|x| *x != item);
    list.push(item);
}

fn remove<T: PartialEq>(list: &mut Vec<T>, item: &T) -> bool {
    let before = list.len();
    list.retain(|x| x != item);
    list.len() != before
}

#[derive(Default)]
pub struct MuteManager {
    state: RwLock<MuteState>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl MuteManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn listen_mode(&self) -> bool {
        self.read().listen_mode
    }

    pub fn set_listen_mode(&self, on: bool) {
        self.write().listen_mode = on;
    }

    pub fn is_username_allowed(&self, username: &str) -> bool {
        let name = standardize(username);
        let state = self.read();
        if state.listen_mode {
            state.username_listen_list.contains(&name)
        } else {
            !state.username_mute_list.contains(&name)
        }
    }

    pub fn is_npc_allowed(&self, npc_id: i32, npc_name: &str) -> bool {
        let name = standardize(npc_name);
        let state = self.read();
        if state.listen_mode {
            state.npc_id_listen_list.contains(&npc_id) || state.npc_name_listen_list.contains(&name)
        } else {
            !state.npc_id_mute_list.contains(&npc_id) && !state.npc_name_mute_list.contains(&name)
        }
    }

    pub fn mute_username(&self, username: &str) {
        add_unique(&mut self.write().username_mute_list, standardize(username));
    }

    pub fn unmute_username(&self, username: &str) -> bool {
        remove(&mut self.write().username_mute_list, &standardize(username))
    }

    pub fn listen_username(&self, username: &str) {
        add_unique(&mut self.write().username_listen_list, standardize(username));
    }

    pub fn unlisten_username(&self, username: &str) -> bool {
        remove(&mut self.write().username_listen_list, &standardize(username))
    }

    pub fn mute_npc_id(&self, npc_id: i32) {
        add_unique(&mut self.write().npc_id_mute_list, npc_id);
    }

    pub fn unmute_npc_id(&self, npc_id: i32) -> bool {
        remove(&mut self.write().npc_id_mute_list, &npc_id)
    }

    pub fn listen_npc_id(&self, npc_id: i32) {
        add_unique(&mut self.write().npc_id_listen_list, npc_id);
    }

    pub fn unlisten_npc_id(&self, npc_id: i32) -> bool {
        remove(&mut self.write().npc_id_listen_list, &npc_id)
    }

    pub fn mute_npc_name(&self, npc_name: &str) {
        add_unique(&mut self.write().npc_name_mute_list, standardize(npc_name));
    }

    pub fn unmute_npc_name(&self, npc_name: &str) -> bool {
        remove(&mut self.write().npc_name_mute_list, &standardize(npc_name))
    }

    pub fn listen_npc_name(&self, npc_name: &str) {
        add_unique(&mut self.write().npc_name_listen_list, standardize(npc_name));
    }

    pub fn unlisten_npc_name(&self, npc_name: &str) -> bool {
        remove(&mut self.write().npc_name_listen_list, &standardize(npc_name))
    }

    pub fn clear_listens(&self) {
        let mut state = self.write();
        state.username_listen_list.clear();
        state.npc_id_listen_list.clear();
        state.npc_name_listen_list.clear();
    }

    pub fn snapshot(&self) -> MuteState {
        self.read().clone()
    }

    pub fn replace(&self, state: MuteState) {
        *self.write() = state;
    }

    pub fn save(&self) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            let doc = serde_json::to_string_pretty(&self.snapshot())?;
            persistence.put_raw(MUTE_SETTINGS_KEY, &doc)?;
            info!(target = "voice", "Saved mute settings");
        }
        Ok(())
    }

    /// Missing settings reset to mute mode with empty lists.
    pub fn load(&self) -> Result<bool> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        match persistence.get_raw(MUTE_SETTINGS_KEY)? {
            Some(doc) => {
                self.replace(serde_json::from_str(&doc)?);
                Ok(true)
            }
            None => {
                self.replace(MuteState::default());
                Ok(false)
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MuteState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MuteState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
