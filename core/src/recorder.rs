// Session-scoped record of which voice each speaker was given
use crate::entity::EntityID;
use crate::voice_id::VoiceID;
use crate::voice_manager::Resolution;
use crate::{Result, VoxlineError};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub entity: EntityID,
    pub voice: VoiceID,
    pub reason: Resolution,
}

/// Exclusive recording session; one start/stop pair at a time.
#[derive(Default)]
pub struct Recorder {
    session: Mutex<Option<Vec<HistoryEntry>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Result<()> {
        let mut session = self.lock();
        if session.is_some() {
            return Err(VoxlineError::RecorderBusy);
        }
        *session = Some(Vec::new());
        debug!(target = "voice", "Recording started");
        Ok(())
    }

    /// Ends the session and hands back its history.
    pub fn stop(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.lock().take().ok_or(VoxlineError::RecorderIdle)?;
        debug!(target = "voice", entries = entries.len(), "Recording stopped");
        Ok(entries)
    }

    pub fn is_recording(&self) -> bool {
        self.lock().is_some()
    }

    /// No-op unless recording.
    pub fn record(&self, entity: &EntityID, voice: &VoiceID, reason: Resolution) -> bool {
        match self.lock().as_mut() {
            Some(entries) => {
                entries.push(HistoryEntry {
                    at: Utc::now(),
                    entity: entity.clone(),
                    voice: voice.clone(),
                    reason,
                });
                true
            }
            None => false,
        }
    }

    /// Entries recorded so far in the running session.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().clone().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<HistoryEntry>>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
