//! Well-known audio line names.
//!
//! Per-speaker lines are derived from the speaker's standardized name so that a
//! new utterance from the same speaker preempts the previous one.

/// Sentinel speakers play on the line named after them.
pub use crate::entity::{DIALOG, LOCAL_USER, SYSTEM};

pub const VOICE_EXPLORER: &str = "&voiceexplorer";

const USER_PREFIX: &str = "&user_";
const NPC_PREFIX: &str = "&npc_";

pub fn user(username: &str) -> String {
    format!("{}{}", USER_PREFIX, username)
}

pub fn npc(npc_name: &str) -> String {
    format!("{}{}", NPC_PREFIX, npc_name)
}

/// Matches every line fed by `username`, for muting a player mid-sentence.
pub fn is_user_line(line: &str, username: &str) -> bool {
    line.strip_prefix(USER_PREFIX) == Some(username)
}

pub fn is_npc_line(line: &str) -> bool {
    line.starts_with(NPC_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityID;

    #[test]
    fn sentinel_lines_match_sentinel_names() {
        assert_eq!(EntityID::system().as_name(), Some(SYSTEM));
        assert_eq!(EntityID::local_user().as_name(), Some(LOCAL_USER));
        assert_eq!(EntityID::dialog().as_name(), Some(DIALOG));
    }

    #[test]
    fn user_lines_match_only_their_user() {
        let line = user("zezima");
        assert!(is_user_line(&line, "zezima"));
        assert!(!is_user_line(&line, "zez"));
        assert!(!is_npc_line(&line));
        assert!(is_npc_line(&npc("hans")));
    }
}
