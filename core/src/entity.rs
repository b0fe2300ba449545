//! Speaker identity.
//!
//! An [`EntityID`] is either a numeric in-world id (an NPC's species index) or a
//! standardized name (players, sentinels). The two kinds never compare equal.
//! An empty standardized name is rejected at construction, so every value of this
//! type is a valid lookup key.

use crate::{Result, VoxlineError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SYSTEM: &str = "&system";
pub const GLOBAL_NPC: &str = "&globalnpc";
pub const LOCAL_USER: &str = "&localuser";
pub const DIALOG: &str = "&dialog";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "EntityIdDoc", into = "EntityIdDoc")]
pub struct EntityID(Key);

// Private so a name can only enter through `EntityID::name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Key {
    Id(i32),
    Name(String),
}

/// Borrowed view of an [`EntityID`] for matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind<'a> {
    Id(i32),
    Name(&'a str),
}

impl EntityID {
    pub fn id(id: i32) -> Self {
        EntityID(Key::Id(id))
    }

    /// Builds a name-based id from raw text, standardizing it first.
    pub fn name(raw: &str) -> Result<Self> {
        let name = standardize(raw);
        if name.is_empty() {
            return Err(VoxlineError::InvalidEntity);
        }
        Ok(EntityID(Key::Name(name)))
    }

    fn sentinel(name: &str) -> Self {
        EntityID(Key::Name(name.to_string()))
    }

    pub fn system() -> Self {
        Self::sentinel(SYSTEM)
    }

    pub fn global_npc() -> Self {
        Self::sentinel(GLOBAL_NPC)
    }

    pub fn local_user() -> Self {
        Self::sentinel(LOCAL_USER)
    }

    pub fn dialog() -> Self {
        Self::sentinel(DIALOG)
    }

    pub fn kind(&self) -> EntityKind<'_> {
        match &self.0 {
            Key::Id(id) => EntityKind::Id(*id),
            Key::Name(name) => EntityKind::Name(name),
        }
    }

    pub fn as_id(&self) -> Option<i32> {
        match self.0 {
            Key::Id(id) => Some(id),
            Key::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.0 {
            Key::Id(_) => None,
            Key::Name(name) => Some(name),
        }
    }

    pub fn is_npc(&self) -> bool {
        matches!(self.0, Key::Id(_))
    }

    /// True for the `&`-prefixed well-known names.
    pub fn is_sentinel(&self) -> bool {
        matches!(&self.0, Key::Name(name) if name.starts_with('&'))
    }

    /// Stable across runs, used for hash-indexed voice fallback.
    pub(crate) fn stable_hash(&self) -> u64 {
        match &self.0 {
            Key::Id(id) => *id as i64 as u64,
            Key::Name(name) => name
                .chars()
                .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32))
                as u64,
        }
    }
}

impl fmt::Display for EntityID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Key::Id(id) => write!(f, "id({})", id),
            Key::Name(name) => write!(f, "name({})", name),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntityIdDoc {
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl TryFrom<EntityIdDoc> for EntityID {
    type Error = VoxlineError;

    fn try_from(doc: EntityIdDoc) -> Result<Self> {
        match (doc.id, doc.name) {
            (Some(id), None) => Ok(EntityID::id(id)),
            (None, Some(name)) => EntityID::name(&name),
            _ => Err(VoxlineError::InvalidEntity),
        }
    }
}

impl From<EntityID> for EntityIdDoc {
    fn from(entity: EntityID) -> Self {
        match entity.0 {
            Key::Id(id) => EntityIdDoc {
                version: 1,
                id: Some(id),
                name: None,
            },
            Key::Name(name) => EntityIdDoc {
                version: 1,
                id: None,
                name: Some(name),
            },
        }
    }
}

/// Canonical form for names: tags removed, whitespace collapsed, lowercase,
/// trailing `(level-NN)` dropped.
pub fn standardize(raw: &str) -> String {
    let mut untagged = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => untagged.push(c),
            _ => {}
        }
    }

    let collapsed = untagged
        .split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    strip_level(&collapsed).to_string()
}

fn strip_level(name: &str) -> &str {
    if let Some(idx) = name.rfind("(level-") {
        if name.ends_with(')') {
            return name[..idx].trim_end();
        }
    }
    name
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Lenient parse used for config and command input.
    pub fn parse(s: &str) -> Gender {
        match s.trim().to_lowercase().as_str() {
            "0" | "m" | "male" => Gender::Male,
            "1" | "f" | "female" => Gender::Female,
            _ => Gender::Other,
        }
    }

    pub fn from_index(i: i32) -> Gender {
        match i {
            0 => Gender::Male,
            1 => Gender::Female,
            _ => Gender::Other,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_strips_tags_and_level() {
        assert_eq!(standardize("<col=ff0000>Zezima</col>"), "zezima");
        assert_eq!(standardize("  Giant\u{a0}  Bat  (level-27)"), "giant bat");
        assert_eq!(standardize("Hans"), "hans");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            EntityID::name("  <img=2> "),
            Err(VoxlineError::InvalidEntity)
        ));
    }

    #[test]
    fn stable_hash_matches_numeric_id() {
        assert_eq!(EntityID::id(41).stable_hash(), 41);
        assert_eq!(
            EntityID::name("abc").unwrap().stable_hash(),
            EntityID::name("ABC").unwrap().stable_hash()
        );
    }

    #[test]
    fn gender_parse_is_lenient() {
        assert_eq!(Gender::parse("M"), Gender::Male);
        assert_eq!(Gender::parse("female"), Gender::Female);
        assert_eq!(Gender::parse("1"), Gender::Female);
        assert_eq!(Gender::parse("robot"), Gender::Other);
    }
}
