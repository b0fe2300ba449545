//! `engine:voice` identifiers.

use crate::{Result, VoxlineError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one synthesizable voice within one backend.
///
/// The canonical text form is `"engine:voice"`; it is used in command input
/// and persisted rules and must round-trip exactly through [`VoiceID::parse`]
/// and `Display`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "VoiceIdDoc", into = "String")]
pub struct VoiceID {
    engine: String,
    voice: String,
}

impl VoiceID {
    pub fn new(engine: impl Into<String>, voice: impl Into<String>) -> Result<Self> {
        let engine = engine.into().trim().to_string();
        let voice = voice.into().trim().to_string();
        if engine.is_empty() || voice.is_empty() {
            return Err(VoxlineError::InvalidVoiceId(format!(
                "'{}:{}' needs a non-blank engine and voice",
                engine, voice
            )));
        }
        if engine.contains(':') || voice.contains(':') {
            return Err(VoxlineError::InvalidVoiceId(format!(
                "'{}:{}' must not contain ':' inside a part",
                engine, voice
            )));
        }
        Ok(Self { engine, voice })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 2 {
            return Err(VoxlineError::InvalidVoiceId(format!(
                "'{}' is not in engine:voice form",
                text
            )));
        }
        Self::new(parts[0], parts[1])
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Numeric speaker index, for engines whose voices are model speaker ids.
    pub fn int_id(&self) -> Option<i64> {
        self.voice.parse().ok()
    }
}

impl fmt::Display for VoiceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.engine, self.voice)
    }
}

impl FromStr for VoiceID {
    type Err = VoxlineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<VoiceID> for String {
    fn from(v: VoiceID) -> Self {
        v.to_string()
    }
}

// Persisted rules written by older releases stored voices as objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum VoiceIdDoc {
    Text(String),
    Object {
        #[serde(rename = "modelName")]
        model_name: String,
        #[serde(default)]
        id: Option<serde_json::Value>,
        #[serde(default, rename = "piperVoiceID")]
        piper_voice_id: Option<i64>,
    },
}

impl TryFrom<VoiceIdDoc> for VoiceID {
    type Error = VoxlineError;

    fn try_from(doc: VoiceIdDoc) -> Result<Self> {
        match doc {
            VoiceIdDoc::Text(text) => VoiceID::parse(&text),
            VoiceIdDoc::Object {
                model_name,
                id,
                piper_voice_id,
            } => {
                let voice = match (id, piper_voice_id) {
                    (Some(serde_json::Value::String(s)), _) => s,
                    (Some(serde_json::Value::Number(n)), _) => n.to_string(),
                    (_, Some(n)) => n.to_string(),
                    _ => {
                        return Err(VoxlineError::InvalidVoiceId(format!(
                            "voice object for '{}' has no id",
                            model_name
                        )))
                    }
                };
                VoiceID::new(model_name, voice)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_malformed_text() {
        assert!(VoiceID::parse("libritts").is_err());
        assert!(VoiceID::parse("a:b:c").is_err());
        assert!(VoiceID::parse(" :12").is_err());
        assert!(VoiceID::parse("libritts: ").is_err());
    }

    #[test]
    fn parse_trims_parts() {
        let v = VoiceID::parse(" libritts : 12 ").unwrap();
        assert_eq!(v.to_string(), "libritts:12");
        assert_eq!(v.int_id(), Some(12));
    }

    #[test]
    fn reads_legacy_object_forms() {
        let v: VoiceID =
            serde_json::from_str(r#"{"modelName":"libritts","piperVoiceID":7}"#).unwrap();
        assert_eq!(v, VoiceID::new("libritts", "7").unwrap());

        let v: VoiceID =
            serde_json::from_str(r#"{"modelName":"libritts","id":"12","version":1}"#).unwrap();
        assert_eq!(v.to_string(), "libritts:12");

        let v: VoiceID = serde_json::from_str(r#""espeak:en-us""#).unwrap();
        assert_eq!(v.engine(), "espeak");
    }
}
