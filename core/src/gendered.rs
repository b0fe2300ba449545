// Gender buckets for fallback voice selection
use crate::entity::Gender;
use crate::voice_id::VoiceID;
use std::collections::BTreeSet;
use tracing::warn;

/// Three ordered sets of voices, one per [`Gender`].
///
/// Ordered sets keep hash-indexed selection stable for a fixed set of voices.
#[derive(Debug, Clone, Default)]
pub struct GenderedVoiceRegistry {
    male: BTreeSet<VoiceID>,
    female: BTreeSet<VoiceID>,
    other: BTreeSet<VoiceID>,
}

impl GenderedVoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and warns) if the voice was already in that bucket.
    pub fn add(&mut self, voice: VoiceID, gender: Gender) -> bool {
        let inserted = self.bucket_mut(gender).insert(voice.clone());
        if !inserted {
            warn!(target = "voice", voice = %voice, gender = %gender, "Voice already registered in bucket");
        }
        inserted
    }

    /// Removes from every bucket.
    pub fn remove(&mut self, voice: &VoiceID) -> bool {
        let m = self.male.remove(voice);
        let f = self.female.remove(voice);
        let o = self.other.remove(voice);
        m || f || o
    }

    pub fn contains(&self, voice: &VoiceID) -> bool {
        self.male.contains(voice) || self.female.contains(voice) || self.other.contains(voice)
    }

    pub fn find(&self, gender: Gender) -> &BTreeSet<VoiceID> {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
            Gender::Other => &self.other,
        }
    }

    /// Picks `bucket[hash % len]`, skipping voices rejected by `allow`.
    pub fn pick(&self, gender: Gender, hash: u64, allow: impl Fn(&VoiceID) -> bool) -> Option<VoiceID> {
        let candidates: Vec<&VoiceID> = self.find(gender).iter().filter(|v| allow(v)).collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = (hash % candidates.len() as u64) as usize;
        Some(candidates[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.male.len() + self.female.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_mut(&mut self, gender: Gender) -> &mut BTreeSet<VoiceID> {
        match gender {
            Gender::Male => &mut self.male,
            Gender::Female => &mut self.female,
            Gender::Other => &mut self.other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> VoiceID {
        VoiceID::parse(s).unwrap()
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut reg = GenderedVoiceRegistry::new();
        assert!(reg.add(v("p1:alice"), Gender::Male));
        assert!(!reg.add(v("p1:alice"), Gender::Male));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_clears_every_bucket() {
        let mut reg = GenderedVoiceRegistry::new();
        reg.add(v("p1:x"), Gender::Male);
        reg.add(v("p1:x"), Gender::Other);
        assert!(reg.remove(&v("p1:x")));
        assert!(reg.is_empty());
        assert!(!reg.remove(&v("p1:x")));
    }

    #[test]
    fn pick_is_stable_for_same_hash() {
        let mut reg = GenderedVoiceRegistry::new();
        for name in ["p1:a", "p1:b", "p1:c"] {
            reg.add(v(name), Gender::Female);
        }
        let first = reg.pick(Gender::Female, 1234, |_| true);
        assert_eq!(first, reg.pick(Gender::Female, 1234, |_| true));
        assert_eq!(reg.pick(Gender::Male, 1234, |_| true), None);
        assert_eq!(reg.pick(Gender::Female, 0, |x| x == &v("p1:c")), Some(v("p1:c")));
    }
}
