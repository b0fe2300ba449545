use voxline_core::{EntityID, EntityKind, Gender, VoiceID, VoxlineError};

#[test]
fn names_compare_after_standardization() {
    let a = EntityID::name("Zezima").unwrap();
    let b = EntityID::name("  <col=ff0000>zEzImA</col> ").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_name(), Some("zezima"));
}

#[test]
fn ids_and_names_never_compare_equal() {
    let by_id = EntityID::id(7);
    let by_name = EntityID::name("7").unwrap();
    assert_ne!(by_id, by_name);
    assert_eq!(by_id, EntityID::id(7));
    assert_ne!(by_id, EntityID::id(8));
}

#[test]
fn blank_name_is_invalid() {
    assert!(matches!(EntityID::name("   "), Err(VoxlineError::InvalidEntity)));
    assert!(matches!(EntityID::name("<img=2>"), Err(VoxlineError::InvalidEntity)));
}

#[test]
fn names_only_enter_standardized() {
    let raw: EntityID = serde_json::from_str(r#"{"name":"  <b>ZEZIMA</b> (level-3)"}"#).unwrap();
    assert_eq!(raw, EntityID::name("Zezima").unwrap());
    assert_eq!(raw.kind(), EntityKind::Name("zezima"));
    assert!(serde_json::from_str::<EntityID>(r#"{"name":""}"#).is_err());

    assert_eq!(EntityID::id(41).kind(), EntityKind::Id(41));
    assert!(EntityID::id(41).is_npc());
    assert!(!raw.is_npc());
}

#[test]
fn sentinels() {
    assert!(EntityID::system().is_sentinel());
    assert!(EntityID::global_npc().is_sentinel());
    assert!(!EntityID::name("bob").unwrap().is_sentinel());
    assert_ne!(EntityID::global_npc(), EntityID::local_user());
}

#[test]
fn entity_json_document() {
    let json = serde_json::to_string(&EntityID::id(3106)).unwrap();
    assert_eq!(json, r#"{"version":1,"id":3106}"#);
    let back: EntityID = serde_json::from_str(&json).unwrap();
    assert_eq!(back, EntityID::id(3106));

    let named: EntityID = serde_json::from_str(r#"{"version":1,"name":"Some Guy"}"#).unwrap();
    assert_eq!(named, EntityID::name("some guy").unwrap());

    // Neither field, or both, is not a usable key.
    assert!(serde_json::from_str::<EntityID>(r#"{"version":1}"#).is_err());
    assert!(serde_json::from_str::<EntityID>(r#"{"version":1,"id":1,"name":"x"}"#).is_err());
}

#[test]
fn voice_id_text_round_trip() {
    let v = VoiceID::parse("libritts:12").unwrap();
    assert_eq!(v.engine(), "libritts");
    assert_eq!(v.voice(), "12");
    assert_eq!(v.int_id(), Some(12));
    assert_eq!(VoiceID::parse(&v.to_string()).unwrap(), v);
    assert_eq!(serde_json::to_string(&v).unwrap(), r#""libritts:12""#);
}

#[test]
fn voice_id_reads_legacy_objects() {
    let v: VoiceID = serde_json::from_str(r#"{"modelName":"libritts","piperVoiceID":41}"#).unwrap();
    assert_eq!(v, VoiceID::parse("libritts:41").unwrap());
    let v: VoiceID = serde_json::from_str(r#"{"modelName":"espeak","id":"en-us"}"#).unwrap();
    assert_eq!(v, VoiceID::parse("espeak:en-us").unwrap());
    assert!(serde_json::from_str::<VoiceID>(r#""no-colon""#).is_err());
}

#[test]
fn gender_parse() {
    assert_eq!(Gender::parse("M"), Gender::Male);
    assert_eq!(Gender::parse("female"), Gender::Female);
    assert_eq!(Gender::parse("robot"), Gender::Other);
}
