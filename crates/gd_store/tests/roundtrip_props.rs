//! Randomized round-trips through the record format.

use std::collections::BTreeMap;

use gd_store::{
    decode_record, encode_record, from_bytes, to_bytes, Color, Quaternion, RecordOptions, Vector3,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Pickup {
    Coin(i32),
    Heart,
    Key { door: u16, label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    level: u32,
    title: String,
    position: Vector3,
    rotation: Quaternion,
    tint: Color,
    pickups: Vec<Pickup>,
    flags: BTreeMap<String, bool>,
    best_time: Option<f64>,
}

fn finite() -> impl Strategy<Value = f32> {
    prop::num::f32::NORMAL | prop::num::f32::ZERO | prop::num::f32::SUBNORMAL
}

fn pickup() -> impl Strategy<Value = Pickup> {
    prop_oneof![
        any::<i32>().prop_map(Pickup::Coin),
        Just(Pickup::Heart),
        (any::<u16>(), "[a-z]{0,8}").prop_map(|(door, label)| Pickup::Key { door, label }),
    ]
}

fn snapshot() -> impl Strategy<Value = Snapshot> {
    (
        any::<u32>(),
        ".{0,24}",
        (finite(), finite(), finite()),
        (finite(), finite(), finite(), finite()),
        (finite(), finite(), finite(), finite()),
        prop::collection::vec(pickup(), 0..12),
        prop::collection::btree_map("[a-z_]{1,10}", any::<bool>(), 0..6),
        prop::option::of(-1.0e9f64..1.0e9f64),
    )
        .prop_map(|(level, title, p, r, c, pickups, flags, best_time)| Snapshot {
            level,
            title,
            position: Vector3::new(p.0, p.1, p.2),
            rotation: Quaternion::new(r.0, r.1, r.2, r.3),
            tint: Color::new(c.0, c.1, c.2, c.3),
            pickups,
            flags,
            best_time,
        })
}

proptest! {
    /// Property: every snapshot survives encode/decode unchanged
    #[test]
    fn prop_snapshot_roundtrip(value in snapshot(), compress in any::<bool>()) {
        let bytes = encode_record(&value, RecordOptions { compress }).unwrap();
        let decoded: Snapshot = decode_record(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Property: vector components keep their exact bit patterns
    #[test]
    fn prop_vector_bits_preserved(x in any::<u32>(), y in any::<u32>(), z in any::<u32>()) {
        let original = Vector3::new(f32::from_bits(x), f32::from_bits(y), f32::from_bits(z));
        let bytes = encode_record(&original, RecordOptions::default()).unwrap();
        let decoded: Vector3 = decode_record(&bytes).unwrap();
        prop_assert_eq!(decoded.x.to_bits(), x);
        prop_assert_eq!(decoded.y.to_bits(), y);
        prop_assert_eq!(decoded.z.to_bits(), z);
    }

    /// Property: arbitrary bytes never panic the decoder
    #[test]
    fn prop_garbage_is_rejected_without_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_record::<Snapshot>(&bytes);
    }

    /// Property: arbitrary payload bytes never panic the structural decoder
    #[test]
    fn prop_garbage_payload_is_rejected_without_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = from_bytes::<Snapshot>(&bytes);
    }

    /// Property: a damaged payload decodes to an error or a value, never a panic
    #[test]
    fn prop_damaged_payload_never_panics(
        value in snapshot(),
        position in any::<prop::sample::Index>(),
        byte in any::<u8>(),
        damage in 0..3u8,
    ) {
        let mut bytes = to_bytes(&value).unwrap();
        let at = position.index(bytes.len());
        match damage {
            0 => bytes[at] ^= byte | 1,
            1 => bytes.truncate(at),
            _ => bytes.insert(at, byte),
        }
        let _ = from_bytes::<Snapshot>(&bytes);
    }
}
