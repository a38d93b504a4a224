use mtkit_tl::{Cursor, Deserializable, Error, FieldMeta, Object, Serializable, tl_object};
use proptest::prelude::*;

tl_object! {
    /// Shaped like an application record: plain fields around optional ones.
    pub struct Profile = 0x5f1e0a01 {
        pub id: i64,
        pub name: Option<String> [flag 0],
        pub verified: bool [flag 1 bool],
        pub rating: Option<f64> [flag 2],
        pub tags: Option<Vec<String>> [flag 4],
        pub scam: bool [flag 7 bool],
        pub about: String,
    }
}

tl_object! {
    pub struct Empty = 0x0000abcd {}
}

fn profile() -> Profile {
    Profile {
        id: 77,
        name: None,
        verified: false,
        rating: None,
        tags: None,
        scam: false,
        about: String::new(),
    }
}

// ── Scalars ───────────────────────────────────────────────────────────────────

#[test]
fn bool_uses_reserved_words() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
}

#[test]
fn bool_rejects_other_words() {
    let result = bool::from_bytes(&1u32.to_le_bytes());
    assert_eq!(result, Err(Error::MalformedBool { got: 1 }));
}

#[test]
fn deserialize_truncated_returns_eof() {
    let result = i32::from_bytes(&[0x01, 0x02]);
    assert_eq!(result, Err(Error::UnexpectedEof));
}

proptest! {
    #[test]
    fn scalars_round_trip(a: i32, b: u32, c: i64, d: f64) {
        let mut buf = Vec::new();
        a.serialize(&mut buf);
        b.serialize(&mut buf);
        c.serialize(&mut buf);
        d.serialize(&mut buf);
        prop_assert_eq!(buf.len(), 4 + 4 + 8 + 8);

        let mut cur = Cursor::from_slice(&buf);
        prop_assert_eq!(i32::deserialize(&mut cur).unwrap(), a);
        prop_assert_eq!(u32::deserialize(&mut cur).unwrap(), b);
        prop_assert_eq!(i64::deserialize(&mut cur).unwrap(), c);
        prop_assert_eq!(f64::deserialize(&mut cur).unwrap().to_bits(), d.to_bits());
        prop_assert_eq!(cur.remaining(), 0);
    }
}

// ── Byte strings ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn byte_string_length_and_padding(data in proptest::collection::vec(any::<u8>(), 0..700)) {
        let bytes = data.to_bytes();
        let header = if data.len() < 254 { 1 } else { 4 };
        prop_assert_eq!(bytes.len(), 4 * (header + data.len()).div_ceil(4));
        prop_assert!(bytes[header + data.len()..].iter().all(|&b| b == 0));
        prop_assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), data);
    }
}

#[test]
fn non_zero_padding_is_rejected() {
    // 1 length byte + 2 data bytes + 1 padding byte
    let mut bytes = vec![1u8, 2].to_bytes();
    assert_eq!(bytes.len(), 4);
    bytes[3] = 0x01;
    assert_eq!(Vec::<u8>::from_bytes(&bytes), Err(Error::PaddingCorrupt));

    let mut long = vec![9u8; 255].to_bytes();
    let last = long.len() - 1;
    long[last] = 0x80;
    assert_eq!(Vec::<u8>::from_bytes(&long), Err(Error::PaddingCorrupt));
}

#[test]
fn boundary_lengths_switch_header() {
    assert_eq!(vec![0u8; 253].to_bytes()[0], 253);
    assert_eq!(&vec![0u8; 254].to_bytes()[..4], &[0xfe, 254, 0, 0]);
}

#[test]
fn string_must_be_utf8() {
    let bytes = vec![0xffu8, 0xfe].to_bytes();
    assert_eq!(String::from_bytes(&bytes), Err(Error::InvalidUtf8));
}

#[test]
fn truncated_payload_is_eof() {
    let mut bytes = vec![5u8; 40].to_bytes();
    bytes.truncate(20);
    assert_eq!(Vec::<u8>::from_bytes(&bytes), Err(Error::UnexpectedEof));
}

// ── Vectors ───────────────────────────────────────────────────────────────────

#[test]
fn vector_has_fixed_tag() {
    let bytes = vec![1i32, 2, 3].to_bytes();
    assert_eq!(&bytes[..4], &0x1cb5c415u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &3i32.to_le_bytes());
    assert_eq!(Vec::<i32>::from_bytes(&bytes).unwrap(), vec![1, 2, 3]);
}

#[test]
fn vector_with_wrong_tag() {
    let mut bytes = vec![1i64].to_bytes();
    bytes[0] ^= 0xff;
    match Vec::<i64>::from_bytes(&bytes) {
        Err(Error::TagMismatch { expected, .. }) => assert_eq!(expected, 0x1cb5c415),
        other => panic!("unexpected: {other:?}"),
    }
}

// ── Objects and flags ─────────────────────────────────────────────────────────

#[test]
fn tag_precedes_flags_word() {
    let mut p = profile();
    p.verified = true;
    p.name = Some("ann".into());
    let bytes = p.to_bytes();
    assert_eq!(&bytes[..4], &0x5f1e0a01u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &0b11u32.to_le_bytes());
    assert_eq!(&bytes[8..16], &77i64.to_le_bytes());
}

#[test]
fn bool_only_flag_adds_no_bytes() {
    let plain = profile().to_bytes();
    let mut p = profile();
    p.scam = true;
    let flagged = p.to_bytes();
    assert_eq!(plain.len(), flagged.len());
    assert_eq!(p.flags(), 1 << 7);
    assert_eq!(Profile::from_bytes(&flagged).unwrap(), p);
}

#[test]
fn flag_bits_without_a_field_are_rejected() {
    let mut bytes = profile().to_bytes();
    bytes[4..8].copy_from_slice(&(1u32 << 3 | 1 << 7).to_le_bytes());
    assert_eq!(
        Profile::from_bytes(&bytes),
        Err(Error::UnclaimedFlags { flags: 0b1000_1000, unclaimed: 0b1000 })
    );
}

#[test]
fn typed_decode_checks_tag() {
    let bytes = Empty {}.to_bytes();
    assert_eq!(
        Profile::from_bytes(&bytes),
        Err(Error::TagMismatch { expected: 0x5f1e0a01, got: 0x0000abcd })
    );
}

#[test]
fn empty_object_is_just_its_tag() {
    assert_eq!(Empty {}.to_bytes(), 0x0000abcdu32.to_le_bytes());
    assert!(!Empty::HAS_FLAGS);
}

#[test]
fn field_table_reflects_declaration() {
    let metas: Vec<_> = Profile::FIELDS.iter().map(|f| (f.name, f.meta)).collect();
    assert_eq!(metas, vec![
        ("id", None),
        ("name", Some(FieldMeta::value(0))),
        ("verified", Some(FieldMeta::bool_only(1))),
        ("rating", Some(FieldMeta::value(2))),
        ("tags", Some(FieldMeta::value(4))),
        ("scam", Some(FieldMeta::bool_only(7))),
        ("about", None),
    ]);
    assert!(Profile::HAS_FLAGS);
}

#[test]
fn bare_body_skips_tag() {
    let p = profile();
    let mut bare = Vec::new();
    p.serialize_bare(&mut bare);
    assert_eq!(bare, p.to_bytes()[4..]);
    let mut cur = Cursor::from_slice(&bare);
    assert_eq!(Profile::deserialize_bare(&mut cur).unwrap(), p);
}

fn arb_profile() -> impl Strategy<Value = Profile> {
    (
        any::<i64>(),
        proptest::option::of("[a-z]{0,300}"),
        any::<bool>(),
        proptest::option::of(-1.0e6f64..1.0e6),
        proptest::option::of(proptest::collection::vec("[a-z]{0,8}", 0..5)),
        any::<bool>(),
        ".{0,40}",
    )
        .prop_map(|(id, name, verified, rating, tags, scam, about)| Profile {
            id, name, verified, rating, tags, scam, about,
        })
}

proptest! {
    #[test]
    fn flagged_object_round_trip(p in arb_profile()) {
        let bytes = p.to_bytes();
        let flags = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        prop_assert_eq!(flags, p.flags());
        prop_assert_eq!(flags & 1 != 0, p.name.is_some());
        prop_assert_eq!(flags & 2 != 0, p.verified);
        prop_assert_eq!(flags & 4 != 0, p.rating.is_some());
        prop_assert_eq!(flags & 16 != 0, p.tags.is_some());
        prop_assert_eq!(flags & 128 != 0, p.scam);
        prop_assert_eq!(flags & !0b1001_0111, 0);

        let back = Profile::from_bytes(&bytes).unwrap();
        prop_assert_eq!(back.flags(), flags);
        prop_assert_eq!(back, p);
    }
}
