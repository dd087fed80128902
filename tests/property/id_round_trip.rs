//! Round-trip properties for object identifiers.

use proptest::prelude::*;

use baregit::ObjectId;

proptest! {
    /// Any 20 bytes survive a bytes -> id -> bytes round trip.
    #[test]
    fn bytes_round_trip(raw in prop::array::uniform20(any::<u8>())) {
        let id = ObjectId::from_bytes(&raw).unwrap();
        prop_assert_eq!(id.as_bytes(), &raw);
    }

    /// Any 20 bytes survive a bytes -> hex -> id round trip, and the hex
    /// form is exactly 40 lowercase characters.
    #[test]
    fn hex_round_trip(raw in prop::array::uniform20(any::<u8>())) {
        let id = ObjectId::from_raw(raw);
        let hex = id.to_hex();

        prop_assert_eq!(hex.len(), ObjectId::HEX_LEN);
        prop_assert!(hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
        prop_assert_eq!(ObjectId::from_hex(&hex).unwrap(), id);
    }

    /// Uppercase input parses to the same identifier as lowercase.
    #[test]
    fn case_insensitive_parse(raw in prop::array::uniform20(any::<u8>())) {
        let hex = ObjectId::from_raw(raw).to_hex();
        let upper = hex.to_ascii_uppercase();
        prop_assert_eq!(
            ObjectId::from_hex(&upper).unwrap(),
            ObjectId::from_hex(&hex).unwrap()
        );
    }

    /// Ordering of identifiers matches ordering of their byte arrays.
    #[test]
    fn ordering_matches_bytes(
        a in prop::array::uniform20(any::<u8>()),
        b in prop::array::uniform20(any::<u8>()),
    ) {
        let id_a = ObjectId::from_raw(a);
        let id_b = ObjectId::from_raw(b);
        prop_assert_eq!(id_a.cmp(&id_b), a.cmp(&b));
    }
}
