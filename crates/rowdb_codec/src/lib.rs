//! # RowDB Codec
//!
//! Row value model and pluggable wire codecs for RowDB.
//!
//! A stored row is a flat field map ([`FieldMap`]) of self-describing
//! [`Value`]s. Backends own the row ↔ bytes translation through the
//! [`RowCodec`] trait; this crate ships two implementations:
//!
//! - [`JsonCodec`]: human-readable JSON text
//! - [`CborCodec`]: compact binary CBOR
//!
//! Decoding an absent or empty buffer yields `Ok(None)` (a null row),
//! never an error.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod json;
mod value;

pub use cbor::CborCodec;
pub use error::{CodecError, CodecResult};
pub use json::JsonCodec;
pub use value::{FieldMap, Value};

/// Translates a row field map to and from wire bytes.
///
/// Implementations must round-trip: `decode(encode(row))` yields a map
/// equal to `row` for every map whose values survive the format (e.g.
/// JSON has a single number type, so integral floats may come back as
/// integers).
pub trait RowCodec: Send + Sync {
    /// Encodes a row into wire bytes.
    fn encode(&self, row: &FieldMap) -> CodecResult<Vec<u8>>;

    /// Decodes wire bytes into a row.
    ///
    /// `None` or empty input decodes to `Ok(None)`.
    fn decode(&self, bytes: Option<&[u8]>) -> CodecResult<Option<FieldMap>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> FieldMap {
        let mut row = FieldMap::new();
        row.insert("ID".to_string(), Value::from("row-1"));
        row.insert("name".to_string(), Value::from("Ann"));
        row.insert("age".to_string(), Value::from(42i64));
        row.insert(
            "tags".to_string(),
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        );
        row
    }

    #[test]
    fn json_roundtrip() {
        let codec = JsonCodec;
        let row = sample_row();
        let bytes = codec.encode(&row).unwrap();
        let back = codec.decode(Some(&bytes)).unwrap().unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn cbor_roundtrip() {
        let codec = CborCodec;
        let row = sample_row();
        let bytes = codec.encode(&row).unwrap();
        let back = codec.decode(Some(&bytes)).unwrap().unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn absent_decodes_to_null_row() {
        assert!(JsonCodec.decode(None).unwrap().is_none());
        assert!(JsonCodec.decode(Some(b"")).unwrap().is_none());
        assert!(CborCodec.decode(None).unwrap().is_none());
        assert!(CborCodec.decode(Some(b"")).unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(JsonCodec.decode(Some(b"{not json")).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = Value> {
            let scalar = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::Integer),
                "[ -~]{0,16}".prop_map(Value::Text),
            ];
            prop_oneof![
                4 => scalar.clone(),
                1 => prop::collection::vec(scalar, 0..4).prop_map(Value::Array),
            ]
        }

        fn arb_row() -> impl Strategy<Value = FieldMap> {
            prop::collection::btree_map("[a-zA-Z_$][a-zA-Z0-9_]{0,10}", arb_value(), 0..8)
        }

        proptest! {
            #[test]
            fn json_roundtrips_any_row(row in arb_row()) {
                let bytes = JsonCodec.encode(&row).unwrap();
                let back = JsonCodec.decode(Some(&bytes)).unwrap().unwrap();
                prop_assert_eq!(row, back);
            }

            #[test]
            fn cbor_roundtrips_any_row(row in arb_row()) {
                let bytes = CborCodec.encode(&row).unwrap();
                let back = CborCodec.decode(Some(&bytes)).unwrap().unwrap();
                prop_assert_eq!(row, back);
            }
        }
    }
}
