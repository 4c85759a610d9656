//! Property-based test generators.

use proptest::prelude::*;
use rowdb_codec::{FieldMap, Value};

/// Strategy over scalar values (no arrays).
pub fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        // Finite floats only; NaN breaks equality-based assertions.
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy over values including flat arrays of scalars.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => arb_scalar(),
        1 => prop::collection::vec(arb_scalar(), 0..6).prop_map(Value::Array),
    ]
}

/// Strategy over row field maps with simple identifier field names.
pub fn arb_field_map() -> impl Strategy<Value = FieldMap> {
    prop::collection::btree_map("[a-z][a-z0-9_]{0,12}", arb_value(), 0..10)
}

/// Strategy over index-safe text: non-empty, free of the separator
/// bytes and glob metacharacters used in the physical layout.
pub fn arb_index_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,24}".prop_map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn scalars_are_never_arrays(v in arb_scalar()) {
            prop_assert!(v.as_array().is_none());
        }

        #[test]
        fn index_text_has_no_separators(s in arb_index_text()) {
            prop_assert!(!s.contains('\u{0}'), "index text must not contain the separator");
            prop_assert!(!s.contains('*'));
            prop_assert!(!s.contains('?'));
        }
    }
}
