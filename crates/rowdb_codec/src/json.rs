//! JSON row codec.

use crate::{CodecResult, FieldMap, RowCodec};

/// Encodes rows as JSON text.
///
/// The wire form is a plain JSON object, one member per field, so rows
/// written by this codec stay readable with any store inspection tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RowCodec for JsonCodec {
    fn encode(&self, row: &FieldMap) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(row)?)
    }

    fn decode(&self, bytes: Option<&[u8]>) -> CodecResult<Option<FieldMap>> {
        match bytes {
            None | Some([]) => Ok(None),
            Some(data) => Ok(Some(serde_json::from_slice(data)?)),
        }
    }
}
