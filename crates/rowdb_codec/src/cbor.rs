//! Binary (CBOR) row codec.

use crate::{CodecError, CodecResult, FieldMap, RowCodec};

/// Encodes rows as compact binary CBOR.
///
/// Drop-in replacement for [`crate::JsonCodec`] when wire size matters
/// more than readability. Both codecs share the same field-map model,
/// but the stored bytes are not interchangeable between them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl RowCodec for CborCodec {
    fn encode(&self, row: &FieldMap) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(row, &mut buf)
            .map_err(|e| CodecError::cbor_encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: Option<&[u8]>) -> CodecResult<Option<FieldMap>> {
        match bytes {
            None | Some([]) => Ok(None),
            Some(data) => {
                let row = ciborium::de::from_reader(data)
                    .map_err(|e| CodecError::cbor_decode(e.to_string()))?;
                Ok(Some(row))
            }
        }
    }
}
