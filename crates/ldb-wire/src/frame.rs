//! Length-prefixed framing: a 4-byte little-endian length followed by the payload.

use crate::error::WireError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Payloads are read from the stream in pieces of at most this many bytes.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Encode a payload length as the 4-byte little-endian prefix.
pub fn encode_length(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE], WireError> {
    let len = u32::try_from(len).map_err(|_| WireError::TooLarge(len))?;
    Ok(len.to_le_bytes())
}

/// Decode a 4-byte little-endian prefix into a payload length.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> usize {
    u32::from_le_bytes(prefix) as usize
}

/// Encode a payload into a complete frame (prefix + payload).
pub fn encode_message(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let prefix = encode_length(payload.len())?;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode one frame from the front of a byte buffer.
///
/// Returns the payload and the number of bytes consumed. A buffer that does
/// not yet hold a complete frame yields [`WireError::ShortRead`].
pub fn decode_message(data: &[u8]) -> Result<(&[u8], usize), WireError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(WireError::ShortRead {
            expected: LENGTH_PREFIX_SIZE,
            got: data.len(),
        });
    }
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&data[..LENGTH_PREFIX_SIZE]);
    let len = decode_length(prefix);

    let body = &data[LENGTH_PREFIX_SIZE..];
    if body.len() < len {
        return Err(WireError::ShortRead {
            expected: len,
            got: body.len(),
        });
    }
    Ok((&body[..len], LENGTH_PREFIX_SIZE + len))
}
