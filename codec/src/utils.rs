use byteorder::{BigEndian, WriteBytesExt};

use crate::error::EncodeError;

/// Writes a 2-byte big-endian length prefix followed by the UTF-8 bytes of `s`.
pub fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<usize, EncodeError> {
    write_bytes(buf, s.as_bytes())
}

/// Writes a 2-byte big-endian length prefix followed by `bytes` verbatim.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<usize, EncodeError> {
    if bytes.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyData);
    }
    buf.write_u16::<BigEndian>(bytes.len() as u16)
        .map_err(|_err| EncodeError::InvalidData)?;
    buf.extend_from_slice(bytes);
    Ok(2 + bytes.len())
}
