//! Zig-zag varint and length-prefixed primitives
//!
//! Readers take `&mut &[u8]` and advance the slice past what they consume.
//! Running out of input yields [`CodecError::UnexpectedEof`], which streaming
//! callers treat as "wait for more bytes".

use crate::error::{CodecError, Result};

const MAX_VARINT_BYTES: usize = 10;

pub fn read_long(buf: &mut &[u8]) -> Result<i64> {
    let mut raw: u64 = 0;
    let mut shift = 0;

    for i in 0..MAX_VARINT_BYTES {
        let Some(&byte) = buf.get(i) else {
            return Err(CodecError::UnexpectedEof);
        };
        raw |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            *buf = &buf[i + 1..];
            return Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64));
        }
        shift += 7;
    }

    Err(CodecError::VarintOverflow)
}

pub fn read_int(buf: &mut &[u8]) -> Result<i32> {
    let value = read_long(buf)?;
    i32::try_from(value).map_err(|_| CodecError::IntOutOfRange(value))
}

pub fn read_len(buf: &mut &[u8]) -> Result<usize> {
    let len = read_long(buf)?;
    usize::try_from(len).map_err(|_| CodecError::InvalidLength(len))
}

pub fn read_fixed<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(CodecError::UnexpectedEof);
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

pub fn read_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = read_len(buf)?;
    read_fixed(buf, len)
}

pub fn read_string(buf: &mut &[u8]) -> Result<String> {
    let bytes = read_bytes(buf)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| CodecError::InvalidUtf8)
}

pub fn write_long(out: &mut Vec<u8>, value: i64) {
    let mut raw = ((value << 1) ^ (value >> 63)) as u64;
    while raw >= 0x80 {
        out.push((raw as u8) | 0x80);
        raw >>= 7;
    }
    out.push(raw as u8);
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

/// Read the item count that prefixes each array/map block.
///
/// A negative count is followed by the block's byte size, which is skipped.
pub fn read_block_count(buf: &mut &[u8]) -> Result<usize> {
    let count = read_long(buf)?;
    if count < 0 {
        read_long(buf)?;
        return usize::try_from(count.unsigned_abs()).map_err(|_| CodecError::InvalidLength(count));
    }
    usize::try_from(count).map_err(|_| CodecError::InvalidLength(count))
}
