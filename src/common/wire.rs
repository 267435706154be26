//! Bounds-checked primitives for the binary payload layouts.
//!
//! Every integer is big-endian. Strings are a `u32` byte length followed by
//! UTF-8 bytes. Readers consume from a `&[u8]` cursor and fail with
//! [`SyncError::MalformedPayload`] instead of panicking on short input.

use bytes::{Buf, BufMut};

use super::error::{SyncError, SyncResult};

fn ensure(buf: &[u8], needed: usize, what: &str) -> SyncResult<()> {
    if buf.remaining() < needed {
        return Err(SyncError::MalformedPayload(format!(
            "{} needs {} bytes, {} left",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// A string too long for its length prefix also overflows the enclosing
/// frame, which `Message::ensure_fits` rejects before sending.
pub fn put_string(buf: &mut Vec<u8>, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub fn put_bool(buf: &mut Vec<u8>, value: bool) {
    buf.put_u8(value as u8);
}

pub fn get_u32(buf: &mut &[u8], what: &str) -> SyncResult<u32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

pub fn get_u64(buf: &mut &[u8], what: &str) -> SyncResult<u64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_u64())
}

pub fn get_f32(buf: &mut &[u8], what: &str) -> SyncResult<f32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_f32())
}

pub fn get_f64(buf: &mut &[u8], what: &str) -> SyncResult<f64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_f64())
}

pub fn get_bool(buf: &mut &[u8], what: &str) -> SyncResult<bool> {
    ensure(buf, 1, what)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SyncError::MalformedPayload(format!(
            "{} is not a boolean: {}",
            what, other
        ))),
    }
}

pub fn get_string(buf: &mut &[u8], what: &str) -> SyncResult<String> {
    let len = get_u32(buf, what)? as usize;
    ensure(buf, len, what)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(bytes)
        .map_err(|_| SyncError::MalformedPayload(format!("{} is not valid UTF-8", what)))
}

/// Fail if a payload carries bytes past its last field.
pub fn expect_end(buf: &[u8], what: &str) -> SyncResult<()> {
    if buf.has_remaining() {
        return Err(SyncError::MalformedPayload(format!(
            "{} has {} trailing bytes",
            what,
            buf.remaining()
        )));
    }
    Ok(())
}
