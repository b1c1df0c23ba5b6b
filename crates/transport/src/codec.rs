//! Primitive wire types
//!
//! Every value on the wire is built from four primitives:
//!
//! - a *code*: a big-endian `u32`
//! - a *code64*: a big-endian `u64` (only used for process ids)
//! - *binary*: a code holding the length, followed by that many raw bytes
//! - *text*: binary whose bytes are UTF-8
//!
//! Encoding appends to a [`BytesMut`] so that a whole message can be written
//! with a single call. Decoding pulls directly from any [`Read`]; a short read
//! surfaces as [`CodecError::Closed`].
//!
//! ```
//! use bytes::BytesMut;
//! use transport::codec;
//!
//! let mut buf = BytesMut::new();
//! codec::put_code(&mut buf, 0xdcba0000);
//! codec::put_string(&mut buf, "glClear")?;
//!
//! let mut input = &buf[..];
//! assert_eq!(codec::recv_code(&mut input)?, 0xdcba0000);
//! assert_eq!(codec::recv_string(&mut input)?, "glClear");
//! # Ok::<(), transport::CodecError>(())
//! ```

use std::io::{self, Read, Write};

use bytes::{BufMut, BytesMut};

use crate::CodecError;

pub fn put_code(buf: &mut BytesMut, code: u32) {
    buf.put_u32(code);
}

pub fn put_code64(buf: &mut BytesMut, code: u64) {
    buf.put_u64(code);
}

/// Signed values travel as the bit pattern of a code.
pub fn put_signed(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

pub fn put_binary(buf: &mut BytesMut, data: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit a length code", data.len()),
        )
    })?;
    buf.reserve(4 + data.len());
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}

pub fn put_string(buf: &mut BytesMut, text: &str) -> Result<(), CodecError> {
    put_binary(buf, text.as_bytes())
}

/// Write a fully encoded message and flush it
pub fn send_frame<W: Write + ?Sized>(writer: &mut W, frame: &[u8]) -> Result<(), CodecError> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

fn read_exact<R: Read + ?Sized>(reader: &mut R, out: &mut [u8]) -> Result<(), CodecError> {
    reader.read_exact(out).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::Closed,
        _ => CodecError::Io(e),
    })
}

pub fn recv_code<R: Read + ?Sized>(reader: &mut R) -> Result<u32, CodecError> {
    let mut raw = [0u8; 4];
    read_exact(reader, &mut raw)?;
    Ok(u32::from_be_bytes(raw))
}

pub fn recv_code64<R: Read + ?Sized>(reader: &mut R) -> Result<u64, CodecError> {
    let mut raw = [0u8; 8];
    read_exact(reader, &mut raw)?;
    Ok(u64::from_be_bytes(raw))
}

pub fn recv_signed<R: Read + ?Sized>(reader: &mut R) -> Result<i32, CodecError> {
    let mut raw = [0u8; 4];
    read_exact(reader, &mut raw)?;
    Ok(i32::from_be_bytes(raw))
}

pub fn recv_binary<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, CodecError> {
    let len = u64::from(recv_code(reader)?);
    // read through `take` so a corrupt length cannot force a huge allocation up front
    let mut data = Vec::new();
    let read = reader.take(len).read_to_end(&mut data)?;
    if read as u64 != len {
        return Err(CodecError::Closed);
    }
    Ok(data)
}

pub fn recv_string<R: Read + ?Sized>(reader: &mut R) -> Result<String, CodecError> {
    let data = recv_binary(reader)?;
    Ok(String::from_utf8(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_big_endian() {
        let mut buf = BytesMut::new();
        put_code(&mut buf, 0xabcd0006);
        put_code64(&mut buf, 0x0102);
        assert_eq!(
            &buf[..],
            &[0xab, 0xcd, 0x00, 0x06, 0, 0, 0, 0, 0, 0, 0x01, 0x02]
        );
    }

    #[test]
    fn text_is_length_prefixed_without_terminator() -> Result<(), CodecError> {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "glEnd")?;
        assert_eq!(&buf[..], b"\x00\x00\x00\x05glEnd");
        Ok(())
    }

    #[test]
    fn negative_lengths_survive() -> Result<(), CodecError> {
        let mut buf = BytesMut::new();
        put_signed(&mut buf, -2);
        let mut input = &buf[..];
        assert_eq!(recv_signed(&mut input)?, -2);
        Ok(())
    }

    #[test]
    fn short_read_is_closed() {
        let mut input: &[u8] = &[0x00, 0x01];
        assert!(matches!(recv_code(&mut input), Err(CodecError::Closed)));

        // length says 10 bytes, only 3 follow
        let mut input: &[u8] = b"\x00\x00\x00\x0aabc";
        assert!(matches!(recv_binary(&mut input), Err(CodecError::Closed)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut input: &[u8] = b"\x00\x00\x00\x02\xff\xfe";
        assert!(matches!(
            recv_string(&mut input),
            Err(CodecError::InvalidUtf8(_))
        ));
    }
}
