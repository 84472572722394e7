use crate::bitvector::BitVector;
use crate::debug::log_error;
use crate::error::{Result, WireError};
use bytes::{BufMut, Bytes, BytesMut};

/// Sequential writer over an in-memory byte buffer.
///
/// All multi-byte integers are written in network byte order. The buffer
/// grows as needed, so `put_*` operations cannot fail; the engine never
/// performs I/O through this type.
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_bool8(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Writes a NUL-terminated string. A value containing an interior NUL
    /// is truncated at the NUL with a logged error, since the remainder
    /// would be unreadable on the receiving side.
    pub fn put_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let end = match bytes.iter().position(|b| *b == 0) {
            Some(pos) => {
                log_error(&format!(
                    "string field contains interior NUL, truncated at byte {}",
                    pos
                ));
                pos
            }
            None => bytes.len(),
        };
        self.buf.put_slice(&bytes[..end]);
        self.buf.put_u8(0);
    }

    /// Writes a bit string as a 16-bit bit count followed by the packed
    /// bytes, LSB-first within each byte.
    pub fn put_bit_string(&mut self, value: &BitVector) {
        self.buf.put_u16(value.width() as u16);
        self.buf.put_slice(value.as_bytes());
    }

    /// Writes a fixed-width bitvector as raw packed bytes, no length
    /// prefix. The width is a schema constant known to both sides.
    pub fn put_bitvector(&mut self, value: &BitVector) {
        self.buf.put_slice(value.as_bytes());
    }

    pub fn put_memory(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Fixed-point encoding of a non-negative float: `round(value * scale)`
    /// as a `u32`. Bit-exact wire contract.
    pub fn put_ufloat(&mut self, value: f64, scale: u32) {
        self.buf.put_u32((value * f64::from(scale)).round() as u32);
    }

    /// Fixed-point encoding of a signed float: `round(value * scale)` as
    /// an `i32`.
    pub fn put_sfloat(&mut self, value: f64, scale: u32) {
        self.buf.put_i32((value * f64::from(scale)).round() as i32);
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential reader over a received message body.
///
/// All reads are bounds-checked against the buffer; malformed or short
/// input surfaces as an error, never a panic.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(WireError::BufferUnderrun {
                requested: count,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    /// Any nonzero byte decodes as true.
    pub fn get_bool8(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    /// Reads a NUL-terminated string of at most `max_len - 1` characters.
    /// A longer received string is truncated with a logged error; a missing
    /// terminator is a hard decode error.
    pub fn get_string(&mut self, max_len: usize) -> Result<String> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(WireError::BadString)?;
        let mut bytes = &rest[..nul];
        if max_len > 0 && bytes.len() > max_len - 1 {
            log_error(&format!(
                "string of {} bytes exceeds field capacity {}, truncated",
                bytes.len(),
                max_len
            ));
            bytes = &bytes[..max_len - 1];
        }
        self.pos += nul + 1;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads a length-prefixed bit string. A claimed bit count above
    /// `max_bits` is a hard decode error.
    pub fn get_bit_string(&mut self, max_bits: usize) -> Result<BitVector> {
        let bits = usize::from(self.get_u16()?);
        if bits > max_bits {
            return Err(WireError::BadBitString { bits, max_bits });
        }
        let bytes = self.take((bits + 7) / 8)?;
        Ok(BitVector::from_bytes(bits, bytes.to_vec()))
    }

    /// Reads a fixed-width bitvector of exactly `(width + 7) / 8` bytes.
    pub fn get_bitvector(&mut self, width: usize) -> Result<BitVector> {
        let bytes = self.take((width + 7) / 8)?;
        Ok(BitVector::from_bytes(width, bytes.to_vec()))
    }

    pub fn get_memory(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_ufloat(&mut self, scale: u32) -> Result<f64> {
        Ok(f64::from(self.get_u32()?) / f64::from(scale))
    }

    pub fn get_sfloat(&mut self, scale: u32) -> Result<f64> {
        Ok(f64::from(self.get_i32()?) / f64::from(scale))
    }
}
