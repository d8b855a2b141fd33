use bytes::{BufMut, Bytes, BytesMut};

use crate::utils::CodecError;

/// Maximum encoded width of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Growable byte cursor.
///
/// Writes always append; reads consume from an internal position that never
/// moves backwards. Multi-byte integers are big-endian. Strings and byte
/// fields carry a signed-varint length prefix.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    buf: BytesMut,
    pos: usize,
}

impl Buffer {
    /// An empty buffer ready for writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty buffer with room for `cap` bytes.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap),
            pos: 0,
        }
    }

    /// Total number of bytes held, read or not.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes not yet consumed by a read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Everything written so far, regardless of the read cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the buffer, returning its contents.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    /// Appends `v` big-endian.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Appends `v` big-endian.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Appends `v` big-endian.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    /// Appends `v` as eight big-endian bytes.
    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// Zig-zag encodes `v` and appends it as an LEB128 varint.
    pub fn write_varint(&mut self, v: i64) {
        let mut ux = ((v << 1) ^ (v >> 63)) as u64;
        while ux >= 0x80 {
            self.buf.put_u8((ux as u8) | 0x80);
            ux >>= 7;
        }
        self.buf.put_u8(ux as u8);
    }

    /// Appends raw bytes with no length prefix.
    pub fn write_raw(&mut self, p: &[u8]) {
        self.buf.extend_from_slice(p);
    }

    /// Appends a varint length followed by the bytes.
    pub fn write_bytes(&mut self, p: &[u8]) {
        self.write_varint(p.len() as i64);
        self.write_raw(p);
    }

    /// Appends `s` as varint-prefixed UTF-8.
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Consumes exactly `n` bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&[u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::BufferTooShort);
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.read_array().map(u16::from_be_bytes)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.read_array().map(u32::from_be_bytes)
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.read_array().map(u64::from_be_bytes)
    }

    /// Reads eight big-endian bytes as `i64`.
    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.read_array().map(i64::from_be_bytes)
    }

    /// Reads a zig-zag LEB128 varint.
    ///
    /// Fails with `VarintOverflow` when the encoding does not terminate within
    /// ten bytes or the tenth byte carries more than the final bit.
    pub fn read_varint(&mut self) -> Result<i64, CodecError> {
        let mut ux: u64 = 0;
        let mut shift = 0u32;
        for (i, &b) in self.buf[self.pos..].iter().enumerate() {
            if i == MAX_VARINT_LEN {
                return Err(CodecError::VarintOverflow);
            }
            if b < 0x80 {
                if i == MAX_VARINT_LEN - 1 && b > 1 {
                    return Err(CodecError::VarintOverflow);
                }
                ux |= (b as u64) << shift;
                self.pos += i + 1;
                let v = (ux >> 1) as i64;
                return Ok(if ux & 1 != 0 { !v } else { v });
            }
            ux |= ((b & 0x7f) as u64) << shift;
            shift += 7;
        }
        Err(CodecError::BufferTooShort)
    }

    fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_varint()?;
        usize::try_from(len).map_err(|_| CodecError::NegativeLength)
    }

    /// Reads a varint-length-prefixed byte field.
    pub fn read_bytes(&mut self) -> Result<Bytes, CodecError> {
        let len = self.read_len()?;
        self.read_raw(len).map(Bytes::copy_from_slice)
    }

    /// Reads a varint-prefixed string. Fails with `InvalidUtf8` on bad text.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_len()?;
        let raw = self.read_raw(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Consumes every unread byte. An exhausted buffer yields an empty result.
    pub fn read_all(&mut self) -> Result<Bytes, CodecError> {
        let rest = self.remaining();
        self.read_raw(rest).map(Bytes::copy_from_slice)
    }
}

impl From<&[u8]> for Buffer {
    fn from(p: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(p),
            pos: 0,
        }
    }
}

impl From<BytesMut> for Buffer {
    fn from(buf: BytesMut) -> Self {
        Self { buf, pos: 0 }
    }
}
