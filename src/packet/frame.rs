//! Frame header layout (byte 0, most significant bit first):
//!
//! ```text
//!  7 6 5   4     3 2 1 0
//! [type ][ext][ length high nibble ]  [length byte] ( [length byte] [length byte] if ext )
//! ```
//!
//! Without `ext` the length is 12 bits (at most `0xFFF`); with `ext` it is
//! 28 bits (at most `0xFFFFFFF`).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::Buffer;
use crate::packet::{Packet, PacketType};
use crate::utils::ProtocolError;

/// Largest body that fits the short header.
pub const MID_LEN: usize = 0xFFF;
/// Largest body a frame can carry.
pub const MAX_LEN: usize = 0xFFF_FFFF;

const EXTENDED: u8 = 0x10;

/// Writes the header for a body of `len` bytes.
pub fn encode_header(ty: PacketType, len: usize, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if len > MAX_LEN {
        return Err(ProtocolError::PacketTooLarge(len));
    }
    let tag = (ty as u8) << 5;
    if len > MID_LEN {
        let n = len as u32;
        dst.put_u8(tag | EXTENDED | ((n >> 24) as u8 & 0x0f));
        dst.put_u8((n >> 16) as u8);
        dst.put_u8((n >> 8) as u8);
        dst.put_u8(n as u8);
    } else {
        dst.put_u8(tag | ((len >> 8) as u8 & 0x0f));
        dst.put_u8(len as u8);
    }
    Ok(())
}

/// Parses a header from the front of `src` without consuming it.
///
/// Returns `Ok(None)` until enough bytes are buffered, otherwise the packet
/// type, the body length and the header width.
pub fn decode_header(src: &[u8]) -> Result<Option<(PacketType, usize, usize)>, ProtocolError> {
    if src.len() < 2 {
        return Ok(None);
    }
    let ty = PacketType::try_from(src[0] >> 5)?;
    let high = (src[0] & 0x0f) as usize;
    if src[0] & EXTENDED == 0 {
        return Ok(Some((ty, (high << 8) | src[1] as usize, 2)));
    }
    if src.len() < 4 {
        return Ok(None);
    }
    let len = (high << 24) | (src[1] as usize) << 16 | (src[2] as usize) << 8 | src[3] as usize;
    Ok(Some((ty, len, 4)))
}

/// Writes `packet` as one frame.
pub fn encode(packet: &Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    let mut body = Buffer::new();
    packet.write_to(&mut body);
    let body = body.as_bytes();
    dst.reserve(body.len() + 4);
    encode_header(packet.packet_type(), body.len(), dst)?;
    dst.extend_from_slice(body);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header,
    Body { ty: PacketType, len: usize },
}

/// `tokio_util` codec for framed packets.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    state: DecodeState,
    max_size: usize,
}

impl FrameCodec {
    /// A codec accepting bodies up to [`MAX_LEN`].
    pub fn new() -> Self {
        Self::with_max_size(MAX_LEN)
    }

    /// Inbound bodies larger than `max_size` fail with `MessageTooBig`.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_size: max_size.min(MAX_LEN),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    let Some((ty, len, header_len)) = decode_header(src)? else {
                        return Ok(None);
                    };
                    if len > self.max_size {
                        return Err(ProtocolError::MessageTooBig {
                            size: len,
                            max: self.max_size,
                        });
                    }
                    src.advance(header_len);
                    src.reserve(len);
                    self.state = DecodeState::Body { ty, len };
                }
                DecodeState::Body { ty, len } => {
                    if src.len() < len {
                        return Ok(None);
                    }
                    let mut body = Buffer::from(src.split_to(len));
                    self.state = DecodeState::Header;
                    return Packet::read_from(ty, &mut body).map(Some);
                }
            }
        }
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        encode(&item, dst)
    }
}
