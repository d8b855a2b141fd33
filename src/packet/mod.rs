//! Packet model and wire framing.
//!
//! A [`Packet`] is a closed set of variants. Each variant body implements
//! [`Encodable`]; [`FrameCodec`] wraps a body in the 2- or 4-byte frame header
//! and is what every socket in the crate reads and writes through.

pub mod close;
pub mod connect;
pub mod data;
pub mod frame;

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::codec::Buffer;
use crate::utils::ProtocolError;

pub use close::{Close, CloseCode};
pub use connect::{Connack, ConnackCode, Connect, Identity};
pub use data::{Data, DataAck, DataType, Qos};
pub use frame::{FrameCodec, MAX_LEN, MID_LEN};

/// Body encoding owned by each packet variant.
pub trait Encodable: Sized {
    fn write_to(&self, buf: &mut Buffer);
    fn read_from(buf: &mut Buffer) -> Result<Self, ProtocolError>;
}

/// Three-bit type tag carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Ping = 3,
    Pong = 4,
    Data = 5,
    DataAck = 6,
    Close = 7,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Ping),
            4 => Ok(PacketType::Pong),
            5 => Ok(PacketType::Data),
            6 => Ok(PacketType::DataAck),
            7 => Ok(PacketType::Close),
            n => Err(ProtocolError::UnknownPacketType(n)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Ping => "PING",
            PacketType::Pong => "PONG",
            PacketType::Data => "DATA",
            PacketType::DataAck => "DATAACK",
            PacketType::Close => "CLOSE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Data(Data),
    DataAck(DataAck),
    Ping,
    Pong,
    Close(Close),
}

impl Packet {
    /// CONNECT carrying `identity`.
    pub fn connect(identity: Identity) -> Self {
        Packet::Connect(Connect {
            identity: Some(identity),
        })
    }

    pub fn connack(code: ConnackCode) -> Self {
        Packet::Connack(Connack { code })
    }

    pub fn data_ack(packet_id: i64) -> Self {
        Packet::DataAck(DataAck { packet_id })
    }

    /// CLOSE with `code`.
    pub fn close(code: CloseCode) -> Self {
        Packet::Close(Close { code })
    }

    /// The type number written into the frame header.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Data(_) => PacketType::Data,
            Packet::DataAck(_) => PacketType::DataAck,
            Packet::Ping => PacketType::Ping,
            Packet::Pong => PacketType::Pong,
            Packet::Close(_) => PacketType::Close,
        }
    }

    /// Serializes the body only, without a frame header.
    pub fn write_to(&self, buf: &mut Buffer) {
        match self {
            Packet::Connect(p) => p.write_to(buf),
            Packet::Connack(p) => p.write_to(buf),
            Packet::Data(p) => p.write_to(buf),
            Packet::DataAck(p) => p.write_to(buf),
            Packet::Ping | Packet::Pong => {}
            Packet::Close(p) => p.write_to(buf),
        }
    }

    /// Parses a body previously framed with `ty`.
    pub fn read_from(ty: PacketType, buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(match ty {
            PacketType::Connect => Packet::Connect(Connect::read_from(buf)?),
            PacketType::Connack => Packet::Connack(Connack::read_from(buf)?),
            PacketType::Data => Packet::Data(Data::read_from(buf)?),
            PacketType::DataAck => Packet::DataAck(DataAck::read_from(buf)?),
            PacketType::Ping => Packet::Ping,
            PacketType::Pong => Packet::Pong,
            PacketType::Close => Packet::Close(Close::read_from(buf)?),
        })
    }

    /// Encodes header and body into a standalone frame.
    pub fn to_frame(&self) -> Result<Bytes, ProtocolError> {
        let mut dst = BytesMut::new();
        frame::encode(self, &mut dst)?;
        Ok(dst.freeze())
    }
}

impl From<Data> for Packet {
    fn from(d: Data) -> Self {
        Packet::Data(d)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Connect(p) => fmt::Display::fmt(p, f),
            Packet::Connack(p) => write!(f, "CONNACK({})", u16::from(p.code)),
            Packet::Data(p) => fmt::Display::fmt(p, f),
            Packet::DataAck(p) => write!(f, "DATAACK(id={})", p.packet_id),
            Packet::Ping => f.write_str("PING"),
            Packet::Pong => f.write_str("PONG"),
            Packet::Close(p) => write!(f, "CLOSE({})", p.code),
        }
    }
}
