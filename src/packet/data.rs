use std::fmt;

use bytes::Bytes;

use crate::codec::Buffer;
use crate::packet::Encodable;
use crate::utils::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Qos {
    /// Fire and forget, no DATAACK.
    #[default]
    AtMostOnce,
    /// The receiver answers with DATAACK once the payload has been handled.
    AtLeastOnce,
}

impl TryFrom<u8> for Qos {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            n => Err(ProtocolError::InvalidQos(n)),
        }
    }
}

impl From<Qos> for u8 {
    fn from(q: Qos) -> u8 {
        match q {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
        }
    }
}

/// Application-level payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Text,
    Json,
    MsgPack,
    Protobuf,
    Binary,
}

impl TryFrom<u8> for DataType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(DataType::Text),
            1 => Ok(DataType::Json),
            2 => Ok(DataType::MsgPack),
            3 => Ok(DataType::Protobuf),
            4 => Ok(DataType::Binary),
            n => Err(ProtocolError::UnknownDataType(n)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(t: DataType) -> u8 {
        match t {
            DataType::Text => 0,
            DataType::Json => 1,
            DataType::MsgPack => 2,
            DataType::Protobuf => 3,
            DataType::Binary => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Text => "text",
            DataType::Json => "json",
            DataType::MsgPack => "msgpack",
            DataType::Protobuf => "protobuf",
            DataType::Binary => "binary",
        };
        f.write_str(s)
    }
}

/// DATA. `packet_id` is only on the wire when `qos` is `AtLeastOnce`;
/// for `AtMostOnce` it is always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub qos: Qos,
    pub data_type: DataType,
    pub packet_id: i64,
    pub payload: Bytes,
}

impl Data {
    /// QoS 1 data; the receiver acknowledges `packet_id`.
    pub fn new(data_type: DataType, packet_id: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            qos: Qos::AtLeastOnce,
            data_type,
            packet_id,
            payload: payload.into(),
        }
    }

    /// QoS 0 data.
    pub fn qos0(data_type: DataType, payload: impl Into<Bytes>) -> Self {
        Self {
            qos: Qos::AtMostOnce,
            data_type,
            packet_id: 0,
            payload: payload.into(),
        }
    }

    /// QoS 1 packets expect a DATAACK once handled.
    pub fn needs_ack(&self) -> bool {
        self.qos == Qos::AtLeastOnce
    }
}

impl Encodable for Data {
    fn write_to(&self, buf: &mut Buffer) {
        buf.write_u8(self.qos.into());
        buf.write_u8(self.data_type.into());
        if self.needs_ack() {
            buf.write_i64(self.packet_id);
        }
        buf.write_raw(&self.payload);
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let qos = Qos::try_from(buf.read_u8()?)?;
        let data_type = DataType::try_from(buf.read_u8()?)?;
        let packet_id = match qos {
            Qos::AtLeastOnce => buf.read_i64()?,
            Qos::AtMostOnce => 0,
        };
        let payload = buf.read_all()?;
        Ok(Data {
            qos,
            data_type,
            packet_id,
            payload,
        })
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qos = u8::from(self.qos);
        match self.data_type {
            DataType::Text if self.payload.len() <= 64 => write!(
                f,
                "DATA(qos{qos}, text, id={}, {:?})",
                self.packet_id,
                String::from_utf8_lossy(&self.payload)
            ),
            t => write!(
                f,
                "DATA(qos{qos}, {t}, id={}, {} bytes)",
                self.packet_id,
                self.payload.len()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAck {
    pub packet_id: i64,
}

impl Encodable for DataAck {
    fn write_to(&self, buf: &mut Buffer) {
        buf.write_i64(self.packet_id);
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(DataAck {
            packet_id: buf.read_i64()?,
        })
    }
}
