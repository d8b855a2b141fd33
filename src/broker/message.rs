use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::Buffer;
use crate::utils::ProtocolError;

/// Commands a client sends to the broker as JSON DATA.
///
/// ```json
/// {"type": "join", "channels": ["room1", "room2"]}
/// {"type": "publish", "channel": "room1", "payload": "hi"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Join { channels: Vec<String> },
    Leave { channels: Vec<String> },
    Publish { channel: String, payload: String },
}

/// Envelope the broker delivers to channel subscribers whose payload is
/// UTF-8. Other payloads go out as a [`BinaryDelivery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Message { channel: String, payload: String },
}

/// Delivery of a non-UTF-8 payload, sent as binary DATA: the channel name
/// as a length-prefixed string, then the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDelivery {
    pub channel: String,
    pub payload: Bytes,
}

impl BinaryDelivery {
    pub fn encode(&self) -> Bytes {
        let mut buf = Buffer::with_capacity(self.channel.len() + self.payload.len() + 4);
        buf.write_string(&self.channel);
        buf.write_raw(&self.payload);
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = Buffer::from(bytes);
        Ok(BinaryDelivery {
            channel: buf.read_string()?,
            payload: buf.read_all()?,
        })
    }
}

const TAG_JOIN: u8 = 1;
const TAG_LEAVE: u8 = 2;
const TAG_PUBLISH: u8 = 3;

/// Broker-to-broker replication, carried as binary DATA on the peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    Join {
        subscriber: String,
        channels: Vec<String>,
    },
    Leave {
        subscriber: String,
        channels: Vec<String>,
    },
    Publish {
        channel: String,
        payload: Bytes,
    },
}

impl PeerMessage {
    pub fn encode(&self) -> Bytes {
        let mut buf = Buffer::new();
        match self {
            PeerMessage::Join {
                subscriber,
                channels,
            }
            | PeerMessage::Leave {
                subscriber,
                channels,
            } => {
                let tag = if matches!(self, PeerMessage::Join { .. }) {
                    TAG_JOIN
                } else {
                    TAG_LEAVE
                };
                buf.write_u8(tag);
                buf.write_string(subscriber);
                buf.write_varint(channels.len() as i64);
                for channel in channels {
                    buf.write_string(channel);
                }
            }
            PeerMessage::Publish { channel, payload } => {
                buf.write_u8(TAG_PUBLISH);
                buf.write_string(channel);
                buf.write_bytes(payload);
            }
        }
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = Buffer::from(bytes);
        let tag = buf.read_u8()?;
        match tag {
            TAG_JOIN | TAG_LEAVE => {
                let subscriber = buf.read_string()?;
                let count = buf.read_varint()?;
                if count < 0 {
                    return Err(crate::utils::CodecError::NegativeLength.into());
                }
                let mut channels = Vec::with_capacity((count as usize).min(buf.remaining()));
                for _ in 0..count {
                    channels.push(buf.read_string()?);
                }
                Ok(if tag == TAG_JOIN {
                    PeerMessage::Join {
                        subscriber,
                        channels,
                    }
                } else {
                    PeerMessage::Leave {
                        subscriber,
                        channels,
                    }
                })
            }
            TAG_PUBLISH => Ok(PeerMessage::Publish {
                channel: buf.read_string()?,
                payload: buf.read_bytes()?,
            }),
            n => Err(ProtocolError::UnknownPeerMessage(n)),
        }
    }
}
