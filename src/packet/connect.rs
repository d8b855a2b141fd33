use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::Buffer;
use crate::packet::Encodable;
use crate::utils::ProtocolError;

/// Credentials presented once per connection in the CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub client_id: String,
    pub auth_token: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        client_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            client_id: client_id.into(),
            auth_token: auth_token.into(),
        }
    }
}

/// CONNECT. A `None` identity is sent as an empty body (anonymous).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connect {
    pub identity: Option<Identity>,
}

impl Encodable for Connect {
    fn write_to(&self, buf: &mut Buffer) {
        if let Some(id) = &self.identity {
            buf.write_string(&id.auth_token);
            buf.write_string(&id.user_id);
            buf.write_string(&id.client_id);
        }
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        if buf.remaining() == 0 {
            return Ok(Connect { identity: None });
        }
        let auth_token = buf.read_string()?;
        let user_id = buf.read_string()?;
        let client_id = buf.read_string()?;
        Ok(Connect {
            identity: Some(Identity {
                user_id,
                client_id,
                auth_token,
            }),
        })
    }
}

impl fmt::Display for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            // auth token is never logged
            Some(id) => write!(f, "CONNECT(uid={}, cid={})", id.user_id, id.client_id),
            None => write!(f, "CONNECT(anonymous)"),
        }
    }
}

/// Handshake result. Like [`CloseCode`](crate::packet::CloseCode), compares
/// by wire value: `Other(0) == Accepted`.
#[derive(Debug, Clone, Copy)]
pub enum ConnackCode {
    Accepted,
    AlreadyConnected,
    IdentifierRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    Other(u16),
}

impl ConnackCode {
    /// Whether the handshake succeeded.
    pub fn is_accepted(self) -> bool {
        self == ConnackCode::Accepted
    }

    /// The named variant for a catalogued value, `Other` otherwise.
    pub fn normalized(self) -> Self {
        ConnackCode::from(u16::from(self))
    }
}

impl PartialEq for ConnackCode {
    fn eq(&self, other: &Self) -> bool {
        u16::from(*self) == u16::from(*other)
    }
}

impl Eq for ConnackCode {}

impl std::hash::Hash for ConnackCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        u16::from(*self).hash(state);
    }
}

impl From<ConnackCode> for u16 {
    fn from(code: ConnackCode) -> u16 {
        match code {
            ConnackCode::Accepted => 0,
            ConnackCode::AlreadyConnected => 1,
            ConnackCode::IdentifierRejected => 2,
            ConnackCode::ServerUnavailable => 3,
            ConnackCode::BadCredentials => 4,
            ConnackCode::NotAuthorized => 5,
            ConnackCode::Other(n) => n,
        }
    }
}

impl From<u16> for ConnackCode {
    fn from(n: u16) -> ConnackCode {
        match n {
            0 => ConnackCode::Accepted,
            1 => ConnackCode::AlreadyConnected,
            2 => ConnackCode::IdentifierRejected,
            3 => ConnackCode::ServerUnavailable,
            4 => ConnackCode::BadCredentials,
            5 => ConnackCode::NotAuthorized,
            n => ConnackCode::Other(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connack {
    pub code: ConnackCode,
}

impl Encodable for Connack {
    fn write_to(&self, buf: &mut Buffer) {
        buf.write_u16(self.code.into());
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(Connack {
            code: buf.read_u16()?.into(),
        })
    }
}
