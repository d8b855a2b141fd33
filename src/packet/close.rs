use std::fmt;

use crate::codec::Buffer;
use crate::packet::Encodable;
use crate::utils::ProtocolError;

/// Reason carried by a CLOSE packet.
///
/// The values are private to this client/server pair. Codes without a named
/// variant survive a round trip as `Other`. Equality and hashing go by wire
/// value, so `Other(1000) == Normal`; [`normalized`](Self::normalized) maps
/// such a value onto its named variant for pattern matching.
#[derive(Debug, Clone, Copy)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    Unsupported,
    NoStatus,
    Abnormal,
    InvalidFrame,
    PolicyViolation,
    MessageTooBig,
    InternalError,
    ServiceRestart,
    TryAgainLater,
    DuplicateLogin,
    AuthenticationFailure,
    AuthenticationTimeout,
    KickedOut,
    PingTimeout,
    Other(u16),
}

impl CloseCode {
    /// Every named code, in wire order.
    pub const CATALOG: [CloseCode; 17] = [
        CloseCode::Normal,
        CloseCode::GoingAway,
        CloseCode::ProtocolError,
        CloseCode::Unsupported,
        CloseCode::NoStatus,
        CloseCode::Abnormal,
        CloseCode::InvalidFrame,
        CloseCode::PolicyViolation,
        CloseCode::MessageTooBig,
        CloseCode::InternalError,
        CloseCode::ServiceRestart,
        CloseCode::TryAgainLater,
        CloseCode::DuplicateLogin,
        CloseCode::AuthenticationFailure,
        CloseCode::AuthenticationTimeout,
        CloseCode::KickedOut,
        CloseCode::PingTimeout,
    ];

    /// A normal close is never retried.
    pub fn is_normal(self) -> bool {
        self == CloseCode::Normal
    }

    /// The named variant for a catalogued value, `Other` otherwise.
    pub fn normalized(self) -> Self {
        CloseCode::from(u16::from(self))
    }
}

impl PartialEq for CloseCode {
    fn eq(&self, other: &Self) -> bool {
        u16::from(*self) == u16::from(*other)
    }
}

impl Eq for CloseCode {}

impl std::hash::Hash for CloseCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        u16::from(*self).hash(state);
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidFrame => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::InternalError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
            CloseCode::DuplicateLogin => 4000,
            CloseCode::AuthenticationFailure => 4001,
            CloseCode::AuthenticationTimeout => 4002,
            CloseCode::KickedOut => 4003,
            CloseCode::PingTimeout => 4004,
            CloseCode::Other(n) => n,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(n: u16) -> CloseCode {
        CloseCode::CATALOG
            .into_iter()
            .find(|c| u16::from(*c) == n)
            .unwrap_or(CloseCode::Other(n))
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.normalized() {
            CloseCode::Other(n) => write!(f, "{n}"),
            named => write!(f, "{:?}({})", named, u16::from(named)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Close {
    pub code: CloseCode,
}

impl Encodable for Close {
    fn write_to(&self, buf: &mut Buffer) {
        buf.write_u16(self.code.into());
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(Close {
            code: buf.read_u16()?.into(),
        })
    }
}
