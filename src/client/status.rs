use std::fmt;

use crate::packet::{CloseCode, ConnackCode};

/// Client session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Unknown,
    Opening,
    Opened,
    Closing,
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unknown => "unknown",
            Status::Opening => "opening",
            Status::Opened => "opened",
            Status::Closing => "closing",
            Status::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a session left `Opened` (or never reached it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// CLOSE received from the server, or raised locally (ping timeout).
    Code(CloseCode),
    /// CONNACK with a non-accepted code.
    Rejected(ConnackCode),
    /// Dial failure, reset or EOF.
    Transport(String),
    /// Undecodable frame from the server.
    Protocol(String),
}

impl CloseReason {
    /// A normal close ends the session without a retry.
    pub fn is_normal(&self) -> bool {
        matches!(self, CloseReason::Code(code) if code.is_normal())
    }

    /// Reasons the server will answer the same way on every attempt.
    pub fn is_fatal(&self) -> bool {
        match self {
            CloseReason::Code(code) => matches!(
                code.normalized(),
                CloseCode::DuplicateLogin | CloseCode::KickedOut | CloseCode::AuthenticationFailure
            ),
            CloseReason::Rejected(_) => true,
            CloseReason::Transport(_) | CloseReason::Protocol(_) => false,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Code(code) => write!(f, "closed with {code}"),
            CloseReason::Rejected(code) => write!(f, "rejected with {}", u16::from(*code)),
            CloseReason::Transport(e) => write!(f, "transport: {e}"),
            CloseReason::Protocol(e) => write!(f, "protocol: {e}"),
        }
    }
}
