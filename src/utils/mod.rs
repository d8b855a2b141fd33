//! Shared utilities: the error catalog, logging setup, and the locked map
//! primitive that backs the connection registry and channel table.

pub mod error;
pub mod logging;
pub mod safe;

pub use error::{AuthError, CodecError, Error, ProtocolError, Result};
pub use safe::SafeMap;
