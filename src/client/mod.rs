//! The `client` module implements the reconnecting client session.
//!
//! A [`Client`] dials the server, authenticates with CONNECT, keeps the socket
//! alive with PING/PONG and reconnects with backoff after abnormal closes.

mod session;
mod status;

pub use session::{Client, DataHandler};
pub use status::{CloseReason, Status};

#[cfg(test)]
mod tests;
