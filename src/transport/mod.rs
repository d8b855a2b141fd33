//! The `transport` module owns the socket side of the protocol.
//!
//! It runs the server connection handler (handshake with an authentication
//! deadline, keepalive, DATA dispatch), tracks authenticated connections in
//! the [`Registry`], and provides the frame writer shared with the client.

mod conn;
pub(crate) mod link;
mod registry;
mod server;

pub use conn::Conn;
#[cfg(test)]
pub(crate) use conn::conn_for_test;
pub use registry::Registry;
pub use server::{Handler, Server};
