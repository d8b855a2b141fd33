//! # Tether
//!
//! `tether` is a small MQTT-like messaging substrate: a compact binary
//! packet protocol over TCP, a reconnecting client session, a server
//! connection handler, and a channel broker that fans messages out to local
//! connections and replicates to sibling brokers.
//!
//! ## Core Modules
//!
//! - `codec`: Length-prefixed primitives (varints, strings) over a byte buffer.
//! - `packet`: The seven packet types and their 2- or 4-byte frame header.
//! - `keepalive`: Ping scheduling with a pong deadline.
//! - `retry`: Backoff strategies and the reconnect retrier.
//! - `client`: The client session state machine.
//! - `transport`: The server connection handler and connection registry.
//! - `broker`: Channel membership, fan-out and peer replication.
//! - `config`: Layered configuration from file and environment.
//! - `utils`: Errors, logging, and shared containers.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod keepalive;
pub mod packet;
pub mod retry;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
