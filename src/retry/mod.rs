//! Reconnect policy: delay strategies and a bounded, cancellable retrier.

pub mod backoff;
pub mod retrier;

pub use backoff::Backoff;
pub use retrier::Retrier;
