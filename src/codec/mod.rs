//! Primitive binary encoding shared by every packet body.

pub mod buffer;

pub use buffer::{Buffer, MAX_VARINT_LEN};
