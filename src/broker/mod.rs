pub mod channel;
pub mod engine;
pub mod message;
pub mod node;
pub mod peer;

pub use engine::{Broker, PeerHandler};
pub use message::{BinaryDelivery, ClientMessage, PeerMessage, ServerMessage};
pub use node::Node;
pub use peer::{ClientPeer, Peer};
