use bytes::Bytes;
use tracing::{debug, warn};

use crate::broker::message::PeerMessage;
use crate::client::Client;
use crate::config::ClientSettings;
use crate::packet::{Data, DataType, Identity};

/// A sibling broker that mirrors this node's membership changes and
/// publishes. Calls are fire-and-forget.
pub trait Peer: Send + Sync {
    fn join(&self, channels: &[String], subscriber: &str);
    fn leave(&self, channels: &[String], subscriber: &str);
    fn publish(&self, channel: &str, payload: Bytes);
}

/// Outbound peer link: a reconnecting [`Client`] dialled at a sibling's peer
/// listener. Messages produced while the link is down are dropped.
pub struct ClientPeer {
    addr: String,
    identity: Identity,
    client: Client,
}

impl ClientPeer {
    /// A link to the peer listener at `addr`, using `settings` for keepalive
    /// and reconnect. Nothing is dialled until [`connect`](Self::connect).
    pub fn new(settings: &ClientSettings, addr: &str, node_id: &str, token: &str) -> Self {
        let settings = ClientSettings {
            addr: addr.to_string(),
            ..settings.clone()
        };
        let addr = settings.addr.clone();
        let client = Client::new(&settings, |data: &Data| -> anyhow::Result<()> {
            debug!("ignoring {data} from peer");
            Ok(())
        });
        Self {
            addr,
            identity: Identity::new(node_id, format!("peer-{node_id}"), token),
            client,
        }
    }

    /// Starts dialling. Must run inside a tokio runtime.
    pub fn connect(&self) {
        self.client.connect(self.identity.clone());
    }

    /// Closes the link; it does not reconnect.
    pub fn close(&self) {
        self.client.close();
    }

    /// The underlying session, for status observation.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn send(&self, msg: PeerMessage) {
        let data = Data::qos0(DataType::Binary, msg.encode());
        if let Err(e) = self.client.send_data(data) {
            warn!(peer = %self.addr, "dropping {msg:?}: {e}");
        }
    }
}

impl Peer for ClientPeer {
    fn join(&self, channels: &[String], subscriber: &str) {
        self.send(PeerMessage::Join {
            subscriber: subscriber.to_string(),
            channels: channels.to_vec(),
        });
    }

    fn leave(&self, channels: &[String], subscriber: &str) {
        self.send(PeerMessage::Leave {
            subscriber: subscriber.to_string(),
            channels: channels.to_vec(),
        });
    }

    fn publish(&self, channel: &str, payload: Bytes) {
        self.send(PeerMessage::Publish {
            channel: channel.to_string(),
            payload,
        });
    }
}
