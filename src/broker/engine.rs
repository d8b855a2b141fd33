use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::broker::channel::{Channel, SubscriberId};
use crate::broker::message::{BinaryDelivery, ClientMessage, PeerMessage, ServerMessage};
use crate::broker::peer::Peer;
use crate::packet::{Data, DataType, Identity};
use crate::transport::{Conn, Handler, Registry};
use crate::utils::{AuthError, SafeMap};

type AuthCallback = Box<dyn Fn(&Identity) -> Result<(), AuthError> + Send + Sync>;

/// Channel membership and fan-out for one node.
///
/// Membership changes and publishes are applied locally and then forwarded
/// to every configured peer. Whatever arrives from a peer is applied locally
/// only, so a flat peer list never loops.
pub struct Broker {
    channels: SafeMap<String, Channel>,
    registry: Registry,
    peers: RwLock<Vec<Arc<dyn Peer>>>,
    auth: AuthCallback,
}

impl Broker {
    /// Delivers to connections found in `registry`; accepts every identity.
    pub fn new(registry: Registry) -> Self {
        Self::with_auth(registry, |_| Ok(()))
    }

    /// Like [`new`](Self::new), but CONNECT identities go through `auth` first.
    pub fn with_auth<F>(registry: Registry, auth: F) -> Self
    where
        F: Fn(&Identity) -> Result<(), AuthError> + Send + Sync + 'static,
    {
        Self {
            channels: SafeMap::new(),
            registry,
            peers: RwLock::new(Vec::new()),
            auth: Box::new(auth),
        }
    }

    /// Registers a sibling broker that receives every local join, leave and publish.
    pub fn add_peer(&self, peer: Arc<dyn Peer>) {
        self.peers.write().push(peer);
    }

    /// The registry local deliveries are looked up in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Subscribes `subscriber` to every channel in `channels` and tells the peers.
    pub fn join(&self, channels: &[String], subscriber: &str) {
        self.join_local(channels, subscriber);
        for peer in self.peers() {
            peer.join(channels, subscriber);
        }
    }

    /// Unsubscribes `subscriber` from `channels` and tells the peers.
    /// Unknown channels are ignored.
    pub fn leave(&self, channels: &[String], subscriber: &str) {
        self.leave_local(channels, subscriber);
        for peer in self.peers() {
            peer.leave(channels, subscriber);
        }
    }

    /// Delivers to local subscribers and forwards to the peers. Returns the
    /// number of local deliveries.
    pub fn publish(&self, channel: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let delivered = self.publish_local(channel, payload.clone());
        for peer in self.peers() {
            peer.publish(channel, payload.clone());
        }
        delivered
    }

    /// Subscribes without forwarding. Channels are created on first join.
    pub fn join_local(&self, channels: &[String], subscriber: &str) {
        self.channels.write(|map| {
            for name in channels {
                map.entry(name.clone())
                    .or_insert_with(|| Channel::new(name))
                    .subscribe(subscriber.to_string());
            }
        });
        info!(subscriber, ?channels, "joined");
    }

    /// Unsubscribes without forwarding. Emptied channels are kept.
    pub fn leave_local(&self, channels: &[String], subscriber: &str) {
        self.channels.write(|map| {
            for name in channels {
                if let Some(channel) = map.get_mut(name) {
                    channel.unsubscribe(subscriber);
                }
            }
        });
        info!(subscriber, ?channels, "left");
    }

    /// Sends the delivery to every subscriber with a live local connection.
    /// Missing or closed connections are skipped.
    ///
    /// UTF-8 payloads go out as the JSON [`ServerMessage`] envelope, anything
    /// else as a binary [`BinaryDelivery`].
    pub fn publish_local(&self, channel: &str, payload: impl Into<Bytes>) -> usize {
        let subscribers = self.subscribers(channel);
        if subscribers.is_empty() {
            debug!(channel, "publish to channel without subscribers");
            return 0;
        }

        let payload = payload.into();
        let (data_type, body) = match std::str::from_utf8(&payload) {
            Ok(text) => {
                let envelope = ServerMessage::Message {
                    channel: channel.to_string(),
                    payload: text.to_string(),
                };
                match serde_json::to_vec(&envelope) {
                    Ok(body) => (DataType::Json, Bytes::from(body)),
                    Err(e) => {
                        tracing::error!("failed to serialize delivery: {e}");
                        return 0;
                    }
                }
            }
            Err(_) => {
                let delivery = BinaryDelivery {
                    channel: channel.to_string(),
                    payload,
                };
                (DataType::Binary, delivery.encode())
            }
        };

        let mut delivered = 0;
        for id in &subscribers {
            let Some(conn) = self.registry.get(id) else {
                debug!(channel, subscriber = %id, "subscriber not connected here");
                continue;
            };
            match conn.send_data(Data::qos0(data_type, body.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(channel, subscriber = %id, "skipped: {e}"),
            }
        }
        delivered
    }

    /// Sorted subscriber ids of `channel`.
    pub fn subscribers(&self, channel: &str) -> Vec<SubscriberId> {
        let mut ids: Vec<_> = self.channels.read(|map| {
            map.get(channel)
                .map(|c| c.subscribers.iter().cloned().collect())
                .unwrap_or_default()
        });
        ids.sort();
        ids
    }

    /// Sorted names of the channels `subscriber` belongs to.
    pub fn channels_of(&self, subscriber: &str) -> Vec<String> {
        let mut names: Vec<_> = self.channels.read(|map| {
            map.values()
                .filter(|c| c.contains(subscriber))
                .map(|c| c.name.clone())
                .collect()
        });
        names.sort();
        names
    }

    /// Applies a message received from a sibling broker.
    pub fn apply_peer_message(&self, msg: PeerMessage) {
        match msg {
            PeerMessage::Join {
                subscriber,
                channels,
            } => self.join_local(&channels, &subscriber),
            PeerMessage::Leave {
                subscriber,
                channels,
            } => self.leave_local(&channels, &subscriber),
            PeerMessage::Publish { channel, payload } => {
                self.publish_local(&channel, payload);
            }
        }
    }

    fn peers(&self) -> Vec<Arc<dyn Peer>> {
        self.peers.read().clone()
    }
}

impl Handler for Broker {
    fn on_auth(&self, identity: &Identity) -> Result<(), AuthError> {
        (self.auth)(identity)
    }

    fn on_data(&self, conn: &Conn, data: Data) -> anyhow::Result<Option<Data>> {
        if data.data_type != DataType::Json {
            bail!("broker expects json commands, got {}", data.data_type);
        }
        let client_id = conn
            .client_id()
            .ok_or_else(|| anyhow!("command on unauthenticated connection"))?;
        let msg: ClientMessage =
            serde_json::from_slice(&data.payload).context("invalid client message")?;
        match msg {
            ClientMessage::Join { channels } => self.join(&channels, &client_id),
            ClientMessage::Leave { channels } => self.leave(&channels, &client_id),
            ClientMessage::Publish { channel, payload } => {
                let n = self.publish(&channel, payload);
                debug!(client_id = %client_id, channel = %channel, delivered = n, "published");
            }
        }
        Ok(None)
    }
}

/// Handler for the peer-facing listener. Authenticates sibling brokers by
/// shared token and applies their replication messages locally.
pub struct PeerHandler {
    broker: Arc<Broker>,
    token: String,
}

impl PeerHandler {
    /// An empty `token` accepts every peer.
    pub fn new(broker: Arc<Broker>, token: impl Into<String>) -> Self {
        Self {
            broker,
            token: token.into(),
        }
    }
}

impl Handler for PeerHandler {
    fn on_auth(&self, identity: &Identity) -> Result<(), AuthError> {
        if self.token.is_empty() || identity.auth_token == self.token {
            return Ok(());
        }
        Err(AuthError::new(format!("peer {} presented a bad token", identity.user_id)))
    }

    fn on_data(&self, _conn: &Conn, data: Data) -> anyhow::Result<Option<Data>> {
        if data.data_type != DataType::Binary {
            bail!("peer link expects binary data, got {}", data.data_type);
        }
        let msg = PeerMessage::decode(&data.payload)?;
        debug!(?msg, "from peer");
        self.broker.apply_peer_message(msg);
        Ok(None)
    }
}
