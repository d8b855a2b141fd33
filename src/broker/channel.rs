use std::collections::HashSet;

/// Subscribers are identified by ClientID.
pub type SubscriberId = String;

/// A named channel and the ClientIDs subscribed to it.
///
/// Channels are created on first join and are never removed, even once the
/// subscriber set is empty.
#[derive(Debug, Default, Clone)]
pub struct Channel {
    pub name: String,
    pub subscribers: HashSet<SubscriberId>,
}

impl Channel {
    /// Creates an empty channel named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Returns `false` if `id` was already subscribed.
    pub fn subscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.insert(id)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.subscribers.remove(id)
    }

    /// Whether `id` is subscribed to this channel.
    pub fn contains(&self, id: &str) -> bool {
        self.subscribers.contains(id)
    }
}
