use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::keepalive::KeepAlive;
use crate::packet::{CloseCode, Data, Identity, Packet};
use crate::transport::Registry;
use crate::utils::{Error, Result};

#[derive(Debug, Default)]
struct ConnState {
    identity: Option<Identity>,
    close_code: Option<CloseCode>,
}

struct ConnInner {
    id: u64,
    peer_addr: SocketAddr,
    state: Mutex<ConnState>,
    tx: UnboundedSender<Packet>,
    cancel: CancellationToken,
    keepalive: KeepAlive,
    registry: Registry,
}

/// Server side of one accepted socket.
///
/// Cheap to clone. Outbound packets go through an unbounded queue drained by
/// the connection's writer task, so sending never blocks on the socket.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

pub(crate) struct ConnParts {
    pub id: u64,
    pub peer_addr: SocketAddr,
    pub tx: UnboundedSender<Packet>,
    pub cancel: CancellationToken,
    pub keepalive: Duration,
    pub ping_timeout: Duration,
    pub registry: Registry,
}

impl Conn {
    pub(crate) fn new(parts: ConnParts) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ConnInner>| {
            let on_ping = weak.clone();
            let on_timeout = weak.clone();
            ConnInner {
                id: parts.id,
                peer_addr: parts.peer_addr,
                state: Mutex::new(ConnState::default()),
                tx: parts.tx,
                cancel: parts.cancel,
                keepalive: KeepAlive::new(
                    parts.keepalive,
                    parts.ping_timeout,
                    move || {
                        if let Some(inner) = on_ping.upgrade() {
                            let _ = Conn { inner }.send(Packet::Ping);
                        }
                    },
                    move || {
                        if let Some(inner) = on_timeout.upgrade() {
                            Conn { inner }.close(CloseCode::PingTimeout);
                        }
                    },
                ),
                registry: parts.registry,
            }
        });
        Conn { inner }
    }

    /// Server-assigned id, unique per server.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// The identity bound at CONNECT, if authenticated.
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.lock().identity.clone()
    }

    pub fn client_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .identity
            .as_ref()
            .map(|i| i.client_id.clone())
    }

    /// Whether CONNECT has been accepted.
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().identity.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().close_code.is_some()
    }

    /// The code this connection was closed with, once closed.
    pub fn close_code(&self) -> Option<CloseCode> {
        self.inner.state.lock().close_code
    }

    /// Queues `packet` for the writer. Fails with `ConnClosed` once closed.
    pub fn send(&self, packet: Packet) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnClosed);
        }
        self.inner.tx.send(packet).map_err(|_| Error::ConnClosed)
    }

    pub fn send_data(&self, data: Data) -> Result<()> {
        self.send(data.into())
    }

    /// Sends CLOSE(`code`) and tears the connection down.
    pub fn close(&self, code: CloseCode) {
        self.shutdown(code, true);
    }

    /// Attaches the authenticated identity. Fails once the connection is
    /// closed.
    pub(crate) fn bind(&self, identity: Identity) -> bool {
        let mut state = self.inner.state.lock();
        if state.close_code.is_some() {
            return false;
        }
        state.identity = Some(identity);
        true
    }

    pub(crate) fn keepalive(&self) -> &KeepAlive {
        &self.inner.keepalive
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Tears down once; later calls are no-ops. `notify` queues a CLOSE
    /// frame ahead of the writer shutting down.
    pub(crate) fn shutdown(&self, code: CloseCode, notify: bool) {
        let client_id = {
            let mut state = self.inner.state.lock();
            if state.close_code.is_some() {
                return;
            }
            state.close_code = Some(code);
            state.identity.as_ref().map(|i| i.client_id.clone())
        };

        if notify {
            let _ = self.inner.tx.send(Packet::close(code));
        }
        self.inner.keepalive.stop();
        self.inner.cancel.cancel();

        if let Some(client_id) = &client_id {
            self.inner.registry.remove_if(client_id, self.id());
        }
        info!(
            conn_id = self.id(),
            client_id = client_id.as_deref().unwrap_or("-"),
            %code,
            "connection closed"
        );
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Conn")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("client_id", &state.identity.as_ref().map(|i| &i.client_id))
            .field("close_code", &state.close_code)
            .finish()
    }
}

/// A registered-nowhere connection backed by an in-memory queue.
#[cfg(test)]
pub(crate) fn conn_for_test(registry: Registry) -> (Conn, tokio::sync::mpsc::UnboundedReceiver<Packet>) {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT_ID: AtomicU64 = AtomicU64::new(1_000_000);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let conn = Conn::new(ConnParts {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        peer_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        tx,
        cancel: CancellationToken::new(),
        keepalive: Duration::from_secs(60),
        ping_timeout: Duration::from_secs(5),
        registry,
    });
    (conn, rx)
}
