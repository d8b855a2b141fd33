use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerSettings;
use crate::packet::{CloseCode, ConnackCode, Connect, Data, FrameCodec, Identity, Packet};
use crate::transport::conn::ConnParts;
use crate::transport::{Conn, Registry, link};
use crate::utils::{AuthError, Error, ProtocolError, Result};

/// Application hooks for a [`Server`].
pub trait Handler: Send + Sync + 'static {
    /// Accepts or refuses the identity presented in CONNECT.
    fn on_auth(&self, identity: &Identity) -> Result<(), AuthError>;

    /// Handles one DATA packet. Runs on its own task. An `Ok` return acks a
    /// QoS 1 packet and sends the optional reply; an error is logged and the
    /// ack is withheld.
    fn on_data(&self, conn: &Conn, data: Data) -> anyhow::Result<Option<Data>>;
}

struct ServerInner {
    settings: ServerSettings,
    handler: Arc<dyn Handler>,
    registry: Registry,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

/// Accepts sockets and runs one reader task, one writer task and one
/// keepalive per connection.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// A server with its own registry.
    pub fn new(settings: ServerSettings, handler: Arc<dyn Handler>) -> Self {
        Self::with_registry(settings, handler, Registry::new())
    }

    /// Uses a registry shared with other components (e.g. a broker).
    pub fn with_registry(
        settings: ServerSettings,
        handler: Arc<dyn Handler>,
        registry: Registry,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                settings,
                handler,
                registry,
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(self.inner.settings.addr()).await?;
        self.serve_on(listener).await
    }

    /// Serves an already bound listener until [`shutdown`](Self::shutdown).
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        info!("listening on {}", listener.local_addr()?);
        loop {
            let accepted = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.handle_conn(stream, addr).await });
                }
                Err(e) => error!("accept failed: {e}"),
            }
        }
        info!("server stopped accepting");
        Ok(())
    }

    /// Authenticated connections by ClientID.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The live connection for `client_id`, if any.
    pub fn get_conn(&self, client_id: &str) -> Option<Conn> {
        self.inner.registry.get(client_id)
    }

    /// Closes the connection registered under `client_id` with `KickedOut`.
    pub fn kick_conn(&self, client_id: &str) -> Result<()> {
        let conn = self.get_conn(client_id).ok_or(Error::ConnNotFound)?;
        conn.close(CloseCode::KickedOut);
        Ok(())
    }

    /// Kicks every connection of `user_id`; returns how many were closed.
    pub fn kick_user(&self, user_id: &str) -> usize {
        let conns = self.inner.registry.by_user(user_id);
        for conn in &conns {
            conn.close(CloseCode::KickedOut);
        }
        conns.len()
    }

    /// Number of authenticated connections.
    pub fn conn_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Stops accepting and closes every registered connection with `GoingAway`.
    pub fn shutdown(&self) {
        for conn in self.inner.registry.all() {
            conn.close(CloseCode::GoingAway);
        }
        self.inner.shutdown.cancel();
    }

    async fn handle_conn(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let settings = &self.inner.settings;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.inner.shutdown.child_token();

        let conn = Conn::new(ConnParts {
            id,
            peer_addr,
            tx,
            cancel: cancel.clone(),
            keepalive: settings.keepalive(),
            ping_timeout: settings.ping_timeout(),
            registry: self.inner.registry.clone(),
        });
        debug!(conn_id = id, %peer_addr, "accepted");

        tokio::spawn(link::write_loop(
            writer,
            rx,
            cancel.clone(),
            format!("conn {id}"),
        ));

        let deadline = conn.clone();
        let auth_timeout = settings.auth_timeout();
        tokio::spawn(async move {
            let token = deadline.cancel_token();
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(auth_timeout) => {
                    if !deadline.is_authenticated() {
                        warn!(conn_id = deadline.id(), "no CONNECT within {:?}", auth_timeout);
                        deadline.close(CloseCode::AuthenticationTimeout);
                    }
                }
            }
        });

        let mut frames = FramedRead::new(reader, FrameCodec::with_max_size(settings.max_packet_size));
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(packet)) => {
                    debug!(conn_id = id, "<- {packet}");
                    self.dispatch(&conn, packet);
                }
                Some(Err(ProtocolError::Io(e))) => {
                    debug!(conn_id = id, "read failed: {e}");
                    conn.shutdown(CloseCode::Abnormal, false);
                    break;
                }
                Some(Err(e @ ProtocolError::MessageTooBig { .. })) => {
                    warn!(conn_id = id, "{e}");
                    conn.close(CloseCode::MessageTooBig);
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn_id = id, "protocol error: {e}");
                    conn.close(CloseCode::ProtocolError);
                    break;
                }
                None => {
                    debug!(conn_id = id, "peer hung up");
                    conn.shutdown(CloseCode::Abnormal, false);
                    break;
                }
            }
        }
        conn.shutdown(CloseCode::GoingAway, false);
    }

    fn dispatch(&self, conn: &Conn, packet: Packet) {
        match packet {
            Packet::Connect(connect) => self.handle_connect(conn, connect),
            Packet::Data(data) => {
                if !conn.is_authenticated() {
                    debug!(conn_id = conn.id(), "dropping DATA before CONNECT");
                    return;
                }
                let handler = self.inner.handler.clone();
                let conn = conn.clone();
                tokio::spawn(async move { handle_data(handler.as_ref(), &conn, data) });
            }
            Packet::Ping => {
                let _ = conn.send(Packet::Pong);
            }
            Packet::Pong => conn.keepalive().handle_pong(),
            Packet::Close(close) => conn.shutdown(close.code, false),
            Packet::DataAck(ack) => debug!(conn_id = conn.id(), "acked {}", ack.packet_id),
            Packet::Connack(_) => conn.close(CloseCode::ProtocolError),
        }
    }

    fn handle_connect(&self, conn: &Conn, connect: Connect) {
        if conn.is_authenticated() {
            warn!(conn_id = conn.id(), "second CONNECT on one connection");
            conn.close(CloseCode::ProtocolError);
            return;
        }
        let Some(identity) = connect.identity else {
            warn!(conn_id = conn.id(), "anonymous CONNECT refused");
            conn.close(CloseCode::AuthenticationFailure);
            return;
        };
        if let Err(e) = self.inner.handler.on_auth(&identity) {
            warn!(conn_id = conn.id(), user_id = %identity.user_id, "{e}");
            conn.close(CloseCode::AuthenticationFailure);
            return;
        }

        let client_id = identity.client_id.clone();
        if !conn.bind(identity) {
            return;
        }
        self.inner.registry.register(&client_id, conn.clone());
        if conn.is_closed() {
            self.inner.registry.remove_if(&client_id, conn.id());
            return;
        }
        conn.keepalive().start();
        let _ = conn.send(Packet::connack(ConnackCode::Accepted));
        info!(conn_id = conn.id(), client_id = %client_id, "authenticated");
    }
}

fn handle_data(handler: &dyn Handler, conn: &Conn, data: Data) {
    let ack = data.needs_ack().then_some(data.packet_id);
    match handler.on_data(conn, data) {
        Ok(reply) => {
            if let Some(packet_id) = ack {
                let _ = conn.send(Packet::data_ack(packet_id));
            }
            if let Some(reply) = reply {
                let _ = conn.send_data(reply);
            }
        }
        Err(e) => warn!(conn_id = conn.id(), "data handler failed, ack withheld: {e:#}"),
    }
}
