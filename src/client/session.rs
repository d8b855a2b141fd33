use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CloseReason, Status};
use crate::config::ClientSettings;
use crate::keepalive::KeepAlive;
use crate::packet::{CloseCode, Connect, Data, DataType, FrameCodec, Identity, Packet};
use crate::retry::{Backoff, Retrier};
use crate::transport::link;
use crate::utils::{Error, ProtocolError, Result};

/// Receives DATA pushed by the server.
pub trait DataHandler: Send + Sync + 'static {
    /// An `Ok` return acknowledges a QoS 1 packet.
    fn on_data(&self, data: &Data) -> anyhow::Result<()>;

    /// Called when the server acknowledges one of our QoS 1 packets.
    fn on_ack(&self, _packet_id: i64) {}
}

impl<F> DataHandler for F
where
    F: Fn(&Data) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_data(&self, data: &Data) -> anyhow::Result<()> {
        self(data)
    }
}

struct Link {
    tx: mpsc::UnboundedSender<Packet>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    status: Status,
    identity: Option<Identity>,
    link: Option<Link>,
    retrying: bool,
    /// Bumped on every dial so callbacks from a replaced socket are ignored.
    generation: u64,
}

struct Inner {
    addr: String,
    handler: Arc<dyn DataHandler>,
    state: Mutex<State>,
    status: watch::Sender<Status>,
    retrier: Retrier<CloseReason>,
    keepalive: KeepAlive,
    next_packet_id: AtomicI64,
}

/// Reconnecting client session.
///
/// All status transitions happen under one lock. Cheap to clone; clones share
/// the session. Dropping the last clone closes the session as [`close`]
/// does.
///
/// [`close`]: Client::close
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
    _guard: Arc<CloseOnDrop>,
}

/// Shared by every handle but never by the session's own tasks, so it drops
/// with the last handle.
struct CloseOnDrop(Weak<Inner>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(inner) = self.0.upgrade() {
            inner.close();
        }
    }
}

impl Client {
    /// Creates an idle session in `Unknown`. Nothing is dialled until
    /// [`connect`](Self::connect).
    pub fn new(settings: &ClientSettings, handler: impl DataHandler) -> Self {
        let backoff = Backoff::from(&settings.backoff);
        let retrier = Retrier::new(settings.retry_limit, backoff).with_filter(CloseReason::is_fatal);
        let (status, _) = watch::channel(Status::Unknown);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let on_ping = weak.clone();
            let on_timeout = weak.clone();
            Inner {
                addr: settings.addr.clone(),
                handler: Arc::new(handler),
                state: Mutex::new(State::default()),
                status,
                retrier,
                keepalive: KeepAlive::new(
                    settings.keepalive(),
                    settings.ping_timeout(),
                    move || {
                        if let Some(inner) = on_ping.upgrade() {
                            let _ = inner.send(Packet::Ping);
                        }
                    },
                    move || {
                        if let Some(inner) = on_timeout.upgrade() {
                            inner.try_close(CloseReason::Code(CloseCode::PingTimeout), None);
                        }
                    },
                ),
                next_packet_id: AtomicI64::new(1),
            }
        });
        let guard = Arc::new(CloseOnDrop(Arc::downgrade(&inner)));
        Client {
            inner,
            _guard: guard,
        }
    }

    /// Dials and sends CONNECT. No-op while `Opening` or `Opened`.
    pub fn connect(&self, identity: Identity) {
        let generation = {
            let mut st = self.inner.state.lock();
            if matches!(st.status, Status::Opening | Status::Opened) {
                return;
            }
            st.identity = Some(identity);
            self.inner.retrier.cancel();
            self.inner.set_status(&mut st, Status::Opening);
            st.generation += 1;
            st.generation
        };
        tokio::spawn(self.inner.clone().open(generation));
    }

    /// Sends CLOSE(Normal) and enters `Closed`. No reconnect follows.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.inner.state.lock().status
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.inner.status.subscribe()
    }

    /// The identity passed to the last `connect`.
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.lock().identity.clone()
    }

    /// Reconnect attempts made since the last successful handshake.
    pub fn retry_attempts(&self) -> u32 {
        self.inner.retrier.attempts()
    }

    /// Queues `data` as is. Fails with `NotConnected` unless `Opened`.
    pub fn send_data(&self, data: Data) -> Result<()> {
        self.inner.send(data.into())
    }

    /// Sends an extra PING outside the keepalive schedule.
    pub fn send_ping(&self) -> Result<()> {
        self.inner.send(Packet::Ping)
    }

    /// QoS 1 text; returns the packet id the ack will carry.
    pub fn send_text(&self, text: impl Into<String>) -> Result<i64> {
        self.send_acked(DataType::Text, Bytes::from(text.into()))
    }

    /// Sends text at QoS 0.
    pub fn send_text0(&self, text: impl Into<String>) -> Result<()> {
        self.send_data(Data::qos0(DataType::Text, Bytes::from(text.into())))
    }

    /// QoS 1 JSON; returns the packet id the ack will carry.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<i64> {
        self.send_acked(DataType::Json, serde_json::to_vec(value)?.into())
    }

    /// Sends `value` as JSON at QoS 0.
    pub fn send_json0<T: Serialize>(&self, value: &T) -> Result<()> {
        self.send_data(Data::qos0(DataType::Json, serde_json::to_vec(value)?))
    }

    fn send_acked(&self, data_type: DataType, payload: Bytes) -> Result<i64> {
        let id = self.inner.next_packet_id.fetch_add(1, Ordering::Relaxed);
        self.send_data(Data::new(data_type, id, payload))?;
        Ok(id)
    }
}

impl Inner {
    fn close(&self) {
        let mut st = self.state.lock();
        if st.status == Status::Closed {
            return;
        }
        self.set_status(&mut st, Status::Closing);
        if let Some(link) = &st.link {
            let _ = link.tx.send(Packet::close(CloseCode::Normal));
        }
        self.set_status(&mut st, Status::Closed);
    }

    fn send(&self, packet: Packet) -> Result<()> {
        let st = self.state.lock();
        match (&st.link, st.status) {
            (Some(link), Status::Opened) => link.tx.send(packet).map_err(|_| Error::ConnClosed),
            _ => Err(Error::NotConnected),
        }
    }

    /// Applies `status` and its side effects. Caller holds the state lock.
    fn set_status(&self, st: &mut State, status: Status) {
        if st.status == status {
            return;
        }
        info!(addr = %self.addr, from = %st.status, to = %status, "client status");
        st.status = status;
        match status {
            Status::Opened => {
                self.retrier.cancel();
                self.keepalive.start();
            }
            Status::Opening | Status::Closing => self.keepalive.stop(),
            Status::Closed => {
                self.keepalive.stop();
                self.retrier.cancel();
                st.retrying = false;
                if let Some(link) = st.link.take() {
                    link.cancel.cancel();
                }
            }
            Status::Unknown => {}
        }
        self.status.send_replace(status);
    }

    /// Handles the end of a connection attempt. `generation` is `None` for
    /// reasons raised against whatever socket is current.
    fn try_close(self: &Arc<Self>, reason: CloseReason, generation: Option<u64>) {
        let mut st = self.state.lock();
        if generation.is_some_and(|g| g != st.generation) {
            return;
        }
        if matches!(st.status, Status::Closed | Status::Closing) || st.retrying {
            return;
        }
        if let Some(link) = st.link.take() {
            link.cancel.cancel();
        }

        if reason.is_normal() {
            info!(addr = %self.addr, "{reason}");
            self.set_status(&mut st, Status::Closed);
            return;
        }
        match self.retrier.can(&reason) {
            Some(delay) => {
                warn!(
                    addr = %self.addr,
                    attempt = self.retrier.attempts(),
                    "{reason}, reconnecting in {delay:?}"
                );
                st.retrying = true;
                self.set_status(&mut st, Status::Opening);
                st.generation += 1;
                let generation = st.generation;
                drop(st);
                let inner = self.clone();
                self.retrier
                    .retry(delay, move || async move { inner.reconnect(generation).await });
            }
            None => {
                warn!(addr = %self.addr, "{reason}, giving up");
                self.set_status(&mut st, Status::Closed);
            }
        }
    }

    async fn reconnect(self: Arc<Self>, generation: u64) {
        {
            let mut st = self.state.lock();
            if st.generation != generation || !st.retrying {
                return;
            }
            st.retrying = false;
        }
        self.open(generation).await;
    }

    async fn open(self: Arc<Self>, generation: u64) {
        let stream = match TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(e) => {
                self.try_close(CloseReason::Transport(e.to_string()), Some(generation));
                return;
            }
        };
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let identity = {
            let mut st = self.state.lock();
            if st.generation != generation || st.status != Status::Opening {
                debug!(addr = %self.addr, "dropping stale dial");
                return;
            }
            st.link = Some(Link {
                tx: tx.clone(),
                cancel: cancel.clone(),
            });
            st.identity.clone()
        };

        let label = format!(
            "client {}",
            identity.as_ref().map_or("anonymous", |i| i.client_id.as_str())
        );
        tokio::spawn(link::write_loop(writer, rx, cancel.clone(), label));
        let _ = tx.send(Packet::Connect(Connect { identity }));
        tokio::spawn(self.read_loop(reader, cancel, generation));
    }

    async fn read_loop(self: Arc<Self>, reader: OwnedReadHalf, cancel: CancellationToken, generation: u64) {
        let mut frames = FramedRead::new(reader, FrameCodec::new());
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = frames.next() => next,
            };
            let reason = match next {
                Some(Ok(packet)) => {
                    debug!(addr = %self.addr, "<- {packet}");
                    self.dispatch(packet, generation);
                    continue;
                }
                Some(Err(ProtocolError::Io(e))) => CloseReason::Transport(e.to_string()),
                Some(Err(e)) => CloseReason::Protocol(e.to_string()),
                None => CloseReason::Transport("connection closed by server".to_string()),
            };
            self.try_close(reason, Some(generation));
            return;
        }
    }

    fn dispatch(self: &Arc<Self>, packet: Packet, generation: u64) {
        match packet {
            Packet::Connack(ack) if ack.code.is_accepted() => {
                let mut st = self.state.lock();
                if st.generation == generation && st.status == Status::Opening {
                    self.set_status(&mut st, Status::Opened);
                }
            }
            Packet::Connack(ack) => self.try_close(CloseReason::Rejected(ack.code), Some(generation)),
            Packet::Close(close) => self.try_close(CloseReason::Code(close.code), Some(generation)),
            Packet::Ping => {
                let _ = self.send(Packet::Pong);
            }
            Packet::Pong => self.keepalive.handle_pong(),
            Packet::Data(data) => {
                let inner = self.clone();
                tokio::spawn(async move {
                    match inner.handler.on_data(&data) {
                        Ok(()) if data.needs_ack() => {
                            let _ = inner.send(Packet::data_ack(data.packet_id));
                        }
                        Ok(()) => {}
                        Err(e) => warn!(addr = %inner.addr, "data handler failed: {e:#}"),
                    }
                });
            }
            Packet::DataAck(ack) => self.handler.on_ack(ack.packet_id),
            Packet::Connect(_) => self.try_close(
                CloseReason::Protocol("unexpected CONNECT from server".to_string()),
                Some(generation),
            ),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.inner.addr)
            .field("status", &self.status())
            .finish()
    }
}
