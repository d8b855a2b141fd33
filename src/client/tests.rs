use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use super::{Client, CloseReason, DataHandler, Status};
use crate::config::{BackoffSettings, ClientSettings, ServerSettings};
use crate::packet::{CloseCode, ConnackCode, Data, DataType, FrameCodec, Identity, Packet};
use crate::transport::{Conn, Handler, Server};
use crate::utils::{AuthError, Error};

fn settings(addr: SocketAddr, retry_limit: u32) -> ClientSettings {
    ClientSettings {
        addr: addr.to_string(),
        retry_limit,
        backoff: BackoffSettings::Constant { delay_ms: 20 },
        ..Default::default()
    }
}

fn ignore(_: &Data) -> anyhow::Result<()> {
    Ok(())
}

async fn wait_status(rx: &mut watch::Receiver<Status>, want: Status) {
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("never reached {want}"))
        .unwrap();
}

/// Echoes DATA back as QoS 1; refuses the token "bad".
struct EchoHandler;

impl Handler for EchoHandler {
    fn on_auth(&self, identity: &Identity) -> Result<(), AuthError> {
        if identity.auth_token == "bad" {
            return Err(AuthError::new("bad token"));
        }
        Ok(())
    }

    fn on_data(&self, _conn: &Conn, data: Data) -> anyhow::Result<Option<Data>> {
        Ok(Some(Data::new(data.data_type, 99, data.payload)))
    }
}

async fn start_server() -> (Server, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(ServerSettings::default(), Arc::new(EchoHandler));
    let s = server.clone();
    tokio::spawn(async move { s.serve_on(listener).await });
    (server, addr)
}

/// A bare listener that reports every accepted socket.
async fn raw_listener() -> (SocketAddr, mpsc::UnboundedReceiver<Framed<TcpStream, FrameCodec>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if tx.send(Framed::new(stream, FrameCodec::new())).is_err() {
                break;
            }
        }
    });
    (addr, rx)
}

async fn next_packet(peer: &mut Framed<TcpStream, FrameCodec>) -> Packet {
    timeout(Duration::from_secs(5), peer.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("decode failed")
}

#[derive(Default)]
struct Recorder {
    data: Mutex<Vec<Data>>,
    acks: Mutex<Vec<i64>>,
}

struct Recording(Arc<Recorder>);

impl DataHandler for Recording {
    fn on_data(&self, data: &Data) -> anyhow::Result<()> {
        self.0.data.lock().push(data.clone());
        Ok(())
    }

    fn on_ack(&self, packet_id: i64) {
        self.0.acks.lock().push(packet_id);
    }
}

#[tokio::test]
async fn test_connect_send_and_receive() {
    let (server, addr) = start_server().await;
    let recorder = Arc::new(Recorder::default());
    let client = Client::new(&settings(addr, 3), Recording(recorder.clone()));
    let mut status = client.watch_status();
    assert!(matches!(client.send_text("early"), Err(Error::NotConnected)));

    client.connect(Identity::new("u1", "c1", "tok"));
    wait_status(&mut status, Status::Opened).await;
    assert!(server.get_conn("c1").is_some());

    let id = client.send_text("hello").unwrap();
    for _ in 0..100 {
        if !recorder.data.lock().is_empty() && !recorder.acks.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*recorder.acks.lock(), vec![id]);
    let data = recorder.data.lock().clone();
    assert_eq!(data, vec![Data::new(DataType::Text, 99, "hello")]);

    client.send_ping().unwrap();
    client.send_json0(&serde_json::json!({"k": 1})).unwrap();
    client.close();
    assert_eq!(client.status(), Status::Closed);
    assert!(matches!(client.send_ping(), Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_connect_twice_dials_once() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 3), ignore);
    client.connect(Identity::new("u1", "c1", "tok"));
    client.connect(Identity::new("u1", "c1", "tok"));
    assert_eq!(client.status(), Status::Opening);

    let mut peer = timeout(Duration::from_secs(5), accepted.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(next_packet(&mut peer).await, Packet::Connect(_)));
    assert!(
        timeout(Duration::from_millis(200), accepted.recv())
            .await
            .is_err()
    );
    client.close();
}

#[tokio::test]
async fn test_normal_close_never_retries() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 5), ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    let mut peer = accepted.recv().await.unwrap();
    next_packet(&mut peer).await;
    peer.send(Packet::connack(ConnackCode::Accepted)).await.unwrap();
    wait_status(&mut status, Status::Opened).await;
    peer.send(Packet::close(CloseCode::Normal)).await.unwrap();

    wait_status(&mut status, Status::Closed).await;
    assert_eq!(client.retry_attempts(), 0);
    assert!(
        timeout(Duration::from_millis(200), accepted.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_abnormal_close_retries_up_to_limit() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 2), ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    // initial dial plus two retries, each dropped on arrival
    for _ in 0..3 {
        let peer = timeout(Duration::from_secs(5), accepted.recv())
            .await
            .unwrap()
            .unwrap();
        drop(peer);
    }
    wait_status(&mut status, Status::Closed).await;
    assert!(
        timeout(Duration::from_millis(200), accepted.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_successful_reconnect_resets_attempts() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 5), ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    drop(accepted.recv().await.unwrap());
    let mut peer = accepted.recv().await.unwrap();
    assert_eq!(
        next_packet(&mut peer).await,
        Packet::connect(Identity::new("u1", "c1", "tok"))
    );
    peer.send(Packet::connack(ConnackCode::Accepted)).await.unwrap();
    wait_status(&mut status, Status::Opened).await;
    assert_eq!(client.retry_attempts(), 0);
    client.close();
}

#[tokio::test]
async fn test_rejected_connack_is_terminal() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 5), ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    let mut peer = accepted.recv().await.unwrap();
    next_packet(&mut peer).await;
    peer.send(Packet::connack(ConnackCode::BadCredentials))
        .await
        .unwrap();
    wait_status(&mut status, Status::Closed).await;
    assert_eq!(client.retry_attempts(), 0);
}

#[tokio::test]
async fn test_auth_failure_and_duplicate_login_are_not_retried() {
    let (_server, addr) = start_server().await;

    let refused = Client::new(&settings(addr, 5), ignore);
    let mut status = refused.watch_status();
    refused.connect(Identity::new("u1", "c1", "bad"));
    wait_status(&mut status, Status::Closed).await;

    let first = Client::new(&settings(addr, 5), ignore);
    let mut first_status = first.watch_status();
    first.connect(Identity::new("u1", "dup", "tok"));
    wait_status(&mut first_status, Status::Opened).await;

    let second = Client::new(&settings(addr, 5), ignore);
    let mut second_status = second.watch_status();
    second.connect(Identity::new("u1", "dup", "tok"));
    wait_status(&mut second_status, Status::Opened).await;
    wait_status(&mut first_status, Status::Closed).await;
    assert_eq!(first.retry_attempts(), 0);
    assert_eq!(second.status(), Status::Opened);
    second.close();
}

#[tokio::test]
async fn test_client_answers_ping_and_acks_data() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 1), ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    let mut peer = accepted.recv().await.unwrap();
    next_packet(&mut peer).await;
    peer.send(Packet::connack(ConnackCode::Accepted)).await.unwrap();
    wait_status(&mut status, Status::Opened).await;

    peer.send(Packet::Ping).await.unwrap();
    assert_eq!(next_packet(&mut peer).await, Packet::Pong);
    peer.send(Packet::from(Data::new(DataType::Text, 5, "x")))
        .await
        .unwrap();
    assert_eq!(next_packet(&mut peer).await, Packet::data_ack(5));

    client.close();
    assert_eq!(next_packet(&mut peer).await, Packet::close(CloseCode::Normal));
}

#[tokio::test]
async fn test_ping_timeout_takes_retry_path() {
    let (addr, mut accepted) = raw_listener().await;
    let mut s = settings(addr, 0);
    s.keepalive_ms = 30;
    s.ping_timeout_ms = 30;
    let client = Client::new(&s, ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    let mut peer = accepted.recv().await.unwrap();
    next_packet(&mut peer).await;
    peer.send(Packet::connack(ConnackCode::Accepted)).await.unwrap();
    wait_status(&mut status, Status::Opened).await;

    assert_eq!(next_packet(&mut peer).await, Packet::Ping);
    // never answered: retry limit 0 makes the timeout terminal
    wait_status(&mut status, Status::Closed).await;
}

#[test]
fn test_close_reason_classes() {
    assert!(CloseReason::Code(CloseCode::Normal).is_normal());
    assert!(!CloseReason::Code(CloseCode::GoingAway).is_normal());
    assert!(CloseReason::Code(CloseCode::KickedOut).is_fatal());
    assert!(CloseReason::Code(CloseCode::Other(4000)).is_fatal());
    assert!(CloseReason::Rejected(ConnackCode::NotAuthorized).is_fatal());
    assert!(!CloseReason::Code(CloseCode::PingTimeout).is_fatal());
    assert!(!CloseReason::Transport("reset".into()).is_fatal());
}

#[tokio::test]
async fn test_dropping_last_handle_closes_session() {
    let (addr, mut accepted) = raw_listener().await;
    let client = Client::new(&settings(addr, 5), ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    let mut peer = accepted.recv().await.unwrap();
    next_packet(&mut peer).await;
    peer.send(Packet::connack(ConnackCode::Accepted)).await.unwrap();
    wait_status(&mut status, Status::Opened).await;

    // a clone going away leaves the session open
    drop(client.clone());
    assert_eq!(client.status(), Status::Opened);

    drop(client);
    assert_eq!(next_packet(&mut peer).await, Packet::close(CloseCode::Normal));
    wait_status(&mut status, Status::Closed).await;
    assert!(
        timeout(Duration::from_millis(200), accepted.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_dropping_client_cancels_pending_retry() {
    let (addr, mut accepted) = raw_listener().await;
    let settings = ClientSettings {
        backoff: BackoffSettings::Constant { delay_ms: 200 },
        ..settings(addr, 5)
    };
    let client = Client::new(&settings, ignore);
    let mut status = client.watch_status();
    client.connect(Identity::new("u1", "c1", "tok"));

    drop(accepted.recv().await.unwrap());
    timeout(Duration::from_secs(5), async {
        while client.retry_attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("retry never scheduled");

    drop(client);
    wait_status(&mut status, Status::Closed).await;
    assert!(
        timeout(Duration::from_millis(500), accepted.recv())
            .await
            .is_err()
    );
}
