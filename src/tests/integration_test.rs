use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::broker::{ClientMessage, Node, ServerMessage};
use crate::client::{Client, Status};
use crate::config::Settings;
use crate::packet::{Data, Identity};

struct Listeners {
    clients: TcpListener,
    peers: TcpListener,
    client_addr: SocketAddr,
    peer_addr: SocketAddr,
}

async fn listeners() -> Listeners {
    let clients = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peers = TcpListener::bind("127.0.0.1:0").await.unwrap();
    Listeners {
        client_addr: clients.local_addr().unwrap(),
        peer_addr: peers.local_addr().unwrap(),
        clients,
        peers,
    }
}

fn start_node(settings: Settings, l: Listeners) -> Arc<Node> {
    let node = Arc::new(Node::new(settings));
    let n = node.clone();
    tokio::spawn(async move { n.serve_on(l.clients, l.peers).await });
    node
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let polled = timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

/// Connects `client_id` to `addr` and returns the client plus its deliveries.
async fn connect(addr: SocketAddr, client_id: &str) -> (Client, mpsc::UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let settings = Settings::default();
    let client = Client::new(
        &crate::config::ClientSettings {
            addr: addr.to_string(),
            ..settings.client
        },
        move |data: &Data| -> anyhow::Result<()> {
            tx.send(serde_json::from_slice(&data.payload)?)?;
            Ok(())
        },
    );
    let mut status = client.watch_status();
    client.connect(Identity::new("user", client_id, ""));
    timeout(Duration::from_secs(5), status.wait_for(|s| *s == Status::Opened))
        .await
        .expect("client never opened")
        .unwrap();
    (client, rx)
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no delivery")
        .expect("handler dropped")
}

fn join(channel: &str) -> ClientMessage {
    ClientMessage::Join {
        channels: vec![channel.to_string()],
    }
}

fn publish(channel: &str, payload: &str) -> ClientMessage {
    ClientMessage::Publish {
        channel: channel.to_string(),
        payload: payload.to_string(),
    }
}

#[tokio::test]
async fn integration_fan_out_end_to_end() {
    let l = listeners().await;
    let addr = l.client_addr;
    let node = start_node(Settings::default(), l);

    let (a, mut rx_a) = connect(addr, "A").await;
    let (b, mut rx_b) = connect(addr, "B").await;
    let (c, mut rx_c) = connect(addr, "C").await;

    a.send_json(&join("room1")).unwrap();
    b.send_json(&join("room1")).unwrap();
    c.send_json(&join("room2")).unwrap();
    let broker = node.broker().clone();
    wait_for("joins", || {
        broker.subscribers("room1").len() == 2 && broker.subscribers("room2").len() == 1
    })
    .await;

    c.send_json(&publish("room1", "X")).unwrap();
    let expected = ServerMessage::Message {
        channel: "room1".into(),
        payload: "X".into(),
    };
    assert_eq!(next_message(&mut rx_a).await, expected);
    assert_eq!(next_message(&mut rx_b).await, expected);

    b.send_json(&ClientMessage::Leave {
        channels: vec!["room1".into()],
    })
    .unwrap();
    wait_for("leave", || broker.subscribers("room1") == vec!["A".to_string()]).await;

    c.send_json(&publish("room1", "Y")).unwrap();
    match next_message(&mut rx_a).await {
        ServerMessage::Message { payload, .. } => assert_eq!(payload, "Y"),
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx_b.try_recv().is_err());
    assert!(rx_c.try_recv().is_err());

    node.shutdown();
}

#[tokio::test]
async fn integration_duplicate_login_evicts_first_session() {
    let l = listeners().await;
    let addr = l.client_addr;
    let node = start_node(Settings::default(), l);

    let (first, _rx1) = connect(addr, "same").await;
    let mut first_status = first.watch_status();
    let (second, _rx2) = connect(addr, "same").await;

    timeout(
        Duration::from_secs(5),
        first_status.wait_for(|s| *s == Status::Closed),
    )
    .await
    .expect("evicted session never closed")
    .unwrap();
    // eviction is terminal for the client, no reconnect race
    assert_eq!(first.retry_attempts(), 0);
    assert_eq!(second.status(), Status::Opened);
    assert_eq!(node.server().conn_count(), 1);

    node.shutdown();
}

#[tokio::test]
async fn integration_peers_replicate_membership_and_publishes() {
    let l1 = listeners().await;
    let l2 = listeners().await;
    let (addr1, addr2) = (l1.client_addr, l2.client_addr);

    let mut s1 = Settings::default();
    s1.broker.node_id = "n1".into();
    s1.broker.peers = vec![l2.peer_addr.to_string()];
    let mut s2 = Settings::default();
    s2.broker.node_id = "n2".into();
    s2.broker.peers = vec![l1.peer_addr.to_string()];

    let node1 = start_node(s1, l1);
    let node2 = start_node(s2, l2);
    for node in [&node1, &node2] {
        let mut status = node.links()[0].client().watch_status();
        timeout(Duration::from_secs(5), status.wait_for(|s| *s == Status::Opened))
            .await
            .expect("peer link never opened")
            .unwrap();
    }

    let (sub, mut rx_sub) = connect(addr2, "S").await;
    sub.send_json(&join("room")).unwrap();
    let remote = node1.broker().clone();
    wait_for("replicated join", || remote.subscribers("room") == vec!["S".to_string()]).await;

    let (publisher, _rx_pub) = connect(addr1, "P").await;
    publisher.send_json(&publish("room", "across")).unwrap();
    assert_eq!(
        next_message(&mut rx_sub).await,
        ServerMessage::Message {
            channel: "room".into(),
            payload: "across".into(),
        }
    );

    node1.shutdown();
    node2.shutdown();
}
