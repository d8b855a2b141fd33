use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::broker::engine::{Broker, PeerHandler};
use crate::broker::peer::ClientPeer;
use crate::config::Settings;
use crate::transport::{Registry, Server};
use crate::utils::Result;

/// A broker process: the client listener, the peer listener and one
/// outbound link per configured sibling.
pub struct Node {
    broker: Arc<Broker>,
    server: Server,
    peer_server: Server,
    links: Vec<Arc<ClientPeer>>,
    settings: Settings,
}

impl Node {
    /// Builds a node with a fresh registry and an open broker.
    pub fn new(settings: Settings) -> Self {
        let registry = Registry::new();
        let broker = Arc::new(Broker::new(registry.clone()));
        Self::with_broker(settings, broker, registry)
    }

    /// Uses a broker built by the caller, e.g. one with an auth callback.
    /// `registry` must be the one the broker delivers through.
    pub fn with_broker(settings: Settings, broker: Arc<Broker>, registry: Registry) -> Self {
        let server = Server::with_registry(settings.server.clone(), broker.clone(), registry);
        let peer_handler = Arc::new(PeerHandler::new(
            broker.clone(),
            settings.broker.peer_token.clone(),
        ));
        let peer_server = Server::new(settings.server.clone(), peer_handler);

        let links: Vec<_> = settings
            .broker
            .peers
            .iter()
            .map(|addr| {
                Arc::new(ClientPeer::new(
                    &settings.client,
                    addr,
                    &settings.broker.node_id,
                    &settings.broker.peer_token,
                ))
            })
            .collect();
        for link in &links {
            broker.add_peer(link.clone());
        }

        Self {
            broker,
            server,
            peer_server,
            links,
            settings,
        }
    }

    /// The channel broker shared by both listeners.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// The client-facing server.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Outbound links, one per configured peer address.
    pub fn links(&self) -> &[Arc<ClientPeer>] {
        &self.links
    }

    /// Binds both configured addresses and serves until [`shutdown`](Self::shutdown).
    pub async fn serve(&self) -> Result<()> {
        let clients = TcpListener::bind(self.settings.server.addr()).await?;
        let peers = TcpListener::bind(self.settings.broker.peer_addr()).await?;
        self.serve_on(clients, peers).await
    }

    /// Starts the peer links and serves both listeners until shutdown.
    pub async fn serve_on(&self, clients: TcpListener, peers: TcpListener) -> Result<()> {
        info!(
            node_id = %self.settings.broker.node_id,
            peers = self.links.len(),
            "broker node starting"
        );
        for link in &self.links {
            link.connect();
        }
        tokio::try_join!(self.server.serve_on(clients), self.peer_server.serve_on(peers))?;
        Ok(())
    }

    /// Closes the peer links, then stops both servers.
    pub fn shutdown(&self) {
        for link in &self.links {
            link.close();
        }
        self.server.shutdown();
        self.peer_server.shutdown();
    }
}
