//! CLI for Tether
//!
//! Subcommands:
//! - `server`: run a broker node
//! - `client`: join a channel, publish stdin lines, print deliveries

use clap::Parser;
use tether::broker::{BinaryDelivery, ClientMessage, Node, ServerMessage};
use tether::client::{Client, Status};
use tether::config::load_config;
use tether::packet::{Data, DataType, Identity};
use tether::utils::logging;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tether")]
enum Command {
    /// Start a broker node
    Server,
    /// Run an interactive client against a node
    Client {
        /// Node address (default: the configured client address)
        #[arg(long)]
        addr: Option<String>,
        #[arg(long, default_value = "cli")]
        client_id: String,
        #[arg(long, default_value = "lobby")]
        channel: String,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Client {
            addr,
            client_id,
            channel,
        } => run_client(settings, addr, client_id, channel).await,
    };
    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run_server(settings: tether::config::Settings) -> anyhow::Result<()> {
    let node = Node::new(settings);

    tokio::select! {
        res = node.serve() => {
            res?;
            error!("Server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            node.shutdown();
        }
    }
    Ok(())
}

async fn run_client(
    mut settings: tether::config::Settings,
    addr: Option<String>,
    client_id: String,
    channel: String,
) -> anyhow::Result<()> {
    if let Some(addr) = addr {
        settings.client.addr = addr;
    }

    let client = Client::new(&settings.client, |data: &Data| -> anyhow::Result<()> {
        if data.data_type == DataType::Binary {
            let delivery = BinaryDelivery::decode(&data.payload)?;
            println!("[{}] <{} bytes>", delivery.channel, delivery.payload.len());
            return Ok(());
        }
        match serde_json::from_slice::<ServerMessage>(&data.payload)? {
            ServerMessage::Message { channel, payload } => println!("[{channel}] {payload}"),
        }
        Ok(())
    });
    let mut status = client.watch_status();
    client.connect(Identity::new(client_id.clone(), client_id, ""));

    status
        .wait_for(|s| matches!(s, Status::Opened | Status::Closed))
        .await?;
    if client.status() != Status::Opened {
        anyhow::bail!("could not connect to {}", settings.client.addr);
    }
    client.send_json(&ClientMessage::Join {
        channels: vec![channel.clone()],
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let msg = ClientMessage::Publish { channel: channel.clone(), payload: line };
                if let Err(e) = client.send_data(Data::qos0(DataType::Json, serde_json::to_vec(&msg)?)) {
                    error!("publish failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.close();
    Ok(())
}
