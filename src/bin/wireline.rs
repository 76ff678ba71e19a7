use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use wireline::{
    setup_local_tracing, AppError, AppResult, MessageDispatcher, NetConfig, RawMessage, SocketHost,
};

/// Demo protocol tags.
const ECHO: i32 = 1;
/// Reserved for a liveness probe; nothing enforces it yet.
#[allow(dead_code)]
const HEARTBEAT: i32 = 2;

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser)]
pub enum Command {
    /// run the echo server
    Serve,
    /// connect, send one message and print the echo
    Send {
        /// server address, defaults to localhost on the configured port
        #[arg(short, long)]
        addr: Option<String>,
        text: String,
    },
    /// print the effective config and exit
    PrintConfig,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    setup_local_tracing()?;

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("conf.toml"), PathBuf::from);
    let config = if config_path.exists() {
        NetConfig::from_file(config_path)?
    } else {
        NetConfig::default()
    };

    match commandline.command {
        Command::Serve => serve(config).await,
        Command::Send { addr, text } => {
            let addr = addr.unwrap_or_else(|| format!("127.0.0.1:{}", config.port));
            send(config, &addr, text).await
        }
        Command::PrintConfig => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

async fn serve(config: NetConfig) -> AppResult<()> {
    let dispatcher = MessageDispatcher::<RawMessage>::new()
        .on_connect(|session| {
            info!(
                "session {} connected from {:?}",
                session.session_id(),
                session.peer_addr()
            );
        })
        .on(ECHO, |session, msg| {
            if let Err(e) = session.send_msg(&msg) {
                error!("echo reply failed: {}", e);
            }
        })
        .on_disconnect(|session_id| {
            info!("session {} disconnected", session_id);
        });

    let host = SocketHost::new(config, Arc::new(dispatcher));
    host.start_as_server().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    host.close();
    host.close_all_sessions();
    Ok(())
}

async fn send(config: NetConfig, addr: &str, text: String) -> AppResult<()> {
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::channel(8);
    let dispatcher = MessageDispatcher::<RawMessage>::new().on(ECHO, move |_, msg| {
        let _ = reply_tx.try_send(msg);
    });

    let host = SocketHost::new(config, Arc::new(dispatcher));
    let session = host.start_as_client(addr).await?;
    session.send_msg(&RawMessage::new(ECHO, text.into_bytes()))?;

    match tokio::time::timeout(Duration::from_secs(5), reply_rx.recv()).await {
        Ok(Some(reply)) => {
            println!("{}", String::from_utf8_lossy(&reply.payload));
            session.close();
            Ok(())
        }
        _ => Err(AppError::IllegalState("no echo reply received".to_string())),
    }
}
