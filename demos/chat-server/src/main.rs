//! Runnable chat server.
//!
//! ```text
//! cargo run -p chat-server -- --bind 0.0.0.0:3333 --secret s3cret
//! nc localhost 3333
//! 1 alice
//! 2 alice s3cret
//! 0 hello everyone
//! ```

use std::path::PathBuf;

use chatline::prelude::*;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON config file; flags below override its values
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on
    #[clap(short, long)]
    bind: Option<String>,
    /// Password clients must send in AUTH_ATTEMPT
    #[clap(short, long)]
    secret: Option<String>,
    /// Don't send chat lines back to their author
    #[clap(long)]
    no_echo: bool,
    /// Accept WebSocket clients instead of raw TCP
    #[cfg(feature = "websocket")]
    #[clap(long)]
    websocket: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(secret) = args.secret {
        config.shared_secret = secret;
    }
    if args.no_echo {
        config.echo_to_sender = false;
    }
    tracing::debug!(?config, "configuration loaded");

    let builder = ChatServerBuilder::new().config(config);

    #[cfg(feature = "websocket")]
    if args.websocket {
        let server = builder.build_websocket().await?;
        tracing::info!(addr = %server.local_addr()?, "listening for websocket clients");
        stop_on_ctrl_c(server.handle());
        return Ok(server.run().await?);
    }

    let server = builder.build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening for tcp clients");
    stop_on_ctrl_c(server.handle());
    server.run().await?;
    Ok(())
}

fn stop_on_ctrl_c<C: Connection>(handle: ServerHandle<C>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.close();
        }
    });
}
