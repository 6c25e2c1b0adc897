mod app;
mod config;
mod input;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use strider::net::{Listener, SessionError, connect};
use strider::{ServerConfig, host};

use app::{App, AppState};
use config::ClientConfig;

#[derive(Parser)]
#[command(name = "strider-client")]
#[command(about = "Headless strider client driven by stdin")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    #[arg(short, long, default_value_t = strider::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "unnamed")]
    name: String,

    #[arg(long, help = "Host a server in this process and connect to it")]
    local: bool,

    #[arg(long, help = "Send load right after joining")]
    load: bool,

    #[arg(long, help = "Send ready once a world is loaded")]
    ready: bool,

    #[arg(long, help = "Send start once attached")]
    start: bool,

    #[arg(long, help = "Map JSON file to load instead of the built-in map")]
    map: Option<PathBuf>,

    #[arg(long, default_value_t = 60)]
    frame_rate: u32,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self {
            address: args.address,
            port: args.port,
            name: args.name,
            local: args.local,
            auto_load: args.load,
            auto_ready: args.ready,
            auto_start: args.start,
            map: args.map,
            frame_rate: args.frame_rate.max(1),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = ClientConfig::from(Args::parse());

    let map = match &config.map {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading map {}", path.display()))?,
        None => String::new(),
    };

    if config.local {
        let listener = Listener::bind(&config.server_addr()).await?;
        let addr = listener.local_addr()?;
        log::info!("Hosting local server on {addr}");
        config.address = addr.ip().to_string();
        config.port = addr.port();
        tokio::spawn(async move {
            if let Err(e) = host::run(listener, ServerConfig::default(), std::future::pending()).await {
                log::error!("Local server stopped: {e}");
            }
        });
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let session = match connect(&config.server_addr(), 0, events_tx).await {
        Ok(session) => session,
        Err(SessionError::ConnectionRefused(addr)) => {
            log::error!("No server is listening on {addr}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let frame = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate));
    let mut app = App::new(config, session, map);
    app.join()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(frame);

    while app.state() == AppState::Playing {
        tokio::select! {
            Some(event) = events_rx.recv() => app.handle_session_event(event)?,
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => app.handle_line(&line)?,
                None => stdin_open = false,
            },
            _ = ticker.tick() => app.frame(frame.as_secs_f32()),
        }
    }

    log::info!("Client exiting");
    Ok(())
}
