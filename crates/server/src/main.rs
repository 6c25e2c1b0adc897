use anyhow::Result;
use clap::Parser;

use strider::host;
use strider::{ServerConfig, WorldConfig};

#[derive(Parser)]
#[command(name = "strider-server")]
#[command(about = "Authoritative strider game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = strider::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = strider::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 4, help = "Physics substeps per tick")]
    substeps: u32,

    #[arg(long, help = "Seed for spawn point selection")]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        seed: args.seed,
        world: WorldConfig {
            substeps: args.substeps,
            ..Default::default()
        },
    };

    host::serve(&bind_addr, config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {e}");
        }
    })
    .await?;

    log::info!("Server shut down");
    Ok(())
}
