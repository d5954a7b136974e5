use clap::Parser;
use client::console::ConsoleWorld;
use client::network::GameClient;
use log::{error, info};
use shared::{NetConfig, Session, SyncRates};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::{interval, Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Player name announced to the host
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Host address to join; discovered on the LAN when omitted
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,

    /// Seconds between mirror reports
    #[arg(short, long, default_value = "2")]
    report_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let session = Session::new(NetConfig::default());

    let host = match args.host {
        Some(host) => host,
        None => {
            info!("Searching for hosts...");
            match session.discover().await.first() {
                Some(host) => *host,
                None => {
                    error!("No host found on the local network");
                    return Ok(());
                }
            }
        }
    };

    session.connect_to_host(host, &args.name).await?;

    let world = Arc::new(ConsoleWorld::new());
    let mut client = GameClient::new(session.clone(), Arc::clone(&world), SyncRates::default());
    client.start()?;

    let mut report = interval(Duration::from_secs(args.report_interval.max(1)));
    loop {
        tokio::select! {
            _ = report.tick() => {
                if !session.is_connected() {
                    info!("Connection to host closed");
                    break;
                }
                info!(
                    "Client {:?}: {} remote players, {} enemies, health {}",
                    session.client_id(),
                    client.remote_player_count(),
                    world.enemy_count(),
                    world.health()
                );
                if let Some(run) = client.run_state() {
                    info!(
                        "Run: time={:.1}s difficulty={} boss={} over={}",
                        run.game_time, run.difficulty_level, run.boss_spawned, run.game_over
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    client.stop().await;
    session.disconnect();

    Ok(())
}
