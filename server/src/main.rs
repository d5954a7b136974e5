use clap::Parser;
use log::{info, warn};
use server::network::GameServer;
use server::simulation::DemoWorld;
use shared::{NetConfig, Session, SyncRates};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the host's own player
    #[arg(short, long, default_value = "Host")]
    name: String,

    /// IP address to bind the host endpoints to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Simulation tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Size of the simulated enemy horde
    #[arg(short, long, default_value = "20")]
    enemies: usize,

    /// Maximum number of remote players
    #[arg(short, long, default_value = "16")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = NetConfig {
        bind_ip: args.bind,
        max_clients: args.max_clients,
        ..NetConfig::default()
    };

    let session = Session::new(config);
    session.start_host(&args.name).await?;

    let world = Arc::new(DemoWorld::new(args.enemies));
    let mut server = GameServer::new(session.clone(), Arc::clone(&world), SyncRates::default());
    server.start()?;

    info!(
        "Hosting '{}' with {} enemies at {} Hz",
        args.name, args.enemies, args.tick_rate
    );

    tokio::select! {
        _ = run_simulation(Arc::clone(&world), args.tick_rate.max(1)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    server.stop().await;
    session.stop();

    Ok(())
}

/// Steps the simulated world at a fixed rate.
async fn run_simulation(world: Arc<DemoWorld>, tick_rate: u32) {
    let mut interval_timer = interval(Duration::from_secs_f32(1.0 / tick_rate as f32));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Cap the maximum delta time to 50ms
    let max_delta_time = 1.0 / 20.0;
    let mut last_update = Instant::now();

    // Skip the first tick since it fires immediately
    interval_timer.tick().await;

    loop {
        interval_timer.tick().await;

        let current_time = Instant::now();
        let mut delta_time = (current_time - last_update).as_secs_f32();
        last_update = current_time;

        if delta_time > max_delta_time {
            warn!(
                "Large delta time detected ({:.3}s), capping to {:.3}s",
                delta_time, max_delta_time
            );
            delta_time = max_delta_time;
        }

        world.step(delta_time);
    }
}
