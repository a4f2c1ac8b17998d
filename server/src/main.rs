use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use shared::{Location, DEFAULT_LOCATION, MAXIMUM_INTERACTION_DISTANCE};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "43594")]
    port: u16,
    /// Length of one world tick in milliseconds
    #[clap(short, long, default_value = "600")]
    tick_ms: u64,
    /// Maximum number of players online at once
    #[clap(short, long, default_value = "2000")]
    max_players: usize,
    /// Minutes without input before a player is logged out
    #[clap(short, long, default_value = "5")]
    idle_minutes: u64,
    /// Distance within which entities are considered local
    #[clap(short = 'd', long, default_value_t = MAXIMUM_INTERACTION_DISTANCE)]
    interaction_distance: f32,
    /// Number of wandering NPCs spawned around the spawn point
    #[clap(short, long, default_value = "4")]
    npcs: u32,
}

/// Main-method of the application.
/// Parses command-line arguments, builds the world and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        tick_duration: Duration::from_millis(args.tick_ms.max(1)),
        max_players: args.max_players,
        idle_disconnect_minutes: args.idle_minutes,
        interaction_distance: args.interaction_distance,
        spawn_location: DEFAULT_LOCATION,
    };

    info!(
        "Starting server: tick {:?}, {} max players, idle logout after {} minutes",
        config.tick_duration, config.max_players, config.idle_disconnect_minutes
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    for i in 0..args.npcs {
        let offset = (i as i32 % 4 - 2) * 3;
        let location = Location::new(DEFAULT_LOCATION.x + offset, DEFAULT_LOCATION.z - offset);
        server.world_mut().spawn_npc("Chicken", location, 3);
    }

    server.run().await?;

    Ok(())
}
