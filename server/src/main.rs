use clap::Parser;
use log::error;
use server::arena::ArenaSet;
use server::network::Server;
use std::path::PathBuf;

/// Authoritative UDP server for the tank arena game.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "5555")]
    port: u16,
    /// Directory containing arena map files
    #[clap(short, long, default_value = "arenas")]
    arenas: PathBuf,
    /// Network tick rate (snapshots per second)
    #[clap(long, default_value = "20")]
    network_rate: u32,
    /// Physics tick rate (simulation steps per second)
    #[clap(long, default_value = "60")]
    physics_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let arenas = match ArenaSet::load_dir(&args.arenas) {
        Ok(arenas) => arenas,
        Err(e) => {
            error!("failed to load arenas from {}: {}", args.arenas.display(), e);
            return Err(e.into());
        }
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, arenas, args.network_rate, args.physics_rate).await?;
    server.run().await
}
