use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use server::passage::PassageSource;
use std::path::PathBuf;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then starts the matchmaking registry and the WebSocket listener.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Passage file, or a directory of .txt passages
        #[clap(long, default_value = "game_text.txt")]
        passage: PathBuf,
        /// Milliseconds between matchmaking sweeps
        #[clap(long, default_value = "100")]
        sweep_interval_ms: u64,
        /// Seconds between game_start and the advertised start time
        #[clap(long, default_value = "3")]
        start_delay_secs: u64,
        /// Milliseconds racers from an aborted match wait before rejoining the pool
        #[clap(long, default_value = "1000")]
        abort_backoff_ms: u64,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = Args::parse();

    let config = ServerConfig::new()
        .with_bind_addr(format!("{}:{}", args.host, args.port))
        .with_sweep_interval(Duration::from_millis(args.sweep_interval_ms))
        .with_start_delay(Duration::from_secs(args.start_delay_secs))
        .with_passages(PassageSource::from_path(args.passage))
        .with_abort_backoff(Duration::from_millis(args.abort_backoff_ms));

    let server = Server::bind(config).await?;
    let registry = server.registry();

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = registry.shutdown();

    Ok(())
}
