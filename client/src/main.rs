use clap::Parser;
use client::network::{Client, ClientConfig, RoundSummary};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Display name shown to opponents
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Typing speed in words per minute
    #[arg(short = 'w', long, default_value = "60")]
    wpm: f64,

    /// Random speed variation per tick (0.0 - 1.0)
    #[arg(short = 'j', long, default_value = "0.2")]
    jitter: f64,

    /// Rounds to play before exiting (0 = forever)
    #[arg(short = 'r', long, default_value = "1")]
    rounds: usize,
}

#[tokio::main]
async fn main() -> Result<(), client::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting racing bot...");
    info!("Server: {}", args.server);
    info!("Target speed: {} wpm", args.wpm);

    let client = Client::new(ClientConfig {
        server_url: args.server,
        name: args.name,
        target_wpm: args.wpm,
        jitter: args.jitter,
        rounds: args.rounds,
    });

    let rounds = client.run().await?;

    let wins = rounds
        .iter()
        .filter(|round| matches!(round, RoundSummary::Won { .. }))
        .count();
    info!("Finished: {} of {} round(s) won", wins, rounds.len());

    Ok(())
}
