use clap::Parser;
use client::config::ClientConfig;
use client::network::{Client, RemoteClient, RemoteGame, RunExit};
use client::view::TextView;
use log::{info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Game to join, watch or create
    #[arg(short = 'g', long)]
    game: Option<String>,

    /// Player name, random when omitted
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Create the game before joining it
    #[arg(short = 'c', long)]
    create: bool,

    /// List running games and exit
    #[arg(short = 'l', long)]
    list: bool,

    /// Follow the game without taking a seat
    #[arg(short = 'w', long)]
    watch: bool,

    /// Milliseconds between board polls
    #[arg(long, default_value = "500")]
    poll_ms: u64,

    /// Milliseconds between drop animation frames
    #[arg(long, default_value = "30")]
    frame_ms: u64,

    /// Milliseconds to wait for a reply
    #[arg(long, default_value = "1000")]
    request_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        server_addr: args.server.clone(),
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
        frame_delay: Duration::from_millis(args.frame_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms.max(1)),
    };

    info!("Connecting to: {}", config.server_addr);
    let (remote, pushes) = RemoteClient::connect(&config.server_addr, config.request_timeout).await?;

    if args.list {
        let names = remote.list_games().await?;
        if names.is_empty() {
            println!("no games running");
        }
        for name in names {
            println!("{}", name);
        }
        return Ok(());
    }

    let Some(game_name) = args.game else {
        return Err("--game is required unless --list is given".into());
    };

    if args.create {
        remote.create_game(&game_name).await?;
        info!("Created game {}", game_name);
    }

    let remote = Arc::new(remote);
    let game = RemoteGame::new(remote.clone(), game_name);
    let view = TextView::new(std::io::stdout());

    let mut client = if args.watch {
        Client::watch(game, pushes, view, &config).await?
    } else {
        let name = args
            .name
            .unwrap_or_else(|| format!("player-{:04}", rand::thread_rng().gen_range(0..10000)));
        Client::join(game, pushes, &name, view, &config).await?
    };

    let exit = client.run(BufReader::new(tokio::io::stdin())).await;

    if let Err(e) = remote.disconnect().await {
        warn!("Failed to send disconnect: {}", e);
    }

    match exit {
        Ok(RunExit::GameFinished) => info!("Game finished"),
        Ok(RunExit::Quit) | Ok(RunExit::InputClosed) => info!("Left the game"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
