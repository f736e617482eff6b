use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::{Server, ServerMessage};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Board rows
    #[arg(long, default_value = "6")]
    rows: usize,

    /// Board columns
    #[arg(long, default_value = "7")]
    cols: usize,

    /// Seconds of silence before a game or peer is dropped
    #[arg(long, default_value = "600")]
    idle_timeout: u64,

    /// Seconds between idle checks
    #[arg(long, default_value = "5")]
    reap_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        rows: args.rows,
        cols: args.cols,
        idle_timeout: Duration::from_secs(args.idle_timeout),
        reap_interval: Duration::from_secs(args.reap_interval.max(1)),
        ..ServerConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    info!("Four in a line server, {}x{} boards", config.rows, config.cols);

    let mut server = Server::new(&address, config).await?;

    let shutdown = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown.send(ServerMessage::Shutdown);
        }
    });

    server.run().await?;

    Ok(())
}
