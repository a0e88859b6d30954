use clap::Parser;
use potluck::{PotluckServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        listen = %config.listen,
        capacity = config.capacity,
        rounds = config.rounds,
        max_coins = config.max_coins,
        "starting potluck server"
    );

    let server = PotluckServer::builder()
        .bind(&config.listen)
        .room_config(config.room_config())
        .build()
        .await?;

    server.run().await?;
    Ok(())
}
