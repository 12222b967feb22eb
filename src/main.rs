use std::sync::Arc;

use scrabble_duel::{config::Config, referee::Referee, store::PgStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    store.migrate().await?;

    info!(
        "referee checking clocks every {:?}, looking for new games every {:?}",
        config.clock_tick, config.sweep_interval
    );

    Referee::from_config(Arc::new(store), &config).run().await;

    Ok(())
}
