#![cfg(not(tarpaulin_include))]

use log::error;
use port_inventory::app;
use port_inventory::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    app::run(config).await?;

    Ok(())
}
