mod config;
mod core;
mod interfaces;
mod logging;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let config = config::Config::from_env()?;
    interfaces::web::serve(config).await
}
