mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::gateway::{GeminiGateway, ModelGateway};
use crate::core::storage::Storage;
use crate::core::tools::Toolbox;
use crate::core::tools::products::{AmazonCatalog, DisabledCatalog, ProductProvider};
use crate::core::tools::search::BraveSearch;
use crate::core::tools::timezone::{GoogleTimezone, TimezoneLookup};
use crate::core::tools::weather::OpenMeteoProvider;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) storage: Storage,
    pub(crate) gateway: Arc<dyn ModelGateway>,
    pub(crate) toolbox: Toolbox,
}

pub async fn serve(config: Config) -> Result<()> {
    let storage = Storage::open(&config.database_path)?;
    let gateway: Arc<dyn ModelGateway> = Arc::new(GeminiGateway::new(config.gcp_api_key.clone()));
    let timezone: Arc<dyn TimezoneLookup> = Arc::new(GoogleTimezone::new(config.gcp_api_key));

    let products: Arc<dyn ProductProvider> = match config.sp_api {
        Some(credentials) => Arc::new(AmazonCatalog::new(credentials)),
        None => {
            warn!("SP-API credentials not configured, product listings disabled");
            Arc::new(DisabledCatalog)
        }
    };
    let toolbox = Toolbox {
        search: Arc::new(BraveSearch::new(config.brave_api_key)),
        weather: Arc::new(OpenMeteoProvider::new(timezone)),
        products,
    };

    let state = AppState {
        storage,
        gateway,
        toolbox,
    };
    let app = router::build_router(state, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
