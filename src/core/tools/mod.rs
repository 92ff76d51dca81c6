pub mod history;
pub mod products;
pub mod search;
pub mod timezone;
pub mod weather;

use std::sync::Arc;

use crate::core::tools::products::ProductProvider;
use crate::core::tools::search::SearchProvider;
use crate::core::tools::weather::WeatherProvider;

/// The side-effecting capabilities agents reach for, behind trait objects so
/// tests can swap in scripted fakes.
#[derive(Clone)]
pub struct Toolbox {
    pub search: Arc<dyn SearchProvider>,
    pub weather: Arc<dyn WeatherProvider>,
    pub products: Arc<dyn ProductProvider>,
}
