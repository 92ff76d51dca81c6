use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::{Error, Result};

const BASE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/timezone/json";

/// Resolves a coordinate to its current UTC offset so date windows can be
/// computed in the location's local time.
#[async_trait]
pub trait TimezoneLookup: Send + Sync {
    async fn utc_offset_seconds(&self, latitude: f64, longitude: f64) -> Result<i32>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimezoneResponse {
    #[serde(default)]
    dst_offset: i32,
    #[serde(default)]
    raw_offset: i32,
    status: String,
}

pub struct GoogleTimezone {
    api_key: String,
    client: Client,
}

impl GoogleTimezone {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl TimezoneLookup for GoogleTimezone {
    async fn utc_offset_seconds(&self, latitude: f64, longitude: f64) -> Result<i32> {
        let url = format!(
            "{}?key={}&location={}%2C{}&timestamp={}",
            BASE_ENDPOINT,
            self.api_key,
            latitude,
            longitude,
            Utc::now().timestamp()
        );
        let response: TimezoneResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::tool("get_weather", e))?
            .json()
            .await
            .map_err(|e| Error::tool("get_weather", e))?;
        if response.status != "OK" {
            return Err(Error::tool(
                "get_weather",
                format!("timezone lookup failed: {}", response.status),
            ));
        }
        // Offset from UTC right now, DST included.
        Ok(response.raw_offset + response.dst_offset)
    }
}
