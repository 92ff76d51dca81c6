use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::tools::products::SpApiCredentials;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE: &str = "wearcast.db";
const DEFAULT_ORIGIN: &str = "http://localhost:5173";

/// Startup configuration, read from the environment once. Product search is
/// the only optional integration; everything else is required to boot.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub gcp_api_key: String,
    pub brave_api_key: String,
    pub sp_api: Option<SpApiCredentials>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT is not a number")?,
            Err(_) => DEFAULT_PORT,
        };
        let database_path = env::var("DATABASE_PATH")
            .unwrap_or_else(|_| DEFAULT_DATABASE.to_string())
            .into();
        let gcp_api_key = env::var("GCP_API_KEY").context("GCP_API_KEY is not set")?;
        let brave_api_key = env::var("BRAVE_API_KEY").context("BRAVE_API_KEY is not set")?;

        let sp_api = match (
            env::var("SP_API_ID"),
            env::var("SP_API_SECRET"),
            env::var("SP_API_REFRESH"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(refresh_token)) => Some(SpApiCredentials {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => None,
        };

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ORIGIN.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            port,
            database_path,
            gcp_api_key,
            brave_api_key,
            sp_api,
            allowed_origins,
        })
    }
}
