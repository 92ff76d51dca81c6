use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::gateway::FunctionDeclaration;

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_RESULTS: usize = 3;

pub fn web_search_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "web_search",
        description: "Searches internet for more context",
        parameters: serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "searchString": {
                    "type": "STRING",
                    "description": "The search string to the search engine"
                }
            },
            "required": ["searchString"]
        }),
    }
}

/// Web search used by the Weather/Location agent to ground location riddles.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns a JSON-encoded list of result objects for model consumption.
    async fn search(&self, query: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<Value>,
}

pub struct BraveSearch {
    api_key: String,
    client: Client,
}

impl BraveSearch {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let response: BraveResponse = self
            .client
            .get(ENDPOINT)
            .query(&[("q", query)])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::tool("web_search", e))?
            .json()
            .await
            .map_err(|e| Error::tool("web_search", e))?;

        let mut results = response.web.map(|w| w.results).unwrap_or_default();
        results.truncate(MAX_RESULTS);
        serde_json::to_string(&results).map_err(|e| Error::tool("web_search", e))
    }
}
