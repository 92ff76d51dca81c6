use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::gateway::FunctionDeclaration;

const TOKEN_ENDPOINT: &str = "https://api.amazon.com/auth/o2/token";
const CATALOG_ENDPOINT: &str =
    "https://sellingpartnerapi-na.amazon.com/catalog/2022-04-01/items";
const MARKETPLACE_ID: &str = "ATVPDKIKX0DER";
const MAX_LISTINGS: usize = 5;

pub fn search_products_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "search_products",
        description: "Search for clothing products based on weather conditions",
        parameters: serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "searchQuery": {
                    "type": "STRING",
                    "description": "The search query for clothing products"
                }
            },
            "required": ["searchQuery"]
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductListing {
    pub name: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub link: String,
}

/// Product lookup backing the attire agent's `search_products` tool.
#[async_trait]
pub trait ProductProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<ProductListing>>;
}

#[derive(Clone)]
pub struct SpApiCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    items: Vec<CatalogItem>,
}

#[derive(Deserialize)]
struct CatalogItem {
    asin: String,
    attributes: Option<CatalogAttributes>,
}

#[derive(Deserialize)]
struct CatalogAttributes {
    #[serde(default)]
    title: Vec<AttributeValue>,
    #[serde(default)]
    images: Vec<ImageValue>,
}

#[derive(Deserialize)]
struct AttributeValue {
    value: Option<String>,
}

#[derive(Deserialize)]
struct ImageValue {
    link: Option<String>,
}

/// Amazon SP-API catalog search. Each call exchanges the LWA refresh token
/// for a short-lived access token; a non-200 catalog response degrades to an
/// empty listing set rather than failing the turn.
pub struct AmazonCatalog {
    credentials: SpApiCredentials,
    client: Client,
}

impl AmazonCatalog {
    pub fn new(credentials: SpApiCredentials) -> Self {
        Self {
            credentials,
            client: Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        let response: TokenResponse = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::tool("search_products", e))?
            .json()
            .await
            .map_err(|e| Error::tool("search_products", e))?;
        Ok(response.access_token)
    }
}

#[async_trait]
impl ProductProvider for AmazonCatalog {
    async fn search(&self, query: &str) -> Result<Vec<ProductListing>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(CATALOG_ENDPOINT)
            .query(&[
                ("keywords", query),
                ("marketplaceIds", MARKETPLACE_ID),
                ("pageSize", "10"),
            ])
            .bearer_auth(&token)
            .header("x-amz-access-token", &token)
            .send()
            .await
            .map_err(|e| Error::tool("search_products", e))?;

        if response.status() != reqwest::StatusCode::OK {
            return Ok(Vec::new());
        }

        let data: CatalogResponse = response
            .json()
            .await
            .map_err(|e| Error::tool("search_products", e))?;

        Ok(data
            .items
            .into_iter()
            .take(MAX_LISTINGS)
            .map(|item| ProductListing {
                name: item
                    .attributes
                    .as_ref()
                    .and_then(|a| a.title.first())
                    .and_then(|t| t.value.clone())
                    .unwrap_or_else(|| "Unknown Product".to_string()),
                image_url: item
                    .attributes
                    .as_ref()
                    .and_then(|a| a.images.first())
                    .and_then(|i| i.link.clone())
                    .unwrap_or_default(),
                link: format!("https://www.amazon.com/dp/{}", item.asin),
            })
            .collect())
    }
}

/// Stands in when SP-API credentials are not configured; recommendations
/// still work, listings stay empty.
pub struct DisabledCatalog;

#[async_trait]
impl ProductProvider for DisabledCatalog {
    async fn search(&self, _query: &str) -> Result<Vec<ProductListing>> {
        Ok(Vec::new())
    }
}
