use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::core::agents::{ATTIRE_PROMPT, MODEL, system_instruction};
use crate::core::error::Result;
use crate::core::gateway::{GenerateRequest, ModelGateway, Part, Role};
use crate::core::memory::Memory;
use crate::core::tools::Toolbox;
use crate::core::tools::products::{ProductListing, search_products_declaration};

#[derive(Debug, Default)]
pub struct AttireOutcome {
    pub recommendation: String,
    pub listings: Vec<ProductListing>,
}

#[derive(Deserialize)]
struct ProductArgs {
    #[serde(rename = "searchQuery")]
    search_query: String,
}

/// Turns the gathered weather into a clothing recommendation in a single
/// round-trip. Product lookups are best-effort; a failed search keeps the
/// recommendation and drops the listings.
pub struct AttireAgent {
    gateway: Arc<dyn ModelGateway>,
    toolbox: Toolbox,
}

impl AttireAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>, toolbox: Toolbox) -> Self {
        Self { gateway, toolbox }
    }

    pub async fn run(&self, memory: &mut Memory) -> Result<AttireOutcome> {
        let request =
            GenerateRequest::new(Some(system_instruction(ATTIRE_PROMPT)), memory.contents())
                .with_tools(vec![search_products_declaration()]);
        let response = self.gateway.generate(MODEL, request).await?;

        let mut outcome = AttireOutcome::default();
        let mut texts: Vec<String> = Vec::new();

        for part in response.parts {
            match part {
                Part::Text { text } => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        texts.push(trimmed.to_string());
                    }
                }
                Part::FunctionCall { function_call } => {
                    memory
                        .record(
                            Role::Model,
                            Part::function_call(
                                function_call.name.clone(),
                                function_call.args.clone(),
                            ),
                        )
                        .await?;
                    if function_call.name != "search_products" {
                        warn!(tool = %function_call.name, "attire agent requested unknown tool");
                        continue;
                    }
                    let args: std::result::Result<ProductArgs, _> =
                        serde_json::from_value(function_call.args);
                    let Ok(args) = args else {
                        warn!("malformed search_products arguments");
                        continue;
                    };
                    match self.toolbox.products.search(&args.search_query).await {
                        Ok(listings) => {
                            memory
                                .record(
                                    Role::User,
                                    Part::function_response(
                                        function_call.name,
                                        json!({ "listings": &listings }),
                                    ),
                                )
                                .await?;
                            outcome.listings = listings;
                        }
                        Err(e) => warn!(error = %e, "product search failed"),
                    }
                }
                _ => {}
            }
        }

        outcome.recommendation = texts.join("\n\n");
        Ok(outcome)
    }
}
