use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::core::agents::{MODEL, ROUTER_PROMPT, system_instruction};
use crate::core::error::Result;
use crate::core::gateway::{FunctionCallingMode, GenerateRequest, ModelGateway, Part, Role};
use crate::core::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    DirectWeather,
    LocationDescription,
}

/// Classifies the latest turn into one of the two workflow routes. The
/// classification is recorded as an internal function call/response pair so
/// downstream agents see it, but the router itself never re-reads old
/// classifications.
pub struct RouterAgent {
    gateway: Arc<dyn ModelGateway>,
}

impl RouterAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn run(&self, memory: &mut Memory) -> Result<Route> {
        let request = GenerateRequest::new(
            Some(system_instruction(ROUTER_PROMPT)),
            memory.contents_excluding_router(),
        )
        .with_calling_mode(FunctionCallingMode::None);

        let response = self.gateway.generate(MODEL, request).await?;
        let classification = response
            .first_text()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default();
        info!(%classification, "router classified prompt");

        memory
            .record(
                Role::Model,
                Part::function_call("router", json!({ "classification": classification })),
            )
            .await?;
        memory
            .record(
                Role::User,
                Part::function_response("router", json!({ "result": classification })),
            )
            .await?;

        // Anything unrecognized is treated as a location description so the
        // user gets a clarifying question instead of a dead end.
        Ok(match classification.as_str() {
            "direct_weather" => Route::DirectWeather,
            _ => Route::LocationDescription,
        })
    }
}
