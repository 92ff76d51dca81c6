use std::sync::Arc;

use crate::core::agents::{IMAGE_PROMPT, MODEL};
use crate::core::error::Result;
use crate::core::gateway::{Content, GenerateRequest, InlineData, ModelGateway, Part, Role};
use crate::core::memory::Memory;

const FALLBACK: &str = "Unable to analyze the image.";

/// One-shot image-to-location-description call. The description is appended
/// as a user-role message so the resolution loop treats it like a typed
/// prompt.
pub struct ImageAnalysisAgent {
    gateway: Arc<dyn ModelGateway>,
}

impl ImageAnalysisAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn run(&self, memory: &mut Memory, image_base64: String) -> Result<String> {
        // The instruction rides as a leading model turn rather than a system
        // instruction; the image is the only user content.
        let contents = vec![
            Content::new(Role::Model, vec![Part::text(IMAGE_PROMPT)]),
            Content::new(
                Role::User,
                vec![Part::InlineData {
                    inline_data: InlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: image_base64,
                    },
                }],
            ),
        ];

        let response = self.gateway.generate(MODEL, GenerateRequest::new(None, contents)).await?;

        match response.parts.into_iter().next() {
            Some(part) => {
                let description = part.as_text().unwrap_or(FALLBACK).to_string();
                memory.record(Role::User, part).await?;
                Ok(description)
            }
            None => Ok(FALLBACK.to_string()),
        }
    }
}
