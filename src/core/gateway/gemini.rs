use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::error::{Error, Result};
use crate::core::gateway::{
    Content, FunctionCallingMode, FunctionDeclaration, GenerateRequest, ModelGateway,
    ModelResponse, Part, Role,
};

#[derive(Serialize)]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystemInstruction<'a>>,
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolSet<'a>>>,
    #[serde(rename = "toolConfig", skip_serializing_if = "Option::is_none")]
    tool_config: Option<WireToolConfig>,
}

#[derive(Serialize)]
struct WireSystemInstruction<'a> {
    parts: Vec<WireTextPart<'a>>,
}

#[derive(Serialize)]
struct WireTextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct WireToolSet<'a> {
    #[serde(rename = "functionDeclarations")]
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Serialize)]
struct WireToolConfig {
    #[serde(rename = "functionCallingConfig")]
    function_calling_config: WireFunctionCallingConfig,
}

#[derive(Serialize)]
struct WireFunctionCallingConfig {
    mode: FunctionCallingMode,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResContent>,
}

#[derive(Deserialize)]
struct GeminiResContent {
    #[serde(default)]
    parts: Vec<Value>,
}

/// `generateContent` client for the Gemini API. Stateless: each call carries
/// the full conversation, and failures surface as `Error::Model` without
/// retry.
pub struct GeminiGateway {
    api_key: String,
    client: Client,
}

impl GeminiGateway {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }
}

/// Gemini requires strictly alternating user/model turns; consecutive
/// same-role entries in the replayed transcript are merged into one turn.
fn merge_consecutive_roles(contents: Vec<Content>) -> Vec<Content> {
    let mut merged: Vec<Content> = Vec::with_capacity(contents.len());
    for content in contents {
        match merged.last_mut() {
            Some(last) if last.role == content.role => {
                last.parts.extend(content.parts);
            }
            _ => merged.push(content),
        }
    }
    merged
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn generate(&self, model_id: &str, request: GenerateRequest) -> Result<ModelResponse> {
        let contents = merge_consecutive_roles(request.contents);

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![WireToolSet {
                function_declarations: &request.tools,
            }])
        };
        let tool_config = match request.calling_mode {
            FunctionCallingMode::Auto => None,
            mode => Some(WireToolConfig {
                function_calling_config: WireFunctionCallingConfig { mode },
            }),
        };

        let body = GeminiRequest {
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|text| WireSystemInstruction {
                    parts: vec![WireTextPart { text }],
                }),
            contents: &contents,
            tools,
            tool_config,
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model_id, self.api_key
        );
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(Error::Model(format!(
                "Gemini API error ({}): {}",
                status, detail
            )));
        }
        let parsed: GeminiResponse = res
            .json()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        let raw_parts = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        // Thought summaries and other unknown part shapes are dropped rather
        // than failing the turn.
        let mut parts = Vec::with_capacity(raw_parts.len());
        for raw in raw_parts {
            match serde_json::from_value::<Part>(raw.clone()) {
                Ok(part) => parts.push(part),
                Err(_) => warn!("skipping unrecognized response part: {}", raw),
            }
        }
        Ok(ModelResponse { parts })
    }
}
