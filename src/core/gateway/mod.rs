mod gemini;

pub use gemini::GeminiGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::Result;

/// Author of a conversation turn. Matches the wire roles of the generative
/// backend, and the CHECK constraint on the messages table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One content part, both the wire shape sent to / received from the backend
/// and the persisted message payload. Closed variant type: replaying the
/// transcript into the gateway must reconstruct exactly one of these shapes
/// per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Part::FunctionCall {
            function_call: FunctionCall {
                name: name.into(),
                args,
            },
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Part::FunctionResponse {
            function_response: FunctionResponse {
                name: name.into(),
                response,
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Part::FunctionCall { function_call } => Some(function_call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }
}

/// Schema of a tool the model may invoke instead of answering in text.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FunctionCallingMode {
    Auto,
    None,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub tools: Vec<FunctionDeclaration>,
    pub calling_mode: FunctionCallingMode,
}

impl GenerateRequest {
    pub fn new(system_instruction: Option<String>, contents: Vec<Content>) -> Self {
        Self {
            system_instruction,
            contents,
            tools: Vec::new(),
            calling_mode: FunctionCallingMode::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_calling_mode(mut self, mode: FunctionCallingMode) -> Self {
        self.calling_mode = mode;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub parts: Vec<Part>,
}

impl ModelResponse {
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| p.as_text())
    }

    pub fn first_function_call(&self) -> Option<&FunctionCall> {
        self.parts.iter().find_map(|p| p.as_function_call())
    }
}

/// Capability-typed interface to the generative backend. Stateless between
/// calls: all context is passed explicitly every call. Injected into each
/// agent so tests can substitute a scripted fake.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, model_id: &str, request: GenerateRequest) -> Result<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_part_serializes_to_bare_text_object() {
        let part = Part::text("hello");
        assert_eq!(serde_json::to_value(&part).unwrap(), json!({"text": "hello"}));
    }

    #[test]
    fn function_call_part_uses_camel_case_key() {
        let part = Part::function_call("get_weather", json!({"latitude": 48.85}));
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["functionCall"]["name"], "get_weather");
        assert_eq!(value["functionCall"]["args"]["latitude"], 48.85);
    }

    #[test]
    fn function_response_part_roundtrips() {
        let part = Part::function_response("web_search", json!({"text": "results"}));
        let encoded = serde_json::to_string(&part).unwrap();
        let decoded: Part = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, part);
    }

    #[test]
    fn inline_data_part_uses_mime_type_key() {
        let part = Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg".into(),
                data: "aGk=".into(),
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["inlineData"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn persisted_part_decodes_back_to_same_variant() {
        let stored = r#"{"functionResponse":{"name":"router","response":{"result":"direct_weather"}}}"#;
        let part: Part = serde_json::from_str(stored).unwrap();
        match part {
            Part::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "router");
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("user"));
        assert_eq!(serde_json::to_value(Role::Model).unwrap(), json!("model"));
    }

    #[test]
    fn calling_mode_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(FunctionCallingMode::None).unwrap(),
            json!("NONE")
        );
    }

    #[test]
    fn model_response_accessors_find_first_matching_part() {
        let response = ModelResponse {
            parts: vec![
                Part::text("thinking"),
                Part::function_call("web_search", json!({"searchString": "paris"})),
            ],
        };
        assert_eq!(response.first_text(), Some("thinking"));
        assert_eq!(response.first_function_call().unwrap().name, "web_search");
    }
}
