use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::agents::{MODEL, WEATHER_PROMPT, system_instruction};
use crate::core::error::{Error, Result};
use crate::core::gateway::{
    FunctionCall, FunctionDeclaration, GenerateRequest, ModelGateway, Part, Role,
};
use crate::core::memory::Memory;
use crate::core::tools::Toolbox;
use crate::core::tools::history::get_history_declaration;
use crate::core::tools::search::web_search_declaration;
use crate::core::tools::weather::{
    WeatherData, WeatherRequest, get_weather_declaration, weather_parameters_schema,
};

/// Tool turns allowed before the agent gives up and asks the user to
/// rephrase.
const MAX_TOOL_TURNS: usize = 6;

const CAP_QUESTION: &str =
    "I went around in circles trying to pin that one down. Could you rephrase where you're headed?";

/// Terminal outcome of the location/weather resolution loop.
#[derive(Debug)]
pub enum LocationOutcome {
    /// The agent needs more from the user; the turn pauses here.
    Followup { question: String },
    /// Location confirmed with a human-readable message, weather attached.
    Confirmed {
        message: String,
        weather: WeatherData,
    },
    /// Weather fetched directly, no confirmation message.
    Weather(WeatherData),
}

#[derive(Deserialize)]
struct ConfirmArgs {
    message: String,
    #[serde(flatten)]
    request: WeatherRequest,
}

#[derive(Deserialize)]
struct ClarificationArgs {
    question: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(rename = "searchString")]
    search_string: String,
}

#[derive(Deserialize)]
struct HistoryArgs {
    last: f64,
}

/// Resolves a described location to coordinates and weather through a
/// bounded tool loop. Intermediate tools (`web_search`, `get_history`) feed
/// results back into the transcript and iterate; the other three tools
/// terminate the loop.
pub struct WeatherAgent {
    gateway: Arc<dyn ModelGateway>,
    toolbox: Toolbox,
}

impl WeatherAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>, toolbox: Toolbox) -> Self {
        Self { gateway, toolbox }
    }

    pub async fn run(&self, memory: &mut Memory) -> Result<LocationOutcome> {
        for turn in 0..MAX_TOOL_TURNS {
            let request =
                GenerateRequest::new(Some(system_instruction(WEATHER_PROMPT)), memory.contents())
                    .with_tools(Self::tools());
            let response = self.gateway.generate(MODEL, request).await?;

            let text = response.first_text().map(str::to_string);
            if let Some(text) = &text {
                memory.record(Role::Model, Part::text(text.clone())).await?;
            }

            let Some(call) = response.first_function_call().cloned() else {
                // Plain text with no tool call reads as an implicit
                // clarification question.
                if let Some(question) = text {
                    return Ok(LocationOutcome::Followup { question });
                }
                warn!(turn, "empty response from location resolution, retrying");
                continue;
            };

            memory
                .record(
                    Role::Model,
                    Part::function_call(call.name.clone(), call.args.clone()),
                )
                .await?;
            info!(tool = %call.name, turn, "location agent invoked tool");

            match call.name.as_str() {
                "web_search" => {
                    let args: SearchArgs = parse_args(&call)?;
                    let results = self.toolbox.search.search(&args.search_string).await?;
                    memory
                        .record(
                            Role::User,
                            Part::function_response(call.name, json!({ "text": results })),
                        )
                        .await?;
                }
                "get_history" => {
                    let args: HistoryArgs = parse_args(&call)?;
                    let history = memory.history(args.last.max(0.0) as usize).await?;
                    memory
                        .record(
                            Role::User,
                            Part::function_response(call.name, json!({ "history": history })),
                        )
                        .await?;
                }
                "ask_clarification" => {
                    let args: ClarificationArgs = parse_args(&call)?;
                    memory
                        .record(
                            Role::User,
                            Part::function_response(
                                call.name,
                                json!({ "question": args.question }),
                            ),
                        )
                        .await?;
                    return Ok(LocationOutcome::Followup {
                        question: args.question,
                    });
                }
                "confirm_location" => {
                    let args: ConfirmArgs = parse_args(&call)?;
                    let weather = self.toolbox.weather.forecast(&args.request).await?;
                    memory
                        .record(
                            Role::User,
                            Part::function_response(call.name, serde_json::to_value(&weather)?),
                        )
                        .await?;
                    return Ok(LocationOutcome::Confirmed {
                        message: args.message,
                        weather,
                    });
                }
                "get_weather" => {
                    let request: WeatherRequest = parse_args(&call)?;
                    let weather = self.toolbox.weather.forecast(&request).await?;
                    memory
                        .record(
                            Role::User,
                            Part::function_response(call.name, serde_json::to_value(&weather)?),
                        )
                        .await?;
                    return Ok(LocationOutcome::Weather(weather));
                }
                other => {
                    warn!(tool = %other, "unknown tool requested");
                    memory
                        .record(
                            Role::User,
                            Part::function_response(
                                call.name.clone(),
                                json!({ "error": format!("unknown tool `{}`", other) }),
                            ),
                        )
                        .await?;
                }
            }
        }

        info!("tool turn limit reached, asking user to rephrase");
        Ok(LocationOutcome::Followup {
            question: CAP_QUESTION.to_string(),
        })
    }

    fn tools() -> Vec<FunctionDeclaration> {
        vec![
            web_search_declaration(),
            ask_clarification_declaration(),
            confirm_location_declaration(),
            get_weather_declaration(),
            get_history_declaration(),
        ]
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(call: &FunctionCall) -> Result<T> {
    serde_json::from_value(call.args.clone())
        .map_err(|e| Error::tool(&call.name, format!("malformed arguments: {}", e)))
}

fn ask_clarification_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "ask_clarification",
        description: "Ask for clearer description when you cannot determine location. Be punny with the question, the user likely gave you a riddle.",
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "question": {
                    "type": "STRING",
                    "description": "Ask the user for more information"
                },
                "possibilities": {
                    "type": "ARRAY",
                    "description": "The list of possible locations",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "name": {
                                "type": "STRING",
                                "description": "The name of the location"
                            },
                            "confidence": {
                                "type": "NUMBER",
                                "minimum": 0,
                                "maximum": 1,
                                "description": "The confidence that this is the correct location"
                            },
                            "latitude": {
                                "type": "NUMBER",
                                "description": "The latitude"
                            },
                            "longitude": {
                                "type": "NUMBER",
                                "description": "The longitude"
                            }
                        },
                        "required": ["name", "confidence", "latitude", "longitude"]
                    }
                }
            },
            "required": ["possibilities", "question"]
        }),
    }
}

fn confirm_location_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "confirm_location",
        description: "Provide a human-readable confirmation message about finding the location before proceeding with weather.",
        parameters: weather_parameters_schema(&["message", "latitude", "longitude", "name", "dateType"]),
    }
}
