use serde::Serialize;

use crate::core::tools::products::ProductListing;
use crate::core::tools::weather::WeatherData;

/// One typed event on the outbound stream. Serialized as
/// `{ "action": ..., "convoId": ..., "data": ... }` with camelCase payload
/// keys; emission order within a turn is part of the contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkflowEvent {
    LocationConfirmed {
        #[serde(rename = "convoId")]
        convo_id: String,
        data: LocationConfirmedData,
    },
    Followup {
        #[serde(rename = "convoId")]
        convo_id: String,
        data: FollowupData,
    },
    Location {
        #[serde(rename = "convoId")]
        convo_id: String,
        data: LocationData,
    },
    Complete {
        #[serde(rename = "convoId")]
        convo_id: String,
        data: CompleteData,
    },
    Error {
        #[serde(rename = "convoId")]
        convo_id: String,
        data: ErrorData,
    },
}

impl WorkflowEvent {
    pub fn action(&self) -> &'static str {
        match self {
            WorkflowEvent::LocationConfirmed { .. } => "location_confirmed",
            WorkflowEvent::Followup { .. } => "followup",
            WorkflowEvent::Location { .. } => "location",
            WorkflowEvent::Complete { .. } => "complete",
            WorkflowEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationConfirmedData {
    pub message: String,
    pub weather: WeatherData,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowupData {
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationData {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteData {
    pub recommendation: String,
    pub listings: Vec<ProductListing>,
    #[serde(rename = "locationName", skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub error: String,
}
