use std::convert::Infallible;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};
use uuid::Uuid;

use super::{USER_COOKIE, bad_request, cookie_value, hostname, internal_error};
use crate::core::error::Error;
use crate::core::events::{ErrorData, WorkflowEvent};
use crate::core::memory::Memory;
use crate::core::orchestrator::Orchestrator;
use crate::core::sanitize::sanitize_prompt;
use crate::interfaces::web::AppState;

struct PromptRequest {
    prompt: String,
    convo_id: Option<String>,
    image: Option<Vec<u8>>,
}

async fn read_multipart(multipart: &mut Multipart) -> Result<PromptRequest, Error> {
    let mut request = PromptRequest {
        prompt: String::new(),
        convo_id: None,
        image: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(e.to_string()))?
    {
        if field.file_name().is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::Validation(e.to_string()))?;
            request.image = Some(bytes.to_vec());
            continue;
        }
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("prompt") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(e.to_string()))?;
                request.prompt = sanitize_prompt(&raw);
            }
            Some("convoId") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(e.to_string()))?;
                if !value.is_empty() {
                    request.convo_id = Some(value);
                }
            }
            _ => {}
        }
    }
    Ok(request)
}

/// Runs one workflow turn, streaming typed events as SSE. The orchestrator
/// runs on its own task; a failed turn closes the stream with a terminal
/// error event instead of tearing the connection down.
pub async fn prompt_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let request = match read_multipart(&mut multipart).await {
        Ok(request) => request,
        Err(_) => return bad_request("Missing required fields"),
    };
    if request.prompt.is_empty() && request.image.is_none() {
        return bad_request("Missing required fields");
    }

    let host = hostname(&headers);
    let cookie = cookie_value(&headers, USER_COOKIE);
    let user_id = match state.storage.create_user(&host, cookie.as_deref()).await {
        Ok(id) => id,
        Err(e) => return internal_error(e),
    };
    let convo_id = request
        .convo_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let memory = match Memory::load(state.storage.clone(), user_id, convo_id.clone()).await {
        Ok(memory) => memory,
        Err(e) => return internal_error(e),
    };
    let orchestrator = Orchestrator::new(state.gateway.clone(), state.toolbox.clone(), memory);

    info!(%convo_id, has_image = request.image.is_some(), "starting workflow turn");
    let (tx, rx) = tokio::sync::mpsc::channel::<WorkflowEvent>(32);
    tokio::spawn(async move {
        if let Err(e) = orchestrator
            .run(request.prompt, request.image, tx.clone())
            .await
        {
            error!(error = %e, "workflow turn failed");
            let _ = tx
                .send(WorkflowEvent::Error {
                    convo_id,
                    data: ErrorData {
                        error: "Processing failed".to_string(),
                    },
                })
                .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<Event, Infallible>(Event::default().data(data))
    });
    Sse::new(stream).into_response()
}
