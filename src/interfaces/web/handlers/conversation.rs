use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use super::{USER_COOKIE, bad_request, cookie_value, internal_error, not_found};
use crate::interfaces::web::AppState;

#[derive(Deserialize)]
pub struct ConversationQuery {
    #[serde(rename = "convoId")]
    convo_id: Option<String>,
}

/// User-visible transcript of one conversation.
pub async fn get_conversation_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConversationQuery>,
) -> Response {
    let Some(user_id) = cookie_value(&headers, USER_COOKIE) else {
        return bad_request("Missing convoId parameter");
    };
    let Some(convo_id) = query.convo_id else {
        return bad_request("Missing convoId parameter");
    };

    match state.storage.owns_conversation(&user_id, &convo_id).await {
        Ok(true) => {}
        Ok(false) => return not_found("Conversation not found"),
        Err(e) => return internal_error(e),
    }

    match state.storage.frontend_messages(&user_id, &convo_id).await {
        Ok(messages) => Json(json!({ "messages": messages })).into_response(),
        Err(e) => internal_error(e),
    }
}

/// Allocates a fresh conversation id for the cookie's user.
pub async fn create_conversation_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = cookie_value(&headers, USER_COOKIE) else {
        return bad_request("Missing userId");
    };

    match state.storage.create_conversation(&user_id).await {
        Ok(convo_id) => Json(json!({ "convoId": convo_id })).into_response(),
        Err(e) => internal_error(e),
    }
}
