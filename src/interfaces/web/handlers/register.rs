use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::{USER_COOKIE, cookie_value, hostname, internal_error};
use crate::interfaces::web::AppState;

const COOKIE_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// Issues or confirms the `userId` cookie. A known cookie is echoed back; a
/// missing or unknown one gets a fresh user row and a Set-Cookie.
pub async fn register_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let host = hostname(&headers);
    let existing = cookie_value(&headers, USER_COOKIE);
    let is_returning = existing.is_some();

    let user_id = match state.storage.create_user(&host, existing.as_deref()).await {
        Ok(id) => id,
        Err(e) => return internal_error(e),
    };

    if is_returning {
        return Json(json!({ "userId": user_id, "isNew": false })).into_response();
    }

    let cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; Secure; SameSite=None; Partitioned",
        USER_COOKIE, user_id, COOKIE_MAX_AGE_SECS
    );
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "userId": user_id, "isNew": true })),
    )
        .into_response()
}
