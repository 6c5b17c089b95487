use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ok, ApiResponse, AppResult};
use crate::middleware::auth::{issue_token, ROLE_GUEST};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    user_id: String,
    expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/guest", post(login_guest))
}

async fn login_guest(State(state): State<AppState>) -> AppResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    let user_id = format!("guest-{}", Uuid::new_v4());
    let token = issue_token(&state.auth.secret, &user_id, ROLE_GUEST, state.auth.expiration)?;

    Ok((
        StatusCode::CREATED,
        ok(AuthResponse {
            token,
            user_id,
            expires_in: state.auth.expiration,
        }),
    ))
}
