use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::models::Username;
use crate::inbound::http::router::AppState;

/// A name that could never be registered is reported as not taken.
pub async fn user_exists(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<ApiSuccess<bool>, ApiError> {
    let Ok(username) = Username::new(username) else {
        return Ok(ApiSuccess::new(StatusCode::OK, false));
    };

    state
        .user_service
        .user_exists(&username)
        .await
        .map_err(ApiError::from)
        .map(|exists| ApiSuccess::new(StatusCode::OK, exists))
}
