use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::models::AuthenticatedSession;
use crate::domain::user::models::LoginCommand;
use crate::inbound::http::router::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<ApiSuccess<LoginResponseData>, ApiError> {
    let command = LoginCommand {
        username: body.username,
        password: body.password,
    };

    state
        .user_service
        .authenticate(command)
        .await
        .map_err(ApiError::from)
        .map(|session| ApiSuccess::new(StatusCode::OK, session.into()))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginResponseData {
    pub message: String,
    pub token: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AuthenticatedSession> for LoginResponseData {
    fn from(session: AuthenticatedSession) -> Self {
        Self {
            message: "Authentication successful".to_string(),
            token: session.token,
            username: session.username.as_str().to_string(),
            role: session.role.as_str().to_string(),
            expires_at: session.expires_at,
        }
    }
}
