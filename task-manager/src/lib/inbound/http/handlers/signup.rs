use std::str::FromStr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use thiserror::Error;

use super::get_user::UserResponseData;
use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::errors::RoleError;
use crate::domain::user::errors::UsernameError;
use crate::domain::user::models::RegisterUserCommand;
use crate::domain::user::models::Role;
use crate::domain::user::models::Username;
use crate::inbound::http::router::AppState;

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<ApiSuccess<UserResponseData>, ApiError> {
    state
        .user_service
        .register(body.try_into_command()?)
        .await
        .map_err(ApiError::from)
        .map(|ref user| ApiSuccess::new(StatusCode::OK, user.into()))
}

/// HTTP request body for registering a user (raw JSON)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignupRequest {
    username: String,
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Clone, Error)]
enum ParseSignupRequestError {
    #[error("Invalid username: {0}")]
    Username(#[from] UsernameError),

    #[error("Invalid role: {0}")]
    Role(#[from] RoleError),
}

impl SignupRequest {
    fn try_into_command(self) -> Result<RegisterUserCommand, ParseSignupRequestError> {
        let username = Username::new(self.username)?;
        let role = match self.role.as_deref() {
            Some(role) => Role::from_str(role)?,
            None => Role::default(),
        };
        Ok(RegisterUserCommand::new(username, self.password, role))
    }
}

impl From<ParseSignupRequestError> for ApiError {
    fn from(err: ParseSignupRequestError) -> Self {
        ApiError::UnprocessableEntity(err.to_string())
    }
}
