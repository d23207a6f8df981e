use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::Deserialize;

use super::ApiError;
use super::ApiSuccess;
use super::MessageResponseData;
use crate::domain::user::models::ChangePasswordCommand;
use crate::domain::user::models::Principal;
use crate::inbound::http::router::AppState;

pub async fn change_password(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<ApiSuccess<MessageResponseData>, ApiError> {
    let command = ChangePasswordCommand {
        old_password: body.old_password,
        new_password: body.new_password,
    };

    state
        .user_service
        .change_password(command, &caller)
        .await
        .map_err(ApiError::from)
        .map(|_| {
            ApiSuccess::new(
                StatusCode::OK,
                MessageResponseData::new(
                    "Password successfully updated, log in again with the new credentials",
                ),
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}
