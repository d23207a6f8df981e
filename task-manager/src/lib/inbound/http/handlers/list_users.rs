use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;

use super::get_user::UserResponseData;
use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::models::Principal;
use crate::inbound::http::router::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
) -> Result<ApiSuccess<Vec<UserResponseData>>, ApiError> {
    state
        .user_service
        .list_users(&caller)
        .await
        .map_err(ApiError::from)
        .map(|users| {
            ApiSuccess::new(
                StatusCode::OK,
                users.iter().map(UserResponseData::from).collect(),
            )
        })
}
