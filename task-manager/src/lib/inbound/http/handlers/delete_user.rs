use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;

use super::MessageResponseData;
use crate::domain::user::errors::UserError;
use crate::domain::user::models::Principal;
use crate::domain::user::models::UserId;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<ApiSuccess<MessageResponseData>, ApiError> {
    let user_id = UserId::from_string(&id).map_err(UserError::from)?;

    state
        .user_service
        .delete_user(&user_id, &caller)
        .await
        .map_err(ApiError::from)
        .map(|_| {
            ApiSuccess::new(
                StatusCode::OK,
                MessageResponseData::new("User successfully deleted!"),
            )
        })
}
