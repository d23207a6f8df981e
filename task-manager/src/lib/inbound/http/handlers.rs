use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::task_history::errors::TaskHistoryError;
use crate::user::errors::UserError;

pub mod change_password;
pub mod delete_user;
pub mod get_user;
pub mod list_task_histories;
pub mod list_users;
pub mod login;
pub mod signup;
pub mod user_exists;

/// Message sent in place of store failure details.
pub const DATABASE_ERROR_MESSAGE: &str = "Database error. See server log for details.";

#[derive(Debug, Clone)]
pub struct ApiSuccess<T: Serialize + PartialEq>(StatusCode, Json<ApiResponseBody<T>>);

impl<T> PartialEq for ApiSuccess<T>
where
    T: Serialize + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 .0 == other.1 .0
    }
}

impl<T: Serialize + PartialEq> ApiSuccess<T> {
    pub fn new(status: StatusCode, data: T) -> Self {
        ApiSuccess(status, Json(ApiResponseBody::new(status, data)))
    }
}

impl<T: Serialize + PartialEq> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    InternalServerError(String),
    UnprocessableEntity(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unauthorized(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
        };

        (status, Json(ApiResponseBody::new_error(status, message))).into_response()
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(_) | UserError::NotFoundByUsername(_) => {
                ApiError::NotFound(err.to_string())
            }
            UserError::UsernameAlreadyExists(_) => ApiError::Conflict(err.to_string()),
            UserError::Unauthorized | UserError::InvalidCredentials => {
                ApiError::Unauthorized(err.to_string())
            }
            UserError::InvalidArgument(_) => ApiError::BadRequest(err.to_string()),
            UserError::InvalidUsername(_) | UserError::InvalidRole(_) => {
                ApiError::UnprocessableEntity(err.to_string())
            }
            UserError::InvalidUserId(_) => ApiError::BadRequest(err.to_string()),
            UserError::TaskHistory(inner) => ApiError::from(inner),
            UserError::DatabaseError(_) => {
                ApiError::InternalServerError(DATABASE_ERROR_MESSAGE.to_string())
            }
            UserError::Password(_) | UserError::Token(_) | UserError::Unknown(_) => {
                tracing::error!(error = %err, "Request failed");
                ApiError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<TaskHistoryError> for ApiError {
    fn from(err: TaskHistoryError) -> Self {
        match err {
            TaskHistoryError::NotFound(_)
            | TaskHistoryError::TaskNotFound(_)
            | TaskHistoryError::OwnerNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            TaskHistoryError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            TaskHistoryError::Unauthorized => ApiError::Unauthorized(err.to_string()),
            TaskHistoryError::DatabaseError(_) => {
                ApiError::InternalServerError(DATABASE_ERROR_MESSAGE.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponseBody<T: Serialize + PartialEq> {
    status_code: u16,
    data: T,
}

impl<T: Serialize + PartialEq> ApiResponseBody<T> {
    pub fn new(status_code: StatusCode, data: T) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data,
        }
    }
}

impl ApiResponseBody<ApiErrorData> {
    pub fn new_error(status_code: StatusCode, message: String) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data: ApiErrorData { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorData {
    pub message: String,
}

/// Plain confirmation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageResponseData {
    pub message: String,
}

impl MessageResponseData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
