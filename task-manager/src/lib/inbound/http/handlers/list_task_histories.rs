use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::task_history::models::TaskHistory;
use crate::domain::user::models::Principal;
use crate::inbound::http::router::AppState;

pub async fn list_task_histories(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
) -> Result<ApiSuccess<Vec<TaskHistoryResponseData>>, ApiError> {
    state
        .task_history_service
        .list_histories(&caller)
        .await
        .map_err(ApiError::from)
        .map(|histories| {
            ApiSuccess::new(
                StatusCode::OK,
                histories.iter().map(TaskHistoryResponseData::from).collect(),
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHistoryResponseData {
    pub user_id: i64,
    pub finished_tasks: Vec<i64>,
}

impl From<&TaskHistory> for TaskHistoryResponseData {
    fn from(history: &TaskHistory) -> Self {
        Self {
            user_id: history.user_id.0,
            finished_tasks: history.finished_tasks.iter().map(|task| task.0).collect(),
        }
    }
}
