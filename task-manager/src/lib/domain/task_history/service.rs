use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::task_history::errors::TaskHistoryError;
use crate::domain::task_history::models::TaskHistory;
use crate::domain::task_history::models::TaskId;
use crate::domain::task_history::ports::TaskHistoryRepository;
use crate::domain::task_history::ports::TaskHistoryServicePort;
use crate::domain::user::models::Principal;
use crate::domain::user::models::Role;
use crate::domain::user::models::UserId;
use crate::domain::user::ports::UserRepository;

/// Domain service for reading and extending task histories.
///
/// Histories are created and removed only by the user service, alongside
/// their owner.
pub struct TaskHistoryService<TR, UR>
where
    TR: TaskHistoryRepository,
    UR: UserRepository,
{
    repository: Arc<TR>,
    users: Arc<UR>,
}

impl<TR, UR> TaskHistoryService<TR, UR>
where
    TR: TaskHistoryRepository,
    UR: UserRepository,
{
    pub fn new(repository: Arc<TR>, users: Arc<UR>) -> Self {
        Self { repository, users }
    }

    async fn own_history(&self, caller: &Principal) -> Result<TaskHistory, TaskHistoryError> {
        let owner = self
            .users
            .find_by_username(caller.username())
            .await
            .map_err(|e| TaskHistoryError::DatabaseError(e.to_string()))?
            .ok_or_else(|| TaskHistoryError::OwnerNotFound(caller.username().to_string()))?;

        self.repository
            .find_by_user_id(&owner.id)
            .await?
            .ok_or_else(|| TaskHistoryError::NotFound(owner.id.to_string()))
    }
}

#[async_trait]
impl<TR, UR> TaskHistoryServicePort for TaskHistoryService<TR, UR>
where
    TR: TaskHistoryRepository,
    UR: UserRepository,
{
    async fn list_histories(&self, caller: &Principal) -> Result<Vec<TaskHistory>, TaskHistoryError> {
        match caller.role() {
            Role::Admin => self.repository.list_all().await,
            Role::User => Ok(vec![self.own_history(caller).await?]),
            Role::Guest => {
                tracing::warn!(username = %caller.username(), "Guest attempted to read task histories");
                Err(TaskHistoryError::Unauthorized)
            }
        }
    }

    async fn record_finished_task(
        &self,
        user_id: &UserId,
        task_id: TaskId,
    ) -> Result<(), TaskHistoryError> {
        self.repository.append_finished_task(user_id, task_id).await?;

        tracing::debug!(user_id = %user_id, task_id = %task_id, "Finished task recorded");

        Ok(())
    }
}
