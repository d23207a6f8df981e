use async_trait::async_trait;

use crate::domain::task_history::errors::TaskHistoryError;
use crate::domain::task_history::models::TaskHistory;
use crate::domain::task_history::models::TaskId;
use crate::domain::user::models::Principal;
use crate::domain::user::models::UserId;

/// Port for task-history domain service operations.
#[async_trait]
pub trait TaskHistoryServicePort: Send + Sync + 'static {
    /// List the histories visible to the caller.
    ///
    /// `admin` sees every history, `user` only their own, `guest` nothing.
    ///
    /// # Errors
    /// * `Unauthorized` - Caller is a guest
    /// * `OwnerNotFound` - Caller's user record no longer exists
    /// * `NotFound` - Caller has no history
    /// * `DatabaseError` - Database operation failed
    async fn list_histories(&self, caller: &Principal) -> Result<Vec<TaskHistory>, TaskHistoryError>;

    /// Append a finished task to its owner's history.
    ///
    /// Recording the same task twice keeps a single entry.
    ///
    /// # Errors
    /// * `NotFound` - The user has no history
    /// * `TaskNotFound` - The task is unknown to the store
    /// * `DatabaseError` - Database operation failed
    async fn record_finished_task(
        &self,
        user_id: &UserId,
        task_id: TaskId,
    ) -> Result<(), TaskHistoryError>;
}

/// Persistence for the user-to-history relation and its finished tasks.
#[async_trait]
pub trait TaskHistoryRepository: Send + Sync + 'static {
    /// Persist a new history.
    ///
    /// # Errors
    /// * `AlreadyExists` - The user already has a history
    /// * `DatabaseError` - Database operation failed
    async fn create(&self, history: TaskHistory) -> Result<TaskHistory, TaskHistoryError>;

    /// Retrieve the history of a user.
    ///
    /// # Returns
    /// Optional history (None if the user has none)
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_user_id(&self, user_id: &UserId)
        -> Result<Option<TaskHistory>, TaskHistoryError>;

    /// Retrieve every history.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn list_all(&self) -> Result<Vec<TaskHistory>, TaskHistoryError>;

    /// Add a task to a user's finished tasks.
    ///
    /// Stores that hold no task table accept any task id.
    ///
    /// # Errors
    /// * `NotFound` - The user has no history
    /// * `TaskNotFound` - The task does not exist
    /// * `DatabaseError` - Database operation failed
    async fn append_finished_task(
        &self,
        user_id: &UserId,
        task_id: TaskId,
    ) -> Result<(), TaskHistoryError>;

    /// Remove a user's history together with its finished-task links.
    ///
    /// # Errors
    /// * `NotFound` - The user has no history
    /// * `DatabaseError` - Database operation failed
    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), TaskHistoryError>;
}
