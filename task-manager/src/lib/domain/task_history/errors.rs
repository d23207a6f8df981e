use thiserror::Error;

/// Error for task-history operations
#[derive(Debug, Clone, Error)]
pub enum TaskHistoryError {
    #[error("No task history found for user {0}")]
    NotFound(String),

    #[error("Task {0} does not exist")]
    TaskNotFound(String),

    #[error("Task history already exists for user {0}")]
    AlreadyExists(String),

    #[error("No user found with username {0}")]
    OwnerNotFound(String),

    #[error("You are not authorized to access this resource")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
