use std::fmt;

use crate::user::models::UserId;

/// Identifier of a task owned by the external task module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-user record of finished tasks.
///
/// Exactly one exists per user, keyed by the owner's id. Order of
/// `finished_tasks` carries no meaning and holds no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHistory {
    pub user_id: UserId,
    pub finished_tasks: Vec<TaskId>,
}

impl TaskHistory {
    /// Empty history for a freshly registered user.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            finished_tasks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.finished_tasks.is_empty()
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.finished_tasks.contains(&task_id)
    }
}
