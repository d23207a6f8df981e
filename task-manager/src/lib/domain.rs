pub mod task_history;
pub mod user;
