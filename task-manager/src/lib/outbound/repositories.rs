pub mod memory;
pub mod task_history;
pub mod user;

pub use memory::InMemoryTaskHistoryRepository;
pub use memory::InMemoryUserRepository;
pub use task_history::PostgresTaskHistoryRepository;
pub use user::PostgresUserRepository;
