pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;

pub use domain::task_history;
pub use domain::user;
pub use outbound::repositories;
