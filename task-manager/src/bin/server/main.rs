use std::sync::Arc;

use auth::Authenticator;
use sqlx::postgres::PgPoolOptions;
use task_manager::config::Config;
use task_manager::config::StorageBackend;
use task_manager::domain::task_history::ports::TaskHistoryRepository;
use task_manager::domain::task_history::ports::TaskHistoryServicePort;
use task_manager::domain::task_history::service::TaskHistoryService;
use task_manager::domain::user::ports::UserRepository;
use task_manager::domain::user::ports::UserServicePort;
use task_manager::domain::user::service::UserService;
use task_manager::inbound::http::router::create_router;
use task_manager::outbound::repositories::InMemoryTaskHistoryRepository;
use task_manager::outbound::repositories::InMemoryUserRepository;
use task_manager::outbound::repositories::PostgresTaskHistoryRepository;
use task_manager::outbound::repositories::PostgresUserRepository;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type Services = (Arc<dyn UserServicePort>, Arc<dyn TaskHistoryServicePort>);

fn build_services<UR, TR>(
    users: Arc<UR>,
    task_histories: Arc<TR>,
    authenticator: Arc<Authenticator>,
) -> Services
where
    UR: UserRepository,
    TR: TaskHistoryRepository,
{
    let user_service: Arc<dyn UserServicePort> = Arc::new(UserService::new(
        Arc::clone(&users),
        Arc::clone(&task_histories),
        authenticator,
    ));
    let task_history_service: Arc<dyn TaskHistoryServicePort> =
        Arc::new(TaskHistoryService::new(task_histories, users));

    (user_service, task_history_service)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_manager=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "task-manager",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        backend = ?config.database.backend,
        http_port = config.server.http_port,
        jwt = ?config.jwt,
        password = ?config.password,
        "Configuration loaded"
    );

    let authenticator = Arc::new(Authenticator::new(config.to_auth_settings())?);

    let (user_service, task_history_service) = match config.database.backend {
        StorageBackend::Postgres => {
            let pg_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(&config.database.url)
                .await?;
            tracing::info!(
                max_connections = config.database.max_connections,
                database = "postgresql",
                "Database connection pool created"
            );

            sqlx::migrate!("./migrations").run(&pg_pool).await?;
            tracing::info!(database = "postgresql", "Database migrations completed");

            build_services(
                Arc::new(PostgresUserRepository::new(pg_pool.clone())),
                Arc::new(PostgresTaskHistoryRepository::new(pg_pool)),
                Arc::clone(&authenticator),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on shutdown");
            build_services(
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryTaskHistoryRepository::new()),
                Arc::clone(&authenticator),
            )
        }
    };

    let http_address = format!("0.0.0.0:{}", config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_address).await?;
    tracing::info!(
        address = %http_address,
        port = config.server.http_port,
        protocol = "http",
        "Http server listening"
    );

    let http_application = create_router(user_service, task_history_service, authenticator);

    if let Err(e) = axum::serve(http_listener, http_application).await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    tracing::info!("Server exited successfully");
    Ok(())
}
