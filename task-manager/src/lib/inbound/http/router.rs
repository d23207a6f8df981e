use std::sync::Arc;
use std::time::Duration;

use auth::Authenticator;
use axum::body::Body;
use axum::http::Request;
use axum::http::Response;
use axum::middleware;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::handlers::change_password::change_password;
use super::handlers::delete_user::delete_user;
use super::handlers::get_user::get_user;
use super::handlers::list_task_histories::list_task_histories;
use super::handlers::list_users::list_users;
use super::handlers::login::login;
use super::handlers::signup::signup;
use super::handlers::user_exists::user_exists;
use super::middleware::authenticate as auth_middleware;
use crate::domain::task_history::ports::TaskHistoryServicePort;
use crate::domain::user::ports::UserServicePort;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<dyn UserServicePort>,
    pub task_history_service: Arc<dyn TaskHistoryServicePort>,
    pub authenticator: Arc<Authenticator>,
}

pub fn create_router(
    user_service: Arc<dyn UserServicePort>,
    task_history_service: Arc<dyn TaskHistoryServicePort>,
    authenticator: Arc<Authenticator>,
) -> Router {
    let state = AppState {
        user_service,
        task_history_service,
        authenticator,
    };

    let public_routes = Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/exists/:username", get(user_exists))
        .route("/users/:user_id", get(get_user));

    let protected_routes = Router::new()
        .route("/users", get(list_users))
        .route("/users/deleteUser/:user_id", delete(delete_user))
        .route("/users/changePassword", post(change_password))
        .route("/taskhistory", get(list_task_histories))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        })
        .on_request(|request: &Request<Body>, _span: &Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "Request started"
            );
        })
        .on_response(
            |response: &Response<Body>, latency: Duration, _span: &Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis(),
                    "Request completed"
                );
            },
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
