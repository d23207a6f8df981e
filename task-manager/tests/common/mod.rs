#![allow(dead_code)]

use std::sync::Arc;

use auth::AuthSettings;
use auth::Authenticator;
use auth::Claims;
use auth::HashingParams;
use auth::JwtHandler;
use axum::body::Body;
use axum::http::header;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use serde_json::Value;
use task_manager::domain::task_history::ports::TaskHistoryServicePort;
use task_manager::domain::task_history::service::TaskHistoryService;
use task_manager::domain::user::service::UserService;
use task_manager::inbound::http::router::create_router;
use task_manager::outbound::repositories::InMemoryTaskHistoryRepository;
use task_manager::outbound::repositories::InMemoryUserRepository;
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";
pub const ISSUER: &str = "task-manager-test";

/// Application wired over the in-memory stores, driven without a socket.
pub struct TestApp {
    router: Router,
    pub task_history_service: Arc<dyn TaskHistoryServicePort>,
    pub jwt_handler: JwtHandler,
}

impl TestApp {
    pub fn new() -> Self {
        let authenticator = Arc::new(
            Authenticator::new(AuthSettings {
                jwt_secret: JWT_SECRET.to_vec(),
                token_lifetime: chrono::Duration::hours(1),
                issuer: Some(ISSUER.to_string()),
                hashing: HashingParams {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                },
            })
            .expect("Failed to build authenticator"),
        );

        let users = Arc::new(InMemoryUserRepository::new());
        let task_histories = Arc::new(InMemoryTaskHistoryRepository::new());

        let user_service = Arc::new(UserService::new(
            Arc::clone(&users),
            Arc::clone(&task_histories),
            Arc::clone(&authenticator),
        ));
        let task_history_service: Arc<dyn TaskHistoryServicePort> =
            Arc::new(TaskHistoryService::new(task_histories, users));

        let router = create_router(
            user_service,
            Arc::clone(&task_history_service),
            authenticator,
        );

        Self {
            router,
            task_history_service,
            jwt_handler: JwtHandler::new(JWT_SECRET).with_issuer(ISSUER),
        }
    }

    /// Send a request and return the status with the decoded JSON body.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Failed to parse response")
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let authorization = token.map(|token| format!("Bearer {}", token));
        self.send(Method::GET, uri, authorization.as_deref(), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let authorization = token.map(|token| format!("Bearer {}", token));
        self.send(Method::POST, uri, authorization.as_deref(), Some(body))
            .await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let authorization = token.map(|token| format!("Bearer {}", token));
        self.send(Method::DELETE, uri, authorization.as_deref(), None)
            .await
    }

    /// Register a user and return its id.
    pub async fn signup(&self, username: &str, password: &str, role: &str) -> i64 {
        let (status, body) = self
            .post(
                "/users/signup",
                None,
                json!({ "username": username, "password": password, "role": role }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "signup failed: {}", body);

        body["data"]["id"].as_i64().expect("Missing user id")
    }

    /// Log in and return the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/users/login",
                None,
                json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);

        body["data"]["token"]
            .as_str()
            .expect("Missing token")
            .to_string()
    }

    /// Register and log in in one step.
    pub async fn signup_and_login(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> (i64, String) {
        let id = self.signup(username, password, role).await;
        let token = self.login(username, password).await;
        (id, token)
    }

    /// A correctly signed token for arbitrary claims.
    pub fn token_for(&self, claims: Claims) -> String {
        self.jwt_handler
            .encode(&claims.with_issuer(ISSUER))
            .expect("Failed to encode token")
    }
}
