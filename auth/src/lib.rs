//! Authentication utilities library
//!
//! Provides the authentication building blocks of the task manager:
//! - Password hashing (Argon2id)
//! - JWT token generation and validation
//! - Authentication coordination
//!
//! Everything here is synchronous and CPU-bound. Async callers should run
//! hashing and verification off the executor threads.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! let is_valid = hasher.verify("my_password", &hash).unwrap();
//! assert!(is_valid);
//! ```
//!
//! ## JWT Tokens
//! ```
//! use auth::{Claims, JwtHandler};
//! use chrono::Duration;
//!
//! let handler = JwtHandler::new(b"secret_key_at_least_32_bytes_long!");
//! let claims = Claims::for_user("alice", "user", Duration::hours(1));
//! let token = handler.encode(&claims).unwrap();
//! let decoded = handler.decode(&token).unwrap();
//! assert_eq!(decoded.username(), "alice");
//! ```
//!
//! ## Complete Authentication Flow
//! ```
//! use auth::{AuthSettings, Authenticator, HashingParams};
//! use chrono::Duration;
//!
//! let auth = Authenticator::new(AuthSettings {
//!     jwt_secret: b"secret_key_at_least_32_bytes_long!".to_vec(),
//!     token_lifetime: Duration::hours(24),
//!     issuer: None,
//!     hashing: HashingParams::default(),
//! })
//! .unwrap();
//!
//! // Register: hash password
//! let hash = auth.hash_password("password123").unwrap();
//!
//! // Login: verify and generate token
//! let result = auth.authenticate("password123", &hash, "alice", "user").unwrap();
//!
//! // Validate token
//! let claims = auth.validate_token(&result.access_token).unwrap();
//! assert_eq!(claims.role, "user");
//! ```

pub mod authenticator;
pub mod jwt;
pub mod password;

// Re-export commonly used items
pub use authenticator::AuthSettings;
pub use authenticator::AuthenticationError;
pub use authenticator::AuthenticationResult;
pub use authenticator::Authenticator;
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtHandler;
pub use password::HashingParams;
pub use password::PasswordError;
pub use password::PasswordHasher;
