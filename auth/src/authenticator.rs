use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::jwt::Claims;
use crate::jwt::JwtError;
use crate::jwt::JwtHandler;
use crate::password::HashingParams;
use crate::password::PasswordError;
use crate::password::PasswordHasher;

/// Process-wide authentication settings.
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct AuthSettings {
    /// Secret key for HS256 signing
    pub jwt_secret: Vec<u8>,
    /// How long an issued token stays valid
    pub token_lifetime: Duration,
    /// Value of the `iss` claim; tokens from other issuers are rejected
    pub issuer: Option<String>,
    /// Argon2id cost parameters
    pub hashing: HashingParams,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("token_lifetime", &self.token_lifetime)
            .field("issuer", &self.issuer)
            .field("hashing", &self.hashing)
            .finish()
    }
}

/// Authentication coordinator combining password verification and JWT generation.
pub struct Authenticator {
    password_hasher: PasswordHasher,
    jwt_handler: JwtHandler,
    token_lifetime: Duration,
    issuer: Option<String>,
}

/// Result of successful authentication.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// JWT access token
    pub access_token: String,
    /// Claims embedded in the token
    pub claims: Claims,
}

impl AuthenticationResult {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }
}

/// Authentication operation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthenticationError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password error: {0}")]
    PasswordError(#[from] PasswordError),

    #[error("JWT error: {0}")]
    JwtError(#[from] JwtError),
}

impl Authenticator {
    /// Create a new authenticator from settings.
    ///
    /// # Errors
    /// * `InvalidParams` - Hashing parameters are rejected by Argon2
    pub fn new(settings: AuthSettings) -> Result<Self, PasswordError> {
        let password_hasher = PasswordHasher::with_params(settings.hashing)?;

        let jwt_handler = match &settings.issuer {
            Some(issuer) => JwtHandler::new(&settings.jwt_secret).with_issuer(issuer),
            None => JwtHandler::new(&settings.jwt_secret),
        };

        Ok(Self {
            password_hasher,
            jwt_handler,
            token_lifetime: settings.token_lifetime,
            issuer: settings.issuer,
        })
    }

    /// Hash a password for storage.
    ///
    /// # Errors
    /// * `PasswordError` - Hashing operation failed
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        self.password_hasher.hash(password)
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// # Errors
    /// * `PasswordError` - Stored hash is unreadable
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
        self.password_hasher.verify(password, stored_hash)
    }

    /// Verify credentials and generate a token for `username` and `role`.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Password does not match
    /// * `PasswordError` - Password verification failed
    /// * `JwtError` - Token generation failed
    pub fn authenticate(
        &self,
        password: &str,
        stored_hash: &str,
        username: &str,
        role: &str,
    ) -> Result<AuthenticationResult, AuthenticationError> {
        if !self.verify_password(password, stored_hash)? {
            return Err(AuthenticationError::InvalidCredentials);
        }

        Ok(self.issue_token(username, role)?)
    }

    /// Generate a token without password verification.
    ///
    /// # Errors
    /// * `JwtError` - Token generation failed
    pub fn issue_token(&self, username: &str, role: &str) -> Result<AuthenticationResult, JwtError> {
        let mut claims = Claims::for_user(username, role, self.token_lifetime);
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }

        let access_token = self.jwt_handler.encode(&claims)?;

        Ok(AuthenticationResult {
            access_token,
            claims,
        })
    }

    /// Validate and decode a token.
    ///
    /// # Errors
    /// * `JwtError` - Token is expired, forged or malformed
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.jwt_handler.decode(token)
    }
}
