use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Identity claims carried by an access token.
///
/// `sub` holds the username. The role travels as its lowercase string form
/// so this crate stays independent of any service's role type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,

    /// Authorization tier ("admin", "user", "guest")
    pub role: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Create claims for a user, valid for `lifetime` from now.
    pub fn for_user(username: impl ToString, role: impl ToString, lifetime: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            iss: None,
        }
    }

    /// Set issuer.
    pub fn with_issuer(mut self, iss: impl ToString) -> Self {
        self.iss = Some(iss.to_string());
        self
    }

    /// Username the token was issued to.
    pub fn username(&self) -> &str {
        &self.sub
    }

    /// Expiration as a timestamp, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}
