use std::fmt;
use std::str::FromStr;

use crate::user::errors::RoleError;
use crate::user::errors::UserIdError;
use crate::user::errors::UsernameError;

/// User aggregate entity.
///
/// `password_hash` never leaves the service; HTTP responses are built from
/// dedicated response types that omit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub password_hash: String,
    pub role: Role,
}

/// User unique identifier, assigned by the store on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl UserId {
    /// Parse a user ID from a path segment.
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a positive integer
    pub fn from_string(s: &str) -> Result<Self, UserIdError> {
        match s.parse::<i64>() {
            Ok(id) if id > 0 => Ok(UserId(id)),
            Ok(_) => Err(UserIdError::InvalidFormat(s.to_string())),
            Err(e) => Err(UserIdError::InvalidFormat(format!("{}: {}", s, e))),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Username value type
///
/// Ensures username is 3-32 characters and contains only alphanumeric, underscore, hyphen and dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    const MIN_LENGTH: usize = 3;
    const MAX_LENGTH: usize = 32;

    /// Create a new valid username.
    ///
    /// # Errors
    /// * `TooShort` - Username shorter than 3 characters
    /// * `TooLong` - Username longer than 32 characters
    /// * `InvalidCharacters` - Contains characters other than alphanumerics, `_`, `-` and `.`
    pub fn new(username: String) -> Result<Self, UsernameError> {
        let username = Self::with_valid_length(username)?;
        let username = Self::with_valid_chars(username)?;
        Ok(Self(username))
    }

    fn with_valid_length(username: String) -> Result<String, UsernameError> {
        let length = username.chars().count();
        if length < Self::MIN_LENGTH {
            Err(UsernameError::TooShort {
                min: Self::MIN_LENGTH,
                actual: length,
            })
        } else if length > Self::MAX_LENGTH {
            Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            })
        } else {
            Ok(username)
        }
    }

    fn with_valid_chars(username: String) -> Result<String, UsernameError> {
        if username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            Ok(username)
        } else {
            Err(UsernameError::InvalidCharacters)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authorization tier.
///
/// Checks are written out per operation rather than derived from an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    Admin,
    #[default]
    User,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "guest" => Ok(Role::Guest),
            other => Err(RoleError::Unknown(other.to_string())),
        }
    }
}

/// The authenticated caller of an operation.
///
/// Only built from the claims of a verified token, so services can trust
/// both fields without another store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    username: Username,
    role: Role,
}

impl Principal {
    pub(crate) fn new(username: Username, role: Role) -> Self {
        Self { username, role }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Command to register a new user with domain types
#[derive(Debug)]
pub struct RegisterUserCommand {
    pub username: Username,
    pub password: String,
    pub role: Role,
}

impl RegisterUserCommand {
    /// Construct a new registration command.
    ///
    /// `password` is plain text and hashed by the service.
    pub fn new(username: Username, password: String, role: Role) -> Self {
        Self {
            username,
            password,
            role,
        }
    }
}

/// User record before the store has assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: Username,
    pub password_hash: String,
    pub role: Role,
}

/// Login attempt as received from the client.
///
/// The username stays unvalidated so that a malformed name fails exactly
/// like an unknown one.
#[derive(Debug)]
pub struct LoginCommand {
    pub username: String,
    pub password: String,
}

/// Outcome of a successful login.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub token: String,
    pub username: Username,
    pub role: Role,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Command to change the caller's own password.
#[derive(Debug)]
pub struct ChangePasswordCommand {
    pub old_password: String,
    pub new_password: String,
}
