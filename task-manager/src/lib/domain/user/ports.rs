use async_trait::async_trait;

use crate::domain::user::models::AuthenticatedSession;
use crate::domain::user::models::ChangePasswordCommand;
use crate::domain::user::models::LoginCommand;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::Principal;
use crate::domain::user::models::RegisterUserCommand;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::Username;
use crate::user::errors::UserError;

/// Port for user domain service operations.
#[async_trait]
pub trait UserServicePort: Send + Sync + 'static {
    /// List the users visible to the caller.
    ///
    /// `admin` gets every user, `user` gets a single-element list holding
    /// their own record.
    ///
    /// # Errors
    /// * `Unauthorized` - Caller is a guest
    /// * `NotFoundByUsername` - Caller's own record no longer exists
    /// * `DatabaseError` - Database operation failed
    async fn list_users(&self, caller: &Principal) -> Result<Vec<User>, UserError>;

    /// Retrieve user by unique identifier.
    ///
    /// Not restricted by role.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `DatabaseError` - Database operation failed
    async fn get_user(&self, id: &UserId) -> Result<User, UserError>;

    /// Register a new user and create their empty task history.
    ///
    /// # Errors
    /// * `UsernameAlreadyExists` - Username is already taken
    /// * `InvalidArgument` - Password is blank
    /// * `Password` - Hashing failed
    /// * `TaskHistory` - History creation failed after the user was stored
    /// * `DatabaseError` - Database operation failed
    async fn register(&self, command: RegisterUserCommand) -> Result<User, UserError>;

    /// Verify credentials and issue an access token.
    ///
    /// Unknown usernames and wrong passwords fail identically.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Username unknown or password wrong
    /// * `Password` / `Token` - Verification or signing failed
    /// * `DatabaseError` - Database operation failed
    async fn authenticate(&self, command: LoginCommand) -> Result<AuthenticatedSession, UserError>;

    /// Whether a username is taken.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn user_exists(&self, username: &Username) -> Result<bool, UserError>;

    /// Delete a user and their task history. Admin only.
    ///
    /// # Errors
    /// * `Unauthorized` - Caller is not an admin
    /// * `NotFound` - Target user does not exist
    /// * `TaskHistory` - History removal failed
    /// * `DatabaseError` - Database operation failed
    async fn delete_user(&self, id: &UserId, caller: &Principal) -> Result<(), UserError>;

    /// Change the caller's own password.
    ///
    /// # Errors
    /// * `InvalidArgument` - Either password is blank
    /// * `NotFoundByUsername` - Caller's record no longer exists
    /// * `InvalidCredentials` - Old password does not match
    /// * `DatabaseError` - Database operation failed
    async fn change_password(
        &self,
        command: ChangePasswordCommand,
        caller: &Principal,
    ) -> Result<(), UserError>;
}

/// Persistence operations for user aggregate.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Persist new user to storage, assigning its id.
    ///
    /// # Errors
    /// * `UsernameAlreadyExists` - Username is already taken
    /// * `DatabaseError` - Database operation failed
    async fn create(&self, user: NewUser) -> Result<User, UserError>;

    /// Retrieve user by identifier.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError>;

    /// Retrieve user by username.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, UserError>;

    /// Retrieve all users ordered by id.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn list_all(&self) -> Result<Vec<User>, UserError>;

    /// Replace the stored password hash.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `DatabaseError` - Database operation failed
    async fn update_password_hash(&self, id: &UserId, password_hash: String)
        -> Result<(), UserError>;

    /// Remove user from storage.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `DatabaseError` - Database operation failed
    async fn delete(&self, id: &UserId) -> Result<(), UserError>;
}
