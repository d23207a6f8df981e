use std::sync::Arc;

use async_trait::async_trait;
use auth::AuthenticationError;
use auth::Authenticator;

use crate::domain::task_history::errors::TaskHistoryError;
use crate::domain::task_history::models::TaskHistory;
use crate::domain::task_history::ports::TaskHistoryRepository;
use crate::domain::user::models::AuthenticatedSession;
use crate::domain::user::models::ChangePasswordCommand;
use crate::domain::user::models::LoginCommand;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::Principal;
use crate::domain::user::models::RegisterUserCommand;
use crate::domain::user::models::Role;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::Username;
use crate::user::errors::UserError;
use crate::user::ports::UserRepository;
use crate::user::ports::UserServicePort;

/// Domain service implementation for user operations.
///
/// Every role check lives here. Store calls are awaited in sequence and
/// are not wrapped in a cross-store transaction: a failure between the user
/// write and the history write leaves the user without a history.
pub struct UserService<UR, TR>
where
    UR: UserRepository,
    TR: TaskHistoryRepository,
{
    repository: Arc<UR>,
    task_histories: Arc<TR>,
    authenticator: Arc<Authenticator>,
}

impl<UR, TR> UserService<UR, TR>
where
    UR: UserRepository,
    TR: TaskHistoryRepository,
{
    /// Create a new user service with injected dependencies.
    ///
    /// # Arguments
    /// * `repository` - User persistence implementation
    /// * `task_histories` - Task-history persistence implementation
    /// * `authenticator` - Shared password hasher and token issuer
    pub fn new(
        repository: Arc<UR>,
        task_histories: Arc<TR>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self {
            repository,
            task_histories,
            authenticator,
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, UserError> {
        let authenticator = Arc::clone(&self.authenticator);

        tokio::task::spawn_blocking(move || authenticator.hash_password(&password))
            .await
            .map_err(|e| UserError::Unknown(format!("Password hashing task failed: {}", e)))?
            .map_err(UserError::from)
    }

    async fn verify_password(&self, password: String, stored_hash: String) -> Result<bool, UserError> {
        let authenticator = Arc::clone(&self.authenticator);

        tokio::task::spawn_blocking(move || authenticator.verify_password(&password, &stored_hash))
            .await
            .map_err(|e| UserError::Unknown(format!("Password verification task failed: {}", e)))?
            .map_err(UserError::from)
    }

    async fn caller_record(&self, caller: &Principal) -> Result<User, UserError> {
        self.repository
            .find_by_username(caller.username())
            .await?
            .ok_or_else(|| UserError::NotFoundByUsername(caller.username().to_string()))
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[async_trait]
impl<UR, TR> UserServicePort for UserService<UR, TR>
where
    UR: UserRepository,
    TR: TaskHistoryRepository,
{
    async fn list_users(&self, caller: &Principal) -> Result<Vec<User>, UserError> {
        match caller.role() {
            Role::Admin => self.repository.list_all().await,
            Role::User => Ok(vec![self.caller_record(caller).await?]),
            Role::Guest => {
                tracing::warn!(username = %caller.username(), "Guest attempted to list users");
                Err(UserError::Unauthorized)
            }
        }
    }

    async fn get_user(&self, id: &UserId) -> Result<User, UserError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id.to_string()))
    }

    async fn register(&self, command: RegisterUserCommand) -> Result<User, UserError> {
        if is_blank(&command.password) {
            return Err(UserError::InvalidArgument("Password is required".to_string()));
        }

        // Advisory only; the store's uniqueness constraint is the real guard.
        if self
            .repository
            .find_by_username(&command.username)
            .await?
            .is_some()
        {
            return Err(UserError::UsernameAlreadyExists(
                command.username.to_string(),
            ));
        }

        let password_hash = self.hash_password(command.password).await?;

        let user = self
            .repository
            .create(NewUser {
                username: command.username,
                password_hash,
                role: command.role,
            })
            .await?;

        if let Err(e) = self.task_histories.create(TaskHistory::empty(user.id)).await {
            tracing::error!(
                user_id = %user.id,
                error = %e,
                "User stored but task history creation failed"
            );
            return Err(e.into());
        }

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            role = %user.role,
            "User registered"
        );

        Ok(user)
    }

    async fn authenticate(&self, command: LoginCommand) -> Result<AuthenticatedSession, UserError> {
        let user = match Username::new(command.username) {
            Ok(username) => self.repository.find_by_username(&username).await?,
            Err(_) => None,
        };

        let Some(user) = user else {
            tracing::info!("Login rejected: unknown username");
            return Err(UserError::InvalidCredentials);
        };

        let authenticator = Arc::clone(&self.authenticator);
        let password_hash = user.password_hash.clone();
        let username = user.username.as_str().to_string();
        let role = user.role.as_str();

        let result = tokio::task::spawn_blocking(move || {
            authenticator.authenticate(&command.password, &password_hash, &username, role)
        })
        .await
        .map_err(|e| UserError::Unknown(format!("Authentication task failed: {}", e)))?
        .map_err(|e| match e {
            AuthenticationError::InvalidCredentials => {
                tracing::info!(username = %user.username, "Login rejected: wrong password");
                UserError::InvalidCredentials
            }
            AuthenticationError::PasswordError(err) => UserError::Password(err),
            AuthenticationError::JwtError(err) => UserError::Token(err),
        })?;

        tracing::info!(username = %user.username, role = %user.role, "Login succeeded");

        Ok(AuthenticatedSession {
            expires_at: result.expires_at(),
            token: result.access_token,
            username: user.username,
            role: user.role,
        })
    }

    async fn user_exists(&self, username: &Username) -> Result<bool, UserError> {
        Ok(self.repository.find_by_username(username).await?.is_some())
    }

    async fn delete_user(&self, id: &UserId, caller: &Principal) -> Result<(), UserError> {
        if caller.role() != Role::Admin {
            tracing::warn!(
                username = %caller.username(),
                role = %caller.role(),
                target = %id,
                "Non-admin attempted to delete a user"
            );
            return Err(UserError::Unauthorized);
        }

        let user = self.get_user(id).await?;

        match self.task_histories.delete_by_user_id(&user.id).await {
            Ok(()) => {}
            Err(TaskHistoryError::NotFound(_)) => {
                tracing::warn!(user_id = %user.id, "Deleting user that has no task history");
            }
            Err(e) => return Err(e.into()),
        }

        self.repository.delete(&user.id).await?;

        tracing::info!(user_id = %user.id, deleted_by = %caller.username(), "User deleted");

        Ok(())
    }

    async fn change_password(
        &self,
        command: ChangePasswordCommand,
        caller: &Principal,
    ) -> Result<(), UserError> {
        if is_blank(&command.old_password) || is_blank(&command.new_password) {
            return Err(UserError::InvalidArgument(
                "Current password and new password are required".to_string(),
            ));
        }

        let user = self.caller_record(caller).await?;

        if !self
            .verify_password(command.old_password, user.password_hash.clone())
            .await?
        {
            tracing::info!(
                username = %user.username,
                "Password change rejected: wrong current password"
            );
            return Err(UserError::InvalidCredentials);
        }

        let password_hash = self.hash_password(command.new_password).await?;
        self.repository
            .update_password_hash(&user.id, password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "Password changed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use auth::AuthSettings;
    use auth::HashingParams;
    use chrono::Duration;
    use mockall::mock;
    use mockall::Sequence;

    use super::*;
    use crate::domain::task_history::models::TaskId;

    mock! {
        pub TestUserRepository {}

        #[async_trait]
        impl UserRepository for TestUserRepository {
            async fn create(&self, user: NewUser) -> Result<User, UserError>;
            async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError>;
            async fn find_by_username(&self, username: &Username) -> Result<Option<User>, UserError>;
            async fn list_all(&self) -> Result<Vec<User>, UserError>;
            async fn update_password_hash(&self, id: &UserId, password_hash: String) -> Result<(), UserError>;
            async fn delete(&self, id: &UserId) -> Result<(), UserError>;
        }
    }

    mock! {
        pub TestTaskHistoryRepository {}

        #[async_trait]
        impl TaskHistoryRepository for TestTaskHistoryRepository {
            async fn create(&self, history: TaskHistory) -> Result<TaskHistory, TaskHistoryError>;
            async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<TaskHistory>, TaskHistoryError>;
            async fn list_all(&self) -> Result<Vec<TaskHistory>, TaskHistoryError>;
            async fn append_finished_task(&self, user_id: &UserId, task_id: TaskId) -> Result<(), TaskHistoryError>;
            async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), TaskHistoryError>;
        }
    }

    fn test_authenticator() -> Arc<Authenticator> {
        Arc::new(
            Authenticator::new(AuthSettings {
                jwt_secret: b"test-secret-key-for-jwt-signing-at-least-32-bytes".to_vec(),
                token_lifetime: Duration::hours(1),
                issuer: None,
                hashing: HashingParams {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                },
            })
            .expect("Failed to build authenticator"),
        )
    }

    fn service(
        repository: MockTestUserRepository,
        task_histories: MockTestTaskHistoryRepository,
        authenticator: Arc<Authenticator>,
    ) -> UserService<MockTestUserRepository, MockTestTaskHistoryRepository> {
        UserService::new(Arc::new(repository), Arc::new(task_histories), authenticator)
    }

    fn username(name: &str) -> Username {
        Username::new(name.to_string()).unwrap()
    }

    fn stored_user(authenticator: &Authenticator, id: i64, name: &str, password: &str, role: Role) -> User {
        User {
            id: UserId(id),
            username: username(name),
            password_hash: authenticator.hash_password(password).unwrap(),
            role,
        }
    }

    fn principal(name: &str, role: Role) -> Principal {
        Principal::new(username(name), role)
    }

    #[tokio::test]
    async fn test_register_success_creates_empty_history() {
        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_username()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_create()
            .withf(|user| {
                user.username.as_str() == "alice"
                    && user.role == Role::User
                    && user.password_hash.starts_with("$argon2id")
                    && user.password_hash != "Secret123"
            })
            .times(1)
            .returning(|user| {
                Ok(User {
                    id: UserId(1),
                    username: user.username,
                    password_hash: user.password_hash,
                    role: user.role,
                })
            });
        task_histories
            .expect_create()
            .withf(|history| history.user_id == UserId(1) && history.is_empty())
            .times(1)
            .returning(|history| Ok(history));

        let service = service(repository, task_histories, test_authenticator());

        let user = service
            .register(RegisterUserCommand::new(
                username("alice"),
                "Secret123".to_string(),
                Role::User,
            ))
            .await
            .expect("Registration failed");

        assert_eq!(user.id, UserId(1));
        assert_eq!(user.username.as_str(), "alice");
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let authenticator = test_authenticator();
        let existing = stored_user(&authenticator, 1, "alice", "Secret123", Role::User);

        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_username()
            .times(1)
            .returning(move |_| Ok(Some(existing.clone())));
        repository.expect_create().times(0);
        task_histories.expect_create().times(0);

        let service = service(repository, task_histories, authenticator);

        let result = service
            .register(RegisterUserCommand::new(
                username("alice"),
                "Other123".to_string(),
                Role::User,
            ))
            .await;

        assert!(matches!(
            result.unwrap_err(),
            UserError::UsernameAlreadyExists(name) if name == "alice"
        ));
    }

    #[tokio::test]
    async fn test_register_store_uniqueness_violation_is_conflict() {
        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_username()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_create()
            .times(1)
            .returning(|user| Err(UserError::UsernameAlreadyExists(user.username.to_string())));
        task_histories.expect_create().times(0);

        let service = service(repository, task_histories, test_authenticator());

        let result = service
            .register(RegisterUserCommand::new(
                username("alice"),
                "Secret123".to_string(),
                Role::User,
            ))
            .await;

        assert!(matches!(
            result.unwrap_err(),
            UserError::UsernameAlreadyExists(_)
        ));
    }

    #[tokio::test]
    async fn test_register_blank_password() {
        let mut repository = MockTestUserRepository::new();
        repository.expect_find_by_username().times(0);
        repository.expect_create().times(0);

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service
            .register(RegisterUserCommand::new(
                username("alice"),
                "   ".to_string(),
                Role::User,
            ))
            .await;

        assert!(matches!(result.unwrap_err(), UserError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_register_history_failure_is_reported() {
        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_username()
            .returning(|_| Ok(None));
        repository.expect_create().times(1).returning(|user| {
            Ok(User {
                id: UserId(7),
                username: user.username,
                password_hash: user.password_hash,
                role: user.role,
            })
        });
        task_histories
            .expect_create()
            .times(1)
            .returning(|_| Err(TaskHistoryError::DatabaseError("connection reset".to_string())));

        let service = service(repository, task_histories, test_authenticator());

        let result = service
            .register(RegisterUserCommand::new(
                username("alice"),
                "Secret123".to_string(),
                Role::User,
            ))
            .await;

        assert!(matches!(
            result.unwrap_err(),
            UserError::TaskHistory(TaskHistoryError::DatabaseError(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_success_issues_token_with_claims() {
        let authenticator = test_authenticator();
        let user = stored_user(&authenticator, 1, "alice", "Secret123", Role::Admin);

        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .withf(|u| u.as_str() == "alice")
            .times(1)
            .returning(move |_| Ok(Some(user.clone())));

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            Arc::clone(&authenticator),
        );

        let session = service
            .authenticate(LoginCommand {
                username: "alice".to_string(),
                password: "Secret123".to_string(),
            })
            .await
            .expect("Login failed");

        assert!(!session.token.is_empty());
        assert_eq!(session.username.as_str(), "alice");
        assert_eq!(session.role, Role::Admin);
        assert!(session.expires_at.is_some());

        let claims = authenticator.validate_token(&session.token).unwrap();
        assert_eq!(claims.username(), "alice");
        assert_eq!(claims.role, "admin");
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password_and_unknown_user_fail_alike() {
        let authenticator = test_authenticator();
        let user = stored_user(&authenticator, 1, "alice", "Secret123", Role::User);

        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .times(2)
            .returning(move |u| {
                if u.as_str() == "alice" {
                    Ok(Some(user.clone()))
                } else {
                    Ok(None)
                }
            });

        let service = service(repository, MockTestTaskHistoryRepository::new(), authenticator);

        let wrong_password = service
            .authenticate(LoginCommand {
                username: "alice".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();
        let unknown_user = service
            .authenticate(LoginCommand {
                username: "mallory".to_string(),
                password: "Secret123".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, UserError::InvalidCredentials));
        assert!(matches!(unknown_user, UserError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_authenticate_unreadable_stored_hash_is_password_error() {
        let mut repository = MockTestUserRepository::new();
        repository.expect_find_by_username().times(1).returning(|_| {
            Ok(Some(User {
                id: UserId(1),
                username: username("alice"),
                password_hash: "not-a-phc-string".to_string(),
                role: Role::User,
            }))
        });

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service
            .authenticate(LoginCommand {
                username: "alice".to_string(),
                password: "Secret123".to_string(),
            })
            .await;

        assert!(matches!(result.unwrap_err(), UserError::Password(_)));
    }

    #[tokio::test]
    async fn test_authenticate_malformed_username_skips_store() {
        let mut repository = MockTestUserRepository::new();
        repository.expect_find_by_username().times(0);

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service
            .authenticate(LoginCommand {
                username: "a b".to_string(),
                password: "Secret123".to_string(),
            })
            .await;

        assert!(matches!(result.unwrap_err(), UserError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_list_users_admin_gets_everyone() {
        let authenticator = test_authenticator();
        let users = vec![
            stored_user(&authenticator, 1, "root", "pw", Role::Admin),
            stored_user(&authenticator, 2, "alice", "pw", Role::User),
            stored_user(&authenticator, 3, "visitor", "pw", Role::Guest),
        ];

        let mut repository = MockTestUserRepository::new();
        repository
            .expect_list_all()
            .times(1)
            .returning(move || Ok(users.clone()));
        repository.expect_find_by_username().times(0);

        let service = service(repository, MockTestTaskHistoryRepository::new(), authenticator);

        let result = service
            .list_users(&principal("root", Role::Admin))
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[tokio::test]
    async fn test_list_users_user_gets_only_self() {
        let authenticator = test_authenticator();
        let alice = stored_user(&authenticator, 2, "alice", "pw", Role::User);

        let mut repository = MockTestUserRepository::new();
        repository.expect_list_all().times(0);
        repository
            .expect_find_by_username()
            .withf(|u| u.as_str() == "alice")
            .times(1)
            .returning(move |_| Ok(Some(alice.clone())));

        let service = service(repository, MockTestTaskHistoryRepository::new(), authenticator);

        let result = service
            .list_users(&principal("alice", Role::User))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].username.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_list_users_user_missing_record() {
        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .returning(|_| Ok(None));

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service.list_users(&principal("ghost", Role::User)).await;
        assert!(matches!(
            result.unwrap_err(),
            UserError::NotFoundByUsername(_)
        ));
    }

    #[tokio::test]
    async fn test_list_users_guest_unauthorized() {
        let mut repository = MockTestUserRepository::new();
        repository.expect_list_all().times(0);
        repository.expect_find_by_username().times(0);

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service.list_users(&principal("visitor", Role::Guest)).await;
        assert!(matches!(result.unwrap_err(), UserError::Unauthorized));
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_id()
            .withf(|id| *id == UserId(99))
            .times(1)
            .returning(|_| Ok(None));

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service.get_user(&UserId(99)).await;
        assert!(matches!(result.unwrap_err(), UserError::NotFound(id) if id == "99"));
    }

    #[tokio::test]
    async fn test_user_exists() {
        let authenticator = test_authenticator();
        let alice = stored_user(&authenticator, 1, "alice", "pw", Role::User);

        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .returning(move |u| {
                if u.as_str() == "alice" {
                    Ok(Some(alice.clone()))
                } else {
                    Ok(None)
                }
            });

        let service = service(repository, MockTestTaskHistoryRepository::new(), authenticator);

        assert!(service.user_exists(&username("alice")).await.unwrap());
        assert!(!service.user_exists(&username("bob")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_admin_removes_history_then_user() {
        let authenticator = test_authenticator();
        let target = stored_user(&authenticator, 5, "alice", "pw", Role::User);

        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();
        let mut sequence = Sequence::new();

        repository
            .expect_find_by_id()
            .withf(|id| *id == UserId(5))
            .times(1)
            .returning(move |_| Ok(Some(target.clone())));
        task_histories
            .expect_delete_by_user_id()
            .withf(|id| *id == UserId(5))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        repository
            .expect_delete()
            .withf(|id| *id == UserId(5))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));

        let service = service(repository, task_histories, authenticator);

        let result = service
            .delete_user(&UserId(5), &principal("root", Role::Admin))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_user_rejects_user_and_guest() {
        for role in [Role::User, Role::Guest] {
            let mut repository = MockTestUserRepository::new();
            let mut task_histories = MockTestTaskHistoryRepository::new();

            repository.expect_find_by_id().times(0);
            repository.expect_delete().times(0);
            task_histories.expect_delete_by_user_id().times(0);

            let service = service(repository, task_histories, test_authenticator());

            let result = service
                .delete_user(&UserId(5), &principal("alice", role))
                .await;
            assert!(matches!(result.unwrap_err(), UserError::Unauthorized));
        }
    }

    #[tokio::test]
    async fn test_delete_user_not_found() {
        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_id()
            .times(1)
            .returning(|_| Ok(None));
        repository.expect_delete().times(0);
        task_histories.expect_delete_by_user_id().times(0);

        let service = service(repository, task_histories, test_authenticator());

        let result = service
            .delete_user(&UserId(42), &principal("root", Role::Admin))
            .await;
        assert!(matches!(result.unwrap_err(), UserError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_user_without_history_still_deletes() {
        let authenticator = test_authenticator();
        let target = stored_user(&authenticator, 5, "alice", "pw", Role::User);

        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));
        task_histories
            .expect_delete_by_user_id()
            .times(1)
            .returning(|id| Err(TaskHistoryError::NotFound(id.to_string())));
        repository.expect_delete().times(1).returning(|_| Ok(()));

        let service = service(repository, task_histories, authenticator);

        let result = service
            .delete_user(&UserId(5), &principal("root", Role::Admin))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_user_history_failure_keeps_user() {
        let authenticator = test_authenticator();
        let target = stored_user(&authenticator, 5, "alice", "pw", Role::User);

        let mut repository = MockTestUserRepository::new();
        let mut task_histories = MockTestTaskHistoryRepository::new();

        repository
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));
        task_histories
            .expect_delete_by_user_id()
            .returning(|_| Err(TaskHistoryError::DatabaseError("timeout".to_string())));
        repository.expect_delete().times(0);

        let service = service(repository, task_histories, authenticator);

        let result = service
            .delete_user(&UserId(5), &principal("root", Role::Admin))
            .await;
        assert!(matches!(result.unwrap_err(), UserError::TaskHistory(_)));
    }

    #[tokio::test]
    async fn test_change_password_success() {
        let authenticator = test_authenticator();
        let alice = stored_user(&authenticator, 3, "alice", "Secret123", Role::User);

        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .withf(|u| u.as_str() == "alice")
            .times(1)
            .returning(move |_| Ok(Some(alice.clone())));

        let verifier = Arc::clone(&authenticator);
        repository
            .expect_update_password_hash()
            .withf(move |id, hash| {
                *id == UserId(3)
                    && verifier.verify_password("NewSecret456", hash).unwrap_or(false)
                    && !verifier.verify_password("Secret123", hash).unwrap_or(true)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(repository, MockTestTaskHistoryRepository::new(), authenticator);

        let result = service
            .change_password(
                ChangePasswordCommand {
                    old_password: "Secret123".to_string(),
                    new_password: "NewSecret456".to_string(),
                },
                &principal("alice", Role::User),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_password() {
        let authenticator = test_authenticator();
        let alice = stored_user(&authenticator, 3, "alice", "Secret123", Role::User);

        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .returning(move |_| Ok(Some(alice.clone())));
        repository.expect_update_password_hash().times(0);

        let service = service(repository, MockTestTaskHistoryRepository::new(), authenticator);

        let result = service
            .change_password(
                ChangePasswordCommand {
                    old_password: "guess".to_string(),
                    new_password: "NewSecret456".to_string(),
                },
                &principal("alice", Role::User),
            )
            .await;
        assert!(matches!(result.unwrap_err(), UserError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_change_password_blank_fields() {
        let mut repository = MockTestUserRepository::new();
        repository.expect_find_by_username().times(0);
        repository.expect_update_password_hash().times(0);

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );
        let caller = principal("alice", Role::User);

        for (old_password, new_password) in [("", "NewSecret456"), ("Secret123", "  \t")] {
            let result = service
                .change_password(
                    ChangePasswordCommand {
                        old_password: old_password.to_string(),
                        new_password: new_password.to_string(),
                    },
                    &caller,
                )
                .await;
            assert!(matches!(result.unwrap_err(), UserError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_change_password_missing_caller() {
        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_username()
            .returning(|_| Ok(None));

        let service = service(
            repository,
            MockTestTaskHistoryRepository::new(),
            test_authenticator(),
        );

        let result = service
            .change_password(
                ChangePasswordCommand {
                    old_password: "Secret123".to_string(),
                    new_password: "NewSecret456".to_string(),
                },
                &principal("ghost", Role::User),
            )
            .await;
        assert!(matches!(
            result.unwrap_err(),
            UserError::NotFoundByUsername(_)
        ));
    }
}
