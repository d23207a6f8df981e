//! In-memory stores for development and tests.
//!
//! Each operation is atomic per record. Username uniqueness is enforced
//! through a reservation map, so concurrent registrations of the same name
//! cannot both succeed.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::task_history::errors::TaskHistoryError;
use crate::domain::task_history::models::TaskHistory;
use crate::domain::task_history::models::TaskId;
use crate::domain::task_history::ports::TaskHistoryRepository;
use crate::domain::user::errors::UserError;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::Username;
use crate::domain::user::ports::UserRepository;

pub struct InMemoryUserRepository {
    users: DashMap<UserId, User>,
    usernames: DashMap<String, UserId>,
    id_counter: AtomicI64,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
            id_counter: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, UserError> {
        match self.usernames.entry(user.username.as_str().to_string()) {
            Entry::Occupied(_) => Err(UserError::UsernameAlreadyExists(user.username.to_string())),
            Entry::Vacant(slot) => {
                let id = UserId(self.id_counter.fetch_add(1, Ordering::SeqCst));
                let created = User {
                    id,
                    username: user.username,
                    password_hash: user.password_hash,
                    role: user.role,
                };
                self.users.insert(id, created.clone());
                slot.insert(id);
                Ok(created)
            }
        }
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, UserError> {
        let Some(id) = self.usernames.get(username.as_str()).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn list_all(&self) -> Result<Vec<User>, UserError> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    async fn update_password_hash(
        &self,
        id: &UserId,
        password_hash: String,
    ) -> Result<(), UserError> {
        match self.users.get_mut(id) {
            Some(mut entry) => {
                entry.password_hash = password_hash;
                Ok(())
            }
            None => Err(UserError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &UserId) -> Result<(), UserError> {
        let (_, user) = self
            .users
            .remove(id)
            .ok_or_else(|| UserError::NotFound(id.to_string()))?;
        self.usernames.remove(user.username.as_str());
        Ok(())
    }
}

pub struct InMemoryTaskHistoryRepository {
    histories: DashMap<UserId, TaskHistory>,
}

impl InMemoryTaskHistoryRepository {
    pub fn new() -> Self {
        Self {
            histories: DashMap::new(),
        }
    }
}

impl Default for InMemoryTaskHistoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHistoryRepository for InMemoryTaskHistoryRepository {
    async fn create(&self, history: TaskHistory) -> Result<TaskHistory, TaskHistoryError> {
        match self.histories.entry(history.user_id) {
            Entry::Occupied(_) => Err(TaskHistoryError::AlreadyExists(
                history.user_id.to_string(),
            )),
            Entry::Vacant(slot) => {
                let mut stored = history;
                stored.finished_tasks.sort();
                stored.finished_tasks.dedup();
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<TaskHistory>, TaskHistoryError> {
        Ok(self
            .histories
            .get(user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_all(&self) -> Result<Vec<TaskHistory>, TaskHistoryError> {
        let mut histories: Vec<TaskHistory> = self
            .histories
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        histories.sort_by_key(|history| history.user_id);
        Ok(histories)
    }

    async fn append_finished_task(
        &self,
        user_id: &UserId,
        task_id: TaskId,
    ) -> Result<(), TaskHistoryError> {
        let mut history = self
            .histories
            .get_mut(user_id)
            .ok_or_else(|| TaskHistoryError::NotFound(user_id.to_string()))?;

        if !history.contains(task_id) {
            history.finished_tasks.push(task_id);
        }

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), TaskHistoryError> {
        self.histories
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| TaskHistoryError::NotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::models::Role;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: Username::new(name.to_string()).unwrap(),
            password_hash: "$argon2id$test_hash".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let repository = InMemoryUserRepository::new();

        let alice = repository.create(new_user("alice")).await.unwrap();
        let bob = repository.create(new_user("bob")).await.unwrap();

        assert_eq!(alice.id, UserId(1));
        assert_eq!(bob.id, UserId(2));
        assert_eq!(repository.list_all().await.unwrap(), vec![alice, bob]);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_username() {
        let repository = InMemoryUserRepository::new();
        repository.create(new_user("alice")).await.unwrap();

        let result = repository.create(new_user("alice")).await;
        assert!(matches!(
            result.unwrap_err(),
            UserError::UsernameAlreadyExists(_)
        ));
        assert_eq!(repository.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_frees_username() {
        let repository = InMemoryUserRepository::new();
        let alice = repository.create(new_user("alice")).await.unwrap();

        repository.delete(&alice.id).await.unwrap();

        let username = Username::new("alice".to_string()).unwrap();
        assert!(repository.find_by_username(&username).await.unwrap().is_none());
        assert!(matches!(
            repository.delete(&alice.id).await.unwrap_err(),
            UserError::NotFound(_)
        ));
        assert!(repository.create(new_user("alice")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_password_hash() {
        let repository = InMemoryUserRepository::new();
        let alice = repository.create(new_user("alice")).await.unwrap();

        repository
            .update_password_hash(&alice.id, "$argon2id$new_hash".to_string())
            .await
            .unwrap();

        let stored = repository.find_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "$argon2id$new_hash");
        assert!(matches!(
            repository
                .update_password_hash(&UserId(99), String::new())
                .await
                .unwrap_err(),
            UserError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_history_lifecycle() {
        let repository = InMemoryTaskHistoryRepository::new();
        let user_id = UserId(1);

        repository.create(TaskHistory::empty(user_id)).await.unwrap();
        assert!(matches!(
            repository
                .create(TaskHistory::empty(user_id))
                .await
                .unwrap_err(),
            TaskHistoryError::AlreadyExists(_)
        ));

        repository
            .append_finished_task(&user_id, TaskId(3))
            .await
            .unwrap();
        repository
            .append_finished_task(&user_id, TaskId(3))
            .await
            .unwrap();
        repository
            .append_finished_task(&user_id, TaskId(1))
            .await
            .unwrap();

        let history = repository.find_by_user_id(&user_id).await.unwrap().unwrap();
        assert_eq!(history.finished_tasks, vec![TaskId(3), TaskId(1)]);

        repository.delete_by_user_id(&user_id).await.unwrap();
        assert!(repository.find_by_user_id(&user_id).await.unwrap().is_none());
        assert!(matches!(
            repository.delete_by_user_id(&user_id).await.unwrap_err(),
            TaskHistoryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_append_without_history() {
        let repository = InMemoryTaskHistoryRepository::new();

        let result = repository.append_finished_task(&UserId(4), TaskId(1)).await;
        assert!(matches!(result.unwrap_err(), TaskHistoryError::NotFound(_)));
    }
}
