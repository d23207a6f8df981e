use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;

use crate::domain::user::models::NewUser;
use crate::domain::user::models::Role;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::Username;
use crate::domain::user::ports::UserRepository;
use crate::user::errors::UserError;

const USERNAME_UNIQUE_CONSTRAINT: &str = "users_username_key";

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &PgRow) -> Result<User, UserError> {
        let id: i64 = row.try_get("id").map_err(database_error)?;
        let username: String = row.try_get("username").map_err(database_error)?;
        let password_hash: String = row.try_get("password_hash").map_err(database_error)?;
        let role: String = row.try_get("role").map_err(database_error)?;

        Ok(User {
            id: UserId(id),
            username: Username::new(username)?,
            password_hash,
            role: role.parse::<Role>()?,
        })
    }
}

fn database_error(e: sqlx::Error) -> UserError {
    tracing::error!(error = %e, "User store operation failed");
    UserError::DatabaseError(e.to_string())
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, UserError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user.username.as_str())
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation()
                    && db_err.constraint() == Some(USERNAME_UNIQUE_CONSTRAINT)
                {
                    return UserError::UsernameAlreadyExists(user.username.to_string());
                }
            }
            database_error(e)
        })?;

        let id: i64 = row.try_get("id").map_err(database_error)?;

        Ok(User {
            id: UserId(id),
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        })
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, UserError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn list_all(&self) -> Result<Vec<User>, UserError> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, password_hash, role
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(Self::row_to_user).collect()
    }

    async fn update_password_hash(
        &self,
        id: &UserId,
        password_hash: String,
    ) -> Result<(), UserError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, id: &UserId) -> Result<(), UserError> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(id.to_string()));
        }

        Ok(())
    }
}
