use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;

use crate::domain::task_history::errors::TaskHistoryError;
use crate::domain::task_history::models::TaskHistory;
use crate::domain::task_history::models::TaskId;
use crate::domain::task_history::ports::TaskHistoryRepository;
use crate::domain::user::models::UserId;

const FINISHED_TASK_FOREIGN_KEY: &str = "task_history_finished_tasks_task_id_fkey";

pub struct PostgresTaskHistoryRepository {
    pool: PgPool,
}

impl PostgresTaskHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fold `(user_id, task_id?)` rows from the history/finished-task join
    /// into one history per user.
    fn rows_to_histories(rows: &[PgRow]) -> Result<Vec<TaskHistory>, TaskHistoryError> {
        let mut histories: BTreeMap<i64, Vec<TaskId>> = BTreeMap::new();

        for row in rows {
            let user_id: i64 = row.try_get("user_id").map_err(database_error)?;
            let task_id: Option<i64> = row.try_get("task_id").map_err(database_error)?;

            let finished_tasks = histories.entry(user_id).or_default();
            if let Some(task_id) = task_id {
                finished_tasks.push(TaskId(task_id));
            }
        }

        Ok(histories
            .into_iter()
            .map(|(user_id, finished_tasks)| TaskHistory {
                user_id: UserId(user_id),
                finished_tasks,
            })
            .collect())
    }
}

fn database_error(e: sqlx::Error) -> TaskHistoryError {
    tracing::error!(error = %e, "Task history store operation failed");
    TaskHistoryError::DatabaseError(e.to_string())
}

fn append_error(e: sqlx::Error, user_id: &UserId, task_id: TaskId) -> TaskHistoryError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_foreign_key_violation() {
            if db_err.constraint() == Some(FINISHED_TASK_FOREIGN_KEY) {
                return TaskHistoryError::TaskNotFound(task_id.to_string());
            }
            // History removed between the existence check and the insert.
            return TaskHistoryError::NotFound(user_id.to_string());
        }
    }
    database_error(e)
}

#[async_trait]
impl TaskHistoryRepository for PostgresTaskHistoryRepository {
    async fn create(&self, history: TaskHistory) -> Result<TaskHistory, TaskHistoryError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        sqlx::query(
            r#"
            INSERT INTO task_histories (user_id)
            VALUES ($1)
            "#,
        )
        .bind(history.user_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return TaskHistoryError::AlreadyExists(history.user_id.to_string());
                }
            }
            database_error(e)
        })?;

        for task_id in &history.finished_tasks {
            sqlx::query(
                r#"
                INSERT INTO task_history_finished_tasks (user_id, task_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(history.user_id.0)
            .bind(task_id.0)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;

        Ok(history)
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<TaskHistory>, TaskHistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT h.user_id, f.task_id
            FROM task_histories h
            LEFT JOIN task_history_finished_tasks f ON f.user_id = h.user_id
            WHERE h.user_id = $1
            ORDER BY f.task_id
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(Self::rows_to_histories(&rows)?.into_iter().next())
    }

    async fn list_all(&self) -> Result<Vec<TaskHistory>, TaskHistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT h.user_id, f.task_id
            FROM task_histories h
            LEFT JOIN task_history_finished_tasks f ON f.user_id = h.user_id
            ORDER BY h.user_id, f.task_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        Self::rows_to_histories(&rows)
    }

    async fn append_finished_task(
        &self,
        user_id: &UserId,
        task_id: TaskId,
    ) -> Result<(), TaskHistoryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM task_histories WHERE user_id = $1)
            "#,
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        if !exists {
            return Err(TaskHistoryError::NotFound(user_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO task_history_finished_tasks (user_id, task_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id.0)
        .bind(task_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| append_error(e, user_id, task_id))?;

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), TaskHistoryError> {
        // Finished-task links go with the history via ON DELETE CASCADE.
        let result = sqlx::query(
            r#"
            DELETE FROM task_histories
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(TaskHistoryError::NotFound(user_id.to_string()));
        }

        Ok(())
    }
}
