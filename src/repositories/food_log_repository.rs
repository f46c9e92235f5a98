use crate::error::{AppError, Result};
use crate::models::FoodLog;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for food log reads and writes.
pub struct FoodLogRepository {
    pool: PgPool,
}

impl FoodLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new food log entry.
    pub async fn create(&self, log: &FoodLog) -> Result<FoodLog> {
        let row = sqlx::query_as::<_, FoodLog>(
            r#"
            INSERT INTO food_logs (id, food_name, calories, consumed_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, food_name, calories, consumed_at, created_at
            "#,
        )
        .bind(log.id)
        .bind(&log.food_name)
        .bind(log.calories)
        .bind(log.consumed_at)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a food log entry by its UUID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<FoodLog>> {
        let row = sqlx::query_as::<_, FoodLog>(
            r#"
            SELECT id, food_name, calories, consumed_at, created_at
            FROM food_logs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Lists entries, most recently consumed first.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<FoodLog>> {
        let rows = sqlx::query_as::<_, FoodLog>(
            r#"
            SELECT id, food_name, calories, consumed_at, created_at
            FROM food_logs
            ORDER BY consumed_at DESC, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM food_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row.0)
    }
}
