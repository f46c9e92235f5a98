use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single food entry in a user's calorie log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FoodLog {
    pub id: Uuid,
    pub food_name: String,
    pub calories: i32,
    pub consumed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl FoodLog {
    pub fn new(food_name: impl Into<String>, calories: i32, consumed_at: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            food_name: food_name.into(),
            calories,
            consumed_at: consumed_at.unwrap_or(now),
            created_at: now,
        }
    }
}
