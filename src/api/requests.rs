use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to log a food entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFoodLogRequest {
    pub food_name: String,
    pub calories: Option<i32>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl CreateFoodLogRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.food_name.trim().is_empty() {
            errors.push(ValidationError { field: "foodName".to_string(), message: "foodName cannot be empty".to_string() });
        }
        if self.food_name.chars().count() > 200 {
            errors.push(ValidationError { field: "foodName".to_string(), message: "foodName must be at most 200 characters".to_string() });
        }
        if matches!(self.calories, Some(calories) if calories < 0) {
            errors.push(ValidationError { field: "calories".to_string(), message: "calories cannot be negative".to_string() });
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Query parameters for listing food logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFoodLogsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListFoodLogsQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
