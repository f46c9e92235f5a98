pub mod food_log_repository;

pub use food_log_repository::FoodLogRepository;
