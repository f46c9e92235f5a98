pub mod food_log;

pub use food_log::FoodLog;
