pub mod config;
pub mod engine;
pub mod models;
pub mod mosaic;
pub mod plugins;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
