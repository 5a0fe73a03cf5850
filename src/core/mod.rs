// Public modules
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod output;
pub mod release;
pub mod process;
pub mod ssh;
pub mod task;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
