//! Closet Common Library
//!
//! Shared types and utilities for the closet pipeline workspace:
//!
//! - **Error Handling**: the stage error taxonomy used across every stage
//! - **Identifiers**: owner identifier sanitization
//! - **Logging**: tracing subscriber setup shared by all binaries

pub mod error;
pub mod ident;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, StageError};
pub use ident::sanitize_user_id;
