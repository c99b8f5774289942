//! # jotter-core
//!
//! Core types, traits, and abstractions for the jotter notes backend.
//!
//! This crate provides the note model, the caller identity, the shared error
//! type and the repository trait that the database and API crates build on.

pub mod error;
pub mod file_safety;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{sanitize_storage_filename, MAX_STORED_FILENAME_LEN, UNNAMED_FILE};
pub use models::*;
pub use traits::*;
