//! Repository API client and response types.

pub mod client;
pub mod error;

pub use client::{parse_response, validate_directory_name, ObjectUpdate, RepositoryClient};
pub use error::ServerMessage;
