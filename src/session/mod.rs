//! Repository session: the client, cache, navigator and uploader of one
//! repository view.

mod operations;
mod repository;
mod transfer;

pub use repository::{RepositorySession, View};
