//! Client-side model of the remote repository tree.

mod cache;
mod filter;
mod item;
mod listener;
mod object;

pub use cache::{ContentStats, Filesystem};
pub use filter::{DirectoryFilter, DirectoryListing, SortKey};
pub use item::Item;
pub use listener::{ObjectCallback, Subscription};
pub use object::{ObjectId, ObjectKind, ObjectRecord, RemoteObject};
