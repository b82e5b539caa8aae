//! Domain entities and error types for the sync engine.

pub mod errors;
pub mod files;
pub mod newtypes;

pub use errors::SyncError;
pub use files::{ChangedFile, LocalFile, ModTimeOrder, RemoteFile, SizeOrder};
pub use newtypes::FileId;
