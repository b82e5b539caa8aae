//! Port definitions (traits for adapters).

pub mod remote_store;

pub use remote_store::{RemoteError, RemoteStore};
