//! GDrive Client - Google Drive v3 adapter.
//!
//! Implements the `RemoteStore` port from `gdrive-core` against the Drive v3
//! REST API: typed request/response DTOs, bearer-token authentication,
//! status-code mapping into `RemoteError` kinds, resumable chunked uploads
//! and streaming downloads.

pub mod auth;
pub mod client;

pub use client::DriveClient;
