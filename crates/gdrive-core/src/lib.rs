//! GDrive Core - domain logic for the sync engine
//!
//! This crate contains the provider-independent core of the client:
//! - Domain entities (`LocalFile`, `RemoteFile`, `ChangedFile`)
//! - The error taxonomy (`SyncError`, `RemoteError`)
//! - Port definition for the remote object store (`RemoteStore`)
//! - Configuration directory resolution and engine defaults

pub mod config;
pub mod domain;
pub mod ports;
