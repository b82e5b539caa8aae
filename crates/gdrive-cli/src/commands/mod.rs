//! CLI command implementations.

pub mod about;
pub mod changes;
pub mod sync;

use anyhow::Result;
use gdrive_client::{auth, DriveClient};

/// Builds an authenticated client from the stored or env-provided token.
pub fn connect() -> Result<DriveClient> {
    let token = auth::access_token()?;
    Ok(DriveClient::new(token))
}
