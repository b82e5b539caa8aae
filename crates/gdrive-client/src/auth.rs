//! Access-token discovery.
//!
//! The OAuth dance itself happens out of band; this module only locates an
//! already-issued token, either from `GDRIVE_ACCESS_TOKEN` or from the token
//! file inside the configuration directory.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use gdrive_core::config::{token_file_path, ACCESS_TOKEN_ENV};

#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
}

/// Resolves the access token: environment first, then the stored token file.
pub fn access_token() -> Result<String> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let path = token_file_path();
    token_from_file(&path).with_context(|| {
        format!(
            "no access token: set {} or store one at {}",
            ACCESS_TOKEN_ENV,
            path.display()
        )
    })
}

fn token_from_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read token file {}", path.display()))?;
    let stored: StoredToken =
        serde_json::from_slice(&data).context("token file is not valid JSON")?;
    if stored.access_token.is_empty() {
        bail!("token file contains an empty access token");
    }
    Ok(stored.access_token)
}
