//! Configuration directory resolution and engine defaults.
//!
//! The client keeps all persistent state (auth token, hash cache) inside a
//! single configuration directory. `GDRIVE_CONFIG_DIR` overrides the default
//! of `~/.gdrive`.

use std::path::PathBuf;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "GDRIVE_CONFIG_DIR";

/// Environment variable supplying a raw OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GDRIVE_ACCESS_TOKEN";

/// Directory name under the user's home, used when no override is set.
pub const DEFAULT_CONFIG_DIR_NAME: &str = ".gdrive";

/// File inside the config dir holding the persisted hash cache.
pub const CACHE_FILE_NAME: &str = "file_cache.json";

/// File inside the config dir holding the stored access token.
pub const TOKEN_FILE_NAME: &str = "token_v2.json";

/// Default chunk size for resumable uploads (8 MiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Default idle timeout for chunked transfers, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Page size used for remote listing queries.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default number of change-log entries fetched per invocation.
pub const DEFAULT_MAX_CHANGES: usize = 100;

/// Resolves the configuration directory.
///
/// Order of precedence: `GDRIVE_CONFIG_DIR`, then `~/.gdrive`. Falls back to
/// a relative `.gdrive` when the home directory cannot be determined.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONFIG_DIR_NAME)
}

/// Path of the persisted hash cache file.
pub fn cache_file_path() -> PathBuf {
    config_dir().join(CACHE_FILE_NAME)
}

/// Path of the stored access token file.
pub fn token_file_path() -> PathBuf {
    config_dir().join(TOKEN_FILE_NAME)
}
