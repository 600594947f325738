//! Configuration management for the QuickDrop server

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default chunk ceiling: 64MB
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

/// Default single-request upload ceiling: 10GB
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Default download block size: 1MB
pub const DEFAULT_BLOCK_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Shared destination directory; every upload lands here, every download is served from here
    pub share_dir: PathBuf,
    /// Root of `{staging_dir}/{session_id}/{index}` chunk files
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_chunk_bytes: u64,
    pub max_file_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub block_bytes: usize,
}

/// Error raised when an environment variable is present but unusable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                share_dir: default_share_dir(),
                staging_dir: default_staging_dir(),
            },
            upload: UploadConfig {
                session_timeout: Duration::from_secs(30 * 60),
                sweep_interval: Duration::from_secs(60),
                max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
                max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            },
            download: DownloadConfig {
                block_bytes: DEFAULT_BLOCK_BYTES,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                share_dir: env::var("SHARE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.share_dir),
                staging_dir: env::var("STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.staging_dir),
            },
            upload: UploadConfig {
                session_timeout: parse_secs(
                    "UPLOAD_SESSION_TIMEOUT_SECS",
                    defaults.upload.session_timeout,
                )?,
                sweep_interval: parse_secs(
                    "UPLOAD_SWEEP_INTERVAL_SECS",
                    defaults.upload.sweep_interval,
                )?,
                max_chunk_bytes: parse_var("UPLOAD_MAX_CHUNK_BYTES", defaults.upload.max_chunk_bytes)?,
                max_file_bytes: parse_var("UPLOAD_MAX_FILE_BYTES", defaults.upload.max_file_bytes)?,
            },
            download: DownloadConfig {
                block_bytes: parse_var("DOWNLOAD_BLOCK_BYTES", defaults.download.block_bytes)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

/// A whole number of seconds; zero is rejected
fn parse_secs(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match parse_var(var, default.as_secs())? {
        0 => Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn default_share_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("PhoneTransfer")
}

fn default_staging_dir() -> PathBuf {
    env::temp_dir().join("quickdrop-staging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.download.block_bytes, 1024 * 1024);
        assert!(config.storage.share_dir.ends_with("PhoneTransfer"));
        assert!(config.upload.sweep_interval < config.upload.session_timeout);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        // Unique name so parallel tests never observe it
        env::set_var("QUICKDROP_TEST_GARBAGE_PORT", "not-a-port");
        let result: Result<u16, _> = parse_var("QUICKDROP_TEST_GARBAGE_PORT", 1);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        env::remove_var("QUICKDROP_TEST_GARBAGE_PORT");
    }

    #[test]
    fn test_zero_seconds_rejected() {
        env::set_var("QUICKDROP_TEST_ZERO_INTERVAL", "0");
        let result = parse_secs("QUICKDROP_TEST_ZERO_INTERVAL", Duration::from_secs(60));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { var: "QUICKDROP_TEST_ZERO_INTERVAL", .. })
        ));

        env::set_var("QUICKDROP_TEST_ZERO_INTERVAL", "15");
        let result = parse_secs("QUICKDROP_TEST_ZERO_INTERVAL", Duration::from_secs(60));
        assert_eq!(result.unwrap(), Duration::from_secs(15));
        env::remove_var("QUICKDROP_TEST_ZERO_INTERVAL");

        let result = parse_secs("QUICKDROP_TEST_UNSET_INTERVAL", Duration::from_secs(60));
        assert_eq!(result.unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let result: u64 = parse_var("QUICKDROP_TEST_UNSET_VALUE", 42).unwrap();
        assert_eq!(result, 42);
    }
}
