use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Eigo Session - session manager for the Eigo learning API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the Eigo API
    #[arg(
        short = 'u',
        long,
        env = "EIGO_API_BASE_URL",
        default_value = "http://localhost:8080/api/v1"
    )]
    pub api_base_url: String,

    /// Path to the session store database
    #[arg(short = 's', long, env = "EIGO_SESSION_STORE")]
    pub store_path: Option<String>,

    /// Seconds before expiry at which a proactive refresh is triggered
    #[arg(long, env = "EIGO_REFRESH_BUFFER", default_value = "300")]
    pub refresh_buffer: i64,

    /// Interval in seconds for the periodic session liveness check
    #[arg(long, env = "EIGO_LIVENESS_INTERVAL", default_value = "300")]
    pub liveness_interval: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "EIGO_HTTP_TIMEOUT", default_value = "10")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Log in and persist the granted session
    Login {
        /// Account email (prompted when omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// Show the persisted session state
    Status,
    /// Ensure a fresh access token, refreshing if needed
    Refresh,
    /// Clear the persisted session
    Logout,
    /// Keep the session alive with the periodic liveness check
    Watch,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub store_path: PathBuf,
    pub refresh_buffer_secs: i64,
    pub liveness_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, SessionCommand)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let store_path = args
            .store_path
            .as_deref()
            .map(expand_tilde)
            .or_else(default_store_path)
            .context("Could not determine a session store path (set EIGO_SESSION_STORE)")?;

        Ok(Config {
            api_base_url: args.api_base_url.trim_end_matches('/').to_string(),
            store_path,
            refresh_buffer_secs: args.refresh_buffer,
            liveness_interval_secs: args.liveness_interval,
            http_timeout_secs: args.http_timeout,
            log_level: args.log_level.clone(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.refresh_buffer_secs < 0 {
            anyhow::bail!("EIGO_REFRESH_BUFFER must not be negative");
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            anyhow::bail!("EIGO_API_BASE_URL must be an http(s) URL: {}", self.api_base_url);
        }

        Ok(())
    }
}

/// Default durable location for the session store
fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("eigo").join("session.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api_base_url: "http://localhost:8080/api/v1".to_string(),
            store_path: PathBuf::from("/tmp/session.sqlite3"),
            refresh_buffer_secs: 300,
            liveness_interval_secs: 300,
            http_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/eigo/session.sqlite3");
        assert!(path.to_string_lossy().contains("eigo/session.sqlite3"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_relative_path() {
        let path = expand_tilde("relative/path");
        assert_eq!(path, PathBuf::from("relative/path"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_buffer() {
        let mut config = test_config();
        config.refresh_buffer_secs = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = test_config();
        config.api_base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }
}
