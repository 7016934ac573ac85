use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub domain: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub listen_addr: String,
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    /// Requires authentication before MAIL/RCPT/DATA and advertises AUTH.
    pub secure: bool,
    pub auth_database_url: Option<String>,
    pub max_message_size: usize,
    /// Seconds to wait for the next command line before disconnecting.
    pub command_timeout_secs: u64,
    /// Seconds to wait for the next DATA line before disconnecting.
    pub data_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub maildir_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MailError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| crate::error::MailError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                domain: "localhost".to_string(),
                hostname: "mail.localhost".to_string(),
            },
            smtp: SmtpConfig {
                listen_addr: "0.0.0.0:2525".to_string(),
                enable_tls: false,
                tls_cert_path: None,
                tls_key_path: None,
                secure: false,
                auth_database_url: None,
                max_message_size: 10 * 1024 * 1024, // 10MB
                command_timeout_secs: 300,
                data_timeout_secs: 600,
            },
            storage: StorageConfig {
                maildir_path: "/tmp/maildir".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
