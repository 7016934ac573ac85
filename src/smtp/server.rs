//! The listener: binds the configured address and spawns one session task
//! per accepted connection.

use crate::config::Config;
use crate::error::Result;
use crate::security::{AuthenticationService, Authenticator, TlsConfig};
use crate::smtp::session::SmtpSession;
use crate::storage::Receiver;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub struct SmtpServer {
    config: Config,
    receiver: Arc<dyn Receiver>,
    tls_config: Option<Arc<TlsConfig>>,
    authenticator: Option<Arc<dyn AuthenticationService>>,
}

impl SmtpServer {
    pub fn new(config: Config, receiver: Arc<dyn Receiver>) -> Self {
        Self {
            config,
            receiver,
            tls_config: None,
            authenticator: None,
        }
    }

    /// Builds a server with TLS and/or SASL authentication wired in, per
    /// `config.smtp`'s `enable_tls`/`secure` flags.
    pub async fn with_security(config: Config, receiver: Arc<dyn Receiver>) -> Result<Self> {
        let tls_config = if config.smtp.enable_tls {
            match (&config.smtp.tls_cert_path, &config.smtp.tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    info!("loading TLS configuration");
                    match TlsConfig::from_pem_files(cert_path, key_path) {
                        Ok(tls) => Some(Arc::new(tls)),
                        Err(e) => {
                            warn!("failed to load TLS config: {}", e);
                            None
                        }
                    }
                }
                _ => {
                    warn!("TLS enabled but certificate paths not configured");
                    None
                }
            }
        } else {
            None
        };

        let authenticator: Option<Arc<dyn AuthenticationService>> = if config.smtp.secure {
            match &config.smtp.auth_database_url {
                Some(db_url) => {
                    info!("initializing SMTP authenticator");
                    match Authenticator::new(db_url).await {
                        Ok(auth) => Some(Arc::new(auth)),
                        Err(e) => {
                            warn!("failed to initialize authenticator: {}", e);
                            None
                        }
                    }
                }
                None => {
                    warn!("secure mode enabled but no auth database configured");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            receiver,
            tls_config,
            authenticator,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.smtp.listen_addr).await?;
        info!("SMTP server listening on {}", self.config.smtp.listen_addr);

        if self.tls_config.is_some() {
            info!("TLS/STARTTLS support enabled");
        }
        if self.authenticator.is_some() {
            info!("SMTP AUTH support enabled (PLAIN, LOGIN, CRAM-MD5)");
        }

        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("new connection from {}", addr);

                    let config = self.config.clone();
                    let tls_config = self.tls_config.clone();
                    let authenticator = self.authenticator.clone();
                    let receiver = self.receiver.clone();

                    tokio::spawn(async move {
                        let mut session = SmtpSession::new(
                            socket,
                            addr.to_string(),
                            &config,
                            tls_config,
                            authenticator,
                            receiver,
                        );
                        if let Err(e) = session.run().await {
                            error!("session error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            }
        }
    }
}
