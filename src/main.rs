use mailcore::config::{Config, LoggingConfig};
use mailcore::smtp::SmtpServer;
use mailcore::storage::{MaildirReceiver, Receiver};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        Config::default()
    };

    init_logging(&config.logging);

    info!("starting mailcore");
    info!(
        listen_addr = %config.smtp.listen_addr,
        domain = %config.server.domain,
        maildir_path = %config.storage.maildir_path,
        "configuration loaded"
    );

    let receiver: Arc<dyn Receiver> = Arc::new(MaildirReceiver::new(config.storage.maildir_path.clone()));

    let server = SmtpServer::with_security(config, receiver).await?;
    server.run().await?;

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}
