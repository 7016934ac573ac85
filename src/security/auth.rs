//! SASL authentication mechanisms and the authentication collaborator
//!
//! # Supported mechanisms
//! - PLAIN (RFC 4616)
//! - LOGIN (common but not standardized)
//! - CRAM-MD5 (RFC 2195)
//!
//! # Security
//! - Passwords hashed with Argon2 for `authenticate`
//! - HMAC-MD5 responses compared in constant time
//! - PLAIN/LOGIN only allowed after STARTTLS (enforced by the session, not here)

use crate::error::{MailError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use md5::Md5;
use sqlx::SqlitePool;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

type HmacMd5 = Hmac<Md5>;

/// SASL mechanisms accepted by the SMTP AUTH extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
    CramMd5,
}

impl AuthMechanism {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }

    /// PLAIN and LOGIN expose the password on the wire and require STARTTLS first.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Plain | Self::Login)
    }
}

/// Outcome of an authentication collaborator call (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok,
    InvalidCredential,
    ServerError(String),
}

/// The authentication collaborator contract consumed by the SASL exchange.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    async fn authenticate(&self, username: &str, password: &[u8]) -> AuthOutcome;
    async fn validate_hmac(&self, username: &str, challenge: &[u8], response_hex: &[u8]) -> AuthOutcome;
}

/// SQLite-backed authenticator: salted-hash password checks plus
/// HMAC-MD5 challenge validation against a per-user shared secret.
#[derive(Clone)]
pub struct Authenticator {
    db: Arc<SqlitePool>,
}

impl Authenticator {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS smtp_users (
                email TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                shared_secret TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Provision a user. The plaintext secret is retained (not hashed) so it
    /// can serve as the HMAC-MD5 key for CRAM-MD5 logins; the password is
    /// additionally stored as an Argon2 hash for the PLAIN/LOGIN path.
    pub async fn add_user(&self, email: &str, password: &str) -> Result<()> {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
            Argon2,
        };

        info!("adding user {}", email);
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| MailError::Config(format!("failed to hash password: {e}")))?
            .to_string();

        sqlx::query(
            r#"
            INSERT INTO smtp_users (email, password_hash, shared_secret, created_at)
            VALUES (?, ?, ?, datetime('now'))
            "#,
        )
        .bind(email)
        .bind(&password_hash)
        .bind(password)
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    pub async fn user_exists(&self, email: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM smtp_users WHERE email = ?")
            .bind(email)
            .fetch_one(&*self.db)
            .await?;
        Ok(count.0 > 0)
    }

    pub async fn delete_user(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM smtp_users WHERE email = ?")
            .bind(email)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn lookup(&self, email: &str) -> Result<Option<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT password_hash, shared_secret FROM smtp_users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&*self.db)
        .await
        .map_err(MailError::from)
    }

    /// Decode PLAIN auth data: `\0identity\0username\0password` base64-encoded.
    /// The identity field is ignored.
    pub fn decode_plain_auth(auth_data: &str) -> Result<(String, String)> {
        let decoded = BASE64
            .decode(auth_data.trim())
            .map_err(|e| MailError::AuthServer(format!("invalid base64: {e}")))?;

        let parts: Vec<&[u8]> = decoded.splitn(3, |&b| b == 0).collect();
        if parts.len() != 3 {
            return Err(MailError::AuthServer("invalid PLAIN auth format".into()));
        }

        let username = String::from_utf8(parts[1].to_vec())
            .map_err(|e| MailError::AuthServer(format!("invalid UTF-8: {e}")))?;
        let password = String::from_utf8(parts[2].to_vec())
            .map_err(|e| MailError::AuthServer(format!("invalid UTF-8: {e}")))?;

        Ok((username, password))
    }

    /// Decode a single base64 LOGIN challenge response (username or password).
    pub fn decode_login_credential(credential: &str) -> Result<String> {
        let decoded = BASE64
            .decode(credential.trim())
            .map_err(|e| MailError::AuthServer(format!("invalid base64: {e}")))?;
        String::from_utf8(decoded).map_err(|e| MailError::AuthServer(format!("invalid UTF-8: {e}")))
    }

    /// Decode a CRAM-MD5 response: base64(`username SP hex-hmac`).
    pub fn decode_cram_response(response: &str) -> Result<(String, Vec<u8>)> {
        let decoded = BASE64
            .decode(response.trim())
            .map_err(|e| MailError::AuthServer(format!("invalid base64: {e}")))?;

        let mut parts = decoded.splitn(2, |&b| b == b' ');
        let username = parts
            .next()
            .ok_or_else(|| MailError::AuthServer("missing username".into()))?;
        let hex_digest = parts
            .next()
            .ok_or_else(|| MailError::AuthServer("missing HMAC digest".into()))?;

        let username = String::from_utf8(username.to_vec())
            .map_err(|e| MailError::AuthServer(format!("invalid UTF-8: {e}")))?;
        Ok((username, hex_digest.to_vec()))
    }
}

#[async_trait]
impl AuthenticationService for Authenticator {
    async fn authenticate(&self, username: &str, password: &[u8]) -> AuthOutcome {
        use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};

        debug!("authentication attempt for {}", username);
        let row = match self.lookup(username).await {
            Ok(row) => row,
            Err(e) => return AuthOutcome::ServerError(e.to_string()),
        };

        let Some((stored_hash, _secret)) = row else {
            warn!("authentication failed: no such user {}", username);
            return AuthOutcome::InvalidCredential;
        };

        let parsed_hash = match PasswordHash::new(&stored_hash) {
            Ok(h) => h,
            Err(e) => return AuthOutcome::ServerError(e.to_string()),
        };

        match Argon2::default().verify_password(password, &parsed_hash) {
            Ok(()) => {
                info!("authentication successful for {}", username);
                AuthOutcome::Ok
            }
            Err(_) => {
                warn!("authentication failed: bad password for {}", username);
                AuthOutcome::InvalidCredential
            }
        }
    }

    async fn validate_hmac(&self, username: &str, challenge: &[u8], response_hex: &[u8]) -> AuthOutcome {
        let row = match self.lookup(username).await {
            Ok(row) => row,
            Err(e) => return AuthOutcome::ServerError(e.to_string()),
        };

        let Some((_hash, secret)) = row else {
            warn!("CRAM-MD5 failed: no such user {}", username);
            return AuthOutcome::InvalidCredential;
        };

        let mut mac = match HmacMd5::new_from_slice(secret.as_bytes()) {
            Ok(m) => m,
            Err(e) => return AuthOutcome::ServerError(e.to_string()),
        };
        mac.update(challenge);
        let expected = hex::encode(mac.finalize().into_bytes());

        if expected.as_bytes().ct_eq(response_hex).into() {
            info!("CRAM-MD5 authentication successful for {}", username);
            AuthOutcome::Ok
        } else {
            warn!("CRAM-MD5 authentication failed for {}", username);
            AuthOutcome::InvalidCredential
        }
    }
}
