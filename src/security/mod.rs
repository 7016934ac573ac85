//! Security module
//!
//! Provides SASL authentication and TLS functionality:
//! - [`auth`]: SASL mechanisms (PLAIN, LOGIN, CRAM-MD5) and the authentication collaborator
//! - [`tls`]: TLS/STARTTLS configuration and handling

pub mod auth;
pub mod tls;

pub use auth::{AuthMechanism, AuthOutcome, AuthenticationService, Authenticator};
pub use tls::TlsConfig;
