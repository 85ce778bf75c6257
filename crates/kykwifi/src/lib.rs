//! # KYK Wi-Fi Portal Client Library
//!
//! This library logs in to the KYK/GSB dormitory Wi-Fi captive portal, keeps
//! the session alive by polling the remaining quota, and logs out again,
//! surviving transient network failures and expired sessions along the way.

pub mod budget;
pub mod config;
pub mod credentials;
pub mod error;
pub mod keepalive;
pub mod logger;
pub mod marker;
pub mod outcome;
pub mod portal;
pub mod recovery;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use config::SessionConfig;
pub use credentials::{CredentialStore, Credentials, EnvFileStore};
pub use error::PortalError;
pub use keepalive::{KeepAliveExit, KeepAliveMode, KeepAliveScheduler};
pub use logger::init_logger;
pub use marker::SessionMarker;
pub use outcome::Quota;
pub use portal::{Endpoints, Portal, PortalClient};
pub use recovery::{CredentialRecovery, NonInteractive, RecoveryDecision};
pub use session::{ExitMode, SessionController, SessionState, Termination};
pub use utils::{ensure_single_instance, get_data_dir, CancellationToken};
