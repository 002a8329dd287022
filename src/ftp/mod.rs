//! FTP transport: session abstraction, `suppaftp` connector and the
//! per-worker connection manager.
//!
//! Plaintext FTP only. Every worker owns its own [`ConnectionManager`];
//! sessions are never shared across threads.

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::{ConnectionManager, with_connection};
pub use session::{ConnectionSettings, Connector, FtpSession, SuppaConnector};
