// crates/client/src/lib.rs
//! Watch client for a jobwatch server.
//!
//! [`WatchClient`] holds one reconnecting WebSocket per process, folds the
//! stream into a [`jobwatch_core::JobsView`] and notifies local listeners.
//! The last observed version is persisted through a [`VersionStore`] so a
//! restart resumes instead of starting over.

pub mod backoff;
pub mod config;
pub mod error;
pub mod listeners;
pub mod store;
pub mod transport;

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{ClientConfig, WATCH_PATH};
pub use error::ClientError;
pub use listeners::{ListenerHandle, ListenerRegistry};
pub use store::{FileVersionStore, MemoryVersionStore, VersionStore};
pub use transport::{ConnectionState, WatchClient};
