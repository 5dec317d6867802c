//! WebSocket watch gateway.
//!
//! - `connections` caps concurrent watchers with an RAII guard
//! - `params` resolves query parameters against server settings
//! - `gateway` runs one connection: snapshot first, then events, bookmarks,
//!   resyncs and pings until either side gives up

pub mod connections;
pub mod gateway;
pub mod params;

pub use connections::{ConnectionGuard, ConnectionLimitError, WatchConnections};
pub use gateway::{serve_connection, CloseReason, Phase};
pub use params::{WatchParams, WatchQuery};
