// crates/core/src/lib.rs
//! Job tracking and list-watch primitives.
//!
//! - `JobLedger`: authoritative job registry and version counter
//! - `WatchBroker`: ordered fan-out with a bounded replay ring
//! - `WatchMessage`: the SNAPSHOT / EVENT / BOOKMARK wire envelope
//! - `JobsView`: client-side reducer over the watch stream

pub mod broker;
pub mod error;
pub mod job;
pub mod ledger;
pub mod protocol;
pub mod reducer;

pub use broker::{ReplayRing, SubscriberId, Subscription, WatchBroker};
pub use error::*;
pub use job::*;
pub use ledger::{JobLedger, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use protocol::*;
pub use reducer::{Applied, JobsView};
