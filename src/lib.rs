//! Watchtower - pending-signature inbox discovery
//!
//! A background daemon for a multi-signature ledger: for each registered
//! user it finds every pending transaction the user is eligible to sign
//! and publishes a per-user inbox into the document store for live
//! client consumption.
//!
//! ## Pipeline
//!
//! - **Explorer**: bounded DFS over the delegation graph, producing the
//!   user's signing paths
//! - **Discovery**: three complementary ledger queries reduced to one
//!   deduplicated eligible set
//! - **Reconciler**: diffs the eligible set against the stored inbox and
//!   commits atomically
//! - **Supervisor**: periodic cycles with bounded per-user concurrency

pub mod canonical;
pub mod config;
pub mod discovery;
pub mod explorer;
pub mod ledger;
pub mod reconciler;
pub mod retry;
pub mod store;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub mod testutil;

pub use config::Args;
pub use types::{Result, WatchtowerError};
