//! # Price Monitor
//!
//! This crate checks user price alerts against current fares. Fares come from a
//! pluggable price source through a bounded TTL cache, every observed fare is kept in the
//! price history, and owners are emailed when a fare reaches their target.

/// Bounded TTL cache of route fares
mod cache;
pub use cache::*;

/// Monitoring runs and single alert checks
mod monitor;
pub use monitor::*;

/// Price alert notifications
mod notifier;
pub use notifier::*;

/// Fare sources
mod price_source;
pub use price_source::*;

/// Persistence trait for alerts, history and run logs
mod store;
pub use store::*;

/// Postgres implementation of the alert store
mod pg_store;
pub use pg_store::*;

/// In-memory implementation of the alert store
mod memory_store;
pub use memory_store::*;

/// Types for price alerts and monitoring runs
mod types;
pub use types::*;
