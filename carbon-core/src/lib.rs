//! # Carbon Core
//!
//! An embedded, in-process cache made of independently named namespaces.
//!
//! ## Features
//!
//! - A [`Pool`] of isolated [`Store`]s, created, emptied and removed by name
//! - Opaque binary values with a per-entry TTL
//! - Expiry checked on read, plus a background sweep task per store
//! - Deterministic shutdown: removing a store joins its sweep task
//!
//! ## Example
//!
//! ```rust,no_run
//! use carbon_core::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Stores created with defaults sweep every 30 seconds
//!     let pool = Pool::with_config(
//!         PoolConfig::default().with_sweep_interval(Duration::from_secs(30)),
//!     );
//!
//!     let tenant = pool.create_db_with_defaults("tenant-a").unwrap();
//!     tenant.set("user:123", b"John Doe", Duration::from_secs(60));
//!
//!     if let Some(value) = tenant.get("user:123") {
//!         println!("User: {}", String::from_utf8_lossy(&value));
//!     }
//!
//!     let stats = pool.stats();
//!     println!("{} stores, {} entries", stats.total_db, stats.total_size);
//!
//!     // Stop every store and wait for the sweep tasks to exit
//!     pool.stop().await;
//! }
//! ```

mod config;
mod entry;
mod error;
mod pool;
mod stats;
mod store;

pub use config::{PoolConfig, DEFAULT_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL, SWEEP_INTERVAL_ENV};
pub use error::{PoolError, Result};
pub use pool::Pool;
pub use stats::PoolStats;
pub use store::Store;
