//! # Observability & Tracing
//!
//! This module provides the tracing setup for the SDK and the demo binary.
//!
//! ## Configuration
//!
//! Compact format with the crate/module prefix hidden (`with_target(false)`);
//! the structured fields (`resource_type`, `id`, `alias`, `key`) carry the
//! context instead.
//!
//! ## What Gets Traced
//!
//! - **Remote calls**: `trace!` per transport call (method and path)
//! - **Resource lifecycle**: Created, Updated, Deleted with type and id
//! - **Caches**: listings (size), alias evictions and dropped duplicates
//! - **Scheduler**: queued jobs, conflicts, flush start and outcome, finalizers
//!
//! ## Usage Examples
//!
//! ```bash
//! # Compact logs (default)
//! RUST_LOG=info cargo run
//!
//! # Show payloads and queueing decisions
//! RUST_LOG=debug cargo run
//!
//! # Every remote call
//! RUST_LOG=resource_sdk=trace cargo run
//! ```
//!
//! With `RUST_LOG=info` a batched dashboard script reads like:
//!
//! ```text
//! INFO Flushing jobs=3
//! INFO set_chart: Created resource_type="chart" id=Some(..)
//! INFO Relayout report=.. charts=3
//! INFO Flushed jobs=3 finalizers=1 failed=0
//! ```

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], falling back to `default_filter` when `RUST_LOG` is
/// unset or invalid. Returns `false` if a subscriber was already installed.
pub fn setup_tracing_with(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
