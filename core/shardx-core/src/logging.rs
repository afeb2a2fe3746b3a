//! Merge engine logging
//!
//! Mergers emit `tracing` events under the `shardx_core::merge` targets:
//!
//! | level   | event                                                      |
//! |---------|------------------------------------------------------------|
//! | `debug` | one per merge: shard count, mode, key columns, LIMIT bounds |
//! | `trace` | heap fill (buffered rows), each assembled group             |
//!
//! A merged cursor that fails and closes its shards logs at `debug` under
//! `shardx_core::rows`.
//!
//! Nothing is logged per returned row at `debug`, so a proxy can keep the
//! engine at `debug` in production. The helpers below install a subscriber
//! that raises only the engine's level and leaves other crates at `warn`.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Target prefix of every merge event.
pub const MERGE_TARGET: &str = "shardx_core::merge";

/// Filter directive: other crates at `warn`, this crate at `level`.
pub fn engine_directive(level: &str) -> String {
    format!("warn,shardx_core={level}")
}

/// Install a subscriber with the engine at `info`.
///
/// `RUST_LOG` overrides the default, e.g. `RUST_LOG=shardx_core::merge=trace`.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Install a subscriber with the engine at `level`.
///
/// Does nothing if a global subscriber is already installed; a proxy that
/// sets up its own subscriber keeps it.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(engine_directive(level)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Heap and group events, captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(format!("{MERGE_TARGET}=trace")))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
