//! Centralized limits and thresholds for the fortac toolchain.
//!
//! Centralizing these values prevents duplicate definitions with
//! inconsistent values across crates.

/// Default worker-thread count for the declaration and attribute pools.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Maximum depth of transitive `use` resolution.
///
/// A `use` chain deeper than this almost certainly indicates a module
/// import cycle; resolution bails out instead of recursing forever.
pub const MAX_USE_RESOLUTION_DEPTH: usize = 64;
