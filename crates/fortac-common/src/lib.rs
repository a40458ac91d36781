//! Common types shared by the fortac translation phases.
//!
//! This crate provides the foundation the indexer, grammar, and code
//! generation phases agree on:
//! - Source locations (`SourceLocation`)
//! - The normalized statement record produced by the preprocessor
//!   (`Statement`) and its classification (`StatementKind`, `classify`)
//! - Used-module edges as they appear in `use` statements (`UsedModule`)
//! - Centralized limits and thresholds

// Source location tracking (file + line)
pub mod position;
pub use position::SourceLocation;

// Normalized statements and their upfront classification
pub mod statements;
pub use statements::{
    EndKind, Rename, Statement, StatementKind, UsedModule, classify,
};

// Parenthesis-aware text scanning helpers
pub mod scan;

// Centralized limits and thresholds
pub mod limits;
