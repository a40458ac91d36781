//! Indexer configuration.

use fortac_common::limits;
use serde::Deserialize;

/// Tunables for index construction and scope resolution. Defaults match the
/// behavior a driver gets without a config file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IndexerOptions {
    /// Worker-pool size for parsing variable declarations.
    pub declaration_worker_threads: usize,
    /// Worker-pool size for applying attribute and `declare` statements.
    pub modification_worker_threads: usize,
    /// Modules a `use` may name without an index record (vendor and
    /// compiler-support modules the translator never needs to see into).
    pub module_ignore_list: Vec<String>,
    /// Pretty-print persisted module files.
    pub pretty_print_module_files: bool,
    /// Evict cached scopes unrelated to the tag being resolved.
    pub remove_outdated_scopes: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        IndexerOptions {
            declaration_worker_threads: limits::DEFAULT_WORKER_THREADS,
            modification_worker_threads: limits::DEFAULT_WORKER_THREADS,
            module_ignore_list: vec![
                "iso_c_binding".to_string(),
                "iso_fortran_env".to_string(),
                "cudafor".to_string(),
                "openacc".to_string(),
            ],
            pretty_print_module_files: false,
            remove_outdated_scopes: true,
        }
    }
}

impl IndexerOptions {
    /// Whether a used module may legally be absent from the index.
    pub fn ignores_module(&self, name: &str) -> bool {
        self.module_ignore_list.iter().any(|m| m == name)
    }
}
