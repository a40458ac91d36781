//! Symbol indexing and scope resolution for accelerator-targeted Fortran.
//!
//! The indexer consumes the preprocessor's normalized statement stream and
//! builds a tree of records (modules, programs, procedures, derived types)
//! with their variables, attributes, and `use` edges. Scope resolution
//! flattens that tree into shadow-ordered views that later translation
//! phases query by name.
//!
//! The build is concurrent: the statement walk runs on the calling thread
//! while declaration parsing and attribute application fan out onto two
//! worker pools separated by hard barriers. Results are deterministic for a
//! given statement stream regardless of pool sizes.

mod attributes;
mod builder;
mod declarations;
pub mod error;
pub mod modfile;
pub mod options;
pub mod query;
pub mod scope;
pub mod types;

pub use builder::{build_index, update_index_from_statements};
pub use error::{IndexError, Result};
pub use modfile::{MODULE_FILE_SUFFIX, load_module_files, write_module_files};
pub use options::IndexerOptions;
pub use query::{
    search_index_for_procedure, search_index_for_type, search_index_for_var,
    search_scope_for_procedure, search_scope_for_type, search_scope_for_var,
};
pub use scope::ScopeResolver;
pub use types::{
    DerivedType, FortranType, Index, Procedure, Record, RecordId, RecordKind, Residency, Scope,
    Variable,
};
