//! Error taxonomy of the indexer.
//!
//! Every variant is fatal to the current build except `Lookup`, which a
//! variable query may recover from via implicit typing. Errors carry their
//! source context and propagate unmodified to the top-level invocation;
//! there is no partial-index recovery.

use fortac_common::SourceLocation;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// Malformed structural nesting: a stray `end`, an `end` of the wrong
    /// kind, or a scope opener in an illegal position.
    Classification {
        message: String,
        location: SourceLocation,
    },
    /// A declaration statement the worker pool could not parse. Input
    /// Fortran is assumed syntactically valid, so this signals a gap in the
    /// tool rather than a user error.
    DeclarationParse {
        statement: String,
        message: String,
        location: SourceLocation,
    },
    /// A `use` names a module that is neither in the index nor on the
    /// intrinsic/ignore lists.
    UnresolvedDependency {
        module: String,
        location: SourceLocation,
    },
    /// An identifier, type, or procedure is absent from a built scope.
    Lookup { name: String },
    /// Module-file persistence failure.
    Io { path: PathBuf, message: String },
    /// Tool-internal invariant violation (worker pool setup, import cycles).
    Internal { message: String },
}

impl IndexError {
    pub(crate) fn classification(message: impl Into<String>, location: &SourceLocation) -> Self {
        IndexError::Classification {
            message: message.into(),
            location: location.clone(),
        }
    }

    pub(crate) fn lookup(name: impl Into<String>) -> Self {
        IndexError::Lookup { name: name.into() }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        IndexError::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        IndexError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::Classification { message, location } => {
                write!(f, "{location}: {message}")
            }
            IndexError::DeclarationParse {
                statement,
                message,
                location,
            } => write!(
                f,
                "{location}: failed to parse declaration '{statement}': {message}"
            ),
            IndexError::UnresolvedDependency { module, location } => {
                write!(
                    f,
                    "{location}: no index record for module '{module}' could be found"
                )
            }
            IndexError::Lookup { name } => {
                write!(f, "no index record found for '{name}' in scope")
            }
            IndexError::Io { path, message } => {
                write!(f, "{}: {message}", path.display())
            }
            IndexError::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for IndexError {}

pub type Result<T> = std::result::Result<T, IndexError>;
