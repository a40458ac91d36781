//! Source location tracking for normalized statements.
//!
//! The preprocessor joins continuation lines into single statements, so a
//! statement's location is the file and first physical line it was read from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// File/line position of a normalized statement, carried through the index
/// so every fatal error can name its source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file the statement was read from.
    pub file: Arc<str>,
    /// 1-based line number of the statement's first physical line.
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_file_colon_line() {
        let loc = SourceLocation::new("kernels.f90", 42);
        assert_eq!(loc.to_string(), "kernels.f90:42");
    }
}
