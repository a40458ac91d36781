//! Post-parse attribute merging.
//!
//! `attributes(...) :: ...` statements and `!$acc declare` directives modify
//! variables that were declared earlier in the same scope. The tree walk
//! queues them as jobs; the jobs run on a second worker pool only after the
//! declaration pool has drained, and mutate the matching variables in place
//! under the shared index lock. Target names with no matching variable are
//! ignored: such statements may legally reference names visible only by
//! import.

use std::sync::Mutex;

use fortac_common::SourceLocation;
use fortac_common::scan::{find_top_level, paren_inner};
use tracing::debug;

use crate::builder::lock;
use crate::error::{IndexError, Result};
use crate::types::{Record, Residency, VarTarget};

/// A deferred variable-modification job, dispatched through [`Self::apply`].
#[derive(Clone, Debug)]
pub(crate) enum PostParseJob {
    /// `attributes(device) :: a_d, b_d`
    Attributes {
        target: VarTarget,
        statement: String,
        location: SourceLocation,
    },
    /// `!$acc declare create(a) copyin(b) ...`
    AccDeclare {
        target: VarTarget,
        statement: String,
        location: SourceLocation,
    },
}

impl PostParseJob {
    pub(crate) fn apply(&self, records: &Mutex<Vec<Record>>) -> Result<()> {
        match self {
            PostParseJob::Attributes {
                target,
                statement,
                location,
            } => {
                let (attributes, names) =
                    parse_attributes(statement).map_err(|message| IndexError::DeclarationParse {
                        statement: statement.clone(),
                        message,
                        location: location.clone(),
                    })?;
                let mut records = lock(records);
                for var in target.variables_mut(&mut records) {
                    if names.iter().any(|n| *n == var.name) {
                        var.qualifiers.extend(attributes.iter().cloned());
                    }
                }
            }
            PostParseJob::AccDeclare {
                target,
                statement,
                location,
            } => {
                let clauses =
                    parse_acc_declare(statement).map_err(|message| IndexError::DeclarationParse {
                        statement: statement.clone(),
                        message,
                        location: location.clone(),
                    })?;
                let mut records = lock(records);
                let variables = target.variables_mut(&mut records);
                for (residency, names) in &clauses {
                    for name in names {
                        match variables.iter_mut().find(|v| v.name == *name) {
                            Some(var) => var.residency = *residency,
                            None => {
                                debug!(name = %name, "declare target not declared in scope, ignoring");
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Parse `attributes(q1[, q2]) :: name1, name2` into qualifiers and target
/// names.
pub(crate) fn parse_attributes(text: &str) -> std::result::Result<(Vec<String>, Vec<String>), String> {
    let lower = text.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("attributes")
        .ok_or_else(|| "expected 'attributes'".to_string())?;
    let (inner, after) = paren_inner(rest.trim_start())
        .ok_or_else(|| "expected '(' after 'attributes'".to_string())?;
    let attributes: Vec<String> = inner
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if attributes.is_empty() {
        return Err("empty attribute list".to_string());
    }
    let names_part = after
        .trim_start()
        .strip_prefix("::")
        .ok_or_else(|| "expected '::' after attribute list".to_string())?;
    let names: Vec<String> = names_part
        .split(',')
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err("no attribute targets named".to_string());
    }
    Ok((attributes, names))
}

const DECLARE_CLAUSES: [(&str, Residency); 4] = [
    ("create", Residency::Alloc),
    ("copyin", Residency::To),
    ("copyout", Residency::From),
    ("copy", Residency::ToFrom),
];

/// Parse the data-mapping clauses of a `!$acc declare` directive.
pub(crate) fn parse_acc_declare(
    text: &str,
) -> std::result::Result<Vec<(Residency, Vec<String>)>, String> {
    let lower = text.trim().to_ascii_lowercase();
    let mut clauses = Vec::new();
    for (keyword, residency) in DECLARE_CLAUSES {
        let marker = format!("{keyword}(");
        let mut offset = 0;
        // Top-level search only: a clause keyword inside another clause's
        // argument list (`create(a_copy(1:n))`) is part of a name, not a
        // clause. The preceding character must not continue an identifier.
        while let Some(found) = find_top_level(&lower[offset..], &marker) {
            let pos = offset + found;
            offset = pos + marker.len();
            let bounded = pos == 0
                || lower[..pos]
                    .chars()
                    .next_back()
                    .is_some_and(|c| !(c.is_ascii_alphanumeric() || c == '_'));
            if !bounded {
                continue;
            }
            let (inner, _) = paren_inner(&lower[pos + keyword.len()..])
                .ok_or_else(|| format!("unbalanced parentheses in '{keyword}' clause"))?;
            let names = inner
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            clauses.push((residency, names));
        }
    }
    Ok(clauses)
}

/// Map an `!$acc routine` parallelism level to the procedure attributes it
/// implies; `None` when the directive names no parallelism level.
pub(crate) fn parse_acc_routine(text: &str) -> Option<[&'static str; 2]> {
    let lower = text.trim().to_ascii_lowercase();
    for tok in lower.split_whitespace().skip(2) {
        match tok {
            "seq" => return Some(["host", "device"]),
            "gang" => return Some(["host", "device:gang"]),
            "worker" => return Some(["host", "device:worker"]),
            "vector" => return Some(["host", "device:vector"]),
            _ => {}
        }
    }
    None
}
