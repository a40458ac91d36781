//! Scope construction: flattened, shadow-ordered views of the index.
//!
//! A scope tag is the colon-joined lexical path of a record, e.g.
//! `mymod:mysub`. Building a scope walks the path from the outermost record
//! inward, resolving each record's used-module edges first and appending the
//! record's own definitions after them, so the innermost declaration of a
//! name is always the last-appended and wins reverse-scan lookups.
//!
//! The resolver owns the cache. It is deliberately not a shared-state type:
//! `create_scope` must not be invoked concurrently against the same
//! resolver; multi-threaded query workloads either serialize through one
//! resolver or pay for independent ones.

use std::sync::Arc;

use fortac_common::limits::MAX_USE_RESOLUTION_DEPTH;
use fortac_common::statements::{Rename, UsedModule};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::options::IndexerOptions;
use crate::types::{Index, Record, RecordId, Scope};

/// Scope cache plus the options controlling eviction and module-ignore
/// behavior. One resolver instance per query pipeline.
#[derive(Debug, Default)]
pub struct ScopeResolver {
    scopes: Vec<Arc<Scope>>,
    options: IndexerOptions,
}

impl ScopeResolver {
    pub fn new(options: IndexerOptions) -> Self {
        ScopeResolver {
            scopes: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// Build (or fetch) the scope for `tag`. For a fixed index, the same tag
    /// always yields a structurally identical scope.
    #[tracing::instrument(level = "debug", skip(self, index))]
    pub fn create_scope(&mut self, index: &Index, tag: &str) -> Result<Arc<Scope>> {
        let tag_tokens: Vec<&str> = tag.split(':').collect();

        // Find the cached scope whose tag is the longest segment-wise prefix
        // of the request; everything unrelated to the request is evicted.
        let mut best: Option<Arc<Scope>> = None;
        let mut best_len = 0usize;
        for scope in &self.scopes {
            let existing: Vec<&str> = scope.tag.split(':').collect();
            if existing.len() <= tag_tokens.len() && existing == tag_tokens[..existing.len()] {
                if existing.len() > best_len || best.is_none() {
                    best_len = existing.len();
                    best = Some(Arc::clone(scope));
                }
            }
        }
        if self.options.remove_outdated_scopes {
            self.scopes.retain(|scope| {
                let existing: Vec<&str> = scope.tag.split(':').collect();
                existing.len() <= tag_tokens.len() && existing == tag_tokens[..existing.len()]
            });
        }

        if let Some(existing) = &best
            && best_len == tag_tokens.len()
        {
            debug!(tag, "reusing cached scope");
            return Ok(Arc::clone(existing));
        }

        let mut scope = match &best {
            Some(prefix) => {
                debug!(tag, prefix = %prefix.tag, "extending cached scope");
                Scope::clone(prefix)
            }
            None => Scope::default(),
        };
        scope.tag = tag.to_string();

        // Locate the record the cached prefix ends at; its subprograms are
        // the search list for the next segment. A fresh scope starts at the
        // top level and sees every top-level procedure.
        let mut search: Option<RecordId> = None;
        if best_len > 0 {
            let mut record = index
                .top_level_by_name(tag_tokens[0])
                .ok_or_else(|| IndexError::lookup(tag_tokens[0]))?;
            for segment in &tag_tokens[1..best_len] {
                record = find_subprogram(index, record, segment)
                    .ok_or_else(|| IndexError::lookup(*segment))?;
            }
            search = Some(record);
        } else {
            for (_, record) in index.top_level() {
                if record.is_procedure() && record.name != tag_tokens[0] {
                    scope.procedures.push(record.procedure_entry());
                }
            }
        }

        for segment in &tag_tokens[best_len..] {
            let record_id = match search {
                None => index.top_level_by_name(segment),
                Some(parent) => find_subprogram(index, parent, segment),
            }
            .ok_or_else(|| IndexError::lookup(*segment))?;
            let record = index.get(record_id);

            // Imported definitions first, then the record's own, so local
            // declarations shadow imports on reverse scans.
            resolve_dependencies(&mut scope, record, index, &self.options)?;
            append_record_entries(&mut scope, record, index);
            scope.implicit_none |= record.implicit_none;
            search = Some(record_id);
        }

        let scope = Arc::new(scope);
        self.scopes.push(Arc::clone(&scope));
        Ok(scope)
    }
}

fn find_subprogram(index: &Index, parent: RecordId, name: &str) -> Option<RecordId> {
    index
        .get(parent)
        .subprograms
        .iter()
        .copied()
        .find(|&id| index.get(id).name == name)
}

/// Append a record's own types, variables, and procedures to a scope.
fn append_record_entries(scope: &mut Scope, record: &Record, index: &Index) {
    scope.types.extend(record.types.iter().cloned());
    scope.variables.extend(record.variables.iter().cloned());
    for &sub in &record.subprograms {
        let sub = index.get(sub);
        if sub.is_procedure() {
            scope.procedures.push(sub.procedure_entry());
        }
    }
}

/// Group consecutive used-module edges naming the same module when both
/// carry a selective-import list, merging the lists.
fn condense_only_groups(used_modules: &[UsedModule]) -> Vec<UsedModule> {
    let mut result: Vec<UsedModule> = Vec::new();
    for edge in used_modules {
        match result.last_mut() {
            Some(last)
                if last.name == edge.name
                    && last.qualifiers == edge.qualifiers
                    && !last.only.is_empty()
                    && !edge.only.is_empty() =>
            {
                last.only.extend(edge.only.iter().cloned());
            }
            _ => result.push(edge.clone()),
        }
    }
    result
}

/// Fold consecutive whole-module edges to the same module. Source files
/// sometimes import a module repeatedly solely to add renamings:
///
/// ```text
/// use a, b1 => a1
/// use a, b2 => a2
/// use a, b3 => a3
/// ```
///
/// Only the last import leaves its renamed originals inaccessible, so all
/// but the last edge collapse into one synthetic selective import of their
/// renamings, followed by the last whole-module edge.
fn condense_non_only_groups(used_modules: Vec<UsedModule>) -> Vec<UsedModule> {
    let mut groups: Vec<Vec<UsedModule>> = Vec::new();
    for edge in used_modules {
        match groups.last_mut() {
            Some(group)
                if group[0].name == edge.name
                    && group[0].qualifiers == edge.qualifiers
                    && group[0].only.is_empty()
                    && edge.only.is_empty() =>
            {
                group.push(edge);
            }
            _ => groups.push(vec![edge]),
        }
    }

    let mut result = Vec::new();
    for mut group in groups {
        if group.len() == 1 {
            result.extend(group);
        } else {
            let last = group.pop().unwrap_or_default();
            let mut selective = UsedModule {
                name: last.name.clone(),
                qualifiers: last.qualifiers.clone(),
                only: Vec::new(),
                renamings: Vec::new(),
                location: last.location.clone(),
            };
            for edge in group {
                selective.only.extend(edge.renamings);
            }
            result.push(selective);
            result.push(last);
        }
    }
    result
}

/// Resolve a record's used-module edges into `scope`, depth-first so
/// transitively imported definitions are visible, exactly once per edge.
pub(crate) fn resolve_dependencies(
    scope: &mut Scope,
    record: &Record,
    index: &Index,
    options: &IndexerOptions,
) -> Result<()> {
    handle_use_statements(scope, record, index, options, 0)
}

fn handle_use_statements(
    scope: &mut Scope,
    record: &Record,
    index: &Index,
    options: &IndexerOptions,
    depth: usize,
) -> Result<()> {
    if depth > MAX_USE_RESOLUTION_DEPTH {
        return Err(IndexError::internal(format!(
            "use chain deeper than {MAX_USE_RESOLUTION_DEPTH} while resolving '{}'; import cycle?",
            record.name
        )));
    }
    let edges = condense_non_only_groups(condense_only_groups(&record.used_modules));
    for edge in &edges {
        if edge.is_intrinsic() || options.ignores_module(&edge.name) {
            debug!(module = %edge.name, "skipping ignorable module");
            continue;
        }
        let Some(other_id) = index.top_level_by_name(&edge.name) else {
            return Err(IndexError::UnresolvedDependency {
                module: edge.name.clone(),
                location: edge.location.clone(),
            });
        };
        let other = index.get(other_id);
        handle_use_statements(scope, other, index, options, depth + 1)?;

        if edge.only.is_empty() {
            debug!(module = %other.name, "using all definitions");
            append_record_entries(scope, other, index);
            for mapping in &edge.renamings {
                rename_in_scope(scope, mapping);
            }
        } else {
            for mapping in &edge.only {
                copy_selected(scope, other, index, mapping);
            }
        }
    }
    Ok(())
}

/// Apply one whole-module renaming: find the original name in the scope
/// (types first, then variables, then procedures; first match wins) and
/// overwrite the copy's name.
fn rename_in_scope(scope: &mut Scope, mapping: &Rename) {
    if let Some(entry) = scope.types.iter_mut().find(|t| t.name == mapping.original) {
        entry.name = mapping.alias.clone();
        return;
    }
    if let Some(entry) = scope
        .variables
        .iter_mut()
        .find(|v| v.name == mapping.original)
    {
        entry.name = mapping.alias.clone();
        return;
    }
    if let Some(entry) = scope
        .procedures
        .iter_mut()
        .find(|p| p.name == mapping.original)
    {
        entry.name = mapping.alias.clone();
    }
}

/// Copy the entries a selective import names from the source module into
/// the scope, under their alias.
fn copy_selected(scope: &mut Scope, other: &Record, index: &Index, mapping: &Rename) {
    for dtype in &other.types {
        if dtype.name == mapping.original {
            let mut copy = dtype.clone();
            copy.name = mapping.alias.clone();
            scope.types.push(copy);
        }
    }
    for var in &other.variables {
        if var.name == mapping.original {
            let mut copy = var.clone();
            copy.name = mapping.alias.clone();
            scope.variables.push(copy);
        }
    }
    for &sub in &other.subprograms {
        let sub = index.get(sub);
        if sub.is_procedure() && sub.name == mapping.original {
            let mut copy = sub.procedure_entry();
            copy.name = mapping.alias.clone();
            scope.procedures.push(copy);
        }
    }
}
