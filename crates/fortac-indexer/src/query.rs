//! Name lookups against a flattened scope.
//!
//! Variable lookups understand derived-type member chains (`a%b%c`) and,
//! when the scope is not under `implicit none`, fall back to Fortran's
//! implicit typing rules for plain identifiers.

use fortac_common::scan::{is_identifier, strip_array_indexing};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::scope::ScopeResolver;
use crate::types::{
    DerivedType, FortranType, Index, Procedure, QualifierList, Scope, Variable, create_index_var,
};

/// Resolve a variable expression in a scope. Array indexing is stripped
/// first, so `a(i,j)%b(k)` resolves like `a%b`. Member chains walk from the
/// base variable through the derived types visible in the scope.
pub fn search_scope_for_var(scope: &Scope, var_expr: &str) -> Result<Variable> {
    let stripped = strip_array_indexing(var_expr.trim());
    let expr = stripped.to_ascii_lowercase();
    let segments: Vec<&str> = expr.split('%').map(str::trim).collect();

    if let Some(var) = lookup_chain(scope, &segments) {
        return Ok(var.clone());
    }

    // A plain identifier without a declaration gets its type from the
    // first-letter rule unless the scope runs under `implicit none`.
    if segments.len() == 1 && is_identifier(segments[0]) && !scope.implicit_none {
        debug!(name = segments[0], "falling back to implicit typing");
        return Ok(implicitly_typed_var(segments[0]));
    }
    Err(IndexError::lookup(&expr))
}

fn lookup_chain<'s>(scope: &'s Scope, segments: &[&str]) -> Option<&'s Variable> {
    let (first, rest) = segments.split_first()?;
    let mut var = scope.variables.iter().rev().find(|v| &v.name == first)?;
    for segment in rest {
        let dtype = find_type_of(scope, var)?;
        var = dtype.variables.iter().rev().find(|v| &v.name == segment)?;
    }
    Some(var)
}

fn find_type_of<'s>(scope: &'s Scope, var: &Variable) -> Option<&'s DerivedType> {
    if var.f_type != FortranType::Derived {
        return None;
    }
    let type_name = var.kind.as_deref()?;
    scope.types.iter().rev().find(|t| t.name == type_name)
}

/// Implicit typing: names starting with `i` through `n` are integers,
/// everything else is a real. Generated temporaries prefixed with `_i` are
/// integers as well.
fn implicitly_typed_var(name: &str) -> Variable {
    let f_type = match name.chars().next() {
        Some(c @ 'i'..='n') if c.is_ascii_lowercase() => FortranType::Integer,
        _ if name.starts_with("_i") => FortranType::Integer,
        _ => FortranType::Real,
    };
    create_index_var(f_type, None, name, QualifierList::new(), Vec::new(), None, 0)
}

/// Resolve a derived-type name in a scope. Innermost definition wins.
pub fn search_scope_for_type<'s>(scope: &'s Scope, name: &str) -> Result<&'s DerivedType> {
    let lower = name.trim().to_ascii_lowercase();
    scope
        .types
        .iter()
        .rev()
        .find(|t| t.name == lower)
        .ok_or_else(|| IndexError::lookup(&lower))
}

/// Resolve a procedure name in a scope. Innermost definition wins.
pub fn search_scope_for_procedure<'s>(scope: &'s Scope, name: &str) -> Result<&'s Procedure> {
    let lower = name.trim().to_ascii_lowercase();
    scope
        .procedures
        .iter()
        .rev()
        .find(|p| p.name == lower)
        .ok_or_else(|| IndexError::lookup(&lower))
}

/// Build the scope for `tag` and resolve a variable expression in it.
pub fn search_index_for_var(
    resolver: &mut ScopeResolver,
    index: &Index,
    tag: &str,
    var_expr: &str,
) -> Result<Variable> {
    let scope = resolver.create_scope(index, tag)?;
    search_scope_for_var(&scope, var_expr)
}

/// Build the scope for `tag` and resolve a derived-type name in it.
pub fn search_index_for_type(
    resolver: &mut ScopeResolver,
    index: &Index,
    tag: &str,
    name: &str,
) -> Result<DerivedType> {
    let scope = resolver.create_scope(index, tag)?;
    search_scope_for_type(&scope, name).cloned()
}

/// Build the scope for `tag` and resolve a procedure name in it.
pub fn search_index_for_procedure(
    resolver: &mut ScopeResolver,
    index: &Index,
    tag: &str,
    name: &str,
) -> Result<Procedure> {
    let scope = resolver.create_scope(index, tag)?;
    search_scope_for_procedure(&scope, name).cloned()
}
