//! Parsing of variable declaration statements.
//!
//! This is the expensive free-text parsing the tree walk hands to the
//! declaration worker pool. One statement yields zero or more variables
//! (`integer :: i, j(n), k = 0` yields three). Failure here is fatal to the
//! build: the input is assumed syntactically valid Fortran, so an
//! unparseable declaration is a gap in this parser, not a user error.

use fortac_common::scan::{find_top_level, is_identifier, paren_inner, split_top_level, take_identifier};

use crate::types::{FortranType, QualifierList, Variable, create_index_var};

/// Parse one declaration statement into its variables. `decl_index` is the
/// statement's position in the stream, kept for deterministic post-sorting.
pub(crate) fn parse_declaration(text: &str, decl_index: u32) -> Result<Vec<Variable>, String> {
    let lower = text.trim().to_ascii_lowercase();
    let (f_type, type_kind, rest) = parse_type_spec(&lower)?;

    let (qualifiers, default_bounds, entities) = match find_top_level(rest, "::") {
        Some(pos) => {
            let (quals, bounds) = parse_qualifiers(&rest[..pos])?;
            (quals, bounds, rest[pos + 2..].trim())
        }
        None => {
            let rest = rest.trim();
            if rest.starts_with(',') {
                return Err("qualifier list without '::'".to_string());
            }
            (QualifierList::new(), Vec::new(), rest)
        }
    };
    if entities.is_empty() {
        return Err("no declared entities".to_string());
    }

    let mut variables = Vec::new();
    for entity in split_top_level(entities, ',') {
        let entity = entity.trim();
        if entity.is_empty() {
            return Err("empty entity in declaration list".to_string());
        }

        // Split off an initializer: `n = 16` or pointer init `p => null()`.
        let (head, rhs) = match find_top_level(entity, "=") {
            Some(pos) => {
                let after = entity[pos + 1..].trim_start();
                let rhs = after.strip_prefix('>').unwrap_or(after).trim();
                (entity[..pos].trim_end(), Some(rhs.to_string()))
            }
            None => (entity, None),
        };

        let (name, after_name) = take_identifier(head);
        if !is_identifier(name) {
            return Err(format!("'{head}' is not a declarable entity"));
        }

        let mut bounds: Vec<String> = Vec::new();
        let mut entity_kind = type_kind.clone();
        let mut tail = after_name.trim_start();
        if let Some((inner, rest_after)) = paren_inner(tail) {
            bounds = split_top_level(inner, ',')
                .iter()
                .map(|b| b.trim().to_string())
                .collect();
            tail = rest_after.trim_start();
        }
        // Per-entity character length: `character :: name*32`.
        if let Some(len) = tail.strip_prefix('*') {
            entity_kind = Some(len.trim().to_string());
            tail = "";
        }
        if !tail.is_empty() {
            return Err(format!("trailing text '{tail}' after entity '{name}'"));
        }
        if bounds.is_empty() {
            bounds = default_bounds.clone();
        }

        variables.push(create_index_var(
            f_type,
            entity_kind,
            name,
            qualifiers.clone(),
            bounds,
            rhs,
            decl_index,
        ));
    }
    Ok(variables)
}

/// Parse the leading type spec; returns the type, its kind/len parameter,
/// and the remaining statement text.
fn parse_type_spec(lower: &str) -> Result<(FortranType, Option<String>, &str), String> {
    for prefix in ["double precision", "doubleprecision"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return Ok((FortranType::DoublePrecision, None, rest));
        }
    }
    if let Some(rest) = lower.strip_prefix("type") {
        let rest = rest.trim_start();
        let (inner, after) =
            paren_inner(rest).ok_or_else(|| "expected '(' after 'type'".to_string())?;
        let name = inner.trim();
        if !is_identifier(name) {
            return Err(format!("'{name}' is not a type name"));
        }
        return Ok((FortranType::Derived, Some(name.to_string()), after));
    }

    const BASE_TYPES: [(&str, FortranType); 5] = [
        ("integer", FortranType::Integer),
        ("real", FortranType::Real),
        ("complex", FortranType::Complex),
        ("logical", FortranType::Logical),
        ("character", FortranType::Character),
    ];
    let (keyword, f_type) = BASE_TYPES
        .iter()
        .find(|(kw, _)| lower.starts_with(kw))
        .ok_or_else(|| "statement does not start with a type keyword".to_string())?;

    let mut rest = lower[keyword.len()..].trim_start();
    let mut kind = None;
    if let Some((inner, after)) = paren_inner(rest) {
        let inner = inner.trim();
        let spec = inner
            .strip_prefix("kind=")
            .or_else(|| inner.strip_prefix("len="))
            .unwrap_or(inner);
        kind = Some(spec.trim().to_string());
        rest = after;
    } else if let Some(after_star) = rest.strip_prefix('*') {
        // Old-style `integer*8` / `character*32`.
        let (len, after) = match after_star.find(|c: char| !c.is_ascii_digit()) {
            Some(end) => (&after_star[..end], &after_star[end..]),
            None => (after_star, ""),
        };
        if len.is_empty() {
            return Err("expected length after '*'".to_string());
        }
        kind = Some(len.to_string());
        rest = after;
    }
    Ok((*f_type, kind, rest))
}

/// Parse the comma-separated qualifier list between the type spec and `::`.
/// A `dimension(...)` qualifier turns into default bounds instead of a
/// qualifier string.
fn parse_qualifiers(text: &str) -> Result<(QualifierList, Vec<String>), String> {
    let mut qualifiers = QualifierList::new();
    let mut default_bounds = Vec::new();
    for part in split_top_level(text, ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(rest) = part.strip_prefix("dimension") {
            let (inner, _) = paren_inner(rest.trim_start())
                .ok_or_else(|| "expected '(' after 'dimension'".to_string())?;
            default_bounds = split_top_level(inner, ',')
                .iter()
                .map(|b| b.trim().to_string())
                .collect();
        } else {
            qualifiers.push(part.to_string());
        }
    }
    Ok((qualifiers, default_bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Residency;

    #[test]
    fn parses_plain_integer_list() {
        let vars = parse_declaration("integer :: i, j, k", 0).unwrap();
        assert_eq!(
            vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["i", "j", "k"]
        );
        for v in &vars {
            assert_eq!(v.f_type, FortranType::Integer);
            assert_eq!(v.bytes_per_element, Some(4));
            assert_eq!(v.rank, 0);
            assert_eq!(v.residency, Residency::None);
        }
    }

    #[test]
    fn parses_kind_and_qualifiers() {
        let vars = parse_declaration("real(kind=8), intent(in), device :: x(n), y(n,m)", 7).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].kind.as_deref(), Some("8"));
        assert_eq!(vars[0].bytes_per_element, Some(8));
        assert_eq!(vars[0].c_type.as_deref(), Some("double"));
        assert_eq!(vars[0].qualifiers.as_slice(), ["intent(in)", "device"]);
        assert_eq!(vars[0].bounds, vec!["n"]);
        assert_eq!(vars[1].bounds, vec!["n", "m"]);
        assert_eq!(vars[1].rank, 2);
        assert_eq!(vars[1].decl_index, 7);
    }

    #[test]
    fn dimension_supplies_default_bounds() {
        let vars = parse_declaration("integer, dimension(3,3) :: a, b(2)", 0).unwrap();
        assert_eq!(vars[0].bounds, vec!["3", "3"]);
        // An entity with its own bounds keeps them.
        assert_eq!(vars[1].bounds, vec!["2"]);
    }

    #[test]
    fn parses_parameter_with_initializer() {
        let vars = parse_declaration("integer, parameter :: block_size = 256", 0).unwrap();
        assert_eq!(vars[0].qualifiers.as_slice(), ["parameter"]);
        assert_eq!(vars[0].rhs.as_deref(), Some("256"));
    }

    #[test]
    fn parses_derived_type_variable() {
        let vars = parse_declaration("type(dim3) :: grid, block", 0).unwrap();
        assert_eq!(vars[0].f_type, FortranType::Derived);
        assert_eq!(vars[0].kind.as_deref(), Some("dim3"));
        assert_eq!(vars[0].c_type.as_deref(), Some("dim3"));
    }

    #[test]
    fn parses_star_kind_and_character_length() {
        let vars = parse_declaration("integer*8 :: n", 0).unwrap();
        assert_eq!(vars[0].kind.as_deref(), Some("8"));
        assert_eq!(vars[0].bytes_per_element, Some(8));

        let vars = parse_declaration("character :: label*32", 0).unwrap();
        assert_eq!(vars[0].kind.as_deref(), Some("32"));
    }

    #[test]
    fn parses_without_double_colon() {
        let vars = parse_declaration("double precision d", 0).unwrap();
        assert_eq!(vars[0].name, "d");
        assert_eq!(vars[0].bytes_per_element, Some(8));
    }

    #[test]
    fn parses_pointer_initializer() {
        let vars = parse_declaration("real, pointer :: p => null()", 0).unwrap();
        assert_eq!(vars[0].rhs.as_deref(), Some("null()"));
        assert_eq!(vars[0].qualifiers.as_slice(), ["pointer"]);
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert!(parse_declaration("integer ::", 0).is_err());
        assert!(parse_declaration("banana :: x", 0).is_err());
        assert!(parse_declaration("integer, :: 1x", 0).is_err());
    }
}
