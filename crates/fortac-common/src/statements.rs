//! Normalized statements and their upfront classification.
//!
//! The preprocessor emits one `Statement` per logical Fortran statement
//! (continuation lines already joined, conditional compilation resolved into
//! the `active` flag). The grammar phase classifies each statement exactly
//! once into a tagged `StatementKind`; all later phases dispatch on the tag
//! instead of re-parsing the text against multiple candidate grammars.
//!
//! Scope-opening statements and `use` statements carry their parsed header
//! in the tag. Declaration, attribute, and `!$acc declare` statements stay
//! unparsed here: their free text is expensive to parse and is handed to the
//! indexer's worker pools instead.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::position::SourceLocation;
use crate::scan::{find_top_level, is_identifier, paren_inner, split_top_level, take_identifier};

/// One normalized statement from the preprocessor.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub location: SourceLocation,
    /// False when the statement sits in an inactive conditional-compilation
    /// branch; the indexer skips it but keeps it for snippet extraction.
    pub active: bool,
    /// Statement text with continuations joined, lowercased by the
    /// preprocessor.
    pub body: String,
}

impl Statement {
    pub fn new(file: &str, line: u32, active: bool, body: impl Into<String>) -> Self {
        Statement {
            location: SourceLocation::new(file, line),
            active,
            body: body.into(),
        }
    }
}

/// Which scope an `end` statement closes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndKind {
    Module,
    Program,
    Subroutine,
    Function,
    Type,
}

/// One `alias => original` pair from a `use` statement. A plain name in an
/// only-list is represented with `alias == original`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub original: String,
    pub alias: String,
}

impl Rename {
    pub fn new(original: impl Into<String>, alias: impl Into<String>) -> Self {
        Rename {
            original: original.into(),
            alias: alias.into(),
        }
    }
}

/// A used-module edge as written in source: `use [, qualifiers ::] name`
/// optionally followed by an only-list or bare renamings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedModule {
    pub name: String,
    /// Import qualifiers such as `intrinsic`.
    pub qualifiers: Vec<String>,
    /// Selective-import list; empty means whole-module import.
    pub only: Vec<Rename>,
    /// Renamings attached to a whole-module import (`use a, b1 => a1`).
    pub renamings: Vec<Rename>,
    /// Location of the `use` statement; classification leaves this at the
    /// default and the index builder fills it in.
    #[serde(default)]
    pub location: SourceLocation,
}

impl UsedModule {
    pub fn is_intrinsic(&self) -> bool {
        self.qualifiers.iter().any(|q| q == "intrinsic")
    }
}

/// Upfront classification of one statement.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementKind {
    Module {
        name: String,
    },
    Program {
        name: String,
    },
    Subroutine {
        attributes: Vec<String>,
        name: String,
        dummy_args: Vec<String>,
    },
    Function {
        attributes: Vec<String>,
        name: String,
        dummy_args: Vec<String>,
        result: Option<String>,
    },
    TypeStart {
        name: String,
    },
    End(EndKind),
    Use(UsedModule),
    /// Variable declaration; text is parsed later by the declaration pool.
    Declaration,
    /// `attributes(...) :: ...` statement; parsed by the attribute pool.
    Attributes,
    /// `!$acc declare ...` directive; parsed by the attribute pool.
    AccDeclare,
    /// `!$acc routine ...` directive; applied inline to the open procedure.
    AccRoutine,
    ImplicitNone,
    /// Anything the indexer does not care about (executable statements,
    /// interface blocks, comments that survived preprocessing, ...).
    Other,
}

static END_KINDS: Lazy<FxHashMap<&'static str, EndKind>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    m.insert("module", EndKind::Module);
    m.insert("program", EndKind::Program);
    m.insert("subroutine", EndKind::Subroutine);
    m.insert("function", EndKind::Function);
    m.insert("type", EndKind::Type);
    m
});

const TYPE_KEYWORDS: [&str; 7] = [
    "character",
    "complex",
    "double",
    "doubleprecision",
    "integer",
    "logical",
    "real",
];

/// Whether `tok` starts with `kw` at a word boundary: the next character
/// must not continue an identifier, so `integer::i` matches `integer` but
/// `integer_count` does not.
fn keyword_prefix(tok: &str, kw: &str) -> bool {
    tok.strip_prefix(kw).is_some_and(|rest| {
        rest.chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
    })
}

/// Classify one statement body. The text is lowercased and trimmed first, so
/// callers may pass raw preprocessor output.
pub fn classify(body: &str) -> StatementKind {
    let lower = body.trim().to_ascii_lowercase();
    let toks: Vec<&str> = lower.split_whitespace().collect();
    let Some(&t0) = toks.first() else {
        return StatementKind::Other;
    };

    // Accelerator directive sentinels (free and fixed form).
    if matches!(t0, "!$acc" | "c$acc" | "*$acc") {
        return match toks.get(1).copied() {
            Some("declare") => StatementKind::AccDeclare,
            Some("routine") => StatementKind::AccRoutine,
            _ => StatementKind::Other,
        };
    }

    if let Some(kind) = end_kind(&toks) {
        return StatementKind::End(kind);
    }

    if t0 == "use" || t0.starts_with("use,") || t0.starts_with("use::") {
        return parse_use(&lower);
    }
    match t0 {
        "implicit" => {
            return if toks.get(1).copied() == Some("none") {
                StatementKind::ImplicitNone
            } else {
                StatementKind::Other
            };
        }
        "module" => {
            // `module procedure` inside an interface block is not a scope.
            return match toks.get(1).copied() {
                None | Some("procedure") => StatementKind::Other,
                Some(name) => StatementKind::Module {
                    name: take_identifier(name).0.to_string(),
                },
            };
        }
        "program" => {
            return match toks.get(1).copied() {
                None => StatementKind::Other,
                Some(name) => StatementKind::Program {
                    name: take_identifier(name).0.to_string(),
                },
            };
        }
        _ => {}
    }

    // `attributes(global) subroutine f(a)` opens a scope, so procedure
    // headers win over everything that merely shares a keyword.
    if toks.iter().any(|t| *t == "function") {
        return parse_function(&lower);
    }
    if toks.iter().any(|t| *t == "subroutine") {
        return parse_subroutine(&lower);
    }

    // `type t` / `type, bind(c) :: t` opens a derived type, while
    // `type(dim3) :: a` / `type (dim3) :: a` declares a variable of one.
    if keyword_prefix(t0, "type") {
        return if lower["type".len()..].trim_start().starts_with('(') {
            StatementKind::Declaration
        } else {
            parse_type_start(&lower)
        };
    }

    if keyword_prefix(t0, "attributes") {
        return StatementKind::Attributes;
    }

    if TYPE_KEYWORDS.iter().any(|kw| keyword_prefix(t0, kw)) {
        return StatementKind::Declaration;
    }

    StatementKind::Other
}

fn end_kind(toks: &[&str]) -> Option<EndKind> {
    let t0 = toks[0];
    if t0 == "end" {
        return toks.get(1).and_then(|t1| END_KINDS.get(t1).copied());
    }
    t0.strip_prefix("end")
        .and_then(|rest| END_KINDS.get(rest).copied())
}

fn parse_use(lower: &str) -> StatementKind {
    let mut rest = lower["use".len()..].trim_start();
    let mut qualifiers = Vec::new();
    if let Some(after_comma) = rest.strip_prefix(',') {
        let Some(sep) = after_comma.find("::") else {
            return StatementKind::Other;
        };
        for q in after_comma[..sep].split(',') {
            let q = q.trim();
            if !q.is_empty() {
                qualifiers.push(q.to_string());
            }
        }
        rest = after_comma[sep + 2..].trim_start();
    } else if let Some(after) = rest.strip_prefix("::") {
        rest = after.trim_start();
    }

    let (name_part, tail) = match find_top_level(rest, ",") {
        Some(i) => (rest[..i].trim(), rest[i + 1..].trim()),
        None => (rest.trim(), ""),
    };
    if !is_identifier(name_part) {
        return StatementKind::Other;
    }

    let mut only = Vec::new();
    let mut renamings = Vec::new();
    if let Some(after_only) = tail.strip_prefix("only") {
        let list = after_only.trim_start().strip_prefix(':').unwrap_or("");
        for item in split_top_level(list, ',') {
            if let Some(rename) = parse_rename(item) {
                only.push(rename);
            }
        }
    } else if !tail.is_empty() {
        for item in split_top_level(tail, ',') {
            // A bare renaming list only makes sense with `=>` pairs.
            if item.contains("=>")
                && let Some(rename) = parse_rename(item)
            {
                renamings.push(rename);
            }
        }
    }

    StatementKind::Use(UsedModule {
        name: name_part.to_string(),
        qualifiers,
        only,
        renamings,
        location: SourceLocation::default(),
    })
}

fn parse_rename(item: &str) -> Option<Rename> {
    let item = item.trim();
    if item.is_empty() {
        return None;
    }
    if let Some((alias, original)) = item.split_once("=>") {
        Some(Rename::new(original.trim(), alias.trim()))
    } else {
        Some(Rename::new(item, item))
    }
}

fn parse_type_start(lower: &str) -> StatementKind {
    let rest = lower["type".len()..].trim_start();
    let name_part = match rest.find("::") {
        Some(pos) => rest[pos + 2..].trim_start(),
        None => rest,
    };
    let (name, _) = take_identifier(name_part);
    if name.is_empty() {
        return StatementKind::Other;
    }
    StatementKind::TypeStart {
        name: name.to_string(),
    }
}

fn parse_subroutine(lower: &str) -> StatementKind {
    let Some(pos) = find_keyword(lower, "subroutine") else {
        return StatementKind::Other;
    };
    let attributes = parse_prefix_attributes(&lower[..pos]);
    let rest = lower[pos + "subroutine".len()..].trim_start();
    let (name, after) = take_identifier(rest);
    if name.is_empty() {
        return StatementKind::Other;
    }
    StatementKind::Subroutine {
        attributes,
        name: name.to_string(),
        dummy_args: parse_arg_list(after).0,
    }
}

fn parse_function(lower: &str) -> StatementKind {
    let Some(pos) = find_keyword(lower, "function") else {
        return StatementKind::Other;
    };
    let attributes = parse_prefix_attributes(&lower[..pos]);
    let rest = lower[pos + "function".len()..].trim_start();
    let (name, after) = take_identifier(rest);
    if name.is_empty() {
        return StatementKind::Other;
    }
    let (dummy_args, remainder) = parse_arg_list(after);
    let result = remainder
        .trim_start()
        .strip_prefix("result")
        .and_then(|r| paren_inner(r.trim_start()))
        .map(|(inner, _)| inner.trim().to_string());
    StatementKind::Function {
        attributes,
        name: name.to_string(),
        dummy_args,
        result,
    }
}

/// Find `kw` as a standalone word outside parentheses.
fn find_keyword(s: &str, kw: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(found) = find_top_level(&s[offset..], kw) {
        let pos = offset + found;
        let before_ok = pos == 0
            || s[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        let after = &s[pos + kw.len()..];
        let after_ok = after
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        if before_ok && after_ok {
            return Some(pos);
        }
        offset = pos + kw.len();
    }
    None
}

/// Parse the tokens before a `subroutine`/`function` keyword into a flat
/// qualifier list: `attributes(global)` contributes `global`, a result-type
/// prefix such as `real(8)` or `pure` is kept verbatim.
fn parse_prefix_attributes(prefix: &str) -> Vec<String> {
    let mut attributes = Vec::new();
    for tok in split_top_level(prefix.trim(), ' ') {
        let tok = tok.trim().trim_matches(',');
        if tok.is_empty() {
            continue;
        }
        if let Some(rest) = tok.strip_prefix("attributes")
            && let Some((inner, _)) = paren_inner(rest.trim_start())
        {
            for attr in inner.split(',') {
                attributes.push(attr.trim().to_string());
            }
        } else {
            attributes.push(tok.to_string());
        }
    }
    attributes
}

/// Parse a parenthesized dummy-argument list; returns the names and the
/// remainder after the close paren.
fn parse_arg_list(after: &str) -> (Vec<String>, &str) {
    let after = after.trim_start();
    match paren_inner(after) {
        Some((inner, rest)) => {
            let args = inner
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            (args, rest)
        }
        None => (Vec::new(), after),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_scope_openers() {
        assert_eq!(
            classify("module simulation_state"),
            StatementKind::Module {
                name: "simulation_state".to_string()
            }
        );
        assert_eq!(
            classify("program main"),
            StatementKind::Program {
                name: "main".to_string()
            }
        );
        assert_eq!(
            classify("type :: particle"),
            StatementKind::TypeStart {
                name: "particle".to_string()
            }
        );
        assert_eq!(
            classify("type, bind(c) :: cell"),
            StatementKind::TypeStart {
                name: "cell".to_string()
            }
        );
    }

    #[test]
    fn module_procedure_is_not_a_scope() {
        assert_eq!(classify("module procedure add_reals"), StatementKind::Other);
    }

    #[test]
    fn classifies_end_statements() {
        assert_eq!(classify("end module"), StatementKind::End(EndKind::Module));
        assert_eq!(
            classify("endsubroutine kernel"),
            StatementKind::End(EndKind::Subroutine)
        );
        assert_eq!(classify("end type"), StatementKind::End(EndKind::Type));
        // A bare `end` carries no kind and is left to the grammar phase.
        assert_eq!(classify("end"), StatementKind::Other);
    }

    #[test]
    fn subroutine_header_with_device_attributes() {
        let kind = classify("attributes(global) subroutine saxpy(n, a, x, y)");
        assert_eq!(
            kind,
            StatementKind::Subroutine {
                attributes: vec!["global".to_string()],
                name: "saxpy".to_string(),
                dummy_args: vec![
                    "n".to_string(),
                    "a".to_string(),
                    "x".to_string(),
                    "y".to_string()
                ],
            }
        );
    }

    #[test]
    fn function_header_with_result() {
        let kind = classify("pure real function norm2(v) result(r)");
        assert_eq!(
            kind,
            StatementKind::Function {
                attributes: vec!["pure".to_string(), "real".to_string()],
                name: "norm2".to_string(),
                dummy_args: vec!["v".to_string()],
                result: Some("r".to_string()),
            }
        );
    }

    #[test]
    fn use_with_only_and_rename() {
        let StatementKind::Use(um) = classify("use constants, only: pi, tau => two_pi") else {
            panic!("expected use statement");
        };
        assert_eq!(um.name, "constants");
        assert_eq!(
            um.only,
            vec![Rename::new("pi", "pi"), Rename::new("two_pi", "tau")]
        );
        assert!(um.renamings.is_empty());
    }

    #[test]
    fn use_with_bare_renamings() {
        let StatementKind::Use(um) = classify("use grid, nx_local => nx") else {
            panic!("expected use statement");
        };
        assert!(um.only.is_empty());
        assert_eq!(um.renamings, vec![Rename::new("nx", "nx_local")]);
    }

    #[test]
    fn use_intrinsic_module() {
        let StatementKind::Use(um) = classify("use, intrinsic :: iso_c_binding") else {
            panic!("expected use statement");
        };
        assert_eq!(um.name, "iso_c_binding");
        assert!(um.is_intrinsic());
    }

    #[test]
    fn declarations_and_attribute_statements() {
        assert_eq!(classify("integer :: i, j"), StatementKind::Declaration);
        assert_eq!(
            classify("real(kind=8), intent(in) :: x(n)"),
            StatementKind::Declaration
        );
        assert_eq!(classify("type(dim3) :: grid"), StatementKind::Declaration);
        assert_eq!(
            classify("double precision :: d"),
            StatementKind::Declaration
        );
        assert_eq!(
            classify("attributes(device) :: a_d, b_d"),
            StatementKind::Attributes
        );
    }

    #[test]
    fn keyword_prefixed_identifiers_are_not_keywords() {
        // Executable statements whose first identifier merely begins with a
        // type keyword must stay unclassified.
        assert_eq!(classify("doubled = 2"), StatementKind::Other);
        assert_eq!(
            classify("integer_count = integer_count + 1"),
            StatementKind::Other
        );
        assert_eq!(classify("typed_value = 1"), StatementKind::Other);
        assert_eq!(classify("realistic = .true."), StatementKind::Other);
        assert_eq!(classify("attributes_seen = 0"), StatementKind::Other);
        // The boundary may be punctuation, not only whitespace.
        assert_eq!(classify("integer::i"), StatementKind::Declaration);
        assert_eq!(classify("integer*8 :: n"), StatementKind::Declaration);
        assert_eq!(classify("type (dim3) :: grid"), StatementKind::Declaration);
    }

    #[test]
    fn acc_directives() {
        assert_eq!(
            classify("!$acc declare create(a_d)"),
            StatementKind::AccDeclare
        );
        assert_eq!(classify("!$acc routine seq"), StatementKind::AccRoutine);
        assert_eq!(classify("!$acc parallel loop"), StatementKind::Other);
    }

    #[test]
    fn implicit_none_statement() {
        assert_eq!(classify("implicit none"), StatementKind::ImplicitNone);
        assert_eq!(classify("implicit real (a-h)"), StatementKind::Other);
    }
}
