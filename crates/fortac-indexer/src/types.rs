//! The index data model: records, variables, derived types, and scopes.
//!
//! Records live in an arena owned by the [`Index`] and are addressed by
//! stable [`RecordId`] handles; parent links are non-owning handles used only
//! for traversal. Scopes are flattened, shadow-ordered views built on demand
//! by the scope resolver; every entry in a scope is an owned copy, so cached
//! scopes never alias records of a later-merged index.

use fortac_common::UsedModule;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Stable handle into the index's record arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Module,
    Program,
    Subroutine,
    Function,
    DerivedType,
}

/// Declared base type of a variable. A `Derived` variable stores its type
/// name in the `kind` slot, mirroring how `type(particle) :: p` reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FortranType {
    Integer,
    Real,
    DoublePrecision,
    Complex,
    Logical,
    Character,
    Derived,
}

impl FortranType {
    /// Element size in bytes, when it can be derived from type and kind.
    /// Non-literal kind expressions and derived types stay unknown.
    pub fn num_bytes(self, kind: Option<&str>) -> Option<u32> {
        let literal_kind = kind.and_then(|k| k.trim().parse::<u32>().ok());
        match self {
            FortranType::Integer | FortranType::Logical => {
                match (kind, literal_kind) {
                    (None, _) => Some(4),
                    (_, Some(k @ (1 | 2 | 4 | 8))) => Some(k),
                    _ => None,
                }
            }
            FortranType::Real => match (kind, literal_kind) {
                (None, _) => Some(4),
                (_, Some(k @ (4 | 8))) => Some(k),
                _ => None,
            },
            FortranType::DoublePrecision => Some(8),
            FortranType::Complex => match (kind, literal_kind) {
                (None, _) => Some(8),
                (_, Some(4)) => Some(8),
                (_, Some(8)) => Some(16),
                _ => None,
            },
            FortranType::Character => Some(1),
            FortranType::Derived => None,
        }
    }

    /// Target-language representation the code generator will emit for this
    /// type. Derived types map to their own (translated) type name.
    pub fn c_type(self, kind: Option<&str>) -> Option<String> {
        let bytes = self.num_bytes(kind);
        let name = match self {
            FortranType::Integer => match bytes {
                Some(1) => "signed char",
                Some(2) => "short",
                Some(8) => "long",
                _ => "int",
            },
            FortranType::Real => match bytes {
                Some(8) => "double",
                _ => "float",
            },
            FortranType::DoublePrecision => "double",
            FortranType::Complex => match bytes {
                Some(16) => "hipDoubleComplex",
                _ => "hipFloatComplex",
            },
            FortranType::Logical => "bool",
            FortranType::Character => "char",
            FortranType::Derived => return kind.map(str::to_string),
        };
        Some(name.to_string())
    }
}

/// How a variable is mapped to accelerator memory by a `declare` directive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    #[default]
    None,
    Alloc,
    To,
    From,
    ToFrom,
}

pub type QualifierList = SmallVec<[String; 4]>;

/// One declared variable, produced by the declaration worker pool. The only
/// post-creation mutation is the qualifier/residency merge applied by the
/// attribute pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub f_type: FortranType,
    /// Kind/len parameter text, or the type name for derived-type variables.
    pub kind: Option<String>,
    pub bytes_per_element: Option<u32>,
    pub c_type: Option<String>,
    pub qualifiers: QualifierList,
    #[serde(default)]
    pub residency: Residency,
    /// Per-dimension bound expressions, verbatim.
    pub bounds: Vec<String>,
    pub rank: usize,
    /// Initializer text for parameters and initialized variables.
    pub rhs: Option<String>,
    /// Position of the declaring statement in its file's statement stream;
    /// used to restore declaration order after concurrent parsing.
    #[serde(default)]
    pub decl_index: u32,
}

/// Build a variable record from its parsed parts, deriving element size and
/// target representation.
pub fn create_index_var(
    f_type: FortranType,
    kind: Option<String>,
    name: impl Into<String>,
    qualifiers: QualifierList,
    bounds: Vec<String>,
    rhs: Option<String>,
    decl_index: u32,
) -> Variable {
    let bytes_per_element = f_type.num_bytes(kind.as_deref());
    let c_type = f_type.c_type(kind.as_deref());
    let rank = bounds.len();
    Variable {
        name: name.into(),
        f_type,
        kind,
        bytes_per_element,
        c_type,
        qualifiers,
        residency: Residency::None,
        bounds,
        rank,
        rhs,
        decl_index,
    }
}

/// A derived-type definition with its member variables. The statement range
/// of the definition is captured for later re-emission as a device struct.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedType {
    pub name: String,
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub statements: Vec<String>,
}

/// An index entry for a module, program, procedure, or derived type.
#[derive(Clone, Debug)]
pub struct Record {
    pub kind: RecordKind,
    pub name: String,
    /// Non-owning parent link, for traversal only.
    pub parent: Option<RecordId>,
    pub variables: Vec<Variable>,
    pub types: Vec<DerivedType>,
    /// Owned child subprograms, in declaration order.
    pub subprograms: Vec<RecordId>,
    pub used_modules: Vec<UsedModule>,
    /// Procedure qualifiers (`host`, `device`, `global`, ...).
    pub attributes: SmallVec<[String; 4]>,
    /// Dummy-argument names of a procedure.
    pub dummy_args: SmallVec<[String; 4]>,
    /// Result-variable name of a function; defaults to the function name.
    pub result_name: Option<String>,
    /// Whether the record declares `implicit none`.
    pub implicit_none: bool,
    /// Re-extractable statement snippet, captured for device-callable
    /// procedures when the record's end statement is seen.
    pub statements: Vec<String>,
}

impl Record {
    pub fn new(kind: RecordKind, name: impl Into<String>, parent: Option<RecordId>) -> Self {
        Record {
            kind,
            name: name.into(),
            parent,
            variables: Vec::new(),
            types: Vec::new(),
            subprograms: Vec::new(),
            used_modules: Vec::new(),
            attributes: SmallVec::new(),
            dummy_args: SmallVec::new(),
            result_name: None,
            implicit_none: false,
            statements: Vec::new(),
        }
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self.kind, RecordKind::Subroutine | RecordKind::Function)
    }

    /// Procedures carrying `global` or any `device` flavor get their bodies
    /// re-emitted as kernels and must keep their statement range.
    pub fn is_device_callable(&self) -> bool {
        self.is_procedure()
            && self
                .attributes
                .iter()
                .any(|a| a == "global" || a.contains("device"))
    }

    /// Flattened view of this record as a callable, for scope entries.
    pub fn procedure_entry(&self) -> Procedure {
        Procedure {
            kind: self.kind,
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            dummy_args: self.dummy_args.clone(),
            result_name: self.result_name.clone(),
        }
    }
}

/// A procedure as visible from a scope: enough to decide callability,
/// launch configuration, and argument shapes, without owning the body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub kind: RecordKind,
    pub name: String,
    pub attributes: SmallVec<[String; 4]>,
    pub dummy_args: SmallVec<[String; 4]>,
    pub result_name: Option<String>,
}

/// The whole-program symbol index: an arena of records plus the ordered
/// top-level entries. Append-only during a build, read-only afterwards
/// except for explicit merges of other files' indexes.
#[derive(Clone, Debug, Default)]
pub struct Index {
    pub(crate) records: Vec<Record>,
    pub(crate) top_level: Vec<RecordId>,
}

impl Index {
    pub fn new() -> Self {
        Index::default()
    }

    pub fn get(&self, id: RecordId) -> &Record {
        &self.records[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: RecordId) -> &mut Record {
        &mut self.records[id.0 as usize]
    }

    pub fn alloc(&mut self, record: Record) -> RecordId {
        let id = RecordId(self.records.len() as u32);
        self.records.push(record);
        id
    }

    pub fn top_level(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.top_level.iter().map(|&id| (id, self.get(id)))
    }

    pub fn top_level_by_name(&self, name: &str) -> Option<RecordId> {
        self.top_level
            .iter()
            .copied()
            .find(|&id| self.get(id).name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty()
    }
}

/// Where a concurrently parsed declaration lands: a record's own variable
/// list, or a member list of the record's `slot`-th derived type. Type slots
/// are stable because a record's type list is append-only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum VarTarget {
    Record(RecordId),
    DerivedType(RecordId, usize),
}

impl VarTarget {
    pub(crate) fn variables_mut(self, records: &mut [Record]) -> &mut Vec<Variable> {
        match self {
            VarTarget::Record(id) => &mut records[id.0 as usize].variables,
            VarTarget::DerivedType(id, slot) => &mut records[id.0 as usize].types[slot].variables,
        }
    }
}

/// Flattened, shadow-ordered view of everything visible at one lexical
/// point. Innermost entries are appended last; lookups scan in reverse.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scope {
    /// Colon-joined lexical path, e.g. `mymod:mysub`.
    pub tag: String,
    pub types: Vec<DerivedType>,
    pub variables: Vec<Variable>,
    pub procedures: Vec<Procedure>,
    /// Whether any record on the path declares `implicit none`.
    pub implicit_none: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_follow_kind() {
        assert_eq!(FortranType::Integer.num_bytes(None), Some(4));
        assert_eq!(FortranType::Integer.num_bytes(Some("8")), Some(8));
        assert_eq!(FortranType::Real.num_bytes(Some("8")), Some(8));
        assert_eq!(FortranType::DoublePrecision.num_bytes(None), Some(8));
        assert_eq!(FortranType::Complex.num_bytes(Some("8")), Some(16));
        // Kind expressions that are not literals stay unknown.
        assert_eq!(FortranType::Real.num_bytes(Some("dp")), None);
        assert_eq!(FortranType::Derived.num_bytes(Some("particle")), None);
    }

    #[test]
    fn c_types_follow_kind() {
        assert_eq!(FortranType::Integer.c_type(None).as_deref(), Some("int"));
        assert_eq!(FortranType::Real.c_type(Some("8")).as_deref(), Some("double"));
        assert_eq!(
            FortranType::Derived.c_type(Some("particle")).as_deref(),
            Some("particle")
        );
    }

    #[test]
    fn device_callable_detection() {
        let mut rec = Record::new(RecordKind::Subroutine, "saxpy", None);
        assert!(!rec.is_device_callable());
        rec.attributes.push("global".to_string());
        assert!(rec.is_device_callable());

        let mut host = Record::new(RecordKind::Function, "norm", None);
        host.attributes.push("host".to_string());
        host.attributes.push("device:gang".to_string());
        assert!(host.is_device_callable());
    }
}
