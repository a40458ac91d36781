//! Module-file persistence.
//!
//! Each top-level record is serialized to one JSON document next to the
//! compiler's own module artifacts, so later translation units can resolve
//! `use` edges without re-indexing their dependencies' sources. The document
//! nests subprograms recursively; arena ids are rebuilt on load.

use std::fs;
use std::path::Path;

use fortac_common::UsedModule;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::options::IndexerOptions;
use crate::types::{DerivedType, Index, Record, RecordId, RecordKind, Variable};

/// Suffix of persisted module files, e.g. `simulation_state.fortac_mod`.
pub const MODULE_FILE_SUFFIX: &str = ".fortac_mod";

/// Serialized form of one record. Subprograms nest instead of referring to
/// arena ids, so a document is self-contained.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RecordDoc {
    kind: RecordKind,
    name: String,
    #[serde(default)]
    attributes: SmallVec<[String; 4]>,
    #[serde(default)]
    dummy_args: SmallVec<[String; 4]>,
    #[serde(default)]
    result_name: Option<String>,
    #[serde(default)]
    implicit_none: bool,
    #[serde(default)]
    variables: Vec<Variable>,
    #[serde(default)]
    types: Vec<DerivedType>,
    #[serde(default)]
    used_modules: Vec<UsedModule>,
    #[serde(default)]
    statements: Vec<String>,
    #[serde(default)]
    subprograms: Vec<RecordDoc>,
}

fn record_to_doc(index: &Index, id: RecordId) -> RecordDoc {
    let record = index.get(id);
    RecordDoc {
        kind: record.kind,
        name: record.name.clone(),
        attributes: record.attributes.clone(),
        dummy_args: record.dummy_args.clone(),
        result_name: record.result_name.clone(),
        implicit_none: record.implicit_none,
        variables: record.variables.clone(),
        types: record.types.clone(),
        used_modules: record.used_modules.clone(),
        statements: record.statements.clone(),
        subprograms: record
            .subprograms
            .iter()
            .map(|&sub| record_to_doc(index, sub))
            .collect(),
    }
}

fn doc_into_index(doc: RecordDoc, index: &mut Index, parent: Option<RecordId>) -> RecordId {
    let mut record = Record::new(doc.kind, doc.name, parent);
    record.attributes = doc.attributes;
    record.dummy_args = doc.dummy_args;
    record.result_name = doc.result_name;
    record.implicit_none = doc.implicit_none;
    record.variables = doc.variables;
    record.types = doc.types;
    record.used_modules = doc.used_modules;
    record.statements = doc.statements;
    let id = index.alloc(record);
    for sub in doc.subprograms {
        let sub_id = doc_into_index(sub, index, Some(id));
        index.get_mut(id).subprograms.push(sub_id);
    }
    id
}

/// Write one module file per top-level record of `index` into `output_dir`.
#[tracing::instrument(level = "debug", skip(index, options))]
pub fn write_module_files(
    index: &Index,
    output_dir: &Path,
    options: &IndexerOptions,
) -> Result<()> {
    for (id, record) in index.top_level() {
        let doc = record_to_doc(index, id);
        let text = if options.pretty_print_module_files {
            serde_json::to_string_pretty(&doc)
        } else {
            serde_json::to_string(&doc)
        }
        .map_err(|e| IndexError::internal(format!("serializing '{}': {e}", record.name)))?;

        let path = output_dir.join(format!("{}{}", record.name, MODULE_FILE_SUFFIX));
        fs::write(&path, text).map_err(|e| IndexError::io(&path, e))?;
        info!(name = %record.name, path = %path.display(), "wrote module file");
    }
    Ok(())
}

/// Load every module file found in `search_dirs` into `index`, skipping
/// documents whose top-level name is already present. Module files are
/// compiler-generated and trusted; a file that fails to parse is an error,
/// not a skip.
#[tracing::instrument(level = "debug", skip(index))]
pub fn load_module_files(search_dirs: &[&Path], index: &mut Index) -> Result<()> {
    for dir in search_dirs {
        let entries = fs::read_dir(dir).map_err(|e| IndexError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| IndexError::io(dir, e))?;
            let path = entry.path();
            let is_module_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(MODULE_FILE_SUFFIX));
            if !is_module_file {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| IndexError::io(&path, e))?;
            let doc: RecordDoc = serde_json::from_str(&text).map_err(|e| {
                IndexError::internal(format!("parsing '{}': {e}", path.display()))
            })?;
            if index.top_level_by_name(&doc.name).is_some() {
                debug!(name = %doc.name, "module already indexed, skipping file");
                continue;
            }
            let id = doc_into_index(doc, index, None);
            index.top_level.push(id);
        }
    }
    Ok(())
}
