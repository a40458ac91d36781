//! Index construction.
//!
//! A single-threaded cursor walks the classified statement stream once and
//! mirrors the lexical nesting into the record arena. Expensive free-text
//! parsing is decoupled from the structural scan: declaration statements are
//! submitted to a bounded worker pool that runs concurrently with the walk,
//! and attribute-style statements are queued as jobs for a second pool that
//! runs only after the declaration pool has drained (attributes target
//! previously declared variables). One mutex guards all cross-task appends
//! and mutations; critical sections are brief and never nest.

use std::sync::{Mutex, MutexGuard, PoisonError};

use fortac_common::{EndKind, SourceLocation, Statement, StatementKind, UsedModule, classify};
use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};

use crate::attributes::{PostParseJob, parse_acc_routine};
use crate::declarations::parse_declaration;
use crate::error::{IndexError, Result};
use crate::options::IndexerOptions;
use crate::types::{DerivedType, Index, Record, RecordId, RecordKind, VarTarget};

/// Lock a build-shared mutex; a poisoned lock only means another worker
/// already hit a fatal error, so the data is still usable for error
/// propagation.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a fresh index from one file's classified statement stream.
pub fn build_index(statements: &[Statement], options: &IndexerOptions) -> Result<Index> {
    let mut index = Index::new();
    update_index_from_statements(&mut index, statements, options)?;
    Ok(index)
}

/// Append one file's records to an existing index.
///
/// Both worker pools are fully drained before this returns, so the index is
/// complete and safe to hand to scope-builder callers. On error the index is
/// left empty; fatal errors abort the whole build and the caller halts.
#[tracing::instrument(level = "debug", skip_all, fields(statements = statements.len()))]
pub fn update_index_from_statements(
    index: &mut Index,
    statements: &[Statement],
    options: &IndexerOptions,
) -> Result<()> {
    let records = Mutex::new(std::mem::take(&mut index.records));
    let mut top_level = std::mem::take(&mut index.top_level);
    let first_error: Mutex<Option<IndexError>> = Mutex::new(None);
    let mut jobs: Vec<PostParseJob> = Vec::new();

    let decl_pool = ThreadPoolBuilder::new()
        .num_threads(options.declaration_worker_threads)
        .build()
        .map_err(|e| IndexError::internal(format!("declaration worker pool: {e}")))?;
    debug!(
        workers = options.declaration_worker_threads,
        "parsing declarations on worker pool"
    );

    let walk_result = decl_pool.in_place_scope(|scope| {
        let mut walker = TreeWalker {
            statements,
            records: &records,
            first_error: &first_error,
            top_level: &mut top_level,
            jobs: &mut jobs,
            stack: Vec::new(),
        };
        walker.run(scope)
    });
    // Leaving the scope is the first hard barrier: every declaration task
    // has completed before any attribute job may run.
    walk_result?;
    if let Some(err) = lock(&first_error).take() {
        return Err(err);
    }

    if !jobs.is_empty() {
        let attr_pool = ThreadPoolBuilder::new()
            .num_threads(options.modification_worker_threads)
            .build()
            .map_err(|e| IndexError::internal(format!("attribute worker pool: {e}")))?;
        debug!(
            jobs = jobs.len(),
            workers = options.modification_worker_threads,
            "applying variable modifications"
        );
        attr_pool.in_place_scope(|scope| {
            for job in jobs.drain(..) {
                let records = &records;
                let first_error = &first_error;
                scope.spawn(move |_| {
                    if let Err(err) = job.apply(records) {
                        let mut slot = lock(first_error);
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                });
            }
        });
        if let Some(err) = lock(&first_error).take() {
            return Err(err);
        }
    }

    let mut records = records.into_inner().unwrap_or_else(PoisonError::into_inner);
    // Concurrent appends do not preserve declaration order within a record;
    // later phases rely on it (bound expressions referencing earlier
    // parameters), so restore it from the statement positions.
    for record in &mut records {
        record.variables.sort_by_key(|v| v.decl_index);
        for dtype in &mut record.types {
            dtype.variables.sort_by_key(|v| v.decl_index);
        }
    }
    index.records = records;
    index.top_level = top_level;
    Ok(())
}

/// An open scope on the cursor stack, with the stream position of its
/// opening statement for snippet capture.
struct Open {
    cursor: Cursor,
    begin: usize,
}

#[derive(Copy, Clone)]
enum Cursor {
    Record(RecordId),
    Type { record: RecordId, slot: usize },
}

struct TreeWalker<'a, 'w> {
    statements: &'a [Statement],
    records: &'a Mutex<Vec<Record>>,
    first_error: &'a Mutex<Option<IndexError>>,
    top_level: &'w mut Vec<RecordId>,
    jobs: &'w mut Vec<PostParseJob>,
    stack: Vec<Open>,
}

impl<'a> TreeWalker<'a, '_> {
    fn run<'s>(&mut self, scope: &rayon::Scope<'s>) -> Result<()>
    where
        'a: 's,
    {
        for (pos, statement) in self.statements.iter().enumerate() {
            if !statement.active {
                continue;
            }
            // A failed declaration task aborts the whole build; stop feeding
            // the pool as soon as one is recorded.
            if lock(self.first_error).is_some() {
                break;
            }
            match classify(&statement.body) {
                StatementKind::Module { name } => {
                    self.open_top_level(RecordKind::Module, name, statement, pos)?;
                }
                StatementKind::Program { name } => {
                    self.open_top_level(RecordKind::Program, name, statement, pos)?;
                }
                StatementKind::Subroutine {
                    attributes,
                    name,
                    dummy_args,
                } => {
                    self.open_procedure(
                        RecordKind::Subroutine,
                        attributes,
                        name,
                        dummy_args,
                        None,
                        statement,
                        pos,
                    );
                }
                StatementKind::Function {
                    attributes,
                    name,
                    dummy_args,
                    result,
                } => {
                    self.open_procedure(
                        RecordKind::Function,
                        attributes,
                        name,
                        dummy_args,
                        result,
                        statement,
                        pos,
                    );
                }
                StatementKind::TypeStart { name } => self.open_type(name, statement, pos),
                StatementKind::End(kind) => self.close(kind, statement, pos)?,
                StatementKind::Use(used_module) => self.add_used_module(used_module, statement),
                StatementKind::Declaration => self.spawn_declaration(scope, statement, pos),
                StatementKind::Attributes => self.queue_attribute_job(statement, false),
                StatementKind::AccDeclare => self.queue_attribute_job(statement, true),
                StatementKind::AccRoutine => self.apply_acc_routine(statement),
                StatementKind::ImplicitNone => self.set_implicit_none(),
                StatementKind::Other => {}
            }
        }
        if let Some(open) = self.stack.last() {
            let (kind, name) = self.describe(open.cursor);
            let location = self
                .statements
                .get(open.begin)
                .map(|s| s.location.clone())
                .unwrap_or_else(|| SourceLocation::new("<unknown>", 0));
            return Err(IndexError::classification(
                format!("unterminated {kind} '{name}'"),
                &location,
            ));
        }
        Ok(())
    }

    fn current(&self) -> Option<Cursor> {
        self.stack.last().map(|open| open.cursor)
    }

    /// Record the cursor points at, when it points at a record at all.
    fn current_record(&self) -> Option<RecordId> {
        match self.current() {
            Some(Cursor::Record(id)) => Some(id),
            _ => None,
        }
    }

    fn describe(&self, cursor: Cursor) -> (&'static str, String) {
        let records = lock(self.records);
        match cursor {
            Cursor::Record(id) => {
                let record = &records[id.0 as usize];
                let kind = match record.kind {
                    RecordKind::Module => "module",
                    RecordKind::Program => "program",
                    RecordKind::Subroutine => "subroutine",
                    RecordKind::Function => "function",
                    RecordKind::DerivedType => "type",
                };
                (kind, record.name.clone())
            }
            Cursor::Type { record, slot } => {
                ("type", records[record.0 as usize].types[slot].name.clone())
            }
        }
    }

    fn open_top_level(
        &mut self,
        kind: RecordKind,
        name: String,
        statement: &Statement,
        pos: usize,
    ) -> Result<()> {
        if let Some(cursor) = self.current() {
            let (open_kind, open_name) = self.describe(cursor);
            return Err(IndexError::classification(
                format!(
                    "'{}' must appear at file level but is nested in {open_kind} '{open_name}'",
                    statement.body.trim()
                ),
                &statement.location,
            ));
        }
        debug!(name = %name, kind = ?kind, "enter scope");
        let id = {
            let mut records = lock(self.records);
            let id = RecordId(records.len() as u32);
            records.push(Record::new(kind, name, None));
            id
        };
        self.top_level.push(id);
        self.stack.push(Open {
            cursor: Cursor::Record(id),
            begin: pos,
        });
        Ok(())
    }

    fn open_procedure(
        &mut self,
        kind: RecordKind,
        attributes: Vec<String>,
        name: String,
        dummy_args: Vec<String>,
        result: Option<String>,
        statement: &Statement,
        pos: usize,
    ) {
        let parent = match self.current() {
            None => None,
            Some(Cursor::Record(id)) => Some(id),
            Some(Cursor::Type { .. }) => {
                warn!(
                    statement = %statement.body,
                    location = %statement.location,
                    "found procedure inside a derived type; expected program/module/subroutine/function parent"
                );
                return;
            }
        };
        debug!(name = %name, kind = ?kind, "enter scope");
        let result_name = match kind {
            RecordKind::Function => Some(result.unwrap_or_else(|| name.clone())),
            _ => None,
        };
        let id = {
            let mut records = lock(self.records);
            let id = RecordId(records.len() as u32);
            let mut record = Record::new(kind, name, parent);
            record.attributes.extend(attributes);
            record.dummy_args.extend(dummy_args);
            record.result_name = result_name;
            records.push(record);
            if let Some(parent) = parent {
                records[parent.0 as usize].subprograms.push(id);
            }
            id
        };
        if parent.is_none() {
            self.top_level.push(id);
        }
        self.stack.push(Open {
            cursor: Cursor::Record(id),
            begin: pos,
        });
    }

    fn open_type(&mut self, name: String, statement: &Statement, pos: usize) {
        let Some(record) = self.current_record() else {
            warn!(
                statement = %statement.body,
                location = %statement.location,
                "found derived type outside a program/module/subroutine/function"
            );
            return;
        };
        debug!(name = %name, "enter derived type");
        let slot = {
            let mut records = lock(self.records);
            let types = &mut records[record.0 as usize].types;
            types.push(DerivedType {
                name,
                ..DerivedType::default()
            });
            types.len() - 1
        };
        self.stack.push(Open {
            cursor: Cursor::Type { record, slot },
            begin: pos,
        });
    }

    fn close(&mut self, end_kind: EndKind, statement: &Statement, pos: usize) -> Result<()> {
        let Some(open) = self.stack.pop() else {
            return Err(IndexError::classification(
                format!("unexpected '{}'", statement.body.trim()),
                &statement.location,
            ));
        };
        let (open_kind, open_name) = self.describe(open.cursor);
        let matches = match (open.cursor, end_kind) {
            (Cursor::Type { .. }, EndKind::Type) => true,
            (Cursor::Type { .. }, _) => false,
            (Cursor::Record(id), _) => {
                let records = lock(self.records);
                matches!(
                    (records[id.0 as usize].kind, end_kind),
                    (RecordKind::Module, EndKind::Module)
                        | (RecordKind::Program, EndKind::Program)
                        | (RecordKind::Subroutine, EndKind::Subroutine)
                        | (RecordKind::Function, EndKind::Function)
                )
            }
        };
        if !matches {
            return Err(IndexError::classification(
                format!(
                    "'{}' does not close the open {open_kind} '{open_name}'",
                    statement.body.trim()
                ),
                &statement.location,
            ));
        }

        debug!(name = %open_name, kind = %open_kind, "leave scope");
        match open.cursor {
            Cursor::Type { record, slot } => {
                let snippet = self.snippet(open.begin, pos);
                lock(self.records)[record.0 as usize].types[slot].statements = snippet;
            }
            Cursor::Record(id) => {
                let device_callable = lock(self.records)[id.0 as usize].is_device_callable();
                if device_callable {
                    let snippet = self.snippet(open.begin, pos);
                    lock(self.records)[id.0 as usize].statements = snippet;
                }
            }
        }
        Ok(())
    }

    /// Exact statement range of a finished scope, for later re-emission.
    fn snippet(&self, begin: usize, end: usize) -> Vec<String> {
        self.statements[begin..=end]
            .iter()
            .filter(|s| s.active)
            .map(|s| s.body.clone())
            .collect()
    }

    fn add_used_module(&mut self, mut used_module: UsedModule, statement: &Statement) {
        used_module.location = statement.location.clone();
        match self.current() {
            Some(Cursor::Record(id)) => {
                lock(self.records)[id.0 as usize]
                    .used_modules
                    .push(used_module);
            }
            Some(Cursor::Type { .. }) | None => {
                debug!(module = %used_module.name, "ignoring use statement outside a record");
            }
        }
    }

    fn spawn_declaration<'s>(&mut self, scope: &rayon::Scope<'s>, statement: &Statement, pos: usize)
    where
        'a: 's,
    {
        let target = match self.current() {
            Some(Cursor::Record(id)) => VarTarget::Record(id),
            Some(Cursor::Type { record, slot }) => VarTarget::DerivedType(record, slot),
            None => return,
        };
        let text = statement.body.clone();
        let location = statement.location.clone();
        let records = self.records;
        let first_error = self.first_error;
        scope.spawn(move |_| match parse_declaration(&text, pos as u32) {
            Ok(variables) => {
                let mut records = lock(records);
                target.variables_mut(&mut records).extend(variables);
            }
            Err(message) => {
                let mut slot = lock(first_error);
                if slot.is_none() {
                    *slot = Some(IndexError::DeclarationParse {
                        statement: text,
                        message,
                        location,
                    });
                }
            }
        });
    }

    fn queue_attribute_job(&mut self, statement: &Statement, is_declare: bool) {
        let target = match self.current() {
            Some(Cursor::Record(id)) => VarTarget::Record(id),
            Some(Cursor::Type { record, slot }) => VarTarget::DerivedType(record, slot),
            None => return,
        };
        let job = if is_declare {
            PostParseJob::AccDeclare {
                target,
                statement: statement.body.clone(),
                location: statement.location.clone(),
            }
        } else {
            PostParseJob::Attributes {
                target,
                statement: statement.body.clone(),
                location: statement.location.clone(),
            }
        };
        self.jobs.push(job);
    }

    fn apply_acc_routine(&mut self, statement: &Statement) {
        let Some(id) = self.current_record() else {
            return;
        };
        let Some(implied) = parse_acc_routine(&statement.body) else {
            return;
        };
        let mut records = lock(self.records);
        let record = &mut records[id.0 as usize];
        if record.is_procedure() {
            record
                .attributes
                .extend(implied.iter().map(|a| a.to_string()));
        }
    }

    fn set_implicit_none(&mut self) {
        if let Some(id) = self.current_record() {
            lock(self.records)[id.0 as usize].implicit_none = true;
        }
    }
}
