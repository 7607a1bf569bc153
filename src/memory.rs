//! In-memory host implementation.
//!
//! A complete `SourceModel` over a set of parsed files held in memory:
//! binding-aware reference search, visibility-scoped filtering, buffer
//! acquisition tracking, and a simple line-per-type import rewriter. The
//! CLI loads one of these from JSON; tests build them directly. Embedders
//! with their own workspace model implement `SourceModel` instead.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::ast::{Expr, ExprKind, FileId, SourceTree, Span, SymbolKey, TypeKey, TypeTable};
use crate::edits::StringEdit;
use crate::host::{BufferGuard, CancelToken, FileMatches, SearchScope, SourceModel};

fn default_true() -> bool {
    true
}

/// One file of the in-memory workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFile {
    pub tree: SourceTree,
    /// `None` models a binary-only file with no source text.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_true")]
    pub structure_known: bool,
    /// Where an import edit would be inserted.
    #[serde(default)]
    pub import_offset: usize,
    /// Top-level types already visible in this file (declared here or
    /// already imported).
    #[serde(default)]
    pub visible_types: BTreeSet<TypeKey>,
}

/// The in-memory workspace model.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryProject {
    pub files: BTreeMap<FileId, MemoryFile>,
    /// Merged from every file's type table on insert/load.
    #[serde(default)]
    pub types: TypeTable,
    #[serde(skip)]
    open_buffers: RefCell<Vec<FileId>>,
}

impl MemoryProject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, merging its type declarations into the workspace table.
    pub fn insert(&mut self, file: MemoryFile) {
        for (key, info) in &file.tree.types {
            self.types.insert(key.clone(), info.clone());
        }
        self.files.insert(file.tree.file.clone(), file);
    }

    /// Load a serialized project model.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read project model: {}", path.display()))?;
        let mut project: MemoryProject =
            serde_json::from_str(&content).context("failed to parse project model")?;
        let files: Vec<MemoryFile> = std::mem::take(&mut project.files).into_values().collect();
        for file in files {
            project.insert(file);
        }
        debug!(files = project.files.len(), "project model loaded");
        Ok(project)
    }

    /// Buffers currently held open; zero once all guards have dropped.
    pub fn open_buffer_count(&self) -> usize {
        self.open_buffers.borrow().len()
    }

    fn file(&self, id: &FileId) -> Result<&MemoryFile> {
        self.files
            .get(id)
            .ok_or_else(|| anyhow!("unknown file '{}'", id))
    }

    fn in_scope(&self, file: &MemoryFile, scope: &SearchScope) -> bool {
        match scope {
            SearchScope::Package(package) => {
                file.tree.package.as_deref() == Some(package.as_str())
            }
            SearchScope::Project | SearchScope::Workspace => true,
        }
    }

    fn top_level_name(&self, key: &TypeKey) -> Option<String> {
        let mut current = key.clone();
        while let Some(enclosing) = self.types.get(&current).and_then(|i| i.enclosing.clone()) {
            current = enclosing;
        }
        self.types.get(&current).and_then(|i| i.name.clone())
    }

    fn top_level_key(&self, key: &TypeKey) -> TypeKey {
        let mut current = key.clone();
        while let Some(enclosing) = self.types.get(&current).and_then(|i| i.enclosing.clone()) {
            current = enclosing;
        }
        current
    }
}

/// Collect the spans of every name bound to `symbol` within `expr`.
fn matches_in(expr: &Expr, symbol: &SymbolKey, out: &mut Vec<Span>) {
    let mut check = |seg: &crate::ast::NameSeg| {
        if let Some(crate::ast::Binding::Field { symbol: s, .. }) = &seg.binding {
            if s == symbol {
                out.push(seg.span);
            }
        }
    };
    match &expr.kind {
        ExprKind::Name { segments } => {
            for seg in segments {
                check(seg);
            }
        }
        ExprKind::FieldAccess { receiver, name } => {
            check(name);
            matches_in(receiver, symbol, out);
        }
        ExprKind::MethodCall {
            receiver,
            name,
            args,
        } => {
            check(name);
            if let Some(r) = receiver {
                matches_in(r, symbol, out);
            }
            for arg in args {
                matches_in(arg, symbol, out);
            }
        }
        _ => {
            for child in expr.children() {
                matches_in(child, symbol, out);
            }
        }
    }
}

impl SourceModel for MemoryProject {
    fn tree(&self, file: &FileId) -> Result<&SourceTree> {
        Ok(&self.file(file)?.tree)
    }

    fn structure_known(&self, file: &FileId) -> bool {
        self.files
            .get(file)
            .map(|f| f.structure_known)
            .unwrap_or(true)
    }

    fn type_table(&self) -> &TypeTable {
        &self.types
    }

    fn declaring_file(&self, symbol: &SymbolKey) -> Option<FileId> {
        self.files
            .values()
            .find(|f| f.tree.decl_of(symbol).is_some())
            .map(|f| f.tree.file.clone())
    }

    fn search_references(
        &self,
        symbol: &SymbolKey,
        scope: &SearchScope,
        cancel: &CancelToken,
    ) -> Result<Vec<FileMatches>> {
        let mut out = Vec::new();
        for file in self.files.values() {
            cancel.check()?;
            if !self.in_scope(file, scope) {
                continue;
            }
            let mut matches = Vec::new();
            for expr in &file.tree.exprs {
                matches_in(expr, symbol, &mut matches);
            }
            for decl in &file.tree.decls {
                if &decl.symbol == symbol {
                    // The declaration itself is not a reference.
                    continue;
                }
                if let Some(init) = &decl.initializer {
                    matches_in(init, symbol, &mut matches);
                }
            }
            if !matches.is_empty() {
                out.push(FileMatches {
                    file: file.tree.file.clone(),
                    matches,
                });
            }
        }
        debug!(symbol = %symbol.0, files = out.len(), "search finished");
        Ok(out)
    }

    fn read_text(&self, file: &FileId) -> Option<&str> {
        self.files.get(file).and_then(|f| f.text.as_deref())
    }

    fn acquire(&self, file: &FileId) -> Result<BufferGuard<'_>> {
        let entry = self.file(file)?;
        let Some(text) = &entry.text else {
            bail!("no buffer available for binary file '{}'", file);
        };
        self.open_buffers.borrow_mut().push(file.clone());
        let id = file.clone();
        Ok(BufferGuard::new(text.clone(), move || {
            let mut open = self.open_buffers.borrow_mut();
            if let Some(pos) = open.iter().position(|f| *f == id) {
                open.remove(pos);
            }
        }))
    }

    fn import_edit(&self, file: &FileId, types: &BTreeSet<TypeKey>) -> Option<StringEdit> {
        let entry = self.files.get(file)?;
        let mut needed: BTreeSet<String> = BTreeSet::new();
        for key in types {
            let top = self.top_level_key(key);
            if entry.visible_types.contains(&top) {
                continue;
            }
            if let Some(name) = self.top_level_name(&top) {
                needed.insert(name);
            }
        }
        if needed.is_empty() {
            return None;
        }
        let text = needed
            .iter()
            .map(|name| format!("import {};\n", name))
            .collect::<String>();
        Some(StringEdit::Insert {
            offset: entry.import_offset,
            text,
        })
    }
}
