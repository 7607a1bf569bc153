//! Interfaces to the host environment.
//!
//! The engine consumes the host's project model through `SourceModel`:
//! parsing with resolved bindings, reference search, buffer access and
//! import rewriting all live on the host side. Failures crossing this
//! boundary are environment breakage and propagate as `anyhow` errors;
//! they are never folded into a `RefactoringStatus`.

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::{FileId, SourceTree, Span, SymbolKey, TypeKey, TypeTable, Visibility};
use crate::edits::StringEdit;

/// Cooperative cancellation token, threaded through every long-running
/// call. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Bails if the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            bail!("operation cancelled");
        }
        Ok(())
    }
}

/// How far a reference search must reach, derived from the declaration's
/// access level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    Package(String),
    Project,
    Workspace,
}

impl SearchScope {
    pub fn for_declaration(visibility: Visibility, package: Option<&str>) -> Self {
        match visibility {
            Visibility::Package => SearchScope::Package(package.unwrap_or_default().to_string()),
            Visibility::Project => SearchScope::Project,
            Visibility::Workspace => SearchScope::Workspace,
        }
    }
}

/// Raw reference matches for one file, as reported by the search index.
/// Offsets address the file's original text; the collector re-resolves
/// them against a parsed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatches {
    pub file: FileId,
    pub matches: Vec<Span>,
}

/// Scoped handle on a file's text document. The host's buffer is released
/// when the guard drops, including on error paths.
pub struct BufferGuard<'h> {
    text: String,
    release: Option<Box<dyn FnOnce() + 'h>>,
}

impl<'h> BufferGuard<'h> {
    pub fn new(text: String, release: impl FnOnce() + 'h) -> Self {
        BufferGuard {
            text,
            release: Some(Box::new(release)),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Deref for BufferGuard<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// The host's project model, supplied as a black box.
pub trait SourceModel {
    /// Parsed tree with resolved bindings for `file`.
    fn tree(&self, file: &FileId) -> Result<&SourceTree>;

    /// Whether `file` parsed cleanly enough for bindings to be reliable.
    fn structure_known(&self, _file: &FileId) -> bool {
        true
    }

    /// Workspace-wide type table, for qualifier construction.
    fn type_table(&self) -> &TypeTable;

    /// File holding the declaration of `symbol`, or `None` when the
    /// declaration has no source (binary origin).
    fn declaring_file(&self, symbol: &SymbolKey) -> Option<FileId>;

    /// Per-file reference matches for `symbol` within `scope`.
    fn search_references(
        &self,
        symbol: &SymbolKey,
        scope: &SearchScope,
        cancel: &CancelToken,
    ) -> Result<Vec<FileMatches>>;

    /// Current text of `file`, or `None` when no source is available.
    fn read_text(&self, file: &FileId) -> Option<&str>;

    /// Acquire a scoped text-document handle for `file`.
    fn acquire(&self, file: &FileId) -> Result<BufferGuard<'_>>;

    /// One edit adding imports for `types` to `file`, or `None` when every
    /// type is already visible there.
    fn import_edit(&self, file: &FileId, types: &BTreeSet<TypeKey>) -> Option<StringEdit>;
}
