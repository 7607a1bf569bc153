//! Change aggregation.
//!
//! Groups per-file edit sets into `FileChange`s, deduplicated by file
//! identity, and assembles the full multi-file `ChangeSet`, including the
//! optional declaration-removal edit attached to the declaring file's
//! change (created on demand when no reference edit already targets that
//! file). Changes are independent; the host may commit them in any order.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::ast::{FieldDecl, FileId};
use crate::edits::{OrderedEditSet, StringEdit};
use crate::host::SourceModel;
use crate::synth::PreparedFile;

/// Hash of a buffer's original content, for stale-buffer detection at
/// commit time.
pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// The per-file output: one validated edit set against one buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub file: FileId,
    /// blake3 of the text the edits were computed against, when the host
    /// could supply it.
    pub base_hash: Option<String>,
    pub edits: OrderedEditSet,
}

impl FileChange {
    /// True when `text` is still the text the edits were computed against.
    pub fn is_current(&self, text: &str) -> bool {
        match &self.base_hash {
            Some(hash) => *hash == hash_text(text),
            None => true,
        }
    }

    pub fn apply_to(&self, text: &str) -> String {
        self.edits.apply(text)
    }

    /// Unified diff of this change against `text`.
    pub fn diff(&self, text: &str) -> String {
        let modified = self.apply_to(text);
        similar::TextDiff::from_lines(text, &modified)
            .unified_diff()
            .context_radius(3)
            .header(
                &format!("a/{}", self.file),
                &format!("b/{}", self.file),
            )
            .to_string()
    }
}

/// The full multi-file output, pending host commit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change_for(&self, file: &FileId) -> Option<&FileChange> {
        self.changes.iter().find(|c| &c.file == file)
    }
}

/// The edit removing an inlined declaration: the single variable-binding
/// fragment, or the whole declaration statement when it is the sole
/// fragment.
pub fn removal_edit(decl: &FieldDecl) -> StringEdit {
    let span = if decl.fragment_count == 1 {
        decl.statement_span
    } else {
        decl.fragment_span
    };
    StringEdit::Delete {
        offset: span.start,
        len: span.len,
    }
}

/// Assemble the change set from per-file synthesis results plus an
/// optional declaration-removal edit targeting `removal.0`.
pub fn aggregate(
    host: &dyn SourceModel,
    prepared: Vec<PreparedFile>,
    removal: Option<(FileId, StringEdit)>,
) -> Result<ChangeSet> {
    let mut by_file: BTreeMap<FileId, OrderedEditSet> = BTreeMap::new();
    for p in prepared {
        if p.edits.is_empty() {
            continue;
        }
        match by_file.remove(&p.file) {
            Some(existing) => {
                by_file.insert(p.file, existing.merged(p.edits));
            }
            None => {
                by_file.insert(p.file, p.edits);
            }
        }
    }

    if let Some((file, edit)) = removal {
        let merged = match by_file.remove(&file) {
            Some(existing) => existing.merged(OrderedEditSet::new(vec![edit])),
            None => OrderedEditSet::new(vec![edit]),
        };
        by_file.insert(file, merged);
    }

    let changes = by_file
        .into_iter()
        .map(|(file, edits)| {
            let base_hash = host.read_text(&file).map(hash_text);
            FileChange {
                file,
                base_hash,
                edits,
            }
        })
        .collect::<Vec<_>>();

    debug!(files = changes.len(), "change set assembled");
    Ok(ChangeSet { changes })
}
