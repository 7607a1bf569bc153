//! Edit synthesis.
//!
//! For every reference site in one file: prepare the initializer for that
//! destination (qualification + parenthesization), emit one replacement
//! edit, and accumulate the types the destination file must import: the
//! types the original initializer references, plus the types introduced
//! by qualification. Sites the resolver rejects are skipped with their
//! finding recorded; the remaining sites still produce edits. Partial
//! success is a first-class outcome.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use tracing::debug;

use crate::ast::{Expr, FileId, TypeKey};
use crate::collect::{site_context, FileReferences};
use crate::edits::{OrderedEditSet, StringEdit};
use crate::host::{CancelToken, SourceModel};
use crate::qualify::{self, Relocation};
use crate::status::RefactoringStatus;

/// The declaration-side inputs to synthesis, fixed for the whole session.
pub struct InitializerSource<'a> {
    pub expr: &'a Expr,
    /// The initializer's original source text.
    pub text: &'a str,
    /// Containing type at the declaration.
    pub source_type: &'a TypeKey,
}

/// Synthesis result for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFile {
    pub file: FileId,
    pub edits: OrderedEditSet,
    /// Sites replaced / sites skipped by the resolver.
    pub replaced: usize,
    pub skipped: usize,
}

/// Synthesize the edit set for one file's reference sites.
///
/// The file's buffer is held for the duration of the computation and
/// released on every path out, including errors.
pub fn synthesize_file(
    host: &dyn SourceModel,
    initializer: &InitializerSource<'_>,
    refs: &FileReferences,
    cancel: &CancelToken,
    status: &mut RefactoringStatus,
) -> Result<PreparedFile> {
    let _buffer = host
        .acquire(&refs.file)
        .with_context(|| format!("acquiring buffer for '{}'", refs.file))?;
    let tree = host.tree(&refs.file)?;
    let types = host.type_table();

    let mut edits: Vec<StringEdit> = Vec::new();
    let mut import_types: BTreeSet<TypeKey> = BTreeSet::new();
    let mut replaced = 0usize;
    let mut skipped = 0usize;

    for site in &refs.sites {
        cancel.check()?;
        let scope = tree
            .scope_info(site.scope)
            .ok_or_else(|| anyhow!("scope {:?} missing from tree of '{}'", site.scope, refs.file))?;

        let relocation = Relocation {
            types,
            source_type: Some(initializer.source_type),
            dest_type: scope.containing_type.as_ref(),
            dest_local_names: &scope.declared_names,
            context: Some(site_context(site)),
        };

        let mut new_types = BTreeSet::new();
        let prepared = qualify::prepare_initializer(
            &relocation,
            initializer.expr,
            initializer.text,
            &site.parent,
            &mut new_types,
            status,
        );
        let Some(text) = prepared else {
            skipped += 1;
            continue;
        };

        edits.push(StringEdit::Replace {
            offset: site.span.start,
            len: site.span.len,
            text,
        });
        replaced += 1;
        // Types the relocated text mentions must be importable at the
        // destination: those of the original initializer, plus any the
        // qualifier introduced.
        import_types.extend(qualify::referenced_types(initializer.expr, types));
        import_types.extend(new_types);
    }

    if !edits.is_empty() {
        if let Some(import) = host.import_edit(&refs.file, &import_types) {
            edits.push(import);
        }
    }

    debug!(file = %refs.file, replaced, skipped, "file synthesis finished");
    Ok(PreparedFile {
        file: refs.file.clone(),
        edits: OrderedEditSet::new(edits),
        replaced,
        skipped,
    })
}
