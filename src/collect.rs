//! Reference collection.
//!
//! Turns raw search matches (offset + length per file) into resolved
//! reference sites by re-resolving each match against the parsed tree of
//! its file. A match on the trailing name of an already-qualified
//! reference expands to the whole qualified expression, so the complete
//! reference becomes the replacement target, not just the trailing name.

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::ast::{Expr, ExprKind, FileId, ScopeId, SourceTree, Span, SymbolKey};
use crate::host::{CancelToken, SearchScope, SourceModel};
use crate::qualify::ParentContext;
use crate::status::{RefactoringStatus, StatusCode, StatusContext};

/// One resolved occurrence of the declaration. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSite {
    pub file: FileId,
    /// Span of the full reference expression in the file's original text.
    pub span: Span,
    /// Destination scope for qualification decisions.
    pub scope: ScopeId,
    /// Syntactic position, for the parenthesization test.
    pub parent: ParentContext,
}

/// All sites found in one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReferences {
    pub file: FileId,
    pub sites: Vec<ReferenceSite>,
}

/// All-references mode: search the host's index within `scope`, then
/// re-resolve every match. Files without source text yield an Info finding
/// and are excluded.
pub fn collect_all_references(
    host: &dyn SourceModel,
    symbol: &SymbolKey,
    scope: &SearchScope,
    cancel: &CancelToken,
    status: &mut RefactoringStatus,
) -> Result<Vec<FileReferences>> {
    let groups = host.search_references(symbol, scope, cancel)?;
    debug!(files = groups.len(), "reference search finished");

    let mut out = Vec::new();
    for group in groups {
        cancel.check()?;
        if host.read_text(&group.file).is_none() {
            status.add_info(
                StatusCode::ReferenceInBinary,
                format!("source of '{}' is not available; its references are not replaced", group.file),
                None,
            );
            continue;
        }
        let tree = host
            .tree(&group.file)
            .with_context(|| format!("parsing '{}'", group.file))?;
        let mut sites = Vec::with_capacity(group.matches.len());
        for m in &group.matches {
            let site = resolve_site(tree, *m).ok_or_else(|| {
                anyhow!(
                    "search match at {}..{} in '{}' does not resolve to an expression",
                    m.start,
                    m.end(),
                    group.file
                )
            })?;
            sites.push(site);
        }
        if !sites.is_empty() {
            out.push(FileReferences {
                file: group.file,
                sites,
            });
        }
    }
    Ok(out)
}

/// Single-reference mode: the explicitly selected occurrence, no search.
pub fn collect_single_reference(
    host: &dyn SourceModel,
    file: &FileId,
    selection: Span,
) -> Result<Option<FileReferences>> {
    let tree = host
        .tree(file)
        .with_context(|| format!("parsing '{}'", file))?;
    Ok(resolve_site(tree, selection).map(|site| FileReferences {
        file: file.clone(),
        sites: vec![site],
    }))
}

/// Normalize one offset/length match to its reference site.
///
/// Member names are not child nodes in this model, so the innermost
/// expression containing a trailing-name match *is* the whole qualified
/// reference (`T.A`, `recv.A`, `recv.m(..)`); the re-expansion the search
/// index cannot do falls out of the lookup itself.
pub fn resolve_site(tree: &SourceTree, span: Span) -> Option<ReferenceSite> {
    let path = tree.expr_path_at(span)?;
    let target = *path.last().unwrap();
    let parent = if path.len() >= 2 {
        parent_context(path[path.len() - 2], target)
    } else {
        ParentContext::Top
    };

    Some(ReferenceSite {
        file: tree.file.clone(),
        span: target.span,
        scope: target.scope,
        parent,
    })
}

/// Location context for findings about a site.
pub fn site_context(site: &ReferenceSite) -> StatusContext {
    StatusContext {
        file: site.file.clone(),
        span: site.span,
    }
}

fn parent_context(parent: &Expr, target: &Expr) -> ParentContext {
    match &parent.kind {
        ExprKind::Paren { .. } => ParentContext::Paren,
        ExprKind::FieldAccess { .. } => ParentContext::Receiver,
        ExprKind::MethodCall { receiver, .. } => {
            if receiver
                .as_deref()
                .map(|r| r.span == target.span)
                .unwrap_or(false)
            {
                ParentContext::Receiver
            } else {
                ParentContext::CallArg
            }
        }
        ExprKind::Unary { .. } => ParentContext::UnaryOperand,
        ExprKind::Binary { op, .. } => ParentContext::BinaryOperand { op: *op },
        ExprKind::Assign { .. } => ParentContext::AssignSide,
        ExprKind::Conditional { .. } => ParentContext::CondPart,
        ExprKind::Name { .. } | ExprKind::Literal { .. } => ParentContext::Top,
    }
}
