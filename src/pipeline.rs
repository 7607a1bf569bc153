//! The two-phase precondition pipeline and the refactoring object itself.
//!
//! `InlineConstant` walks a strictly ordered state machine:
//!
//! ```text
//! Initial -> DeclarationResolved -> SelectionValidated -> InitializerResolved
//! ```
//!
//! Each variant carries the data its phase resolved, so later phases read
//! earlier results by destructuring instead of asserting runtime flags.
//! A fatal finding leaves the machine where it was; the returned status
//! explains the cause through its code.
//!
//! Misusing the staging protocol (asking for final conditions before the
//! initial ones passed, or for a change before final conditions ran) is a
//! caller bug and surfaces as an error, not a finding.

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info};

use crate::ast::{Binding, Expr, ExprKind, FieldDecl, FileId, SourceTree, Span, SymbolKey, TypeKey};
use crate::change::{self, ChangeSet};
use crate::collect;
use crate::host::{CancelToken, SearchScope, SourceModel};
use crate::status::{RefactoringStatus, StatusCode};
use crate::synth::{self, InitializerSource, PreparedFile};

/// Pipeline state. Variants accumulate: each carries everything the
/// previous one resolved.
#[derive(Debug, Clone)]
enum Phase {
    Initial,
    DeclarationResolved {
        symbol: SymbolKey,
        declaring_type: TypeKey,
    },
    SelectionValidated {
        symbol: SymbolKey,
        declaring_type: TypeKey,
        declaration_selected: bool,
    },
    InitializerResolved {
        symbol: SymbolKey,
        declaration_selected: bool,
        declaring_file: FileId,
        decl: FieldDecl,
        initializer_text: String,
        all_constant: bool,
    },
}

/// Synthesis results cached by `check_final_conditions` for
/// `create_change`.
#[derive(Debug, Clone)]
struct FinalState {
    prepared: Vec<PreparedFile>,
    fatal: bool,
}

/// The inline-constant refactoring session over one host workspace.
pub struct InlineConstant<'h> {
    host: &'h dyn SourceModel,
    file: FileId,
    selection: Span,
    replace_all: bool,
    remove_declaration: bool,
    phase: Phase,
    final_state: Option<FinalState>,
}

impl<'h> InlineConstant<'h> {
    /// A session for the occurrence selected at `selection` in `file`.
    pub fn new(host: &'h dyn SourceModel, file: FileId, selection: Span) -> Self {
        InlineConstant {
            host,
            file,
            selection,
            replace_all: true,
            remove_declaration: false,
            phase: Phase::Initial,
            final_state: None,
        }
    }

    /// Replace every reference, or only the selected one.
    pub fn set_replace_all(&mut self, replace_all: bool) -> Result<()> {
        self.validate_config(replace_all, self.remove_declaration)?;
        self.replace_all = replace_all;
        Ok(())
    }

    /// Also remove the declaration. Legal only while replacing all
    /// references; the conflicting combination is rejected immediately.
    pub fn set_remove_declaration(&mut self, remove: bool) -> Result<()> {
        self.validate_config(self.replace_all, remove)?;
        self.remove_declaration = remove;
        Ok(())
    }

    pub fn replace_all(&self) -> bool {
        self.replace_all
    }

    pub fn remove_declaration(&self) -> bool {
        self.remove_declaration
    }

    /// Whether the original selection was the declaration site itself.
    /// Known once initial conditions have passed the selection phase.
    pub fn is_declaration_selected(&self) -> Option<bool> {
        match &self.phase {
            Phase::Initial | Phase::DeclarationResolved { .. } => None,
            Phase::SelectionValidated {
                declaration_selected,
                ..
            }
            | Phase::InitializerResolved {
                declaration_selected,
                ..
            } => Some(*declaration_selected),
        }
    }

    /// Whether the initializer consists entirely of constant expressions.
    /// Informational; known once initial conditions pass.
    pub fn is_initializer_all_constant(&self) -> Option<bool> {
        match &self.phase {
            Phase::InitializerResolved { all_constant, .. } => Some(*all_constant),
            _ => None,
        }
    }

    fn validate_config(&self, replace_all: bool, remove_declaration: bool) -> Result<()> {
        if remove_declaration && !replace_all {
            bail!("the declaration can only be removed when all references are replaced");
        }
        if self.is_declaration_selected() == Some(true) && !replace_all {
            bail!("the declaration itself is selected; only replace-all is possible");
        }
        Ok(())
    }

    /// Cheap validation of the selection: resolves the declaration,
    /// classifies the selection, locates the initializer. Safe to call
    /// from a UI thread.
    pub fn check_initial_conditions(&mut self, cancel: &CancelToken) -> Result<RefactoringStatus> {
        cancel.check()?;
        self.phase = Phase::Initial;
        self.final_state = None;

        if !self.host.structure_known(&self.file) {
            return Ok(RefactoringStatus::from_fatal(
                StatusCode::SyntaxErrors,
                format!("'{}' has syntax errors; bindings are unreliable", self.file),
            ));
        }
        let tree = self.host.tree(&self.file)?;

        // Phase: Initial -> DeclarationResolved
        let (symbol, declaring_type, declaration_selected) =
            match resolve_selection(tree, self.selection) {
                Some(resolved) => resolved,
                None => {
                    return Ok(RefactoringStatus::from_fatal(
                        StatusCode::NotConstantSelected,
                        "the selection does not denote a static final field",
                    ))
                }
            };
        let type_is_anonymous = self
            .host
            .type_table()
            .get(&declaring_type)
            .map(|info| info.name.is_none())
            .unwrap_or(false);
        if type_is_anonymous {
            return Ok(RefactoringStatus::from_fatal(
                StatusCode::LocalOrAnonymousUnsupported,
                "constants declared in local or anonymous types cannot be inlined",
            ));
        }
        self.phase = Phase::DeclarationResolved {
            symbol: symbol.clone(),
            declaring_type: declaring_type.clone(),
        };

        // Phase: -> SelectionValidated. Derived once; invariant afterwards.
        self.phase = Phase::SelectionValidated {
            symbol: symbol.clone(),
            declaring_type,
            declaration_selected,
        };

        // Phase: -> InitializerResolved
        let Some(declaring_file) = self.host.declaring_file(&symbol) else {
            return Ok(RefactoringStatus::from_fatal(
                StatusCode::DeclaredInBinary,
                "the constant is declared in a binary-only file",
            ));
        };
        let declaring_tree = self.host.tree(&declaring_file)?;
        let Some(decl) = declaring_tree.decl_of(&symbol).cloned() else {
            return Ok(RefactoringStatus::from_fatal(
                StatusCode::DeclaredInBinary,
                "no source declaration is available for the constant",
            ));
        };
        let Some(initializer) = decl.initializer.as_ref() else {
            return Ok(RefactoringStatus::from_fatal(
                StatusCode::MissingInitializer,
                format!("'{}' has no initializer at its declaration", decl.name),
            ));
        };
        let text = self
            .host
            .read_text(&declaring_file)
            .ok_or_else(|| anyhow!("text of declaring file '{}' unavailable", declaring_file))?;
        let initializer_text = text
            .get(initializer.span.start..initializer.span.end())
            .ok_or_else(|| {
                anyhow!(
                    "initializer span {}..{} out of bounds in '{}'",
                    initializer.span.start,
                    initializer.span.end(),
                    declaring_file
                )
            })?
            .to_string();
        let all_constant = is_constant_expr(initializer);

        info!(
            symbol = %symbol.0,
            %declaring_file,
            declaration_selected,
            all_constant,
            "initial conditions passed"
        );
        self.phase = Phase::InitializerResolved {
            symbol,
            declaration_selected,
            declaring_file,
            decl,
            initializer_text,
            all_constant,
        };
        Ok(RefactoringStatus::new())
    }

    /// Expensive validation: runs the reference search, synthesizes every
    /// per-file edit set, and merges all per-site findings. A fatal result
    /// blocks change creation; Info findings do not.
    pub fn check_final_conditions(&mut self, cancel: &CancelToken) -> Result<RefactoringStatus> {
        let Phase::InitializerResolved {
            symbol,
            declaration_selected,
            declaring_file,
            decl,
            initializer_text,
            ..
        } = &self.phase
        else {
            bail!("final conditions require passed initial conditions");
        };
        let initializer = decl
            .initializer
            .as_ref()
            .expect("InitializerResolved carries an initializer");

        let mut status = RefactoringStatus::new();
        let targets = if self.replace_all {
            let declaring_tree = self.host.tree(declaring_file)?;
            let scope =
                SearchScope::for_declaration(decl.visibility, declaring_tree.package.as_deref());
            collect::collect_all_references(self.host, symbol, &scope, cancel, &mut status)?
        } else {
            if *declaration_selected {
                bail!("single-reference mode is impossible for a declaration selection");
            }
            let single = collect::collect_single_reference(self.host, &self.file, self.selection)?
                .ok_or_else(|| {
                    anyhow!("the selected reference no longer resolves in '{}'", self.file)
                })?;
            vec![single]
        };

        let source = InitializerSource {
            expr: initializer,
            text: initializer_text,
            source_type: &decl.declaring_type,
        };
        let mut prepared = Vec::with_capacity(targets.len());
        let mut replaced_total = 0usize;
        for refs in &targets {
            cancel.check()?;
            let file = synth::synthesize_file(self.host, &source, refs, cancel, &mut status)?;
            replaced_total += file.replaced;
            prepared.push(file);
        }

        if replaced_total == 0 {
            status.add_fatal(
                StatusCode::NoValidTargets,
                "no reference can be replaced",
                None,
            );
        }
        debug!(
            files = prepared.len(),
            replaced = replaced_total,
            severity = %status.severity(),
            "final conditions finished"
        );
        self.final_state = Some(FinalState {
            prepared,
            fatal: status.has_fatal(),
        });
        Ok(status)
    }

    /// Assemble the change set from the accumulated state. Pure and
    /// idempotent; callable repeatedly.
    pub fn create_change(&self) -> Result<ChangeSet> {
        let Some(final_state) = &self.final_state else {
            bail!("create_change requires passed final conditions");
        };
        if final_state.fatal {
            bail!("cannot create a change after fatal findings");
        }
        let removal = if self.remove_declaration {
            let Phase::InitializerResolved {
                declaring_file,
                decl,
                ..
            } = &self.phase
            else {
                bail!("declaration removal requires resolved initial conditions");
            };
            Some((declaring_file.clone(), change::removal_edit(decl)))
        } else {
            None
        };
        change::aggregate(self.host, final_state.prepared.clone(), removal)
    }
}

/// Resolve the selection to `(symbol, declaring type, selection is the
/// declaration site)`. `None` when it is not a static final field.
fn resolve_selection(
    tree: &SourceTree,
    selection: Span,
) -> Option<(SymbolKey, TypeKey, bool)> {
    // The declaration's own name is not an expression node; check the
    // declared fragments first.
    for decl in &tree.decls {
        if decl.name_span.contains(selection) {
            if !(decl.is_static && decl.is_final) {
                return None;
            }
            return Some((decl.symbol.clone(), decl.declaring_type.clone(), true));
        }
    }

    let expr = tree.expr_at(selection)?;
    let binding = selected_binding(expr, selection)?;
    match binding {
        Binding::Field {
            symbol,
            declaring_type,
            is_static: true,
            is_final: true,
        } => Some((symbol.clone(), declaring_type.clone(), false)),
        _ => None,
    }
}

/// The binding the selection points at within `expr`.
fn selected_binding(expr: &Expr, selection: Span) -> Option<&Binding> {
    match &expr.kind {
        ExprKind::Name { segments } => segments
            .iter()
            .find(|s| s.span.contains(selection))
            .or_else(|| segments.last())
            .and_then(|s| s.binding.as_ref()),
        ExprKind::FieldAccess { name, .. } => name.binding.as_ref(),
        _ => None,
    }
}

/// Whether `expr` is composed entirely of other constant expressions:
/// literals, type names, and static final fields.
fn is_constant_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Literal { .. } => true,
        ExprKind::Name { segments } => segments.iter().all(|s| {
            matches!(
                s.binding,
                Some(Binding::Type { .. })
                    | Some(Binding::Field {
                        is_static: true,
                        is_final: true,
                        ..
                    })
            )
        }),
        ExprKind::FieldAccess { receiver, name } => {
            matches!(
                name.binding,
                Some(Binding::Field {
                    is_static: true,
                    is_final: true,
                    ..
                })
            ) && is_constant_expr(receiver)
        }
        ExprKind::Paren { inner } => is_constant_expr(inner),
        ExprKind::Unary { operand, .. } => is_constant_expr(operand),
        ExprKind::Binary { lhs, rhs, .. } => is_constant_expr(lhs) && is_constant_expr(rhs),
        ExprKind::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            is_constant_expr(cond) && is_constant_expr(then_branch) && is_constant_expr(else_branch)
        }
        ExprKind::MethodCall { .. } | ExprKind::Assign { .. } => false,
    }
}
