//! Qualification resolver.
//!
//! Decides, for an initializer expression being relocated from its
//! declaration site to a reference site, which unqualified names inside it
//! must be prefixed with their declaring type to keep their original
//! binding, then produces the relocated text.
//!
//! Only the leftmost simple name of a reference chain is a candidate:
//! anything already receiver-qualified keeps its binding by construction.
//! Locals, parameters and non-member types are unaffected by relocation
//! and never qualified. Instance members cannot carry their implicit
//! receiver along, so a site whose initializer references one is rejected
//! (the remaining sites still proceed).

use std::collections::BTreeSet;
use tracing::debug;

use crate::ast::{BinOp, Expr, ExprKind, NameSeg, TypeKey, TypeTable};
use crate::edits::{OrderedEditSet, StringEdit};
use crate::status::{RefactoringStatus, StatusCode, StatusContext};

/// Syntactic position of the reference being replaced, used solely by the
/// parenthesization test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentContext {
    /// Statement position, or no enclosing expression.
    Top,
    Paren,
    CallArg,
    /// Receiver of a field access or method call.
    Receiver,
    UnaryOperand,
    BinaryOperand { op: BinOp },
    AssignSide,
    CondPart,
}

/// A scope-prefix insertion, positioned relative to the initializer's own
/// text so the final edit is independent of absolute file coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qualification {
    pub insert_at: usize,
    pub qualifier: String,
    pub qualifying_type: TypeKey,
}

/// Everything the resolver needs to know about one relocation.
pub struct Relocation<'a> {
    pub types: &'a TypeTable,
    /// Containing type of the initializer at its declaration.
    pub source_type: Option<&'a TypeKey>,
    /// Containing type of the destination site.
    pub dest_type: Option<&'a TypeKey>,
    /// Simple names declared locally around the destination point.
    pub dest_local_names: &'a BTreeSet<String>,
    /// Location context attached to any finding this relocation produces.
    pub context: Option<StatusContext>,
}

impl Relocation<'_> {
    fn same_containing_type(&self) -> bool {
        match (self.source_type, self.dest_type) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Prepare the initializer's text for substitution at the destination.
///
/// Returns `None` when the relocation cannot be performed for this site;
/// the reason is recorded in `status` and the caller moves on to the next
/// site. On success the qualifying types are added to `new_types` for
/// import management.
pub fn prepare_initializer(
    relocation: &Relocation<'_>,
    initializer: &Expr,
    initializer_text: &str,
    parent: &ParentContext,
    new_types: &mut BTreeSet<TypeKey>,
    status: &mut RefactoringStatus,
) -> Option<String> {
    let mut traversal = Traversal {
        relocation,
        base: initializer.span.start,
        qualifications: Vec::new(),
        can_prepare: true,
        status,
    };
    traversal.visit(initializer);
    if !traversal.can_prepare {
        return None;
    }

    let qualifications = traversal.qualifications;
    debug!(
        count = qualifications.len(),
        "initializer prepared for relocation"
    );
    for q in &qualifications {
        new_types.insert(q.qualifying_type.clone());
    }

    let edits = OrderedEditSet::new(
        qualifications
            .into_iter()
            .map(|q| StringEdit::Insert {
                offset: q.insert_at,
                text: q.qualifier,
            })
            .collect(),
    );
    let mut result = edits.apply(initializer_text);

    if needs_parentheses(initializer, parent) {
        result = format!("({})", result);
    }
    Some(result)
}

/// Top-level types referenced by the leftmost names of `expr`. These are
/// needed at every destination regardless of qualification decisions.
pub fn referenced_types(expr: &Expr, types: &TypeTable) -> BTreeSet<TypeKey> {
    let mut out = BTreeSet::new();
    collect_referenced_types(expr, types, &mut out);
    out
}

fn collect_referenced_types(expr: &Expr, types: &TypeTable, out: &mut BTreeSet<TypeKey>) {
    if let ExprKind::Name { segments } = &expr.kind {
        if let Some(crate::ast::Binding::Type { key }) = &segments[0].binding {
            out.insert(top_level_ancestor(key, types));
        }
        return;
    }
    for child in expr.children() {
        collect_referenced_types(child, types, out);
    }
}

fn top_level_ancestor(key: &TypeKey, types: &TypeTable) -> TypeKey {
    let mut current = key.clone();
    while let Some(enclosing) = types.get(&current).and_then(|i| i.enclosing.clone()) {
        current = enclosing;
    }
    current
}

/// Whether substituting `substitute` into the destination would change
/// operator-precedence binding without parentheses. Purely syntactic.
pub fn needs_parentheses(substitute: &Expr, parent: &ParentContext) -> bool {
    if matches!(substitute.kind, ExprKind::Assign { .. }) {
        return true;
    }
    let prec = substitute.precedence();
    if prec == 15 {
        return false;
    }
    match parent {
        ParentContext::Top
        | ParentContext::Paren
        | ParentContext::CallArg
        | ParentContext::AssignSide
        | ParentContext::CondPart => false,
        ParentContext::Receiver | ParentContext::UnaryOperand => true,
        // Equal precedence is parenthesized too: associativity may differ.
        ParentContext::BinaryOperand { op } => prec <= op.precedence(),
    }
}

struct Traversal<'a, 'b> {
    relocation: &'a Relocation<'a>,
    base: usize,
    qualifications: Vec<Qualification>,
    can_prepare: bool,
    status: &'b mut RefactoringStatus,
}

impl Traversal<'_, '_> {
    fn visit(&mut self, expr: &Expr) {
        if !self.can_prepare {
            return;
        }
        match &expr.kind {
            ExprKind::Name { segments } => self.candidate(&segments[0]),
            // The name right of the dot keeps its binding; only the
            // receiver side can lose one.
            ExprKind::FieldAccess { receiver, .. } => self.visit(receiver),
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => {
                match receiver {
                    None => self.candidate(name),
                    Some(r) => self.visit(r),
                }
                for arg in args {
                    self.visit(arg);
                }
            }
            ExprKind::Literal { .. } => {}
            _ => {
                for child in expr.children() {
                    self.visit(child);
                }
            }
        }
    }

    /// `seg` is the leftmost simple name of a reference chain; qualify it
    /// if relocation would otherwise change its binding.
    fn candidate(&mut self, seg: &NameSeg) {
        use crate::ast::Binding;

        let Some(binding) = &seg.binding else {
            return;
        };
        let (declaring, is_static) = match binding {
            Binding::Local { .. } => return,
            Binding::Field {
                declaring_type,
                is_static,
                ..
            } => (Some(declaring_type.clone()), *is_static),
            Binding::Method {
                declaring_type,
                is_static,
                ..
            } => (Some(declaring_type.clone()), *is_static),
            Binding::Type { key } => (
                self.relocation
                    .types
                    .get(key)
                    .and_then(|info| info.enclosing.clone()),
                true,
            ),
        };
        // A top-level type is not a member and keeps its binding anywhere.
        let Some(declaring) = declaring else {
            return;
        };

        if !self.should_qualify(seg) {
            return;
        }

        if !is_static {
            self.status.add_info(
                StatusCode::NonStaticReference,
                format!(
                    "'{}' is an instance member; the initializer cannot carry its receiver to the new location",
                    seg.ident
                ),
                self.relocation.context.clone(),
            );
            self.can_prepare = false;
            return;
        }

        match self.qualified_to_top_level(&declaring) {
            Some(path) => {
                self.qualifications.push(Qualification {
                    insert_at: seg.span.start - self.base,
                    qualifier: format!("{}.", path),
                    qualifying_type: declaring,
                });
            }
            None => {
                self.status.add_info(
                    StatusCode::AnonymousDeclaringType,
                    format!(
                        "'{}' is declared in an anonymous class, which has no stable name to qualify with",
                        seg.ident
                    ),
                    self.relocation.context.clone(),
                );
                self.can_prepare = false;
            }
        }
    }

    fn should_qualify(&self, seg: &NameSeg) -> bool {
        if !self.relocation.same_containing_type() {
            return true;
        }
        self.relocation.dest_local_names.contains(&seg.ident)
    }

    /// Declaring-type name qualified to its top level, outermost first,
    /// or `None` when an anonymous class sits anywhere in the chain.
    fn qualified_to_top_level(&self, key: &TypeKey) -> Option<String> {
        let info = self.relocation.types.get(key)?;
        let name = info.name.as_deref()?;
        match &info.enclosing {
            Some(enclosing) => {
                let outer = self.qualified_to_top_level(enclosing)?;
                Some(format!("{}.{}", outer, name))
            }
            None => Some(name.to_string()),
        }
    }
}
