//! Tagged-variant expression AST with resolved bindings.
//!
//! The engine never parses source text itself: the host hands it one
//! already-parsed `SourceTree` per file, with every name resolved to a
//! `Binding` and every expression tagged with the scope it occurs in.
//! Node kinds form a closed set, so traversals are exhaustive `match`es
//! instead of visitor dispatch.
//!
//! The whole model is serde-serializable; a host frontend can produce it in
//! another process and ship it to the engine as JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of a source file within the host's workspace model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of a declared symbol (field, method), assigned by the
/// host's binding resolver. Two occurrences reference the same declaration
/// iff their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolKey(pub String);

/// Stable identity of a type. Compared by key, never by spelling: two
/// distinct types may share a simple name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(pub String);

/// Identity of a lexical scope within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

/// Byte span in a file's original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Span { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// True if `other` lies entirely within this span.
    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }
}

/// Declared access level of a declaration; determines how far the
/// reference search must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible only within the declaring package.
    Package,
    /// Visible throughout the declaring project.
    Project,
    /// Visible across the whole workspace.
    Workspace,
}

/// What a resolved name denotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    Field {
        symbol: SymbolKey,
        declaring_type: TypeKey,
        is_static: bool,
        is_final: bool,
    },
    Method {
        symbol: SymbolKey,
        declaring_type: TypeKey,
        is_static: bool,
    },
    Type {
        key: TypeKey,
    },
    /// Local variable or parameter; unaffected by relocation.
    Local {
        name: String,
    },
}

/// Workspace-wide type lookup, merged by the host from every file's
/// declarations.
pub type TypeTable = BTreeMap<TypeKey, TypeInfo>;

/// Info about one type declaration, kept in the per-file type table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Simple name; `None` for an anonymous class, which has no stable
    /// name to qualify with.
    pub name: Option<String>,
    /// Enclosing type, `None` at top level.
    pub enclosing: Option<TypeKey>,
}

/// Info about one lexical scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeInfo {
    /// The class-or-interface declaration this scope sits in, if any.
    pub containing_type: Option<TypeKey>,
    /// Simple names declared locally in the enclosing body declaration:
    /// local variables, parameters, pattern bindings, locally declared
    /// types. Used for the shadowing test.
    pub declared_names: BTreeSet<String>,
}

/// One segment of a (possibly qualified) name, carrying its own span and
/// resolved binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameSeg {
    pub ident: String,
    pub span: Span,
    pub binding: Option<Binding>,
}

/// Binary operators, ordered here only for display; precedence comes from
/// [`BinOp::precedence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinOp {
    /// Higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Rem => 12,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Shl | BinOp::Shr => 10,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 9,
            BinOp::Eq | BinOp::Ne => 8,
            BinOp::BitAnd => 7,
            BinOp::BitXor => 6,
            BinOp::BitOr => 5,
            BinOp::And => 4,
            BinOp::Or => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    Plus,
}

/// The closed set of expression kinds the engine understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    /// A simple or qualified name (`A`, `X.Y`). Always at least one segment.
    Name { segments: Vec<NameSeg> },
    /// Explicit receiver-dot-field access where the receiver is a general
    /// expression, not a name chain.
    FieldAccess { receiver: Box<Expr>, name: NameSeg },
    MethodCall {
        receiver: Option<Box<Expr>>,
        name: NameSeg,
        args: Vec<Expr>,
    },
    Unary { op: UnOp, operand: Box<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Paren { inner: Box<Expr> },
    Literal { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub span: Span,
    pub scope: ScopeId,
    pub kind: ExprKind,
}

impl Expr {
    /// Child expressions in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Name { .. } | ExprKind::Literal { .. } => Vec::new(),
            ExprKind::FieldAccess { receiver, .. } => vec![receiver],
            ExprKind::MethodCall { receiver, args, .. } => {
                let mut out: Vec<&Expr> = Vec::new();
                if let Some(r) = receiver {
                    out.push(r);
                }
                out.extend(args.iter());
                out
            }
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Assign { lhs, rhs } => vec![lhs, rhs],
            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => vec![cond, then_branch, else_branch],
            ExprKind::Paren { inner } => vec![inner],
        }
    }

    /// Syntactic precedence of this expression as a substitution candidate.
    /// Atoms bind tightest; assignment loosest.
    pub fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Name { .. }
            | ExprKind::FieldAccess { .. }
            | ExprKind::MethodCall { .. }
            | ExprKind::Paren { .. }
            | ExprKind::Literal { .. } => 15,
            ExprKind::Unary { .. } => 13,
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Conditional { .. } => 2,
            ExprKind::Assign { .. } => 1,
        }
    }
}

/// The field declaration being inlined. Owned by the host's symbol table;
/// the engine clones only what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub symbol: SymbolKey,
    pub name: String,
    /// Span of the name within the declaration fragment.
    pub name_span: Span,
    /// Span of this fragment alone (`A = 1`).
    pub fragment_span: Span,
    /// Span of the whole declaration statement, including terminator.
    pub statement_span: Span,
    /// Number of fragments in the declaration statement this fragment
    /// belongs to (`static final int A = 1, B = 2;` has two).
    pub fragment_count: usize,
    pub is_static: bool,
    pub is_final: bool,
    pub visibility: Visibility,
    pub declaring_type: TypeKey,
    /// Scope the initializer expression occurs in.
    pub scope: ScopeId,
    /// Absent for blank finals and binary-only declarations.
    pub initializer: Option<Expr>,
}

/// One parsed file: expressions, declarations, and the scope/type tables
/// their tags point into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTree {
    pub file: FileId,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub types: BTreeMap<TypeKey, TypeInfo>,
    #[serde(default)]
    pub scopes: BTreeMap<ScopeId, ScopeInfo>,
    #[serde(default)]
    pub decls: Vec<FieldDecl>,
    /// Body expressions in source order (statement expressions, call
    /// arguments at top level of method bodies, and so on).
    #[serde(default)]
    pub exprs: Vec<Expr>,
}

impl SourceTree {
    pub fn type_info(&self, key: &TypeKey) -> Option<&TypeInfo> {
        self.types.get(key)
    }

    pub fn scope_info(&self, id: ScopeId) -> Option<&ScopeInfo> {
        self.scopes.get(&id)
    }

    pub fn decl_of(&self, symbol: &SymbolKey) -> Option<&FieldDecl> {
        self.decls.iter().find(|d| &d.symbol == symbol)
    }

    fn roots(&self) -> impl Iterator<Item = &Expr> {
        self.exprs
            .iter()
            .chain(self.decls.iter().filter_map(|d| d.initializer.as_ref()))
    }

    /// Innermost expression containing `span`, together with the path of
    /// ancestors leading to it (outermost first, innermost last).
    pub fn expr_path_at(&self, span: Span) -> Option<Vec<&Expr>> {
        let root = self.roots().find(|e| e.span.contains(span))?;
        let mut path = vec![root];
        loop {
            let current = *path.last().unwrap();
            match current.children().into_iter().find(|c| c.span.contains(span)) {
                Some(child) => path.push(child),
                None => return Some(path),
            }
        }
    }

    /// Innermost expression containing `span`.
    pub fn expr_at(&self, span: Span) -> Option<&Expr> {
        self.expr_path_at(span).map(|p| *p.last().unwrap())
    }
}
