//! End-to-end scenarios over in-memory project fixtures.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::ast::{
    BinOp, Binding, Expr, ExprKind, FieldDecl, FileId, NameSeg, ScopeId, ScopeInfo, SourceTree,
    Span, SymbolKey, TypeInfo, TypeKey, Visibility,
};
use crate::edits::StringEdit;
use crate::host::CancelToken;
use crate::memory::{MemoryFile, MemoryProject};
use crate::pipeline::InlineConstant;
use crate::status::{Severity, StatusCode};

fn lit(start: usize, text: &str) -> Expr {
    Expr {
        span: Span::new(start, text.len()),
        scope: ScopeId(0),
        kind: ExprKind::Literal { text: text.into() },
    }
}

fn field_binding(declaring: &str, ident: &str, is_static: bool, is_final: bool) -> Binding {
    Binding::Field {
        symbol: SymbolKey(format!("{}#{}", declaring, ident)),
        declaring_type: TypeKey(declaring.into()),
        is_static,
        is_final,
    }
}

fn name(start: usize, ident: &str, scope: ScopeId, binding: Binding) -> Expr {
    Expr {
        span: Span::new(start, ident.len()),
        scope,
        kind: ExprKind::Name {
            segments: vec![NameSeg {
                ident: ident.into(),
                span: Span::new(start, ident.len()),
                binding: Some(binding),
            }],
        },
    }
}

fn constant_ref(start: usize, ident: &str, scope: ScopeId, declaring: &str) -> Expr {
    name(start, ident, scope, field_binding(declaring, ident, true, true))
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr, scope: ScopeId) -> Expr {
    let span = Span::new(lhs.span.start, rhs.span.end() - lhs.span.start);
    Expr {
        span,
        scope,
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

fn top_type(key: &str) -> (TypeKey, TypeInfo) {
    (
        TypeKey(key.into()),
        TypeInfo {
            name: Some(key.into()),
            enclosing: None,
        },
    )
}

fn class_scope(id: u32, containing: &str, locals: &[&str]) -> (ScopeId, ScopeInfo) {
    (
        ScopeId(id),
        ScopeInfo {
            containing_type: Some(TypeKey(containing.into())),
            declared_names: locals.iter().map(|s| s.to_string()).collect(),
        },
    )
}

fn mem_file(tree: SourceTree, text: &str, visible: &[&str]) -> MemoryFile {
    MemoryFile {
        tree,
        text: Some(text.into()),
        structure_known: true,
        import_offset: 0,
        visible_types: visible.iter().map(|t| TypeKey((*t).into())).collect(),
    }
}

/// The constant `A = Y + 1` in type `Outer` of file A.src, where `Y` is a
/// static final member of `Outer` referenced without a qualifier.
///
/// A.src, text "Y=6;A=Y+1;A;": declares Y and A, references A in `Outer`.
/// B.src, text "Y;A*2;": type `Client` with a local named `Y` in scope,
/// references A as a multiplication operand.
fn two_file_project() -> MemoryProject {
    let mut project = MemoryProject::new();

    let decl_y = FieldDecl {
        symbol: SymbolKey("Outer#Y".into()),
        name: "Y".into(),
        name_span: Span::new(0, 1),
        fragment_span: Span::new(0, 3),
        statement_span: Span::new(0, 4),
        fragment_count: 1,
        is_static: true,
        is_final: true,
        visibility: Visibility::Workspace,
        declaring_type: TypeKey("Outer".into()),
        scope: ScopeId(0),
        initializer: Some(lit(2, "6")),
    };
    let decl_a = FieldDecl {
        symbol: SymbolKey("Outer#A".into()),
        name: "A".into(),
        name_span: Span::new(4, 1),
        fragment_span: Span::new(4, 5),
        statement_span: Span::new(4, 6),
        fragment_count: 1,
        is_static: true,
        is_final: true,
        visibility: Visibility::Workspace,
        declaring_type: TypeKey("Outer".into()),
        scope: ScopeId(0),
        initializer: Some(binary(
            BinOp::Add,
            constant_ref(6, "Y", ScopeId(0), "Outer"),
            lit(8, "1"),
            ScopeId(0),
        )),
    };
    let tree_a = SourceTree {
        file: FileId("A.src".into()),
        package: None,
        types: BTreeMap::from([top_type("Outer")]),
        scopes: BTreeMap::from([class_scope(0, "Outer", &[])]),
        decls: vec![decl_y, decl_a],
        exprs: vec![constant_ref(10, "A", ScopeId(0), "Outer")],
    };
    project.insert(mem_file(tree_a, "Y=6;A=Y+1;A;", &["Outer"]));

    let local_y = name(0, "Y", ScopeId(1), Binding::Local { name: "Y".into() });
    let use_a = binary(
        BinOp::Mul,
        constant_ref(2, "A", ScopeId(1), "Outer"),
        lit(4, "2"),
        ScopeId(1),
    );
    let tree_b = SourceTree {
        file: FileId("B.src".into()),
        package: None,
        types: BTreeMap::from([top_type("Client")]),
        scopes: BTreeMap::from([class_scope(1, "Client", &["Y"])]),
        decls: Vec::new(),
        exprs: vec![local_y, use_a],
    };
    project.insert(mem_file(tree_b, "Y;A*2;", &["Client"]));

    project
}

/// `B = y + 1` where `y` is an instance field of `Outer`: inlinable within
/// `Outer`, rejected anywhere else.
fn instance_member_project(with_local_uses: bool) -> MemoryProject {
    let mut project = MemoryProject::new();

    let decl_b = FieldDecl {
        symbol: SymbolKey("Outer#B".into()),
        name: "B".into(),
        name_span: Span::new(0, 1),
        fragment_span: Span::new(0, 5),
        statement_span: Span::new(0, 6),
        fragment_count: 1,
        is_static: true,
        is_final: true,
        visibility: Visibility::Workspace,
        declaring_type: TypeKey("Outer".into()),
        scope: ScopeId(0),
        initializer: Some(binary(
            BinOp::Add,
            name(2, "y", ScopeId(0), field_binding("Outer", "y", false, false)),
            lit(4, "1"),
            ScopeId(0),
        )),
    };
    let mut exprs = Vec::new();
    if with_local_uses {
        exprs.push(constant_ref(6, "B", ScopeId(0), "Outer"));
        exprs.push(constant_ref(8, "B", ScopeId(0), "Outer"));
    }
    let text = if with_local_uses { "B=y+1;B;B;" } else { "B=y+1;" };
    let tree_a = SourceTree {
        file: FileId("A.src".into()),
        package: None,
        types: BTreeMap::from([top_type("Outer")]),
        scopes: BTreeMap::from([class_scope(0, "Outer", &[])]),
        decls: vec![decl_b],
        exprs,
    };
    project.insert(mem_file(tree_a, text, &["Outer"]));

    let tree_b = SourceTree {
        file: FileId("B.src".into()),
        package: None,
        types: BTreeMap::from([top_type("Client")]),
        scopes: BTreeMap::from([class_scope(1, "Client", &[])]),
        decls: Vec::new(),
        exprs: vec![constant_ref(0, "B", ScopeId(1), "Outer")],
    };
    project.insert(mem_file(tree_b, "B;", &["Client"]));

    project
}

fn run_to_change(
    project: &MemoryProject,
    file: &str,
    offset: usize,
    configure: impl FnOnce(&mut InlineConstant<'_>),
) -> crate::change::ChangeSet {
    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(project, FileId(file.into()), Span::new(offset, 1));
    let initial = refactoring.check_initial_conditions(&cancel).unwrap();
    assert!(!initial.has_fatal(), "initial: {:?}", initial.findings());
    configure(&mut refactoring);
    let final_status = refactoring.check_final_conditions(&cancel).unwrap();
    assert!(
        !final_status.has_fatal(),
        "final: {:?}",
        final_status.findings()
    );
    refactoring.create_change().unwrap()
}

#[test]
fn inline_across_two_files() {
    let project = two_file_project();
    let change_set = run_to_change(&project, "A.src", 10, |_| {});

    // Same containing type, no shadowing local: the initializer text is
    // relocated verbatim.
    let a = change_set.change_for(&FileId("A.src".into())).unwrap();
    assert_eq!(a.apply_to("Y=6;A=Y+1;A;"), "Y=6;A=Y+1;Y+1;");

    // Different type and a shadowing local `Y`: the member reference is
    // qualified, the substitution parenthesized under `*`, and the
    // qualifying type imported.
    let b = change_set.change_for(&FileId("B.src".into())).unwrap();
    assert_eq!(b.apply_to("Y;A*2;"), "import Outer;\nY;(Outer.Y+1)*2;");

    assert!(project.open_buffer_count() == 0);
}

#[test]
fn import_insertion_at_a_reference_offset() {
    // The referencing file starts with the reference itself, so the
    // import insertion and the replacement edit share offset 0.
    let mut project = two_file_project();
    let tree_b = SourceTree {
        file: FileId("B.src".into()),
        package: None,
        types: BTreeMap::from([top_type("Client")]),
        scopes: BTreeMap::from([class_scope(1, "Client", &[])]),
        decls: Vec::new(),
        exprs: vec![constant_ref(0, "A", ScopeId(1), "Outer")],
    };
    project.insert(mem_file(tree_b, "A;", &["Client"]));

    let change_set = run_to_change(&project, "A.src", 10, |_| {});
    let b = change_set.change_for(&FileId("B.src".into())).unwrap();
    assert_eq!(b.apply_to("A;"), "import Outer;\nOuter.Y+1;");
}

#[test]
fn change_carries_base_hashes() {
    let project = two_file_project();
    let change_set = run_to_change(&project, "A.src", 10, |_| {});
    let a = change_set.change_for(&FileId("A.src".into())).unwrap();
    assert!(a.is_current("Y=6;A=Y+1;A;"));
    assert!(!a.is_current("Y=6;A=Y+1;A; // touched"));
}

#[test]
fn removal_deletes_the_whole_sole_fragment_statement() {
    let project = two_file_project();
    let change_set = run_to_change(&project, "A.src", 10, |r| {
        r.set_remove_declaration(true).unwrap();
    });

    let a = change_set.change_for(&FileId("A.src".into())).unwrap();
    assert!(a
        .edits
        .edits()
        .contains(&StringEdit::Delete { offset: 4, len: 6 }));
    assert_eq!(a.apply_to("Y=6;A=Y+1;A;"), "Y=6;Y+1;");
}

#[test]
fn partial_success_skips_only_the_unsupported_site() {
    let project = instance_member_project(true);
    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(6, 1));
    refactoring.check_initial_conditions(&cancel).unwrap();
    let status = refactoring.check_final_conditions(&cancel).unwrap();

    // Exactly one finding, for the cross-type site; the two same-type
    // sites still produce edits.
    assert_eq!(status.severity(), Severity::Info);
    assert_eq!(
        status
            .findings_with_code(StatusCode::NonStaticReference)
            .count(),
        1
    );

    let change_set = refactoring.create_change().unwrap();
    let a = change_set.change_for(&FileId("A.src".into())).unwrap();
    assert_eq!(a.apply_to("B=y+1;B;B;"), "B=y+1;y+1;y+1;");
    assert!(change_set.change_for(&FileId("B.src".into())).is_none());
}

#[test]
fn no_replaceable_site_is_fatal() {
    let project = instance_member_project(false);
    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("B.src".into()), Span::new(0, 1));
    refactoring.check_initial_conditions(&cancel).unwrap();
    let status = refactoring.check_final_conditions(&cancel).unwrap();

    assert!(status.has_fatal());
    assert_eq!(
        status.findings_with_code(StatusCode::NoValidTargets).count(),
        1
    );
    assert!(refactoring.create_change().is_err());
    assert_eq!(project.open_buffer_count(), 0);
}

#[test]
fn removal_without_replace_all_is_rejected_up_front() {
    let project = two_file_project();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(10, 1));

    refactoring.set_replace_all(false).unwrap();
    assert!(refactoring.set_remove_declaration(true).is_err());

    refactoring.set_replace_all(true).unwrap();
    refactoring.set_remove_declaration(true).unwrap();
    assert!(refactoring.set_replace_all(false).is_err());
}

#[test]
fn declaration_selection_forces_replace_all() {
    let project = two_file_project();
    let cancel = CancelToken::new();
    // Offset 4 is the declared name `A` itself.
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(4, 1));
    refactoring.check_initial_conditions(&cancel).unwrap();

    assert_eq!(refactoring.is_declaration_selected(), Some(true));
    assert!(refactoring.set_replace_all(false).is_err());
}

#[test]
fn single_reference_mode_touches_only_the_selection() {
    let project = two_file_project();
    let change_set = run_to_change(&project, "B.src", 2, |r| {
        r.set_replace_all(false).unwrap();
    });

    assert!(change_set.change_for(&FileId("A.src".into())).is_none());
    let b = change_set.change_for(&FileId("B.src".into())).unwrap();
    assert_eq!(b.apply_to("Y;A*2;"), "import Outer;\nY;(Outer.Y+1)*2;");
}

#[test]
fn create_change_is_idempotent() {
    let project = two_file_project();
    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(10, 1));
    refactoring.check_initial_conditions(&cancel).unwrap();
    refactoring.check_final_conditions(&cancel).unwrap();

    let first = refactoring.create_change().unwrap();
    let second = refactoring.create_change().unwrap();
    assert_eq!(first, second);
}

#[test]
fn binary_only_referencing_file_is_skipped_with_info() {
    let mut project = two_file_project();
    project
        .files
        .get_mut(&FileId("B.src".into()))
        .unwrap()
        .text = None;

    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(10, 1));
    refactoring.check_initial_conditions(&cancel).unwrap();
    let status = refactoring.check_final_conditions(&cancel).unwrap();

    assert_eq!(status.severity(), Severity::Info);
    assert_eq!(
        status
            .findings_with_code(StatusCode::ReferenceInBinary)
            .count(),
        1
    );
    let change_set = refactoring.create_change().unwrap();
    assert!(change_set.change_for(&FileId("B.src".into())).is_none());
    assert!(change_set.change_for(&FileId("A.src".into())).is_some());
}

#[test]
fn cancellation_aborts_with_buffers_released() {
    let project = two_file_project();
    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(10, 1));
    refactoring.check_initial_conditions(&cancel).unwrap();

    cancel.cancel();
    assert!(refactoring.check_final_conditions(&cancel).is_err());
    assert_eq!(project.open_buffer_count(), 0);
}

#[test]
fn selecting_a_literal_is_not_a_constant() {
    let project = two_file_project();
    let cancel = CancelToken::new();
    // Offset 2 is the literal `6` in Y's initializer.
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(2, 1));
    let status = refactoring.check_initial_conditions(&cancel).unwrap();

    assert!(status.has_fatal());
    assert_eq!(
        status
            .findings_with_code(StatusCode::NotConstantSelected)
            .count(),
        1
    );
}

#[test]
fn blank_final_is_rejected() {
    let mut project = MemoryProject::new();
    let decl = FieldDecl {
        symbol: SymbolKey("Outer#A".into()),
        name: "A".into(),
        name_span: Span::new(0, 1),
        fragment_span: Span::new(0, 1),
        statement_span: Span::new(0, 2),
        fragment_count: 1,
        is_static: true,
        is_final: true,
        visibility: Visibility::Workspace,
        declaring_type: TypeKey("Outer".into()),
        scope: ScopeId(0),
        initializer: None,
    };
    let tree = SourceTree {
        file: FileId("A.src".into()),
        package: None,
        types: BTreeMap::from([top_type("Outer")]),
        scopes: BTreeMap::from([class_scope(0, "Outer", &[])]),
        decls: vec![decl],
        exprs: vec![constant_ref(2, "A", ScopeId(0), "Outer")],
    };
    project.insert(mem_file(tree, "A;A;", &["Outer"]));

    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(2, 1));
    let status = refactoring.check_initial_conditions(&cancel).unwrap();
    assert!(status.has_fatal());
    assert_eq!(
        status
            .findings_with_code(StatusCode::MissingInitializer)
            .count(),
        1
    );
}

#[test]
fn anonymous_declaring_type_is_rejected() {
    let mut project = MemoryProject::new();
    let decl = FieldDecl {
        symbol: SymbolKey("Outer$1#A".into()),
        name: "A".into(),
        name_span: Span::new(0, 1),
        fragment_span: Span::new(0, 3),
        statement_span: Span::new(0, 4),
        fragment_count: 1,
        is_static: true,
        is_final: true,
        visibility: Visibility::Workspace,
        declaring_type: TypeKey("Outer$1".into()),
        scope: ScopeId(0),
        initializer: Some(lit(2, "1")),
    };
    let tree = SourceTree {
        file: FileId("A.src".into()),
        package: None,
        types: BTreeMap::from([(
            TypeKey("Outer$1".into()),
            TypeInfo {
                name: None,
                enclosing: None,
            },
        )]),
        scopes: BTreeMap::from([class_scope(0, "Outer$1", &[])]),
        decls: vec![decl],
        exprs: vec![constant_ref(4, "A", ScopeId(0), "Outer$1")],
    };
    project.insert(mem_file(tree, "A=1;A;", &[]));

    let cancel = CancelToken::new();
    let mut refactoring =
        InlineConstant::new(&project, FileId("A.src".into()), Span::new(4, 1));
    let status = refactoring.check_initial_conditions(&cancel).unwrap();
    assert!(status.has_fatal());
    assert_eq!(
        status
            .findings_with_code(StatusCode::LocalOrAnonymousUnsupported)
            .count(),
        1
    );
}

#[test]
fn project_model_round_trips_through_a_file() {
    let project = two_file_project();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&project).unwrap().as_bytes())
        .unwrap();

    let loaded = MemoryProject::load(file.path()).unwrap();
    let change_set = run_to_change(&loaded, "A.src", 10, |_| {});
    let b = change_set.change_for(&FileId("B.src".into())).unwrap();
    assert_eq!(b.apply_to("Y;A*2;"), "import Outer;\nY;(Outer.Y+1)*2;");
}
