//! Accumulating validation status for the precondition pipeline.
//!
//! Every phase merges its findings into one `RefactoringStatus` instead of
//! throwing on recoverable conditions. The effective outcome is the maximum
//! severity over all findings; `Fatal` blocks the transformation, `Info`
//! still allows preview and application.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ast::{FileId, Span};

/// Ordered severity levels. Derived `Ord` follows declaration order, so
/// `Ok < Info < Warning < Error < Fatal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Ok => "ok",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Machine-readable cause of a finding. One code per distinct rejection
/// cause, so callers can message users precisely and tests can assert
/// mechanically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The file holding the selection could not be parsed into a
    /// structurally known tree.
    SyntaxErrors,
    /// The selection does not resolve to a static, final field reference.
    NotConstantSelected,
    /// The selected constant is declared in a local or anonymous scope.
    LocalOrAnonymousUnsupported,
    /// The declaration lives in a binary-only file; no fragment available.
    DeclaredInBinary,
    /// The constant has no initializer at its declaration (blank final).
    MissingInitializer,
    /// A referencing file has no source text available; its references
    /// are skipped.
    ReferenceInBinary,
    /// The initializer references an instance member and cannot carry its
    /// implicit receiver to the destination.
    NonStaticReference,
    /// A needed qualifier would name an anonymous class.
    AnonymousDeclaringType,
    /// No reference site survived synthesis.
    NoValidTargets,
}

/// Optional source-location context attached to a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusContext {
    pub file: FileId,
    pub span: Span,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: StatusCode,
    pub message: String,
    pub context: Option<StatusContext>,
}

/// Append-only list of findings with max-severity semantics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RefactoringStatus {
    findings: Vec<Finding>,
}

impl RefactoringStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fatal(code: StatusCode, message: impl Into<String>) -> Self {
        let mut status = Self::new();
        status.add(Severity::Fatal, code, message, None);
        status
    }

    pub fn add(
        &mut self,
        severity: Severity,
        code: StatusCode,
        message: impl Into<String>,
        context: Option<StatusContext>,
    ) {
        self.findings.push(Finding {
            severity,
            code,
            message: message.into(),
            context,
        });
    }

    pub fn add_info(
        &mut self,
        code: StatusCode,
        message: impl Into<String>,
        context: Option<StatusContext>,
    ) {
        self.add(Severity::Info, code, message, context);
    }

    pub fn add_fatal(
        &mut self,
        code: StatusCode,
        message: impl Into<String>,
        context: Option<StatusContext>,
    ) {
        self.add(Severity::Fatal, code, message, context);
    }

    /// Concatenate `other`'s findings onto this status.
    pub fn merge(&mut self, other: RefactoringStatus) {
        self.findings.extend(other.findings);
    }

    /// Maximum severity over all findings; `Ok` when empty.
    pub fn severity(&self) -> Severity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    pub fn has_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub fn is_ok(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Findings at exactly `code`, for differentiated messaging.
    pub fn findings_with_code(&self, code: StatusCode) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.code == code)
    }
}
