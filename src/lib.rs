//! Binding-aware inline-constant engine.
//!
//! Given a selection denoting a `static final` constant, the engine
//! replaces references to it with its initializer expression, rewriting
//! name qualification so every relocated name still binds to the same
//! declaration at its destination. The output is a set of positional
//! text edits per file, never mutated source.
//!
//! The host environment (parser, search index, buffers) plugs in through
//! [`host::SourceModel`]; [`memory::MemoryProject`] is a ready-made
//! in-memory implementation.

pub mod ast;
pub mod change;
pub mod collect;
pub mod edits;
pub mod host;
pub mod memory;
pub mod pipeline;
pub mod qualify;
pub mod status;
pub mod synth;

#[cfg(test)]
mod tests;

pub use change::{ChangeSet, FileChange};
pub use edits::{OrderedEditSet, StringEdit};
pub use host::{CancelToken, SourceModel};
pub use pipeline::InlineConstant;
pub use status::{RefactoringStatus, Severity, StatusCode};
