//! Positional string-edit algebra.
//!
//! Represents an ordered, non-overlapping set of insertions, deletions and
//! replacements over one buffer, and applies them deterministically. All
//! offsets address the *original* text: construction sorts ascending once,
//! application runs back-to-front so each splice leaves the offsets of the
//! not-yet-applied prefix untouched.
//!
//! Overlapping edits are a programming error in the caller, not a
//! recoverable condition; construction panics rather than silently
//! reordering. The one legal same-offset pairing is a zero-width insertion
//! at the start of a consuming edit: the insertion is ordered first and
//! lands before the consumed span. Two insertions at one offset have no
//! defined order and panic.

use serde::{Deserialize, Serialize};

use crate::ast::Span;

/// A single atomic edit against one buffer's original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StringEdit {
    Insert { offset: usize, text: String },
    Delete { offset: usize, len: usize },
    Replace {
        offset: usize,
        len: usize,
        text: String,
    },
}

impl StringEdit {
    pub fn offset(&self) -> usize {
        match self {
            StringEdit::Insert { offset, .. }
            | StringEdit::Delete { offset, .. }
            | StringEdit::Replace { offset, .. } => *offset,
        }
    }

    /// The span of original text this edit consumes. Empty for insertions.
    pub fn span(&self) -> Span {
        match self {
            StringEdit::Insert { offset, .. } => Span::new(*offset, 0),
            StringEdit::Delete { offset, len } => Span::new(*offset, *len),
            StringEdit::Replace { offset, len, .. } => Span::new(*offset, *len),
        }
    }

    fn apply_to(&self, text: &str) -> String {
        let span = self.span();
        let replacement = match self {
            StringEdit::Insert { text, .. } => text.as_str(),
            StringEdit::Delete { .. } => "",
            StringEdit::Replace { text, .. } => text.as_str(),
        };
        let mut out = String::with_capacity(text.len() + replacement.len());
        out.push_str(&text[..span.start]);
        out.push_str(replacement);
        out.push_str(&text[span.end()..]);
        out
    }
}

/// A validated, offset-sorted, non-overlapping group of edits for one
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderedEditSet {
    edits: Vec<StringEdit>,
}

impl OrderedEditSet {
    /// Sorts ascending by offset (insertions before a consuming edit at the
    /// same offset) and validates the overlap invariant.
    ///
    /// # Panics
    /// If two spans overlap, or two insertions share an offset.
    pub fn new(mut edits: Vec<StringEdit>) -> Self {
        edits.sort_by_key(|e| (e.offset(), e.span().len > 0));
        for pair in edits.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if prev.offset() == curr.offset() && prev.span().len == 0 && curr.span().len == 0 {
                panic!("edits at identical offset {}: {:?} and {:?}", prev.offset(), prev, curr);
            }
            if prev.span().end() > curr.span().start {
                panic!("overlapping edits: {:?} and {:?}", prev, curr);
            }
        }
        OrderedEditSet { edits }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn edits(&self) -> &[StringEdit] {
        &self.edits
    }

    /// Merge two sets into one, revalidating the invariant across the union.
    pub fn merged(self, other: OrderedEditSet) -> OrderedEditSet {
        let mut all = self.edits;
        all.extend(other.edits);
        OrderedEditSet::new(all)
    }

    /// Apply every edit to `text`, last edit first.
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for edit in self.edits.iter().rev() {
            result = edit.apply_to(&result);
        }
        result
    }
}
