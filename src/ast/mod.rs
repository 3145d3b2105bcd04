//! S-expression tree with source metadata.
//!
//! Every node the reader produces is a [`Form`]: a shared [`Sexp`] plus
//! optional [`Meta`] describing where it came from. Meta is owned by each
//! `Form` and copied on clone, never shared, so rewrites can retarget
//! positions without disturbing sibling nodes. The `Sexp` payload is behind
//! an `Rc`, which makes structural sharing cheap and lets the macro
//! expander detect fixpoints by pointer identity instead of deep comparison.
//! The pipeline is single-threaded; only the file label is `Arc<str>`,
//! because diagnostics embed it and must stay `Send + Sync` for reporting.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;

pub mod printer;

/// Head symbol synthesized for `[...]` literals.
pub const VECTOR: &str = "vector";
/// Head symbol synthesized for `{...}` literals.
pub const HASH_MAP: &str = "hash-map";

/// Source position attached to a form. Lines and columns are 1-based, the
/// way pest reports them and the way diagnostics print them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Meta {
    pub fn new(file: Arc<str>, line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            file,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// A zero-width position at the start of a file, for synthesized nodes.
    pub fn synthetic(file: &str) -> Self {
        Self {
            file: Arc::from(file),
            line: 1,
            column: 1,
            end_line: 1,
            end_column: 1,
        }
    }

    /// Byte offset range of this position within `content`.
    ///
    /// Diagnostics render against the original text, which wants byte
    /// offsets rather than line/column pairs.
    pub fn to_offsets(&self, content: &str) -> (usize, usize) {
        let start = offset_of(content, self.line, self.column);
        let end = offset_of(content, self.end_line, self.end_column);
        (start, end.max(start))
    }

    pub fn location_string(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.column)
    }
}

fn offset_of(content: &str, line: u32, column: u32) -> usize {
    let mut current_line = 1u32;
    let mut offset = 0usize;
    for l in content.split_inclusive('\n') {
        if current_line == line {
            let col = (column.saturating_sub(1)) as usize;
            return offset + col.min(l.len());
        }
        offset += l.len();
        current_line += 1;
    }
    content.len()
}

/// Literal payloads. Numbers keep the narrowest parse: `42` stays an
/// integer, `42.0` is a float.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The three S-expression cases. Vector and map literals are ordinary lists
/// with the reserved head symbols [`VECTOR`] and [`HASH_MAP`].
#[derive(Debug, PartialEq, Serialize)]
pub enum Sexp {
    Symbol(String),
    Literal(Literal),
    List(Vec<Form>),
}

/// An S-expression node: shared payload plus owned position metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form {
    pub sexp: Rc<Sexp>,
    pub meta: Option<Meta>,
}

impl Form {
    pub fn new(sexp: Sexp, meta: Option<Meta>) -> Self {
        Self {
            sexp: Rc::new(sexp),
            meta,
        }
    }

    pub fn symbol(name: impl Into<String>, meta: Option<Meta>) -> Self {
        Self::new(Sexp::Symbol(name.into()), meta)
    }

    pub fn literal(lit: Literal, meta: Option<Meta>) -> Self {
        Self::new(Sexp::Literal(lit), meta)
    }

    pub fn string(value: impl Into<String>, meta: Option<Meta>) -> Self {
        Self::literal(Literal::Str(value.into()), meta)
    }

    pub fn int(value: i64, meta: Option<Meta>) -> Self {
        Self::literal(Literal::Int(value), meta)
    }

    pub fn list(elements: Vec<Form>, meta: Option<Meta>) -> Self {
        Self::new(Sexp::List(elements), meta)
    }

    /// Rebuilds this form with different metadata, keeping the shared payload.
    pub fn with_meta(&self, meta: Option<Meta>) -> Self {
        Self {
            sexp: Rc::clone(&self.sexp),
            meta,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &*self.sexp {
            Sexp::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Form]> {
        match &*self.sexp {
            Sexp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &*self.sexp {
            Sexp::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    /// Head symbol of a non-empty list form, if any.
    pub fn head_symbol(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(Form::as_symbol)
    }

    /// True for `foo#` style symbols, which the quasi-quote walker replaces
    /// with fresh names.
    pub fn is_auto_gensym(&self) -> bool {
        matches!(self.as_symbol(), Some(name) if name.len() > 1 && name.ends_with('#'))
    }

    /// Keyword symbols (`:name`) double as map keys and string-ish values.
    pub fn as_keyword(&self) -> Option<&str> {
        match self.as_symbol() {
            Some(name) if name.len() > 1 && name.starts_with(':') => Some(&name[1..]),
            _ => None,
        }
    }

    /// Structural equality, ignoring metadata. The reader round-trip
    /// property is stated modulo positions.
    pub fn structural_eq(&self, other: &Form) -> bool {
        match (&*self.sexp, &*other.sexp) {
            (Sexp::Symbol(a), Sexp::Symbol(b)) => a == b,
            (Sexp::Literal(a), Sexp::Literal(b)) => a == b,
            (Sexp::List(a), Sexp::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y))
            }
            _ => false,
        }
    }

    /// Pointer identity of the payload. Unchanged nodes keep their `Rc`,
    /// which is what makes fixpoint detection cheap.
    pub fn same_node(&self, other: &Form) -> bool {
        Rc::ptr_eq(&self.sexp, &other.sexp)
    }

    pub fn to_source(&self) -> String {
        printer::print_form(self)
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_is_copied_not_shared() {
        let meta = Meta::synthetic("a.hql");
        let form = Form::int(1, Some(meta));
        let mut clone = form.clone();
        clone.meta.as_mut().unwrap().line = 99;
        assert_eq!(form.meta.as_ref().unwrap().line, 1);
    }

    #[test]
    fn with_meta_shares_payload() {
        let form = Form::symbol("x", None);
        let moved = form.with_meta(Some(Meta::synthetic("b.hql")));
        assert!(form.same_node(&moved));
    }

    #[test]
    fn auto_gensym_detection() {
        assert!(Form::symbol("tmp#", None).is_auto_gensym());
        assert!(!Form::symbol("#", None).is_auto_gensym());
        assert!(!Form::symbol("tmp", None).is_auto_gensym());
    }

    #[test]
    fn offsets_from_line_and_column() {
        let meta = Meta {
            file: Arc::from("t.hql"),
            line: 2,
            column: 3,
            end_line: 2,
            end_column: 5,
        };
        let (start, end) = meta.to_offsets("ab\ncdefg\n");
        assert_eq!(start, 5);
        assert_eq!(end, 7);
    }
}
