//! Unified error pipeline.
//!
//! Every phase reports through [`HqlError`]: a kind, a 4-digit `HQLNNNN`
//! code, a message, an optional source location with the original text for
//! context rendering, an optional suggestion, and an optional cause. The
//! miette `Diagnostic` impl drives the user-facing rendering: code, labeled
//! span with caret, help line, and a documentation URL.
//!
//! Codes are grouped by kind (1000..7999). When a constructor is not given
//! an explicit code, one is inferred from the message via a small pattern
//! table, and the default for the kind is used when nothing matches.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::Meta;

/// Error taxonomy. Each kind owns a code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Import,
    Macro,
    Validation,
    Transform,
    Runtime,
    CodeGen,
    Transpiler,
}

impl ErrorKind {
    pub const fn base_code(self) -> u16 {
        match self {
            Self::Parse => 1000,
            Self::Import => 2000,
            Self::Macro => 3000,
            Self::Validation => 4000,
            Self::Transform => 5000,
            Self::Runtime => 6000,
            Self::CodeGen => 7000,
            Self::Transpiler => 7500,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Import => "import",
            Self::Macro => "macro",
            Self::Validation => "validation",
            Self::Transform => "transform",
            Self::Runtime => "runtime",
            Self::CodeGen => "codegen",
            Self::Transpiler => "transpiler",
        }
    }
}

/// Named codes for errors the rest of the compiler raises by name.
pub mod codes {
    pub const UNCLOSED_LIST: u16 = 1001;
    pub const UNCLOSED_STRING: u16 = 1002;
    pub const UNCLOSED_COMMENT: u16 = 1003;
    pub const UNEXPECTED_TOKEN: u16 = 1004;
    pub const UNEXPECTED_EOF: u16 = 1005;
    pub const INVALID_CHARACTER: u16 = 1006;

    pub const MODULE_NOT_FOUND: u16 = 2001;
    pub const EXPORT_MISSING: u16 = 2002;
    pub const CIRCULAR_MACRO_IMPORT: u16 = 2003;
    pub const REMOTE_FETCH_FAILED: u16 = 2004;

    pub const MACRO_NOT_FOUND: u16 = 3001;
    pub const MACRO_EXPANSION_FAILED: u16 = 3002;
    pub const MACRO_RECURSION_LIMIT: u16 = 3003;

    pub const INVALID_EXPRESSION: u16 = 4001;
    pub const TDZ_VIOLATION: u16 = 4002;

    pub const INVALID_SYNTAX_SUGAR: u16 = 5001;

    pub const UNDEFINED_VARIABLE: u16 = 6001;
    pub const TYPE_MISMATCH: u16 = 6002;
    pub const ARITY_MISMATCH: u16 = 6003;

    pub const UNSUPPORTED_NODE: u16 = 7001;
    pub const SOURCE_MAP_INVALID: u16 = 7002;

    pub const TRANSPILE_FAILED: u16 = 7501;
}

/// Message patterns that pin down a code when the caller did not supply one.
static CODE_PATTERNS: Lazy<Vec<(Regex, u16)>> = Lazy::new(|| {
    let table: &[(&str, u16)] = &[
        (r"(?i)unclosed (list|paren)", codes::UNCLOSED_LIST),
        (r"(?i)unclosed string", codes::UNCLOSED_STRING),
        (r"(?i)unclosed (block )?comment", codes::UNCLOSED_COMMENT),
        (r"(?i)unexpected end of (input|file)", codes::UNEXPECTED_EOF),
        (r"(?i)unexpected token", codes::UNEXPECTED_TOKEN),
        (r"(?i)invalid character", codes::INVALID_CHARACTER),
        (r"(?i)module .* not found|cannot resolve module", codes::MODULE_NOT_FOUND),
        (r"(?i)does not export|missing export", codes::EXPORT_MISSING),
        (r"(?i)circular import involving macro", codes::CIRCULAR_MACRO_IMPORT),
        (r"(?i)failed to fetch|remote fetch", codes::REMOTE_FETCH_FAILED),
        (r"(?i)macro .* not found", codes::MACRO_NOT_FOUND),
        (r"(?i)(macro expansion|expansion) (failed|error)", codes::MACRO_EXPANSION_FAILED),
        (r"(?i)(iteration|recursion|expansion) limit", codes::MACRO_RECURSION_LIMIT),
        (r"(?i)duplicate declaration", codes::INVALID_EXPRESSION),
        (r"(?i)before (its )?declaration|temporal dead zone", codes::TDZ_VIOLATION),
        (r"(?i)undefined (variable|symbol)", codes::UNDEFINED_VARIABLE),
        (r"(?i)expected .* got|type mismatch", codes::TYPE_MISMATCH),
        (r"(?i)arity|wrong number of arguments", codes::ARITY_MISMATCH),
    ];
    table
        .iter()
        .map(|(pattern, code)| (Regex::new(pattern).unwrap(), *code))
        .collect()
});

/// Per-kind one-line suggestions used when the constructor supplies none.
fn default_suggestion(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Parse => Some("Check for balanced delimiters and complete literals."),
        ErrorKind::Import => Some("Verify the module path and its exported names."),
        ErrorKind::Macro => Some("Inspect the macro definition and its call site."),
        ErrorKind::Validation => Some("Rename or reorder the conflicting declarations."),
        _ => None,
    }
}

/// Original source text behind a diagnostic, named for rendering.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.clone())
    }
}

/// The single diagnostic type for the whole pipeline.
#[derive(Debug)]
pub struct HqlError {
    pub kind: ErrorKind,
    pub code: u16,
    message: String,
    pub location: Option<Meta>,
    pub source_ctx: Option<Arc<NamedSource<String>>>,
    source_text: Option<Arc<str>>,
    pub suggestion: Option<String>,
    /// Secondary label, e.g. the first declaration in a duplicate pair.
    pub related: Option<(String, Meta)>,
    pub cause: Option<Box<HqlError>>,
    reported: AtomicBool,
}

impl HqlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let raw = message.into();
        let message = strip_code_prefix(&raw);
        let code = infer_code(kind, &message);
        Self {
            kind,
            code,
            message,
            location: None,
            source_ctx: None,
            source_text: None,
            suggestion: default_suggestion(kind).map(String::from),
            related: None,
            cause: None,
            reported: AtomicBool::new(false),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Import, message)
    }

    pub fn macro_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Macro, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transform, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CodeGen, message)
    }

    pub fn transpiler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transpiler, message)
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn at(mut self, meta: &Meta) -> Self {
        self.location = Some(meta.clone());
        self
    }

    pub fn at_opt(mut self, meta: Option<&Meta>) -> Self {
        self.location = meta.cloned();
        self
    }

    pub fn with_source(mut self, ctx: &SourceContext) -> Self {
        self.source_ctx = Some(Arc::new(ctx.to_named_source()));
        self.source_text = Some(Arc::from(ctx.content.as_str()));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_related(mut self, label: impl Into<String>, meta: &Meta) -> Self {
        self.related = Some((label.into(), meta.clone()));
        self
    }

    pub fn caused_by(mut self, cause: HqlError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The raw message, without the code/location enhancement.
    pub fn raw_message(&self) -> &str {
        &self.message
    }

    /// The enhanced message: `[HQLNNNN] <msg> at <file>:<line>:<col>`.
    pub fn enhanced_message(&self) -> String {
        match &self.location {
            Some(meta) => format!(
                "[HQL{}] {} at {}",
                self.code,
                self.message,
                meta.location_string()
            ),
            None => format!("[HQL{}] {}", self.code, self.message),
        }
    }

    pub fn code_string(&self) -> String {
        format!("HQL{}", self.code)
    }

    /// Marks this error as reported; returns true on the first call only.
    /// The reporter uses this so a diagnostic is printed at most once.
    pub fn mark_reported(&self) -> bool {
        !self.reported.swap(true, Ordering::Relaxed)
    }

    fn label_span(&self) -> Option<LabeledSpan> {
        let meta = self.location.as_ref()?;
        let text = self.source_text.as_deref()?;
        let (start, end) = meta.to_offsets(text);
        let len = (end - start).max(1);
        Some(LabeledSpan::new(Some("here".to_string()), start, len))
    }

    fn related_span(&self) -> Option<LabeledSpan> {
        let (label, meta) = self.related.as_ref()?;
        let text = self.source_text.as_deref()?;
        let (start, end) = meta.to_offsets(text);
        let len = (end - start).max(1);
        Some(LabeledSpan::new(Some(label.clone()), start, len))
    }
}

fn infer_code(kind: ErrorKind, message: &str) -> u16 {
    let base = kind.base_code();
    let limit = if kind == ErrorKind::CodeGen {
        7500
    } else if kind == ErrorKind::Transpiler {
        8000
    } else {
        base + 1000
    };
    for (pattern, code) in CODE_PATTERNS.iter() {
        if *code >= base && *code < limit && pattern.is_match(message) {
            return *code;
        }
    }
    base
}

// A caller may hand us an already-enhanced message; keep exactly one prefix.
fn strip_code_prefix(message: &str) -> String {
    static PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[HQL\d{4}\]\s*").unwrap());
    PREFIX.replace(message, "").into_owned()
}

impl fmt::Display for HqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.enhanced_message())
    }
}

impl std::error::Error for HqlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl Diagnostic for HqlError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code_string()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.suggestion
            .as_ref()
            .map(|s| Box::new(s.clone()) as Box<dyn fmt::Display>)
    }

    fn url<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!(
            "https://hql-lang.org/docs/errors/{}",
            self.code_string()
        )))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let mut labels = Vec::new();
        if let Some(primary) = self.label_span() {
            labels.push(primary);
        }
        if let Some(related) = self.related_span() {
            labels.push(related);
        }
        if labels.is_empty() {
            None
        } else {
            Some(Box::new(labels.into_iter()))
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_ctx
            .as_deref()
            .map(|s| s as &dyn miette::SourceCode)
    }
}

pub type Result<T> = std::result::Result<T, HqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_codes_from_messages() {
        let err = HqlError::parse("Unclosed list starting at line 3");
        assert_eq!(err.code, codes::UNCLOSED_LIST);
        let err = HqlError::import("Module './x.hql' not found");
        assert_eq!(err.code, codes::MODULE_NOT_FOUND);
        let err = HqlError::macro_error("Expansion iteration limit of 100 exceeded");
        assert_eq!(err.code, codes::MACRO_RECURSION_LIMIT);
    }

    #[test]
    fn falls_back_to_kind_base() {
        let err = HqlError::codegen("something odd happened");
        assert_eq!(err.code, 7000);
    }

    #[test]
    fn enhanced_message_dedupes_prefix() {
        let err = HqlError::parse("[HQL1001] Unclosed list")
            .at(&Meta::synthetic("a.hql"));
        assert_eq!(err.enhanced_message(), "[HQL1001] Unclosed list at a.hql:1:1");
    }

    #[test]
    fn reported_at_most_once() {
        let err = HqlError::parse("x");
        assert!(err.mark_reported());
        assert!(!err.mark_reported());
    }
}
