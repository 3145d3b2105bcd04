//! Macro-time interpreter.
//!
//! A small tree-walking evaluator used while macros run: macro bodies are
//! ordinary source-language code, so the expander bridges into this module
//! to execute them. It is never used for the compiled program itself; the
//! compiler emits text, it does not execute it.

pub mod builtins;
pub mod eval;
pub mod value;

pub use eval::eval_form;
pub use value::{form_to_value, value_to_form, Closure, ExportMap, Value};
