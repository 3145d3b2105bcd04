//! HQL: a Lisp dialect that compiles to ECMAScript modules.
//!
//! The pipeline reads S-expression source into metadata-carrying forms,
//! canonicalizes surface sugar, resolves and recursively compiles imports,
//! expands macros to fixpoint, lowers to a typed IR, validates scopes, and
//! emits module text together with a V3 source map.
//!
//! The usual entry points are [`compiler::compile`] for text input,
//! [`compiler::compile_file`] for files, and [`compiler::expand`] for
//! macro-expansion tooling.

pub mod ast;
pub mod cli;
pub mod compiler;
pub mod emit;
pub mod env;
pub mod errors;
pub mod imports;
pub mod interp;
pub mod ir;
pub mod macros;
pub mod stdlib;
pub mod syntax;
pub mod validate;

pub mod prelude {
    pub use crate::ast::{Form, Literal, Meta, Sexp};
    pub use crate::compiler::{
        compile, compile_file, expand, CompileContext, CompileOutput, CompilerOptions,
    };
    pub use crate::env::{Environment, ScopeId, GLOBAL_SCOPE};
    pub use crate::errors::{codes, ErrorKind, HqlError, Result, SourceContext};
    pub use crate::interp::{form_to_value, value_to_form, Value};
}

pub use compiler::{compile, compile_file, expand, CompileContext, CompileOutput, CompilerOptions};
pub use emit::{invalidate_source_map_cache, load_source_map, map_position};
pub use errors::{ErrorKind, HqlError, SourceContext};
