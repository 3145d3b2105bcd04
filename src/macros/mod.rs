//! Macro system: registry and fixpoint expander.
//!
//! Macros are purely syntactic. A macro body is ordinary source-language
//! code that receives its argument forms unevaluated, runs in the
//! macro-time interpreter, and returns the replacement form. Expansion
//! repeats until the tree stops changing, detected by payload identity
//! rather than deep comparison.

pub mod expander;
pub mod registry;

pub use expander::{expand_program, parse_macro_definition, ExpandOptions};
pub use registry::{MacroDef, MacroRegistry};
