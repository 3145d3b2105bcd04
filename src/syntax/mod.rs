//! Surface syntax: the reader (text to forms) and the sugar transformer
//! (surface forms to canonical forms).

pub mod reader;
pub mod transform;

pub use reader::read_program;
pub use transform::{parse_param_vector, transform_form, transform_program, ParamSpec};
