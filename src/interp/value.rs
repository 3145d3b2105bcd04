//! The macro-time value space.
//!
//! Values exist only during compilation: macro bodies, compile-time export
//! evaluation, and the expander bridge all trade in [`Value`]. S-expressions
//! pass through as [`Value::Form`] so macro code can introspect them, and
//! module exports live behind a shared, mutable map so circular imports
//! observe later mutations.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Form, Literal, Meta, Sexp, HASH_MAP};
use crate::env::ScopeId;
use crate::errors::{codes, HqlError, Result};

/// One stable exports mapping per module. Never replaced, only mutated, so
/// every importer observes later assignments (live bindings).
pub type ExportMap = Rc<RefCell<HashMap<String, Value>>>;

pub fn new_export_map() -> ExportMap {
    Rc::new(RefCell::new(HashMap::new()))
}

pub type BuiltinFn = fn(&[Value]) -> Result<Value>;

/// A user function captured at macro time.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub rest: Option<String>,
    pub body: Vec<Form>,
    pub env: ScopeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Rest-parameter arguments: a sequence of forms that splices itself
    /// when unquoted inside a template.
    Splice(Vec<Form>),
    Map(im::HashMap<String, Value>),
    /// An S-expression passed through unchanged for introspection.
    Form(Form),
    Closure(Rc<Closure>),
    Builtin(&'static str, BuiltinFn),
    /// A module's live exports mapping.
    Module(ExportMap),
    /// A value that only exists at target runtime (JS shim exports,
    /// deferred bindings). Lookups succeed; using it as data does not.
    Opaque(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Splice(_) => "rest-arguments",
            Value::Map(_) => "map",
            Value::Form(_) => "form",
            Value::Closure(_) => "function",
            Value::Builtin(..) => "builtin",
            Value::Module(_) => "module",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Only `null` and `false` are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Splice(forms) => {
                write!(f, "(")?;
                for (i, form) in forms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", form)?;
                }
                write!(f, ")")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, ":{} {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Form(form) => write!(f, "{}", form),
            Value::Closure(c) => write!(f, "#<fn {}>", c.name.as_deref().unwrap_or("anonymous")),
            Value::Builtin(name, _) => write!(f, "#<builtin {}>", name),
            Value::Module(_) => write!(f, "#<module>"),
            Value::Opaque(name) => write!(f, "#<opaque {}>", name),
        }
    }
}

/// Converts a macro argument form to a value. Literals become primitives;
/// symbols and lists pass through unchanged so introspection works.
pub fn form_to_value(form: &Form) -> Value {
    match &*form.sexp {
        Sexp::Literal(Literal::Null) => Value::Null,
        Sexp::Literal(Literal::Bool(b)) => Value::Bool(*b),
        Sexp::Literal(Literal::Int(n)) => Value::Int(*n),
        Sexp::Literal(Literal::Float(n)) => Value::Float(*n),
        Sexp::Literal(Literal::Str(s)) => Value::Str(s.clone()),
        _ => Value::Form(form.clone()),
    }
}

/// Converts an evaluated value back to a form for macro output.
pub fn value_to_form(value: &Value, meta: Option<&Meta>) -> Result<Form> {
    let meta = meta.cloned();
    match value {
        Value::Null => Ok(Form::literal(Literal::Null, meta)),
        Value::Bool(b) => Ok(Form::literal(Literal::Bool(*b), meta)),
        Value::Int(n) => Ok(Form::literal(Literal::Int(*n), meta)),
        Value::Float(n) => Ok(Form::literal(Literal::Float(*n), meta)),
        Value::Str(s) => Ok(Form::literal(Literal::Str(s.clone()), meta)),
        Value::Form(form) => Ok(form.clone()),
        Value::List(items) => {
            let elements: Result<Vec<_>> =
                items.iter().map(|v| value_to_form(v, meta.as_ref())).collect();
            Ok(Form::list(elements?, meta))
        }
        Value::Splice(forms) => Ok(Form::list(forms.clone(), meta)),
        Value::Map(map) => {
            let mut elements = vec![Form::symbol(HASH_MAP, meta.clone())];
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            for key in keys {
                elements.push(Form::symbol(format!(":{}", key), meta.clone()));
                let value = map.get(key).expect("key came from the map");
                elements.push(value_to_form(value, meta.as_ref())?);
            }
            Ok(Form::list(elements, meta))
        }
        other => Err(HqlError::macro_error(format!(
            "Macro expansion failed: a {} value cannot appear in expanded code",
            other.type_name()
        ))
        .with_code(codes::MACRO_EXPANSION_FAILED)
        .at_opt(meta.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_cross_the_bridge_as_primitives() {
        let form = Form::int(3, None);
        assert_eq!(form_to_value(&form), Value::Int(3));
        let sym = Form::symbol("x", None);
        assert!(matches!(form_to_value(&sym), Value::Form(_)));
    }

    #[test]
    fn value_round_trips_to_form() {
        let v = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
        let form = value_to_form(&v, None).unwrap();
        assert_eq!(form.to_source(), "(1 \"a\")");
    }

    #[test]
    fn closures_do_not_embed() {
        let c = Value::Closure(Rc::new(Closure {
            name: None,
            params: vec![],
            rest: None,
            body: vec![],
            env: ScopeId(0),
        }));
        assert!(value_to_form(&c, None).is_err());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::Str(String::new()).truthy());
    }
}
