//! Sugar canonicalizer.
//!
//! Runs on the freshly read tree, before macro expansion, and again on every
//! macro expansion result so macros may emit sugar themselves. Rewrites are
//! in place on the tree shape but preserve the metadata of the rewritten
//! container, and unchanged subtrees keep their shared payload so fixpoint
//! detection in the expander stays cheap.
//!
//! Canonicalizations:
//! - `(=> body)` and `(=> [x y] body)` become `(fn __anon [...] body)`;
//!   implicit parameters are derived from the highest `$N` referenced.
//! - `(.method obj args...)` becomes `(js-call obj "method" args...)`.
//! - `(.prop obj)` with no arguments becomes `(js-interop obj "prop")`,
//!   the resolve-and-invoke-if-callable access.
//! - `(obj .prop)` becomes `(js-get obj "prop")`.

use crate::ast::{Form, Meta, Sexp, VECTOR};
use crate::errors::{codes, HqlError, Result};

/// Canonical head symbols that are never receivers of a `.prop` rewrite.
const RESERVED_HEADS: &[&str] = &[
    "quote",
    "quasiquote",
    "unquote",
    "unquote-splicing",
    "vector",
    "hash-map",
    "fn",
    "macro",
    "let",
    "var",
    "class",
    "enum",
    "import",
    "export",
    "js-call",
    "js-get",
    "js-interop",
    "=>",
    "if",
    "cond",
    "do",
    "when",
    "unless",
    "while",
    "for",
    "try",
    "throw",
    "return",
    "new",
    "get",
    "nth",
    "template-literal",
];

pub fn transform_program(forms: Vec<Form>) -> Result<Vec<Form>> {
    forms.into_iter().map(|f| transform_form(&f)).collect()
}

pub fn transform_form(form: &Form) -> Result<Form> {
    let items = match form.as_list() {
        Some(items) if !items.is_empty() => items,
        _ => return Ok(form.clone()),
    };

    // Quoted data is left untouched; quasiquote templates are walked at
    // expansion time where unquote depth is known.
    if matches!(form.head_symbol(), Some("quote" | "quasiquote")) {
        return Ok(form.clone());
    }

    if let Some(head) = form.head_symbol() {
        if head == "=>" {
            return transform_arrow(form, items);
        }
        if head.len() > 1 && head.starts_with('.') && !head[1..].contains('.') {
            return transform_dot_call(form, items, &head[1..].to_string());
        }
    }

    // (obj .prop) property access.
    if items.len() == 2 {
        if let Some(prop) = items[1].as_symbol() {
            if prop.len() > 1 && prop.starts_with('.') && !is_reserved_head(&items[0]) {
                let object = transform_form(&items[0])?;
                let rewritten = Form::list(
                    vec![
                        Form::symbol("js-get", items[1].meta.clone()),
                        object,
                        Form::string(&prop[1..], items[1].meta.clone()),
                    ],
                    form.meta.clone(),
                );
                return Ok(rewritten);
            }
        }
    }

    transform_children(form, items)
}

fn is_reserved_head(form: &Form) -> bool {
    matches!(form.as_symbol(), Some(name) if RESERVED_HEADS.contains(&name))
}

// Rebuild the list only when a child actually changed.
fn transform_children(form: &Form, items: &[Form]) -> Result<Form> {
    let mut changed = false;
    let mut new_items = Vec::with_capacity(items.len());
    for item in items {
        let transformed = transform_form(item)?;
        if !transformed.same_node(item) {
            changed = true;
        }
        new_items.push(transformed);
    }
    if changed {
        Ok(Form::list(new_items, form.meta.clone()))
    } else {
        Ok(form.clone())
    }
}

fn transform_arrow(form: &Form, items: &[Form]) -> Result<Form> {
    let meta = form.meta.clone();
    if items.len() < 2 {
        return Err(HqlError::transform("Arrow lambda is missing a body")
            .with_code(codes::INVALID_SYNTAX_SUGAR)
            .at_opt(form.meta.as_ref()));
    }

    let (params, body_start) = match explicit_arrow_params(&items[1]) {
        Some(params) if items.len() > 2 => (params, 2),
        _ => (implicit_arrow_params(&items[1..]), 1),
    };

    let mut param_vec = vec![Form::symbol(VECTOR, meta.clone())];
    param_vec.extend(params);

    let mut fn_form = vec![
        Form::symbol("fn", meta.clone()),
        Form::symbol("__anon", meta.clone()),
        Form::list(param_vec, meta.clone()),
    ];
    for body in &items[body_start..] {
        fn_form.push(transform_form(body)?);
    }
    Ok(Form::list(fn_form, meta))
}

// `(=> [x y] body)` style: a vector of plain symbols in first position.
fn explicit_arrow_params(form: &Form) -> Option<Vec<Form>> {
    let items = form.as_list()?;
    if form.head_symbol() != Some(VECTOR) {
        return None;
    }
    let params = &items[1..];
    if params.iter().all(|p| p.as_symbol().is_some()) {
        Some(params.to_vec())
    } else {
        None
    }
}

// `(=> (+ $0 $1))` style: parameters are $0..$N for the highest N used,
// or none at all when the body never mentions one.
fn implicit_arrow_params(body: &[Form]) -> Vec<Form> {
    let mut max: Option<u32> = None;
    for form in body {
        scan_dollar_refs(form, &mut max);
    }
    match max {
        Some(n) => (0..=n).map(|i| Form::symbol(format!("${}", i), None)).collect(),
        None => Vec::new(),
    }
}

fn scan_dollar_refs(form: &Form, max: &mut Option<u32>) {
    match &*form.sexp {
        Sexp::Symbol(name) => {
            if let Some(rest) = name.strip_prefix('$') {
                if let Ok(n) = rest.parse::<u32>() {
                    *max = Some(max.map_or(n, |m| m.max(n)));
                }
            }
        }
        Sexp::List(items) => {
            for item in items {
                scan_dollar_refs(item, max);
            }
        }
        Sexp::Literal(_) => {}
    }
}

fn transform_dot_call(form: &Form, items: &[Form], method: &str) -> Result<Form> {
    if items.len() < 2 {
        return Err(HqlError::transform(format!(
            "Method shorthand (.{} ...) needs a receiver",
            method
        ))
        .with_code(codes::INVALID_SYNTAX_SUGAR)
        .at_opt(form.meta.as_ref()));
    }
    let head_meta = items[0].meta.clone();
    let object = transform_form(&items[1])?;

    if items.len() == 2 {
        // Zero arguments: property that auto-invokes when callable.
        return Ok(Form::list(
            vec![
                Form::symbol("js-interop", head_meta.clone()),
                object,
                Form::string(method, head_meta),
            ],
            form.meta.clone(),
        ));
    }

    let mut call = vec![
        Form::symbol("js-call", head_meta.clone()),
        object,
        Form::string(method, head_meta),
    ];
    for arg in &items[2..] {
        call.push(transform_form(arg)?);
    }
    Ok(Form::list(call, form.meta.clone()))
}

// ============================================================================
// PARAMETER VECTORS
// ============================================================================

/// One parsed parameter: a name, optionally with a default expression or a
/// destructuring pattern form in place of the name.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub params: Vec<Param>,
    pub rest: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub pattern: Form,
    pub default: Option<Form>,
}

/// Parses the contents of a `[a b = 2 & rest]` parameter vector. The `&`
/// marker must be followed by exactly one symbol and nothing else.
pub fn parse_param_vector(form: &Form) -> Result<ParamSpec> {
    let items = match form.as_list() {
        Some(items) if form.head_symbol() == Some(VECTOR) => &items[1..],
        _ => {
            return Err(HqlError::transform("Expected a parameter vector")
                .with_code(codes::INVALID_SYNTAX_SUGAR)
                .at_opt(form.meta.as_ref()))
        }
    };

    let mut params = Vec::new();
    let mut rest = None;
    let mut i = 0;
    while i < items.len() {
        let item = &items[i];
        if item.is_symbol("&") {
            if rest.is_some() {
                return Err(HqlError::transform(
                    "Only one rest parameter is allowed in a parameter vector",
                )
                .with_code(codes::INVALID_SYNTAX_SUGAR)
                .at_opt(item.meta.as_ref()));
            }
            let name = items.get(i + 1).and_then(Form::as_symbol).ok_or_else(|| {
                HqlError::transform("Expected a symbol after '&'")
                    .with_code(codes::INVALID_SYNTAX_SUGAR)
                    .at_opt(item.meta.as_ref())
            })?;
            if i + 2 != items.len() {
                return Err(HqlError::transform(
                    "The rest parameter must be the final parameter",
                )
                .with_code(codes::INVALID_SYNTAX_SUGAR)
                .at_opt(item.meta.as_ref()));
            }
            rest = Some(name.to_string());
            break;
        }

        // `name = default` triples.
        let default = if items.get(i + 1).map(|f| f.is_symbol("=")) == Some(true) {
            let value = items.get(i + 2).cloned().ok_or_else(|| {
                HqlError::transform("Expected a default value after '='")
                    .with_code(codes::INVALID_SYNTAX_SUGAR)
                    .at_opt(item.meta.as_ref())
            })?;
            i += 2;
            Some(value)
        } else {
            None
        };

        params.push(Param {
            pattern: item.clone(),
            default,
        });
        i += 1;
    }

    Ok(ParamSpec { params, rest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::reader::read_program;

    fn transform_one(source: &str) -> Form {
        let forms = read_program(source, "t.hql").unwrap();
        transform_form(&forms[0]).unwrap()
    }

    #[test]
    fn arrow_with_explicit_params() {
        let f = transform_one("(=> [x y] (+ x y))");
        assert_eq!(f.to_source(), "(fn __anon [x y] (+ x y))");
    }

    #[test]
    fn arrow_with_implicit_params() {
        let f = transform_one("(=> (+ $0 $1))");
        assert_eq!(f.to_source(), "(fn __anon [$0 $1] (+ $0 $1))");
        let thunk = transform_one("(=> 42)");
        assert_eq!(thunk.to_source(), "(fn __anon [] 42)");
    }

    #[test]
    fn dot_method_call() {
        let f = transform_one("(.push items 4)");
        assert_eq!(f.to_source(), "(js-call items \"push\" 4)");
    }

    #[test]
    fn dot_zero_arg_is_interop() {
        let f = transform_one("(.toUpperCase name)");
        assert_eq!(f.to_source(), "(js-interop name \"toUpperCase\")");
    }

    #[test]
    fn property_access() {
        let f = transform_one("(user .name)");
        assert_eq!(f.to_source(), "(js-get user \"name\")");
    }

    #[test]
    fn quote_is_left_alone() {
        let f = transform_one("'(.push items 4)");
        assert_eq!(f.to_source(), "'(.push items 4)");
    }

    #[test]
    fn unchanged_tree_keeps_identity() {
        let forms = read_program("(+ 1 2)", "t.hql").unwrap();
        let out = transform_form(&forms[0]).unwrap();
        assert!(out.same_node(&forms[0]));
    }

    #[test]
    fn param_vector_with_defaults_and_rest() {
        let forms = read_program("[a b = 2 & more]", "t.hql").unwrap();
        let spec = parse_param_vector(&forms[0]).unwrap();
        assert_eq!(spec.params.len(), 2);
        assert_eq!(spec.params[0].pattern.as_symbol(), Some("a"));
        assert!(spec.params[1].default.is_some());
        assert_eq!(spec.rest.as_deref(), Some("more"));
    }

    #[test]
    fn double_rest_marker_rejected() {
        let forms = read_program("[a & b & c]", "t.hql").unwrap();
        assert!(parse_param_vector(&forms[0]).is_err());
    }
}
