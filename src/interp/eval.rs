//! The tree-walking evaluator for macro-time code.
//!
//! Evaluation happens during compilation only: macro bodies, compile-time
//! export expressions, and top-level definitions that later imports may
//! reference. Quasi-quotation lives here because macro bodies are where
//! templates are evaluated; the walker threads an explicit depth counter
//! and a per-template auto-gensym table.

use std::collections::HashMap;

use crate::ast::{Form, Literal, Meta, Sexp};
use crate::env::{Environment, ScopeId};
use crate::errors::{codes, HqlError, Result};
use crate::interp::builtins::lookup_builtin;
use crate::interp::value::{value_to_form, Closure, Value};
use crate::syntax::parse_param_vector;

pub fn eval_form(form: &Form, scope: ScopeId, env: &mut Environment) -> Result<Value> {
    match &*form.sexp {
        Sexp::Literal(lit) => Ok(literal_value(lit)),
        Sexp::Symbol(name) => eval_symbol(name, form, scope, env),
        Sexp::List(items) => eval_list(form, items, scope, env),
    }
}

/// Evaluates a body sequence, returning the last value.
pub fn eval_body(body: &[Form], scope: ScopeId, env: &mut Environment) -> Result<Value> {
    let mut result = Value::Null;
    for form in body {
        result = eval_form(form, scope, env)?;
    }
    Ok(result)
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(n) => Value::Float(*n),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn eval_symbol(name: &str, form: &Form, scope: ScopeId, env: &mut Environment) -> Result<Value> {
    if let Some(keyword) = form.as_keyword() {
        return Ok(Value::Str(keyword.to_string()));
    }
    match env.lookup(scope, name) {
        Ok(value) => Ok(value),
        Err(err) => match lookup_builtin(name) {
            Some(f) => Ok(Value::Builtin(
                lookup_builtin_name(name).unwrap_or("builtin"),
                f,
            )),
            None => Err(err.at_opt(form.meta.as_ref())),
        },
    }
}

// Builtin names are 'static; recover the static str for the Value tag.
fn lookup_builtin_name(name: &str) -> Option<&'static str> {
    const NAMES: &[&str] = &[
        "+", "-", "*", "/", "%", "<", ">", "<=", ">=", "==", "!=", "eq?", "not", "str", "list",
        "list?", "symbol?", "name", "%first", "%rest", "%length", "%empty?", "%nth",
    ];
    NAMES.iter().find(|n| **n == name).copied()
}

fn eval_list(form: &Form, items: &[Form], scope: ScopeId, env: &mut Environment) -> Result<Value> {
    let Some(head) = items.first() else {
        return Ok(Value::List(Vec::new()));
    };

    if let Some(name) = head.as_symbol() {
        match name {
            "quote" => return Ok(Value::Form(expect_arg(form, items, 1)?.clone())),
            "quasiquote" => {
                let template = expect_arg(form, items, 1)?;
                let mut gensyms = HashMap::new();
                return match eval_quasiquote(template, 0, &mut gensyms, scope, env)? {
                    QqResult::One(result) => Ok(Value::Form(result)),
                    QqResult::Many(_) => Err(HqlError::macro_error(
                        "Unquote-splicing cannot appear at the top of a template",
                    )
                    .with_code(codes::MACRO_EXPANSION_FAILED)
                    .at_opt(form.meta.as_ref())),
                };
            }
            "unquote" | "unquote-splicing" => {
                return Err(HqlError::macro_error(format!(
                    "{} is only valid inside a quasiquote template",
                    name
                ))
                .with_code(codes::MACRO_EXPANSION_FAILED)
                .at_opt(form.meta.as_ref()))
            }
            "if" => return eval_if(form, items, scope, env),
            "cond" => return eval_cond(items, scope, env),
            "when" | "unless" => return eval_when(name, form, items, scope, env),
            "and" => {
                let mut last = Value::Bool(true);
                for arg in &items[1..] {
                    last = eval_form(arg, scope, env)?;
                    if !last.truthy() {
                        return Ok(last);
                    }
                }
                return Ok(last);
            }
            "or" => {
                let mut last = Value::Null;
                for arg in &items[1..] {
                    last = eval_form(arg, scope, env)?;
                    if last.truthy() {
                        return Ok(last);
                    }
                }
                return Ok(last);
            }
            "do" => return eval_body(&items[1..], scope, env),
            "let" | "var" | "const" => return eval_let(name, form, items, scope, env),
            "=" => return eval_assign(form, items, scope, env),
            "fn" => return eval_fn(form, items, scope, env),
            _ => {}
        }
    }

    // Application.
    let callee = eval_form(head, scope, env)?;
    let mut args = Vec::with_capacity(items.len() - 1);
    for arg in &items[1..] {
        args.push(eval_form(arg, scope, env)?);
    }
    apply(&callee, &args, form.meta.as_ref(), env)
}

pub fn apply(
    callee: &Value,
    args: &[Value],
    meta: Option<&Meta>,
    env: &mut Environment,
) -> Result<Value> {
    match callee {
        Value::Builtin(_, f) => f(args).map_err(|e| e.at_opt(meta)),
        Value::Closure(closure) => {
            let call_scope = env.extend(closure.env);
            for (i, param) in closure.params.iter().enumerate() {
                // Missing arguments bind null, matching the target language.
                let value = args.get(i).cloned().unwrap_or(Value::Null);
                env.define(call_scope, param.clone(), value);
            }
            if let Some(rest) = &closure.rest {
                let remaining = if args.len() > closure.params.len() {
                    args[closure.params.len()..].to_vec()
                } else {
                    Vec::new()
                };
                env.define(call_scope, rest.clone(), Value::List(remaining));
            } else if args.len() > closure.params.len() {
                return Err(HqlError::runtime(format!(
                    "Wrong number of arguments to {}: expected {}, got {}",
                    closure.name.as_deref().unwrap_or("function"),
                    closure.params.len(),
                    args.len()
                ))
                .with_code(codes::ARITY_MISMATCH)
                .at_opt(meta));
            }
            eval_body(&closure.body, call_scope, env)
        }
        other => Err(HqlError::runtime(format!(
            "Cannot call a {} value at compile time",
            other.type_name()
        ))
        .with_code(codes::TYPE_MISMATCH)
        .at_opt(meta)),
    }
}

fn expect_arg<'a>(form: &Form, items: &'a [Form], index: usize) -> Result<&'a Form> {
    items.get(index).ok_or_else(|| {
        HqlError::runtime(format!(
            "Malformed {} form",
            form.head_symbol().unwrap_or("expression")
        ))
        .with_code(codes::TYPE_MISMATCH)
        .at_opt(form.meta.as_ref())
    })
}

fn eval_if(form: &Form, items: &[Form], scope: ScopeId, env: &mut Environment) -> Result<Value> {
    let test = eval_form(expect_arg(form, items, 1)?, scope, env)?;
    if test.truthy() {
        eval_form(expect_arg(form, items, 2)?, scope, env)
    } else {
        match items.get(3) {
            Some(alt) => eval_form(alt, scope, env),
            None => Ok(Value::Null),
        }
    }
}

// (cond t1 r1 t2 r2 ... [else rN]); `else`, `:else` and `true` all take the
// default branch.
fn eval_cond(items: &[Form], scope: ScopeId, env: &mut Environment) -> Result<Value> {
    let mut pairs = items[1..].chunks(2);
    for pair in &mut pairs {
        match pair {
            [test, result] => {
                let is_default = matches!(test.as_symbol(), Some("else" | ":else"));
                if is_default || eval_form(test, scope, env)?.truthy() {
                    return eval_form(result, scope, env);
                }
            }
            [orphan] => {
                return Err(HqlError::runtime("cond requires test/result pairs")
                    .with_code(codes::TYPE_MISMATCH)
                    .at_opt(orphan.meta.as_ref()))
            }
            _ => unreachable!(),
        }
    }
    Ok(Value::Null)
}

fn eval_when(
    name: &str,
    form: &Form,
    items: &[Form],
    scope: ScopeId,
    env: &mut Environment,
) -> Result<Value> {
    let test = eval_form(expect_arg(form, items, 1)?, scope, env)?;
    let run = if name == "when" {
        test.truthy()
    } else {
        !test.truthy()
    };
    if run {
        eval_body(&items[2..], scope, env)
    } else {
        Ok(Value::Null)
    }
}

// Three `let` shapes:
//   (let name value)              define in the current scope
//   (let (name value) body...)    one binding in a child scope
//   (let [n1 v1 n2 v2] body...)   sequential bindings in a child scope
// `var` always defines in the current scope, which is what lets macros
// build up state between template evaluations.
fn eval_let(
    head: &str,
    form: &Form,
    items: &[Form],
    scope: ScopeId,
    env: &mut Environment,
) -> Result<Value> {
    let first = expect_arg(form, items, 1)?;

    if let Some(name) = first.as_symbol() {
        let value = match items.get(2) {
            Some(init) => eval_form(init, scope, env)?,
            None => Value::Null,
        };
        env.define(scope, name.to_string(), value.clone());
        return Ok(value);
    }

    if head == "var" || head == "const" {
        return Err(HqlError::runtime(format!("Malformed {} form", head))
            .with_code(codes::TYPE_MISMATCH)
            .at_opt(form.meta.as_ref()));
    }

    let child = env.extend(scope);
    match &*first.sexp {
        Sexp::List(binding) if first.head_symbol() == Some(crate::ast::VECTOR) => {
            let pairs = &binding[1..];
            if pairs.len() % 2 != 0 {
                return Err(HqlError::runtime("let binding vector needs name/value pairs")
                    .with_code(codes::TYPE_MISMATCH)
                    .at_opt(first.meta.as_ref()));
            }
            for pair in pairs.chunks(2) {
                let name = pair[0].as_symbol().ok_or_else(|| {
                    HqlError::runtime("let binding name must be a symbol")
                        .with_code(codes::TYPE_MISMATCH)
                        .at_opt(pair[0].meta.as_ref())
                })?;
                let value = eval_form(&pair[1], child, env)?;
                env.define(child, name.to_string(), value);
            }
        }
        Sexp::List(binding) if binding.len() == 2 => {
            let name = binding[0].as_symbol().ok_or_else(|| {
                HqlError::runtime("let binding name must be a symbol")
                    .with_code(codes::TYPE_MISMATCH)
                    .at_opt(binding[0].meta.as_ref())
            })?;
            let value = eval_form(&binding[1], child, env)?;
            env.define(child, name.to_string(), value);
        }
        _ => {
            return Err(HqlError::runtime("Malformed let form")
                .with_code(codes::TYPE_MISMATCH)
                .at_opt(form.meta.as_ref()))
        }
    }
    eval_body(&items[2..], child, env)
}

fn eval_assign(form: &Form, items: &[Form], scope: ScopeId, env: &mut Environment) -> Result<Value> {
    let target = expect_arg(form, items, 1)?;
    let value = eval_form(expect_arg(form, items, 2)?, scope, env)?;
    let name = target.as_symbol().ok_or_else(|| {
        HqlError::runtime("Assignment target must be a symbol at compile time")
            .with_code(codes::TYPE_MISMATCH)
            .at_opt(target.meta.as_ref())
    })?;
    env.assign(scope, name, value.clone());
    Ok(value)
}

// (fn name [params] body...) defines and returns a closure; the anonymous
// shape (fn [params] body...) just returns it.
fn eval_fn(form: &Form, items: &[Form], scope: ScopeId, env: &mut Environment) -> Result<Value> {
    let (name, params_index) = match items.get(1).and_then(Form::as_symbol) {
        Some(name) => (Some(name.to_string()), 2),
        None => (None, 1),
    };
    let params_form = expect_arg(form, items, params_index)?;
    let spec = parse_param_vector(params_form)?;
    let mut params = Vec::with_capacity(spec.params.len());
    for param in &spec.params {
        let name = param.pattern.as_symbol().ok_or_else(|| {
            HqlError::runtime("Destructuring parameters are not available at compile time")
                .with_code(codes::TYPE_MISMATCH)
                .at_opt(param.pattern.meta.as_ref())
        })?;
        params.push(name.to_string());
    }
    let closure = Value::Closure(std::rc::Rc::new(Closure {
        name: name.clone(),
        params,
        rest: spec.rest,
        body: items[params_index + 1..].to_vec(),
        env: scope,
    }));
    if let Some(name) = name {
        env.define(scope, name, closure.clone());
    }
    Ok(closure)
}

// ============================================================================
// QUASI-QUOTATION
// ============================================================================

/// A processed template node: most nodes produce one form, splices produce
/// several that flatten into the surrounding list.
pub enum QqResult {
    One(Form),
    Many(Vec<Form>),
}

/// Walks a quasiquote template. `depth` zero is the outermost template;
/// nested quasiquotes increment it and unquotes decrement it, so only
/// unquotes belonging to this template evaluate. `gensyms` maps `foo#`
/// prefixes to the fresh name chosen for this template.
pub fn eval_quasiquote(
    template: &Form,
    depth: usize,
    gensyms: &mut HashMap<String, String>,
    scope: ScopeId,
    env: &mut Environment,
) -> Result<QqResult> {
    match &*template.sexp {
        Sexp::Symbol(name) if template.is_auto_gensym() => {
            let fresh = gensyms
                .entry(name.clone())
                .or_insert_with_key(|key| env.gensym(key))
                .clone();
            Ok(QqResult::One(Form::symbol(fresh, template.meta.clone())))
        }
        Sexp::Symbol(_) | Sexp::Literal(_) => Ok(QqResult::One(template.clone())),
        Sexp::List(items) => match template.head_symbol() {
            Some("unquote") if items.len() == 2 => {
                if depth == 0 {
                    let value = eval_form(&items[1], scope, env)?;
                    if let Value::Splice(forms) = value {
                        return Ok(QqResult::Many(forms));
                    }
                    let form = value_to_form(&value, items[1].meta.as_ref())?;
                    Ok(QqResult::One(form))
                } else {
                    rebuild_wrapper(template, items, depth - 1, gensyms, scope, env)
                }
            }
            Some("unquote-splicing") if items.len() == 2 => {
                if depth == 0 {
                    let value = eval_form(&items[1], scope, env)?;
                    Ok(QqResult::Many(splice_value(&value, &items[1])?))
                } else {
                    rebuild_wrapper(template, items, depth - 1, gensyms, scope, env)
                }
            }
            Some("quasiquote") if items.len() == 2 => {
                // A nested template: deeper depth and a fresh gensym table.
                let mut nested_gensyms = HashMap::new();
                rebuild_wrapper(template, items, depth + 1, &mut nested_gensyms, scope, env)
            }
            _ => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    match eval_quasiquote(item, depth, gensyms, scope, env)? {
                        QqResult::One(form) => elements.push(form),
                        QqResult::Many(forms) => elements.extend(forms),
                    }
                }
                Ok(QqResult::One(Form::list(elements, template.meta.clone())))
            }
        },
    }
}

fn rebuild_wrapper(
    template: &Form,
    items: &[Form],
    inner_depth: usize,
    gensyms: &mut HashMap<String, String>,
    scope: ScopeId,
    env: &mut Environment,
) -> Result<QqResult> {
    let inner = match eval_quasiquote(&items[1], inner_depth, gensyms, scope, env)? {
        QqResult::One(form) => form,
        QqResult::Many(_) => {
            return Err(HqlError::macro_error(
                "Unquote-splicing cannot be the direct body of a nested template",
            )
            .with_code(codes::MACRO_EXPANSION_FAILED)
            .at_opt(template.meta.as_ref()))
        }
    };
    Ok(QqResult::One(Form::list(
        vec![items[0].clone(), inner],
        template.meta.clone(),
    )))
}

// Spliced values must be sequences. A spliced list form drops the
// reader-synthesized `vector` head before contributing its elements.
fn splice_value(value: &Value, site: &Form) -> Result<Vec<Form>> {
    match value {
        Value::Splice(forms) => Ok(forms.clone()),
        Value::List(values) => values
            .iter()
            .map(|v| value_to_form(v, site.meta.as_ref()))
            .collect(),
        Value::Form(form) => match form.as_list() {
            Some(items) => {
                let items = if form.head_symbol() == Some(crate::ast::VECTOR) {
                    &items[1..]
                } else {
                    items
                };
                Ok(items.to_vec())
            }
            None => Err(splice_error(value, site)),
        },
        _ => Err(splice_error(value, site)),
    }
}

fn splice_error(value: &Value, site: &Form) -> HqlError {
    HqlError::macro_error(format!(
        "Unquote-splicing expected a list, got {}",
        value.type_name()
    ))
    .with_code(codes::MACRO_EXPANSION_FAILED)
    .at_opt(site.meta.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::GLOBAL_SCOPE;
    use crate::syntax::reader::read_program;

    fn eval_str(source: &str, env: &mut Environment) -> Value {
        let forms = read_program(source, "eval.hql").unwrap();
        let mut result = Value::Null;
        for form in forms {
            result = eval_form(&form, GLOBAL_SCOPE, env).unwrap();
        }
        result
    }

    #[test]
    fn arithmetic_and_comparison() {
        let mut env = Environment::new();
        assert_eq!(eval_str("(+ 1 2 3)", &mut env), Value::Int(6));
        assert_eq!(eval_str("(< 1 2)", &mut env), Value::Bool(true));
        assert_eq!(eval_str("(if (> 1 2) 10 20)", &mut env), Value::Int(20));
    }

    #[test]
    fn let_shapes() {
        let mut env = Environment::new();
        assert_eq!(eval_str("(let x 5) x", &mut env), Value::Int(5));
        assert_eq!(eval_str("(let (y 6) (+ y 1))", &mut env), Value::Int(7));
        assert_eq!(
            eval_str("(let [a 1 b (+ a 1)] (+ a b))", &mut env),
            Value::Int(3)
        );
        // Scoped bindings do not leak.
        assert!(env.lookup(GLOBAL_SCOPE, "y").is_err());
    }

    #[test]
    fn functions_and_rest_params() {
        let mut env = Environment::new();
        assert_eq!(
            eval_str("(fn add2 [x y] (+ x y)) (add2 3 4)", &mut env),
            Value::Int(7)
        );
        assert_eq!(
            eval_str("(fn count-rest [a & more] (%length more)) (count-rest 1 2 3 4)", &mut env),
            Value::Int(3)
        );
    }

    #[test]
    fn cond_with_else() {
        let mut env = Environment::new();
        assert_eq!(
            eval_str("(cond (< 2 1) 10 else 99)", &mut env),
            Value::Int(99)
        );
    }

    #[test]
    fn quote_and_quasiquote() {
        let mut env = Environment::new();
        let v = eval_str("'(a b)", &mut env);
        assert!(matches!(&v, Value::Form(f) if f.to_source() == "(a b)"));

        let v = eval_str("(let x 5) `(a ~x)", &mut env);
        assert!(matches!(&v, Value::Form(f) if f.to_source() == "(a 5)"));
    }

    #[test]
    fn unquote_splicing_lists_and_vectors() {
        let mut env = Environment::new();
        let v = eval_str("(let xs (list 1 2 3)) `(a ~@xs b)", &mut env);
        assert!(matches!(&v, Value::Form(f) if f.to_source() == "(a 1 2 3 b)"));

        // A spliced vector form loses its synthesized head.
        let v = eval_str("(let ys '[7 8]) `(c ~@ys)", &mut env);
        assert!(matches!(&v, Value::Form(f) if f.to_source() == "(c 7 8)"));
    }

    #[test]
    fn auto_gensym_same_within_template() {
        let mut env = Environment::new();
        let v = eval_str("`(let (tmp# 1) tmp#)", &mut env);
        let Value::Form(form) = v else { panic!() };
        let items = form.as_list().unwrap();
        let bound = items[1].as_list().unwrap()[0].as_symbol().unwrap();
        let used = items[2].as_symbol().unwrap();
        assert_eq!(bound, used);
        assert!(bound.starts_with("tmp__"));

        // A second template gets a different fresh symbol.
        let v2 = eval_str("`(tmp#)", &mut env);
        let Value::Form(form2) = v2 else { panic!() };
        assert_ne!(form2.as_list().unwrap()[0].as_symbol().unwrap(), bound);
    }

    #[test]
    fn nested_quasiquote_depth() {
        let mut env = Environment::new();
        // The inner template keeps its unquote; only depth-zero evaluates.
        let v = eval_str("(let x 1) ``(~x)", &mut env);
        let Value::Form(form) = v else { panic!() };
        assert_eq!(form.to_source(), "`(~x)");
    }

    #[test]
    fn keywords_evaluate_to_strings() {
        let mut env = Environment::new();
        assert_eq!(eval_str("(name :hello)", &mut env), Value::Str("hello".into()));
    }
}
