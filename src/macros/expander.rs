//! The fixpoint macro expander.
//!
//! One pass over a file: collect top-level `macro` definitions into the
//! registry, then repeatedly walk every expression expanding accessible
//! macro calls until a full sweep changes nothing. The walk is bounded both
//! by an iteration limit across sweeps and a depth limit per call chain, so
//! a macro that keeps producing new macro calls fails loudly instead of
//! spinning.
//!
//! Every node of an expansion that carries a different file path than the
//! call site is restamped with the call-site position, so diagnostics for
//! expanded code point at the call, not at the macro definition.

use sha2::{Digest, Sha256};

use crate::ast::{Form, Meta};
use crate::env::{Environment, ScopeId};
use crate::errors::{codes, HqlError, Result};
use crate::interp::value::{form_to_value, value_to_form, Value};
use crate::interp::eval::eval_body;
use crate::syntax::{parse_param_vector, transform_form};

use super::registry::MacroDef;

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    pub use_cache: bool,
    pub iteration_limit: usize,
    pub max_expand_depth: usize,
    pub current_file: Option<String>,
    /// Registers `macro` forms as system macros; set while loading the
    /// embedded stdlib.
    pub system_mode: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            iteration_limit: 100,
            max_expand_depth: 100,
            current_file: None,
            system_mode: false,
        }
    }
}

/// Expands a top-level sequence to fixpoint. Macro definition forms are
/// registered first and removed from the output.
pub fn expand_program(
    forms: Vec<Form>,
    scope: ScopeId,
    env: &mut Environment,
    opts: &ExpandOptions,
) -> Result<Vec<Form>> {
    if let Some(file) = &opts.current_file {
        env.current_file = Some(file.clone());
    }

    // Phase 1: register macro definitions.
    for form in &forms {
        if form.head_symbol() == Some("macro") {
            let def = parse_macro_definition(form, env)?;
            env.define_macro(def, opts.system_mode);
        }
    }

    // Phase 2: expand to fixpoint.
    let mut forms = forms;
    let mut settled = false;
    for _ in 0..opts.iteration_limit {
        let mut changed = false;
        let mut next = Vec::with_capacity(forms.len());
        for form in &forms {
            let expanded = expand_form(form, 0, scope, env, opts)?;
            if !expanded.same_node(form) {
                changed = true;
            }
            next.push(expanded);
        }
        forms = next;
        if !changed {
            settled = true;
            break;
        }
    }
    if !settled {
        return Err(HqlError::macro_error(format!(
            "Macro expansion iteration limit of {} exceeded",
            opts.iteration_limit
        ))
        .with_code(codes::MACRO_RECURSION_LIMIT)
        .with_suggestion("A macro keeps producing new macro calls; check for unbounded recursion."));
    }

    // Phase 3: macro definitions do not survive into the compiled output.
    Ok(forms
        .into_iter()
        .filter(|form| form.head_symbol() != Some("macro"))
        .collect())
}

/// Parses `(macro name [params] body...)` into a definition record.
pub fn parse_macro_definition(form: &Form, env: &Environment) -> Result<MacroDef> {
    let items = form.as_list().unwrap_or_default();
    let name = items.get(1).and_then(Form::as_symbol).ok_or_else(|| {
        HqlError::macro_error("Macro definition is missing a name")
            .with_code(codes::MACRO_EXPANSION_FAILED)
            .at_opt(form.meta.as_ref())
    })?;
    let params_form = items.get(2).ok_or_else(|| {
        HqlError::macro_error(format!("Macro '{}' is missing a parameter vector", name))
            .with_code(codes::MACRO_EXPANSION_FAILED)
            .at_opt(form.meta.as_ref())
    })?;
    let spec = parse_param_vector(params_form)?;
    let mut params = Vec::with_capacity(spec.params.len());
    for param in &spec.params {
        let param_name = param.pattern.as_symbol().ok_or_else(|| {
            HqlError::macro_error(format!(
                "Macro '{}' parameters must be plain symbols",
                name
            ))
            .with_code(codes::MACRO_EXPANSION_FAILED)
            .at_opt(param.pattern.meta.as_ref())
        })?;
        params.push(param_name.to_string());
    }
    Ok(MacroDef {
        name: name.to_string(),
        params,
        rest: spec.rest,
        body: items[3..].to_vec(),
        source_file: env.current_file.clone().unwrap_or_default(),
    })
}

fn expand_form(
    form: &Form,
    depth: usize,
    scope: ScopeId,
    env: &mut Environment,
    opts: &ExpandOptions,
) -> Result<Form> {
    if depth > opts.max_expand_depth {
        return Err(HqlError::macro_error(format!(
            "Macro expansion depth limit of {} exceeded",
            opts.max_expand_depth
        ))
        .with_code(codes::MACRO_RECURSION_LIMIT)
        .at_opt(form.meta.as_ref()));
    }

    let items = match form.as_list() {
        Some(items) if !items.is_empty() => items,
        _ => return Ok(form.clone()),
    };

    // Quoted data and macro definitions are not expansion territory;
    // template bodies expand after instantiation.
    if matches!(form.head_symbol(), Some("quote" | "quasiquote" | "macro")) {
        return Ok(form.clone());
    }

    if let Some(head) = form.head_symbol() {
        if env.is_macro_accessible(head) {
            let expansion = invoke_macro(head, form, items, scope, env, opts)?;
            return expand_form(&expansion, depth + 1, scope, env, opts);
        }
    }

    // Not a macro call: expand children, preserving identity when nothing
    // underneath changed.
    let mut changed = false;
    let mut new_items = Vec::with_capacity(items.len());
    for item in items {
        let expanded = expand_form(item, depth, scope, env, opts)?;
        if !expanded.same_node(item) {
            changed = true;
        }
        new_items.push(expanded);
    }
    if changed {
        Ok(Form::list(new_items, form.meta.clone()))
    } else {
        Ok(form.clone())
    }
}

fn invoke_macro(
    name: &str,
    call: &Form,
    items: &[Form],
    scope: ScopeId,
    env: &mut Environment,
    opts: &ExpandOptions,
) -> Result<Form> {
    let def = env.macros.get(name).ok_or_else(|| {
        HqlError::macro_error(format!("Macro '{}' not found", name))
            .with_code(codes::MACRO_NOT_FOUND)
            .at_opt(call.meta.as_ref())
    })?;
    let args = &items[1..];

    if args.len() < def.params.len() || (def.rest.is_none() && args.len() > def.params.len()) {
        let expected = if def.rest.is_some() {
            format!("at least {}", def.params.len())
        } else {
            def.params.len().to_string()
        };
        return Err(HqlError::macro_error(format!(
            "Macro '{}' expects {} arguments, got {}",
            name,
            expected,
            args.len()
        ))
        .with_code(codes::MACRO_EXPANSION_FAILED)
        .at_opt(call.meta.as_ref()));
    }

    let cache_key = if opts.use_cache {
        let key = expansion_cache_key(call, &env.macros.fingerprint());
        if let Some(hit) = env.macros.cache_get(&key) {
            return Ok(hit);
        }
        Some(key)
    } else {
        None
    };

    // Bridge into the interpreter: the entire compiler scope chain flattens
    // into one scope, then parameters bind over it.
    let macro_scope = env.flattened(scope);
    for (i, param) in def.params.iter().enumerate() {
        env.define(macro_scope, param.clone(), form_to_value(&args[i]));
    }
    if let Some(rest) = &def.rest {
        let remaining: Vec<Form> = args[def.params.len()..].to_vec();
        env.define(macro_scope, rest.clone(), Value::Splice(remaining));
    }

    let saved_context = env.current_macro_context.replace(name.to_string());
    let result = eval_body(&def.body, macro_scope, env);
    env.current_macro_context = saved_context;

    let value = result.map_err(|err| wrap_expansion_error(err, name, call))?;
    let expansion = value_to_form(&value, call.meta.as_ref())?;

    // Diagnostics inside the expansion should point at the call site.
    let expansion = match call.meta.as_ref() {
        Some(call_meta) => retarget_meta(&expansion, call_meta),
        None => expansion,
    };

    // Macros may emit sugar; canonicalize their output too.
    let expansion = transform_form(&expansion)?;

    if let Some(key) = cache_key {
        env.macros.cache_put(key, expansion.clone());
    }
    Ok(expansion)
}

// Typed diagnostics from macro bodies pass through untouched; only the
// macro kind gets the expansion framing.
fn wrap_expansion_error(err: HqlError, name: &str, call: &Form) -> HqlError {
    if err.kind == crate::errors::ErrorKind::Macro {
        return err;
    }
    HqlError::macro_error(format!("Macro expansion failed in '{}'", name))
        .with_code(codes::MACRO_EXPANSION_FAILED)
        .at_opt(call.meta.as_ref())
        .caused_by(err)
}

/// Restamps every node whose file path differs from the call site.
/// Argument forms spliced into the expansion already carry call-site file
/// metadata and keep their precise positions.
fn retarget_meta(form: &Form, call_meta: &Meta) -> Form {
    let keep = match &form.meta {
        Some(meta) => meta.file == call_meta.file,
        None => false,
    };
    let new_meta = if keep {
        form.meta.clone()
    } else {
        Some(call_meta.clone())
    };

    match form.as_list() {
        Some(items) => {
            let children: Vec<Form> = items
                .iter()
                .map(|item| retarget_meta(item, call_meta))
                .collect();
            Form::list(children, new_meta)
        }
        None => form.with_meta(new_meta),
    }
}

fn expansion_cache_key(call: &Form, fingerprint: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"\x00");
    hasher.update(call.to_source().as_bytes());
    // The call-site position participates so cached expansions carry the
    // right retargeted metadata.
    if let Some(meta) = &call.meta {
        hasher.update(meta.location_string().as_bytes());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::GLOBAL_SCOPE;
    use crate::syntax::reader::read_program;
    use crate::syntax::transform_program;

    fn expand_src(source: &str, file: &str) -> Result<Vec<Form>> {
        let mut env = Environment::new();
        expand_src_in(source, file, &mut env)
    }

    fn expand_src_in(source: &str, file: &str, env: &mut Environment) -> Result<Vec<Form>> {
        let forms = read_program(source, file).unwrap();
        let forms = transform_program(forms).unwrap();
        let opts = ExpandOptions {
            current_file: Some(file.to_string()),
            ..Default::default()
        };
        expand_program(forms, GLOBAL_SCOPE, env, &opts)
    }

    #[test]
    fn simple_macro_expands_and_definition_is_removed() {
        let out = expand_src("(macro twice [x] `(+ ~x ~x)) (twice 3)", "m.hql").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_source(), "(+ 3 3)");
    }

    #[test]
    fn rest_parameters_splice() {
        let out = expand_src(
            "(macro call-all [f & args] `(~f ~@args)) (call-all g 1 2 3)",
            "m.hql",
        )
        .unwrap();
        assert_eq!(out[0].to_source(), "(g 1 2 3)");
    }

    #[test]
    fn recursive_macro_reaches_fixpoint() {
        let source = r#"
            (macro my-list [& xs]
              (if (%empty? xs)
                  '()
                  `(cons ~(%first xs) (my-list ~@(%rest xs)))))
            (my-list 1 2)
        "#;
        let out = expand_src(source, "m.hql").unwrap();
        assert_eq!(out[0].to_source(), "(cons 1 (cons 2 ()))");
    }

    #[test]
    fn second_pass_is_identity() {
        let mut env = Environment::new();
        let out = expand_src_in("(macro twice [x] `(+ ~x ~x)) (twice 3)", "m.hql", &mut env)
            .unwrap();
        let opts = ExpandOptions {
            current_file: Some("m.hql".to_string()),
            ..Default::default()
        };
        let again = expand_program(out.clone(), GLOBAL_SCOPE, &mut env, &opts).unwrap();
        for (a, b) in out.iter().zip(&again) {
            assert!(a.same_node(b), "re-expansion changed {}", a);
        }
    }

    #[test]
    fn swap_macro_gensym_does_not_capture() {
        let source = r#"
            (macro swap [a b]
              `(let (tmp# ~a) (= ~a ~b) (= ~b tmp#)))
            (swap x y)
        "#;
        let out = expand_src(source, "m.hql").unwrap();
        let text = out[0].to_source();
        // x and y survive unrenamed; tmp# became one fresh symbol.
        assert!(text.contains("= x y"), "{}", text);
        let fresh: Vec<&str> = text.matches("tmp__").collect();
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn iteration_limit_fires() {
        let source = "(macro loop-forever [] '(loop-forever)) (loop-forever)";
        let err = expand_src(source, "m.hql").unwrap_err();
        assert_eq!(err.code, codes::MACRO_RECURSION_LIMIT);
    }

    #[test]
    fn macro_not_accessible_from_other_file() {
        let mut env = Environment::new();
        expand_src_in("(macro hidden [] '1)", "a.hql", &mut env).unwrap();
        // In b.hql the name never expands; it stays a plain call.
        let out = expand_src_in("(hidden)", "b.hql", &mut env).unwrap();
        assert_eq!(out[0].to_source(), "(hidden)");
    }

    #[test]
    fn expansion_meta_points_at_call_site() {
        let mut env = Environment::new();
        // Define the macro as if it came from another file, then export
        // and import it into the caller.
        expand_src_in("(macro ping [] `(pong))", "lib.hql", &mut env).unwrap();
        env.macros.mark_exported("lib.hql", "ping").unwrap();
        env.macros.import_user_macro("ping", None, "lib.hql", "use.hql").unwrap();

        let out = expand_src_in("(ping)", "use.hql", &mut env).unwrap();
        let meta = out[0].meta.as_ref().unwrap();
        assert_eq!(&*meta.file, "use.hql");
        let inner = out[0].as_list().unwrap()[0].meta.as_ref().unwrap();
        assert_eq!(&*inner.file, "use.hql");
    }

    #[test]
    fn arity_errors_are_macro_errors() {
        let err = expand_src("(macro one [x] `~x) (one)", "m.hql").unwrap_err();
        assert_eq!(err.code, codes::MACRO_EXPANSION_FAILED);
    }

    #[test]
    fn macro_output_sugar_is_canonicalized() {
        let out = expand_src(
            "(macro logit [x] `(.log console ~x)) (logit 5)",
            "m.hql",
        )
        .unwrap();
        assert_eq!(out[0].to_source(), "(js-call console \"log\" 5)");
    }
}
