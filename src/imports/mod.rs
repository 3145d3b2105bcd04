//! Import processor.
//!
//! Resolves import forms, recursively compiles dependencies through the
//! same pipeline, and establishes live bindings in the environment. Local
//! modules process strictly sequentially to keep definition order
//! deterministic; remote modules prefetch with a bounded fan-out first.
//!
//! Cycle handling: entering a source module marks it in-progress and
//! pre-registers an empty but stable exports map. A dependency that loops
//! back binds that same map and observes the real values once the first
//! module finishes. Macros cannot participate in cycles because expansion
//! must complete at use time, so any macro export on the looping edge
//! aborts compilation.

pub mod fetcher;
pub mod resolver;

use std::collections::HashMap;

use crate::ast::Form;
use crate::env::{Environment, ScopeId, GLOBAL_SCOPE};
use crate::errors::{codes, HqlError, Result};
use crate::interp::eval::eval_form;
use crate::interp::value::{ExportMap, Value};
use crate::ir::builder::{derived_module_name, parse_import_vector};
use crate::macros::{expand_program, ExpandOptions};
use crate::syntax::{reader, transform_program};

use fetcher::{fetch_many, ModuleFetcher};
use resolver::{FileSystem, ModuleKind, PathResolver, ResolvedModule};

pub struct ImportProcessor<'a> {
    pub fs: &'a dyn FileSystem,
    pub fetcher: &'a dyn ModuleFetcher,
    pub resolver: PathResolver,
    remote_cache: HashMap<String, String>,
}

impl<'a> ImportProcessor<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        fetcher: &'a dyn ModuleFetcher,
        resolver: PathResolver,
    ) -> Self {
        Self {
            fs,
            fetcher,
            resolver,
            remote_cache: HashMap::new(),
        }
    }

    /// Processes every top-level import in `forms`, loading dependencies
    /// and binding names into `scope`.
    pub fn process_imports(
        &mut self,
        forms: &[Form],
        scope: ScopeId,
        env: &mut Environment,
    ) -> Result<()> {
        self.prefetch_remote(forms)?;
        for form in forms {
            if form.head_symbol() == Some("import") {
                self.handle_import(form, scope, env)?;
            }
        }
        Ok(())
    }

    // Remote imports in one file fetch in parallel before any binding
    // happens; everything after this point is sequential.
    fn prefetch_remote(&mut self, forms: &[Form]) -> Result<()> {
        let mut specs = Vec::new();
        for form in forms {
            if form.head_symbol() != Some("import") {
                continue;
            }
            if let Some(spec) = import_spec_of(form) {
                let resolved = self.resolver.resolve(&spec, None);
                if resolved.kind == ModuleKind::Remote && !self.remote_cache.contains_key(&spec) {
                    specs.push(spec);
                }
            }
        }
        if specs.is_empty() {
            return Ok(());
        }
        let fetched = fetch_many(self.fetcher, &specs)?;
        self.remote_cache.extend(fetched);
        Ok(())
    }

    fn handle_import(&mut self, form: &Form, scope: ScopeId, env: &mut Environment) -> Result<()> {
        let items = form.as_list().unwrap_or_default();
        let importing = env.current_file.clone();

        // (import "path")
        if items.len() == 2 {
            let spec = import_spec_of(form).ok_or_else(|| malformed(form))?;
            let (resolved, exports) = self.load_module(&spec, importing.as_deref(), env)?;
            self.reject_macro_cycle(&resolved, env, form)?;
            let local = derived_module_name(&spec);
            env.define(scope, local, Value::Module(exports));
            return Ok(());
        }

        // (import name from "path") | (import [a b, c as d] from "path")
        if items.len() == 4 && items[2].is_symbol("from") {
            let spec = import_spec_of(form).ok_or_else(|| malformed(form))?;
            let (resolved, exports) = self.load_module(&spec, importing.as_deref(), env)?;
            self.reject_macro_cycle(&resolved, env, form)?;

            if let Some(name) = items[1].as_symbol() {
                env.define(scope, name.to_string(), Value::Module(exports));
                return Ok(());
            }
            if items[1].head_symbol() == Some(crate::ast::VECTOR) {
                return self.bind_vector_imports(&items[1], &spec, &resolved, exports, scope, env);
            }
        }

        Err(malformed(form))
    }

    /// Symbol import resolution order: exported user macro, then system
    /// macro, then value export, then deferred shim placeholder. Anything
    /// else is a precise export-missing error at the offending symbol.
    fn bind_vector_imports(
        &mut self,
        vector: &Form,
        spec: &str,
        resolved: &ResolvedModule,
        exports: ExportMap,
        scope: ScopeId,
        env: &mut Environment,
    ) -> Result<()> {
        for (name, alias, meta) in parse_import_vector(vector)? {
            if env.macros.is_exported_from(&resolved.key, &name) {
                let alias_opt = (alias != name).then_some(alias.as_str());
                env.import_user_macro(&name, alias_opt, &resolved.key)?;
                continue;
            }
            if env.macros.is_system_macro(&name) {
                env.mark_macro_imported(&name);
                continue;
            }
            let value = exports.borrow().get(&name).cloned();
            let deferred = resolved.kind.is_shim() || env.is_file_in_progress(&resolved.key);
            match value {
                Some(value) => env.define(scope, alias, value),
                None if deferred => {
                    // External shims have unknown exports; defer to the
                    // target runtime.
                    env.define(scope, alias, Value::Opaque(format!("{}#{}", resolved.key, name)));
                }
                None => {
                    return Err(HqlError::import(format!(
                        "Module '{}' does not export '{}'",
                        spec, name
                    ))
                    .with_code(codes::EXPORT_MISSING)
                    .at_opt(meta.as_ref())
                    .with_suggestion(format!("Add (export [{}]) to {}.", name, spec)));
                }
            }
        }
        Ok(())
    }

    // Any macro export on a module still being compiled means the import
    // edge closes a cycle through a macro.
    fn reject_macro_cycle(
        &self,
        resolved: &ResolvedModule,
        env: &Environment,
        form: &Form,
    ) -> Result<()> {
        if !env.is_file_in_progress(&resolved.key) {
            return Ok(());
        }
        if let Some(macros) = env.macros.exported_macros_of(&resolved.key) {
            if let Some(name) = macros.iter().next() {
                return Err(HqlError::import(format!(
                    "Circular import involving macro '{}'",
                    name
                ))
                .with_code(codes::CIRCULAR_MACRO_IMPORT)
                .at_opt(form.meta.as_ref())
                .with_suggestion(
                    "Break the cycle, or move the macro into a module outside it.",
                ));
            }
        }
        Ok(())
    }

    /// Loads a module by specifier, compiling source modules recursively.
    /// Returns the resolution and the module's stable exports map.
    pub fn load_module(
        &mut self,
        spec: &str,
        importing: Option<&str>,
        env: &mut Environment,
    ) -> Result<(ResolvedModule, ExportMap)> {
        let resolved = self.resolver.resolve(spec, importing);
        let key = resolved.key.clone();

        if env.is_file_in_progress(&key) {
            // A cycle: bind the stable, still-empty exports map. It fills
            // in once the module on top of the stack finishes.
            env.note_cycle_binding(&key);
            let map = env.import_module(key, HashMap::new());
            return Ok((resolved, map));
        }
        if env.has_processed_file(&key) {
            let map = env.import_module(key, HashMap::new());
            return Ok((resolved, map));
        }

        match resolved.kind {
            ModuleKind::Stdlib => {
                let source = crate::stdlib::embedded_source(&key).ok_or_else(|| {
                    HqlError::import(format!("Module '{}' not found in the embedded stdlib", spec))
                        .with_code(codes::MODULE_NOT_FOUND)
                })?;
                let map = self.load_source_module(&key, source.to_string(), env, true)?;
                Ok((resolved, map))
            }
            ModuleKind::LocalSource => {
                let text = self.fs.read_to_string(&key).map_err(|e| {
                    HqlError::import(format!("Module '{}' not found: {}", spec, e))
                        .with_code(codes::MODULE_NOT_FOUND)
                })?;
                let map = self.load_source_module(&key, text, env, false)?;
                Ok((resolved, map))
            }
            ModuleKind::LocalJs | ModuleKind::LocalTs => {
                if !self.fs.exists(&key) {
                    return Err(HqlError::import(format!("Module '{}' not found", spec))
                        .with_code(codes::MODULE_NOT_FOUND));
                }
                env.begin_file(&key);
                let map = env.import_module(key.clone(), HashMap::new());
                env.mark_file_processed(&key);
                Ok((resolved, map))
            }
            ModuleKind::Remote => {
                let text = match self.remote_cache.get(&key) {
                    Some(text) => text.clone(),
                    None => {
                        let text = fetcher::fetch_with_fallback(self.fetcher, &key)?;
                        self.remote_cache.insert(key.clone(), text.clone());
                        text
                    }
                };
                if key.ends_with(".hql") {
                    let map = self.load_source_module(&key, text, env, false)?;
                    return Ok((resolved, map));
                }
                env.begin_file(&key);
                let map = env.import_module(key.clone(), HashMap::new());
                env.mark_file_processed(&key);
                Ok((resolved, map))
            }
        }
    }

    // Full pipeline for one dependency: read, canonicalize, imports,
    // expand, evaluate, publish exports.
    fn load_source_module(
        &mut self,
        key: &str,
        text: String,
        env: &mut Environment,
        system_mode: bool,
    ) -> Result<ExportMap> {
        env.begin_file(key);
        let map = env.import_module(key.to_string(), HashMap::new());
        let saved_file = env.current_file.replace(key.to_string());

        let result: Result<()> = (|| {
            let forms = reader::read_program(&text, key)?;
            let forms = transform_program(forms)?;
            let module_scope = env.extend(GLOBAL_SCOPE);
            self.process_imports(&forms, module_scope, env)?;
            let opts = ExpandOptions {
                current_file: Some(key.to_string()),
                system_mode,
                ..Default::default()
            };
            let expanded = expand_program(forms, module_scope, env, &opts)?;
            evaluate_top_level(&expanded, module_scope, env);
            collect_exports(&expanded, module_scope, key, env)?;
            Ok(())
        })();

        env.current_file = saved_file;
        match result {
            Ok(()) => {
                env.mark_file_processed(key);
                Ok(map)
            }
            Err(err) => Err(err),
        }
    }
}

fn malformed(form: &Form) -> HqlError {
    HqlError::import("Malformed import form")
        .at_opt(form.meta.as_ref())
        .with_suggestion(
            "Use (import \"path\"), (import name from \"path\") or (import [a b] from \"path\").",
        )
}

fn import_spec_of(form: &Form) -> Option<String> {
    let items = form.as_list()?;
    let spec_form = if items.len() == 2 { &items[1] } else { items.last()? };
    match spec_form.as_literal() {
        Some(crate::ast::Literal::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Best-effort compile-time evaluation of top-level definitions, so later
/// exports and macro bodies can see them. Anything that cannot evaluate at
/// compile time binds an opaque placeholder instead.
pub fn evaluate_top_level(forms: &[Form], scope: ScopeId, env: &mut Environment) {
    for form in forms {
        let items = match form.as_list() {
            Some(items) if !items.is_empty() => items,
            _ => continue,
        };
        match form.head_symbol() {
            Some("fn") => {
                if items.get(1).and_then(Form::as_symbol).is_some() {
                    let _ = eval_form(form, scope, env);
                }
            }
            Some("let") | Some("var") | Some("const") => {
                if let Some(name) = items.get(1).and_then(Form::as_symbol) {
                    let name = name.to_string();
                    match items.get(2) {
                        Some(init) => {
                            let value = eval_form(init, scope, env)
                                .unwrap_or_else(|_| Value::Opaque(name.clone()));
                            env.define(scope, name, value);
                        }
                        None => env.define(scope, name, Value::Null),
                    }
                }
            }
            Some("class") | Some("enum") => {
                if let Some(name) = items.get(1).and_then(Form::as_symbol) {
                    env.define(scope, name.to_string(), Value::Opaque(name.to_string()));
                }
            }
            _ => {}
        }
    }
}

/// Publishes a module's exports into its stable exports map and records
/// exported macros for the per-file gating tables.
pub fn collect_exports(
    forms: &[Form],
    scope: ScopeId,
    module_key: &str,
    env: &mut Environment,
) -> Result<()> {
    for form in forms {
        if form.head_symbol() != Some("export") {
            continue;
        }
        let items = form.as_list().unwrap_or_default();

        // (export [a b, c as d])
        if items.len() == 2 && items[1].head_symbol() == Some(crate::ast::VECTOR) {
            for (name, alias, meta) in parse_import_vector(&items[1])? {
                let is_user_macro = env.macros.source_file_of(&name).is_some()
                    && env.macros.is_accessible(&name, module_key);
                if is_user_macro {
                    // A macro export on a module someone bound mid-cycle
                    // can never be satisfied: expansion already ran.
                    if env.was_cycle_bound(module_key) {
                        return Err(HqlError::import(format!(
                            "Circular import involving macro '{}'",
                            name
                        ))
                        .with_code(codes::CIRCULAR_MACRO_IMPORT)
                        .at_opt(meta.as_ref()));
                    }
                    env.macros.mark_exported(module_key, &name)?;
                    continue;
                }
                let value = env
                    .lookup(scope, &name)
                    .unwrap_or_else(|_| Value::Opaque(name.clone()));
                let map = env.import_module(module_key.to_string(), HashMap::new());
                map.borrow_mut().insert(alias, value);
            }
            continue;
        }

        // (export "name" expr). A failed compile-time evaluation freezes a
        // null placeholder; there is no lazy re-evaluation.
        if items.len() == 3 {
            if let Some(crate::ast::Literal::Str(name)) = items[1].as_literal() {
                let value = eval_form(&items[2], scope, env).unwrap_or(Value::Null);
                let map = env.import_module(module_key.to_string(), HashMap::new());
                map.borrow_mut().insert(name.clone(), value);
                continue;
            }
        }

        return Err(HqlError::import("Malformed export form").at_opt(form.meta.as_ref()));
    }
    Ok(())
}
