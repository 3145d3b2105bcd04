//! Compiler driver.
//!
//! Orchestrates the pipeline: reader, syntax transformer, import
//! processor, macro expander, IR builder, semantic validator, emitter.
//! Each `compile` call may run against a fresh environment or a caller
//! supplied one (`CompileContext`), which is how tooling reuses a
//! prewarmed environment across compilations.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};

use crate::ast::Form;
use crate::emit::codegen::{generate, GenOptions};
use crate::emit::helpers;
use crate::emit::lower::lower_program;
use crate::env::{Environment, GLOBAL_SCOPE};
use crate::errors::{HqlError, Result, SourceContext};
use crate::imports::fetcher::{HttpFetcher, ModuleFetcher};
use crate::imports::resolver::{FileSystem, OsFileSystem, PathResolver};
use crate::imports::{collect_exports, evaluate_top_level, ImportProcessor};
use crate::ir::builder::build_program;
use crate::ir::Program;
use crate::macros::{expand_program, ExpandOptions};
use crate::stdlib;
use crate::syntax::{reader, transform_program};
use crate::validate::validate_program;

/// Label used for string input with no `current_file`.
const ANONYMOUS_FILE: &str = "inline.hql";

#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Log pipeline progress.
    pub verbose: bool,
    /// Emit per-phase timings.
    pub show_timing: bool,
    /// Root for resolving relative imports when the input has no file.
    pub base_dir: Option<PathBuf>,
    /// Cache location for transpiled target modules (host tooling).
    pub temp_dir: Option<PathBuf>,
    /// Authoritative file label for the input.
    pub current_file: Option<String>,
    /// Defaults false for string input, true for file input.
    pub generate_source_map: Option<bool>,
    /// Original source to embed in the map's `sourcesContent`.
    pub source_content: Option<String>,
    /// Keep the lowered IR on the output (tooling).
    pub emit_ir: bool,
    /// Disable the expansion cache, e.g. when macros were injected at
    /// runtime into a reused environment.
    pub disable_expansion_cache: bool,
}

/// Injectable pipeline state: environment plus I/O capabilities.
pub struct CompileContext {
    pub env: Environment,
    pub fs: Box<dyn FileSystem>,
    pub fetcher: Box<dyn ModuleFetcher>,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self {
            env: Environment::new(),
            fs: Box::new(OsFileSystem),
            fetcher: Box::new(HttpFetcher::default()),
        }
    }
}

#[derive(Debug)]
pub struct CompileOutput {
    pub code: String,
    pub source_map: Option<String>,
    pub ir: Option<Program>,
}

/// Compiles source text with a fresh environment.
pub fn compile(source: &str, options: &CompilerOptions) -> Result<CompileOutput> {
    let mut ctx = CompileContext::default();
    compile_with_context(source, options, &mut ctx)
}

/// Compiles a file; source maps default on and embed the original text.
pub fn compile_file(path: &str, options: &CompilerOptions) -> Result<CompileOutput> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| HqlError::import(format!("Module '{}' not found: {}", path, e)))?;
    let mut options = options.clone();
    options.current_file.get_or_insert_with(|| path.to_string());
    options.generate_source_map.get_or_insert(true);
    options.source_content.get_or_insert_with(|| source.clone());
    compile(&source, &options)
}

/// Macro expansion only, for tooling.
pub fn expand(source: &str, options: &CompilerOptions) -> Result<Vec<Form>> {
    let mut ctx = CompileContext::default();
    expand_with_context(source, options, &mut ctx)
}

pub fn expand_with_context(
    source: &str,
    options: &CompilerOptions,
    ctx: &mut CompileContext,
) -> Result<Vec<Form>> {
    let front = run_front_half(source, options, ctx)?;
    Ok(front.forms)
}

struct FrontHalf {
    forms: Vec<Form>,
    file: String,
}

// Reader through macro expansion, shared by compile and expand.
fn run_front_half(
    source: &str,
    options: &CompilerOptions,
    ctx: &mut CompileContext,
) -> Result<FrontHalf> {
    stdlib::ensure_core_macros(&mut ctx.env)?;

    let file = options
        .current_file
        .clone()
        .unwrap_or_else(|| ANONYMOUS_FILE.to_string());
    ctx.env.current_file = Some(file.clone());

    let scope = ctx.env.extend(GLOBAL_SCOPE);

    let forms = phase(options, "read", || reader::read_program(source, &file))?;
    let forms = phase(options, "transform", || transform_program(forms))?;

    let forms = phase(options, "imports", || {
        let resolver = PathResolver::new(options.base_dir.clone());
        let mut processor = ImportProcessor::new(&*ctx.fs, &*ctx.fetcher, resolver);
        processor.process_imports(&forms, scope, &mut ctx.env)?;
        Ok(forms)
    })?;

    let forms = phase(options, "expand", || {
        let opts = ExpandOptions {
            use_cache: !options.disable_expansion_cache,
            current_file: Some(file.clone()),
            ..Default::default()
        };
        expand_program(forms, scope, &mut ctx.env, &opts)
    })?;

    // Publish this file's own definitions and exports so sibling compiles
    // sharing the environment can import them.
    if !ctx.env.has_processed_file(&file) {
        ctx.env.begin_file(&file);
        evaluate_top_level(&forms, scope, &mut ctx.env);
        collect_exports(&forms, scope, &file, &mut ctx.env)?;
        ctx.env.mark_file_processed(&file);
    }

    Ok(FrontHalf { forms, file })
}

pub fn compile_with_context(
    source: &str,
    options: &CompilerOptions,
    ctx: &mut CompileContext,
) -> Result<CompileOutput> {
    let total = Instant::now();
    let FrontHalf { forms, file } = run_front_half(source, options, ctx)?;

    let source_ctx = SourceContext::new(&file, source);

    let macro_exports = ctx
        .env
        .macros
        .exported_macros_of(&file)
        .cloned()
        .unwrap_or_else(HashSet::new);

    let is_macro_import = |name: &str| ctx.env.macros.is_accessible(name, &file);
    let program = phase(options, "lower", || {
        build_program(&forms, &file, &macro_exports, &is_macro_import)
    })
    .map_err(|e| attach_source(e, &source_ctx))?;

    phase(options, "validate", || {
        validate_program(&program, Some(&source_ctx))
    })?;

    let (estree, used_helpers) = phase(options, "estree", || lower_program(&program))
        .map_err(|e| attach_source(e, &source_ctx))?;

    let generate_map = options
        .generate_source_map
        .unwrap_or(options.current_file.is_some() && options.source_content.is_some());

    let output = phase(options, "generate", || {
        let prelude = helpers::prelude_for(used_helpers.iter().copied());
        let prelude_lines = prelude.matches('\n').count() as u32;
        let out_file = format!("{}.js", file.trim_end_matches(".hql"));
        let gen_opts = GenOptions {
            file: out_file,
            source_map: generate_map,
            source_content: Some((
                file.clone(),
                options
                    .source_content
                    .clone()
                    .unwrap_or_else(|| source.to_string()),
            )),
        };
        let mut module = generate_with_offset(&estree, &gen_opts, prelude_lines);
        if !prelude.is_empty() {
            module.code = format!("{}{}", prelude, module.code);
        }
        Ok(module)
    })?;

    if options.verbose {
        info!(
            file = %file,
            elapsed_ms = total.elapsed().as_millis() as u64,
            "compiled module"
        );
    }

    Ok(CompileOutput {
        code: output.code,
        source_map: output.map.map(|m| m.to_json()),
        ir: options.emit_ir.then_some(program),
    })
}

// The helper prelude goes ahead of the module body; generated mappings
// shift down by its line count so they still point at the right lines.
fn generate_with_offset(
    estree: &crate::emit::estree::Node,
    opts: &GenOptions,
    line_offset: u32,
) -> crate::emit::codegen::GeneratedModule {
    if line_offset == 0 {
        return generate(estree, opts);
    }
    let module = generate(estree, opts);
    match module.map {
        None => module,
        Some(map) => {
            let mut shifted = String::new();
            for _ in 0..line_offset {
                shifted.push(';');
            }
            shifted.push_str(&map.mappings);
            crate::emit::codegen::GeneratedModule {
                code: module.code,
                map: Some(crate::emit::sourcemap::SourceMap {
                    mappings: shifted,
                    ..map
                }),
            }
        }
    }
}

fn attach_source(err: HqlError, ctx: &SourceContext) -> HqlError {
    if err.source_ctx.is_some() {
        return err;
    }
    err.with_source(ctx)
}

fn phase<T>(
    options: &CompilerOptions,
    name: &'static str,
    run: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    let result = run();
    let elapsed = start.elapsed();
    if options.show_timing {
        info!(phase = name, elapsed_us = elapsed.as_micros() as u64, "phase timing");
    } else if options.verbose {
        debug!(phase = name, "phase complete");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_arithmetic() {
        let out = compile("(print (+ 1 2 3))", &CompilerOptions::default()).unwrap();
        assert_eq!(out.code.trim(), "console.log(1 + 2 + 3);");
        assert!(out.source_map.is_none());
    }

    #[test]
    fn determinism_byte_identical() {
        let options = CompilerOptions {
            current_file: Some("d.hql".to_string()),
            generate_source_map: Some(true),
            ..Default::default()
        };
        let source = "(fn f [x] (* x 2)) (print (f 21))";
        let a = compile(source, &options).unwrap();
        let b = compile(source, &options).unwrap();
        assert_eq!(a.code, b.code);
        assert_eq!(a.source_map, b.source_map);
    }

    #[test]
    fn expand_returns_forms() {
        let forms = expand(
            "(macro twice [x] `(+ ~x ~x)) (twice 5)",
            &CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].to_source(), "(+ 5 5)");
    }

    #[test]
    fn expansion_is_idempotent() {
        let options = CompilerOptions::default();
        let once = expand("(macro twice [x] `(+ ~x ~x)) (twice 5)", &options).unwrap();
        let source = crate::ast::printer::print_program(&once);
        let twice = expand(&source, &options).unwrap();
        assert_eq!(
            crate::ast::printer::print_program(&twice),
            source
        );
    }

    #[test]
    fn helper_prelude_is_injected_once_needed() {
        let out = compile("(let v (get m \"k\"))", &CompilerOptions::default()).unwrap();
        assert!(out.code.starts_with("function __hql_get"));
        let out = compile("(let v 1)", &CompilerOptions::default()).unwrap();
        assert!(!out.code.contains("__hql_get"));
    }

    #[test]
    fn validation_failure_aborts() {
        let err = compile("(do (let x 1) (let x 2))", &CompilerOptions::default()).unwrap_err();
        assert_eq!(err.code, crate::errors::codes::INVALID_EXPRESSION);
    }
}
