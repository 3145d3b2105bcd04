//! Import processor tests against an in-memory module tree.

use hql::compiler::{compile_with_context, CompileContext, CompilerOptions};
use hql::errors::{codes, HqlError, Result};
use hql::imports::fetcher::ModuleFetcher;
use hql::imports::resolver::MemoryFileSystem;

struct NoNetwork;

impl ModuleFetcher for NoNetwork {
    fn fetch(&self, url: &str) -> Result<String> {
        Err(HqlError::import(format!("Failed to fetch '{}': offline", url))
            .with_code(codes::REMOTE_FETCH_FAILED))
    }
}

struct CannedFetcher(&'static str);

impl ModuleFetcher for CannedFetcher {
    fn fetch(&self, _url: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn context_with(files: &[(&str, &str)]) -> CompileContext {
    let mut fs = MemoryFileSystem::new();
    for (path, content) in files {
        fs.add(*path, *content);
    }
    CompileContext {
        fs: Box::new(fs),
        fetcher: Box::new(NoNetwork),
        ..Default::default()
    }
}

fn main_options() -> CompilerOptions {
    CompilerOptions {
        current_file: Some("main.hql".to_string()),
        generate_source_map: Some(false),
        ..Default::default()
    }
}

#[test]
fn vector_import_with_alias() {
    let mut ctx = context_with(&[(
        "lib.hql",
        "(fn add [a b] (+ a b)) (fn sub [a b] (- a b)) (export [add sub])",
    )]);
    let out = compile_with_context(
        "(import [add, sub as minus] from \"./lib.hql\") (print (add 1 2) (minus 3 1))",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("import { add, sub as minus } from \"./lib.js\";"));
    assert!(out.code.contains("console.log(add(1, 2), minus(3, 1));"));
}

#[test]
fn namespace_and_bare_imports() {
    let mut ctx = context_with(&[("vals.hql", "(export \"answer\" 42)")]);
    let out = compile_with_context(
        "(import vals from \"./vals.hql\") (print vals.answer)",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("import * as vals from \"./vals.js\";"));
    assert!(out.code.contains("console.log(vals.answer);"));

    let mut ctx = context_with(&[("vals.hql", "(export \"answer\" 42)")]);
    let out = compile_with_context("(import \"./vals.hql\")", &main_options(), &mut ctx).unwrap();
    assert!(out.code.contains("import * as vals from \"./vals.js\";"));
}

#[test]
fn missing_export_pinpoints_symbol() {
    let mut ctx = context_with(&[("lib.hql", "(fn add [a b] (+ a b)) (export [add])")]);
    let source = "(import [add missing] from \"./lib.hql\")";
    let err = compile_with_context(source, &main_options(), &mut ctx).unwrap_err();
    assert_eq!(err.code, codes::EXPORT_MISSING);
    let location = err.location.expect("missing exports carry a location");
    // Column of `missing` inside the import vector, 1-based.
    assert_eq!(location.column as usize, source.find("missing").unwrap() + 1);
}

#[test]
fn module_not_found() {
    let mut ctx = context_with(&[]);
    let err = compile_with_context(
        "(import [x] from \"./nope.hql\")",
        &main_options(),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::MODULE_NOT_FOUND);
}

#[test]
fn value_cycle_compiles_and_shares_one_export_map() {
    let mut ctx = context_with(&[
        (
            "a.hql",
            "(import [bar] from \"./b.hql\") (fn foo [] 1) (export [foo])",
        ),
        (
            "b.hql",
            "(import [foo] from \"./a.hql\") (fn bar [] 2) (export [bar])",
        ),
    ]);
    let out = compile_with_context(
        "(import [foo] from \"./a.hql\") (print (foo))",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("import { foo } from \"./a.js\";"));

    // The map pre-registered during the cycle is the one that ended up
    // populated: live bindings, never replaced.
    let map = ctx.env.module_export_map("a.hql").unwrap();
    assert!(map.borrow().contains_key("foo"));
    let map_b = ctx.env.module_export_map("b.hql").unwrap();
    assert!(map_b.borrow().contains_key("bar"));
}

#[test]
fn macro_in_cycle_is_rejected() {
    let mut ctx = context_with(&[
        (
            "a.hql",
            "(import [bar] from \"./b.hql\") (macro m [] '1) (export [m])",
        ),
        (
            "b.hql",
            "(import [m] from \"./a.hql\") (fn bar [] 2) (export [bar])",
        ),
    ]);
    let err = compile_with_context(
        "(import [m] from \"./a.hql\")",
        &main_options(),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::CIRCULAR_MACRO_IMPORT);
    assert!(err.raw_message().contains("Circular import involving macro 'm'"));
}

#[test]
fn user_macro_requires_export_and_import() {
    let mut ctx = context_with(&[(
        "lib.hql",
        "(macro twice [x] `(+ ~x ~x)) (export [twice])",
    )]);
    let out = compile_with_context(
        "(import [twice] from \"./lib.hql\") (print (twice 3))",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("console.log(3 + 3);"));
    // The macro-only export leaves no runtime import for `twice`.
    assert!(!out.code.contains("{ twice }"));

    // Without the export, the same import fails.
    let mut ctx = context_with(&[("lib.hql", "(macro twice [x] `(+ ~x ~x))")]);
    let err = compile_with_context(
        "(import [twice] from \"./lib.hql\")",
        &main_options(),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::EXPORT_MISSING);
}

#[test]
fn aliased_macro_import() {
    let mut ctx = context_with(&[(
        "lib.hql",
        "(macro twice [x] `(+ ~x ~x)) (export [twice])",
    )]);
    let out = compile_with_context(
        "(import [twice as double] from \"./lib.hql\") (print (double 4))",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("console.log(4 + 4);"));
}

#[test]
fn js_shim_imports_defer() {
    let mut ctx = context_with(&[("shim.js", "export const thing = 1;")]);
    let out = compile_with_context(
        "(import [thing] from \"./shim.js\") (print thing)",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("import { thing } from \"./shim.js\";"));
}

#[test]
fn ts_shim_behaves_like_js() {
    let mut ctx = context_with(&[("typed.ts", "export const n: number = 1;")]);
    let out = compile_with_context(
        "(import [n] from \"./typed.ts\") (print n)",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("import { n } from \"./typed.ts\";"));
}

#[test]
fn remote_import_is_a_shim() {
    let mut ctx = context_with(&[]);
    ctx.fetcher = Box::new(CannedFetcher("export default {};"));
    let out = compile_with_context(
        "(import [fetchit] from \"npm:fetchit\")",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(out.code.contains("import { fetchit } from \"npm:fetchit\";"));
}

#[test]
fn remote_fetch_failure_surfaces() {
    let mut ctx = context_with(&[]);
    let err = compile_with_context(
        "(import [x] from \"https://example.com/mod.js\")",
        &main_options(),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::REMOTE_FETCH_FAILED);
}

#[test]
fn stdlib_module_resolves_embedded() {
    let mut ctx = context_with(&[]);
    compile_with_context("(import \"@hql/core\")", &main_options(), &mut ctx).unwrap();

    let err = compile_with_context(
        "(import [x] from \"@hql/not-a-module\")",
        &main_options(),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::MODULE_NOT_FOUND);
}

#[test]
fn transitive_imports_compile_once() {
    let mut ctx = context_with(&[
        ("shared.hql", "(fn util [] 1) (export [util])"),
        (
            "x.hql",
            "(import [util] from \"./shared.hql\") (fn fx [] (util)) (export [fx])",
        ),
        (
            "y.hql",
            "(import [util] from \"./shared.hql\") (fn fy [] (util)) (export [fy])",
        ),
    ]);
    let out = compile_with_context(
        "(import [fx] from \"./x.hql\") (import [fy] from \"./y.hql\") (print (fx) (fy))",
        &main_options(),
        &mut ctx,
    )
    .unwrap();
    assert!(ctx.env.has_processed_file("shared.hql"));
    assert!(out.code.contains("import { fx } from \"./x.js\";"));
    assert!(out.code.contains("import { fy } from \"./y.js\";"));
}
