//! End-to-end pipeline tests: source text in, module text and map out.

use hql::emit::sourcemap::{map_position, parse_source_map};
use hql::errors::codes;
use hql::{compile, CompilerOptions};

fn compile_ok(source: &str) -> String {
    compile(source, &CompilerOptions::default())
        .expect("compilation succeeds")
        .code
}

fn compile_mapped(source: &str, file: &str) -> (String, String) {
    let options = CompilerOptions {
        current_file: Some(file.to_string()),
        generate_source_map: Some(true),
        source_content: Some(source.to_string()),
        ..Default::default()
    };
    let out = compile(source, &options).expect("compilation succeeds");
    (out.code, out.source_map.expect("map requested"))
}

#[test]
fn arithmetic_sums_through_print() {
    let code = compile_ok("(print (+ 1 2 3))");
    assert_eq!(code.trim(), "console.log(1 + 2 + 3);");
}

#[test]
fn arithmetic_source_map_points_at_operator() {
    let source = "(print (+ 1 2 3))";
    let (code, map) = compile_mapped(source, "sum.hql");
    let parsed = parse_source_map(&map).unwrap();

    let gen_line = code.lines().next().unwrap();
    let plus_col = gen_line.find('+').unwrap() as u32;
    let mapped = map_position(&parsed, 1, plus_col).unwrap();
    assert_eq!(mapped.source, "sum.hql");
    assert_eq!(mapped.line, 1);
    assert_eq!(mapped.column, source.find('+').unwrap() as u32);
}

#[test]
fn source_map_embeds_source_content() {
    let source = "(let x 1)";
    let (_, map) = compile_mapped(source, "content.hql");
    let parsed = parse_source_map(&map).unwrap();
    assert_eq!(
        parsed.map.sources_content.as_ref().unwrap()[0].as_deref(),
        Some(source)
    );
}

#[test]
fn json_map_default_parameters() {
    let code = compile_ok("(fn multiply {x: 10 y: 20} (* x y)) (multiply {y: 7})");
    assert!(code.contains("function multiply(__hql_params = {}) {"));
    assert!(code.contains("const x = __hql_params.x ?? 10;"));
    assert!(code.contains("const y = __hql_params.y ?? 20;"));
    assert!(code.contains("return x * y;"));
    assert!(code.contains("multiply({ y: 7 });"));
}

#[test]
fn swap_macro_with_auto_gensym() {
    let source = r#"
        (var x 1)
        (var y 2)
        (macro swap [a b]
          `(let (tmp# ~a) (= ~a ~b) (= ~b tmp#)))
        (swap x y)
    "#;
    let code = compile_ok(source);
    // One fresh temporary, x and y untouched by hygiene.
    assert!(code.contains("const tmp__"), "{}", code);
    assert!(code.contains("x = y;"), "{}", code);
    let fresh = code
        .lines()
        .find(|l| l.contains("const tmp__"))
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap()
        .to_string();
    assert!(code.contains(&format!("y = {};", fresh)), "{}", code);
}

#[test]
fn tdz_violation_fails_with_diagnostic() {
    let err = compile("(do (print x) (let x 1))", &CompilerOptions::default()).unwrap_err();
    assert_eq!(err.code, codes::TDZ_VIOLATION);
    let location = err.location.as_ref().expect("tdz errors carry a location");
    assert_eq!(location.line, 1);
    let message = err.enhanced_message();
    assert!(message.starts_with("[HQL4002]"), "{}", message);
}

#[test]
fn duplicate_declaration_cites_both_sites() {
    let err = compile("(do (let x 1) (let x 2))", &CompilerOptions::default()).unwrap_err();
    assert_eq!(err.code, codes::INVALID_EXPRESSION);
    assert!(err.location.is_some());
    assert!(err.related.is_some(), "duplicate reports the first site too");
}

#[test]
fn nested_closure_over_later_binding_compiles() {
    compile(
        "(fn reader [] counter) (let counter 1)",
        &CompilerOptions::default(),
    )
    .unwrap();
}

#[test]
fn determinism_is_byte_exact() {
    let source = r#"
        (macro twice [x] `(+ ~x ~x))
        (fn shout [name] (.toUpperCase name))
        (print (twice 4) (shout "hey"))
    "#;
    let options = CompilerOptions {
        current_file: Some("det.hql".to_string()),
        generate_source_map: Some(true),
        source_content: Some(source.to_string()),
        ..Default::default()
    };
    let a = compile(source, &options).unwrap();
    let b = compile(source, &options).unwrap();
    assert_eq!(a.code, b.code);
    assert_eq!(a.source_map, b.source_map);
}

#[test]
fn classes_compile_with_fields_and_methods() {
    let code = compile_ok(
        r#"
        (class Counter
          (field count 0)
          (field #seed 42)
          (constructor [initial] (= this.count initial))
          (fn bump [self] (= self.count (+ self.count 1))))
        (let c (new Counter 5))
        (.bump c)
        "#,
    );
    assert!(code.contains("class Counter {"));
    assert!(code.contains("#seed = 42;"));
    assert!(code.contains("this.count = 0;"));
    assert!(code.contains("const c = new Counter(5);"));
}

#[test]
fn enums_compile_both_shapes() {
    let code = compile_ok("(enum Color (case red) (case green \"g\"))");
    assert!(code.contains("__hql_deepFreeze({ red: \"red\", green: \"g\" })"));
    assert!(code.contains("function __hql_deepFreeze"));

    let code = compile_ok("(enum Shape (case circle [radius]) (case rect [w h]))");
    assert!(code.contains("static circle(radius)"));
    assert!(code.contains("static rect(w, h)"));
    assert!(code.contains("new Shape(\"rect\", { w, h })"));
}

#[test]
fn threading_macros_from_stdlib() {
    let code = compile_ok("(print (-> 5 (plus 1) double))");
    assert_eq!(code.trim(), "console.log(double(plus(5, 1)));");
}

#[test]
fn arrow_lambdas_and_interop() {
    let code = compile_ok("(let f (=> (* $0 $0))) (print (f 9))");
    assert!(code.contains("const f = ($0) => $0 * $0;"));

    let code = compile_ok("(let up (.trim text))");
    assert!(code.contains("typeof __hql_member === \"function\""));
}

#[test]
fn parse_error_reports_open_position() {
    let err = compile("(print 1", &CompilerOptions::default()).unwrap_err();
    assert_eq!(err.code, codes::UNCLOSED_LIST);
    assert_eq!(err.location.as_ref().unwrap().column, 1);
}

#[test]
fn macro_iteration_limit_surfaces() {
    let err = compile(
        "(macro spin [] '(spin)) (spin)",
        &CompilerOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, codes::MACRO_RECURSION_LIMIT);
}

#[test]
fn for_and_while_lower_to_loops() {
    let code = compile_ok("(for [i (range 3)] (print i))");
    assert!(code.contains("for (const i of __hql_toSequence(__hql_range(3))) {"));
    assert!(code.contains("function __hql_range"));
    assert!(code.contains("function __hql_toSequence"));

    let code = compile_ok("(var n 0) (while (< n 3) (= n (+ n 1)))");
    assert!(code.contains("while (n < 3) {"));
}

#[test]
fn try_catch_finally() {
    let code = compile_ok("(try (risky) (catch e (print e)) (finally (cleanup)))");
    assert!(code.contains("try {"));
    assert!(code.contains("} catch (e) {"));
    assert!(code.contains("} finally {"));
}
