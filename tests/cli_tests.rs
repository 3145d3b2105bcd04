//! CLI-level tests driving the `hql` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn hql() -> Command {
    Command::cargo_bin("hql").expect("binary builds")
}

#[test]
fn compile_print_writes_module_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sum.hql");
    std::fs::write(&input, "(print (+ 1 2 3))").unwrap();

    hql()
        .args(["compile", "--print"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("console.log(1 + 2 + 3);"));
}

#[test]
fn compile_writes_js_and_map() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mod.hql");
    std::fs::write(&input, "(fn id [x] x)").unwrap();

    hql().arg("compile").arg(&input).assert().success();

    let js = dir.path().join("mod.js");
    let map = dir.path().join("mod.js.map");
    assert!(js.exists());
    assert!(map.exists());
    let map_text = std::fs::read_to_string(map).unwrap();
    assert!(map_text.contains("\"version\":3"));
}

#[test]
fn expand_prints_expanded_forms() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("m.hql");
    std::fs::write(&input, "(macro twice [x] `(+ ~x ~x)) (twice 2)").unwrap();

    hql()
        .arg("expand")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("(+ 2 2)"));
}

#[test]
fn ast_dumps_ir_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.hql");
    std::fs::write(&input, "(let x 1)").unwrap();

    hql()
        .arg("ast")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"VarDecl\""));
}

#[test]
fn errors_exit_nonzero_with_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.hql");
    std::fs::write(&input, "(do (let x 1) (let x 2))").unwrap();

    hql()
        .arg("compile")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("HQL4001"));
}

#[test]
fn missing_file_fails_cleanly() {
    hql()
        .args(["compile", "definitely-not-here.hql"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HQL2001"));
}
