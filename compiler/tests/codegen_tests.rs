//! End-to-end tests: source through the pipeline, then the interpreter

use compiler::config::{CompilerConfig, EmitKind};
use compiler::error::CompileError;
use compiler::ir::printer::print_module;
use compiler::pipeline::{self, compile_source, write_artifact};
use std::path::Path;

fn run(source: &str) -> String {
    let config = CompilerConfig::default();
    let module = compile_source(source, &config).expect("compilation failed");
    pipeline::run(&module, &config)
        .expect("execution failed")
        .stdout
}

const POINTS: &str = r#"
(class Point null
  (begin
    (var x 0)
    (var y 0)
    (def constructor (self x y)
      (begin
        (set (prop self x) x)
        (set (prop self y) y)))
    (def calc (self)
      (+ (prop self x) (prop self y)))))

(class Point3D Point
  (begin
    (var z 0)
    (def constructor (self x y z)
      (begin
        ((method (super Point3D) constructor) self x y)
        (set (prop self z) z)))
    (def calc (self)
      (+ ((method (super Point3D) calc) self) (prop self z)))))
"#;

#[test]
fn test_compilation_is_deterministic() {
    let source = format!(
        r#"{}
        (var p (new Point3D 1 2 3))
        (var (s string) "calc: %d\n")
        (printf s (if (> (prop p z) 2) ((method p calc) p) 0))"#,
        POINTS
    );
    let config = CompilerConfig::default();
    let first = print_module(&compile_source(&source, &config).unwrap());
    let second = print_module(&compile_source(&source, &config).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_variables() {
    assert_eq!(run(r#"(var x 42) (printf "%d\n" x)"#), "42\n");
    assert_eq!(run(r#"(var x 42) (set x 100) (printf "%d\n" x)"#), "100\n");
}

#[test]
fn test_block_shadowing() {
    let out = run(r#"
        (var x 10)
        (begin
          (var x 20)
          (printf "x: %d\n" x))
        (printf "x: %d\n" x)
    "#);
    assert_eq!(out, "x: 20\nx: 10\n");
}

#[test]
fn test_point_polymorphism() {
    let out = run(&format!(
        r#"{}
        (var p (new Point3D 100 200 300))
        (def show ((obj Point)) ((method obj calc) obj))
        (printf "calc: %d\n" (show p))
        (printf "x=%d y=%d z=%d\n" (prop p x) (prop p y) (prop p z))"#,
        POINTS
    ));
    assert_eq!(out, "calc: 600\nx=100 y=200 z=300\n");
}

#[test]
fn test_if() {
    assert_eq!(run(r#"(printf "%d" (if (> 5 10) 1 2))"#), "2");
    assert_eq!(run(r#"(printf "%d" (if (< 5 10) 1 2))"#), "1");
}

#[test]
fn test_while_countdown() {
    let out = run(r#"
        (var i 5)
        (var body 0)
        (while (> i 0)
          (begin
            (set body (+ body 1))
            (set i (- i 1))))
        (printf "%d %d" body i)
    "#);
    assert_eq!(out, "5 0");
}

#[test]
fn test_undefined_symbol_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("dist").join("out.ll");
    let mut config = CompilerConfig::default();
    config.build.output = output.display().to_string();

    let err = pipeline::build("(var x 1) (printf \"%d\" y)", &config).unwrap_err();
    assert_eq!(err, CompileError::undefined("y"));
    assert!(err.diagnostic().starts_with("error[E2001]: undefined symbol 'y'"));
    assert!(!output.exists());

    pipeline::build("(var x 1)", &config).unwrap();
    assert!(output.exists());
}

#[test]
fn test_unknown_class_in_new() {
    let err = compile_source("(var p (new Shape 1))", &CompilerConfig::default()).unwrap_err();
    assert_eq!(err, CompileError::unknown_class("Shape"));
    assert_eq!(err.code(), 2002);
}

#[test]
fn test_string_escapes() {
    let config = CompilerConfig::default();
    let source = r#"(var (s string) "hi\n") (printf s)"#;
    let module = compile_source(source, &config).unwrap();
    assert!(print_module(&module).contains(r#"c"hi\0A\00""#));
    assert_eq!(pipeline::run(&module, &config).unwrap().stdout, "hi\n");
}

#[test]
fn test_json_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("module.json");
    let mut config = CompilerConfig::default();
    config.build.emit = EmitKind::Json;

    let module = compile_source("(def f () 1) (f)", &config).unwrap();
    write_artifact(&module, &config, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["name"], "EvaLLVM");
    assert!(value["functions"].get("f").is_some());
}

#[test]
fn test_config_file_globals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eva.toml");
    std::fs::write(
        &path,
        r#"
[build]
module-name = "Demo"
target-triple = "x86_64-unknown-linux-gnu"

[globals]
VERSION = 3
LIMIT = 10
"#,
    )
    .unwrap();

    let config = CompilerConfig::load(&path).unwrap();
    let module = compile_source(r#"(printf "%d" (+ VERSION LIMIT))"#, &config).unwrap();
    let text = print_module(&module);
    assert!(text.starts_with("; ModuleID = 'Demo'"));
    assert!(text.contains("target triple = \"x86_64-unknown-linux-gnu\""));
    assert_eq!(pipeline::run(&module, &config).unwrap().stdout, "13");

    assert!(matches!(
        CompilerConfig::load(Path::new("/nonexistent/eva.toml")),
        Err(CompileError::Io { .. })
    ));
}
