//! Runs every `programs/*.eva` and compares stdout with the `.out` file
//! next to it

use compiler::config::CompilerConfig;
use compiler::pipeline;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

#[test]
fn test_program_corpus() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("programs");
    let config = CompilerConfig::default();
    let mut checked = 0;
    let mut failures = Vec::new();

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("eva") {
            continue;
        }

        let source = fs::read_to_string(path).unwrap();
        let expected = fs::read_to_string(path.with_extension("out"))
            .unwrap_or_else(|_| panic!("missing expectation for {}", path.display()));

        let result = pipeline::compile_source(&source, &config)
            .map_err(|e| e.diagnostic())
            .and_then(|module| pipeline::run(&module, &config).map_err(|e| e.to_string()));
        match result {
            Ok(output) if output.stdout == expected => {}
            Ok(output) => failures.push(format!(
                "{}: expected {:?}, got {:?}",
                path.display(),
                expected,
                output.stdout
            )),
            Err(e) => failures.push(format!("{}: {}", path.display(), e)),
        }
        checked += 1;
    }

    assert!(checked > 0, "no programs found under {}", root.display());
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}
