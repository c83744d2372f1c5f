//! Compilation pipeline
//!
//! Source text → AST → IR module → validated IR module, then optionally
//! serialized to disk or executed. Every phase either succeeds completely
//! or returns an error; artifacts are only written from a finished module.

use crate::codegen;
use crate::config::{CompilerConfig, EmitKind};
use crate::error::{CompileError, Result};
use crate::interpreter::{self, InterpError, RunOutput};
use crate::ir::{printer, validation, IrModule};
use log::{debug, info};
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Parse, lower and (if enabled) validate a whole program
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<IrModule> {
    let start = Instant::now();

    info!("parse: {} bytes", source.len());
    let program = parser::parse_program(source)?;

    info!("codegen: module '{}'", config.build.module_name);
    let module = codegen::compile_program(&program, config)?;
    debug!(
        "codegen produced {} functions, {} globals, {} struct types",
        module.functions.len(),
        module.globals.len(),
        module.struct_types.len()
    );

    if config.build.verify {
        info!("validate");
        validation::validate_module(&module).map_err(CompileError::InvalidIr)?;
    }

    info!("compiled in {:?}", start.elapsed());
    Ok(module)
}

/// Serialize `module` in the configured format
pub fn emit(module: &IrModule, config: &CompilerConfig) -> Result<String> {
    info!("emit: {}", config.build.emit);
    match config.build.emit {
        EmitKind::Llvm => Ok(printer::print_module(module)),
        EmitKind::Json => serde_json::to_string_pretty(module)
            .map_err(|e| CompileError::internal(format!("JSON serialization failed: {}", e))),
    }
}

/// Emit `module` and write it to `path`, creating missing directories
pub fn write_artifact(module: &IrModule, config: &CompilerConfig, path: &Path) -> Result<()> {
    let text = emit(module, config)?;
    let io_error = |e: std::io::Error| CompileError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, text).map_err(io_error)?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Execute `main` of a compiled module with the configured runtime symbols
pub fn run(module: &IrModule, config: &CompilerConfig) -> std::result::Result<RunOutput, InterpError> {
    info!("run: @main");
    interpreter::execute(
        module,
        &config.runtime.allocator,
        &config.runtime.formatter,
    )
}

/// Compile `source` and write the artifact to the configured output path
pub fn build(source: &str, config: &CompilerConfig) -> Result<IrModule> {
    let module = compile_source(source, config)?;
    write_artifact(&module, config, Path::new(&config.build.output))?;
    Ok(module)
}
