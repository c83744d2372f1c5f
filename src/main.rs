//! evac - the Eva compiler driver
//!
//! # Usage
//!
//! ```bash
//! # Compile a file to ./dist/out.ll
//! evac -f program.eva
//!
//! # Compile an expression and print the IR
//! evac -e '(printf "%d\n" (+ 1 2))' --print-ir
//!
//! # Compile and execute with the IR interpreter
//! evac -f program.eva --run
//!
//! # JSON output somewhere else, using settings from eva.toml
//! evac -f program.eva --config eva.toml --emit json -o build/program.json
//! ```

use clap::{ArgGroup, Parser};
use compiler::config::{CompilerConfig, EmitKind};
use compiler::error::CompileError;
use compiler::{logging, pipeline};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "evac")]
#[command(version = "0.1.0")]
#[command(about = "Eva compiler: s-expressions to LLVM-style SSA IR", long_about = None)]
#[command(group(ArgGroup::new("input").required(true).args(["expression", "file"])))]
struct Cli {
    /// Program source given inline
    #[arg(short, long)]
    expression: Option<String>,

    /// Path to an Eva source file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Where to write the compiled module (overrides the config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: llvm or json
    #[arg(long)]
    emit: Option<EmitKind>,

    /// Path to an eva.toml configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the module to stdout as well
    #[arg(long)]
    print_ir: bool,

    /// Execute main with the IR interpreter after compiling
    #[arg(long)]
    run: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    match compile(&cli) {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("{}", e.diagnostic());
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<CompilerConfig, CompileError> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };
    if let Some(emit) = cli.emit {
        config.build.emit = emit;
    }
    if let Some(output) = &cli.output {
        config.build.output = output.display().to_string();
    }
    Ok(config)
}

fn read_source(cli: &Cli) -> Result<String, CompileError> {
    match (&cli.expression, &cli.file) {
        (Some(expression), _) => Ok(expression.clone()),
        (None, Some(path)) => fs::read_to_string(path).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        (None, None) => Err(CompileError::Config(
            "either --expression or --file is required".to_string(),
        )),
    }
}

/// Compile, write the artifact and optionally run; returns the exit code
fn compile(cli: &Cli) -> Result<i32, CompileError> {
    let config = load_config(cli)?;
    debug!("configuration: {:?}", config);

    let source = read_source(cli)?;
    let module = pipeline::compile_source(&source, &config)?;
    pipeline::write_artifact(&module, &config, Path::new(&config.build.output))?;

    if cli.print_ir {
        print!("{}", pipeline::emit(&module, &config)?);
    }

    if cli.run {
        let output = pipeline::run(&module, &config)?;
        print!("{}", output.stdout);
        return Ok(output.exit_code as i32);
    }
    Ok(0)
}
