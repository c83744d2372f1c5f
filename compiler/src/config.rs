//! Compiler configuration (`eva.toml`)
//!
//! ```toml
//! [build]
//! module-name = "EvaLLVM"
//! output = "./dist/out.ll"
//! emit = "llvm"            # or "json"
//! target-triple = "x86_64-pc-linux-gnu"
//! verify = true
//!
//! [runtime]
//! allocator = "GC_malloc"
//! formatter = "printf"
//!
//! [globals]
//! VERSION = 42
//! ```
//!
//! Every key is optional. A `[globals]` table replaces the default set.

use crate::error::{CompileError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Output format of the compiled module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitKind {
    /// LLVM textual IR
    #[default]
    Llvm,
    /// The module serialized as JSON
    Json,
}

impl FromStr for EmitKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "llvm" | "ll" => Ok(EmitKind::Llvm),
            "json" => Ok(EmitKind::Json),
            other => Err(format!("unknown emit kind '{}', expected llvm or json", other)),
        }
    }
}

impl fmt::Display for EmitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitKind::Llvm => write!(f, "llvm"),
            EmitKind::Json => write!(f, "json"),
        }
    }
}

/// `[build]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BuildConfig {
    pub module_name: String,
    pub output: String,
    pub emit: EmitKind,
    pub target_triple: Option<String>,
    /// Run the IR validator before emitting
    pub verify: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            module_name: "EvaLLVM".to_string(),
            output: "./dist/out.ll".to_string(),
            emit: EmitKind::Llvm,
            target_triple: None,
            verify: true,
        }
    }
}

/// `[runtime]` section: names of the external primitives generated code calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// `i8* (i64)` heap allocator
    pub allocator: String,
    /// `i32 (i8*, ...)` formatted output
    pub formatter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            allocator: "GC_malloc".to_string(),
            formatter: "printf".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompilerConfig {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Module-level `i32` globals, in declaration order
    #[serde(default = "default_globals")]
    pub globals: IndexMap<String, i64>,
}

fn default_globals() -> IndexMap<String, i64> {
    let mut globals = IndexMap::new();
    globals.insert("VERSION".to_string(), 42);
    globals
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            runtime: RuntimeConfig::default(),
            globals: default_globals(),
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CompilerConfig = toml::from_str(content)
            .map_err(|e| CompileError::Config(format!("failed to parse eva.toml: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    fn check(&self) -> Result<()> {
        if self.build.module_name.trim().is_empty() {
            return Err(CompileError::Config("build.module-name must not be empty".into()));
        }
        if self.runtime.allocator.is_empty() || self.runtime.formatter.is_empty() {
            return Err(CompileError::Config(
                "runtime.allocator and runtime.formatter must not be empty".into(),
            ));
        }
        if self.runtime.allocator == self.runtime.formatter {
            return Err(CompileError::Config(format!(
                "runtime.allocator and runtime.formatter are both '{}'",
                self.runtime.allocator
            )));
        }
        for (name, value) in &self.globals {
            if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(CompileError::Config(format!("invalid global name '{}'", name)));
            }
            if i32::try_from(*value).is_err() {
                return Err(CompileError::Config(format!(
                    "global '{}' = {} does not fit in i32",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.build.module_name, "EvaLLVM");
        assert_eq!(config.build.output, "./dist/out.ll");
        assert_eq!(config.build.emit, EmitKind::Llvm);
        assert!(config.build.verify);
        assert_eq!(config.runtime.allocator, "GC_malloc");
        assert_eq!(config.globals.get("VERSION"), Some(&42));
        assert_eq!(CompilerConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_kebab_case_keys() {
        let config = CompilerConfig::from_toml_str(
            r#"
            [build]
            module-name = "Demo"
            emit = "json"
            target-triple = "x86_64-pc-linux-gnu"
            verify = false

            [globals]
            MAX = 10
            MIN = -10
            "#,
        )
        .unwrap();

        assert_eq!(config.build.module_name, "Demo");
        assert_eq!(config.build.output, "./dist/out.ll");
        assert_eq!(config.build.emit, EmitKind::Json);
        assert_eq!(config.build.target_triple.as_deref(), Some("x86_64-pc-linux-gnu"));
        assert!(!config.build.verify);
        let names: Vec<&str> = config.globals.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["MAX", "MIN"]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            CompilerConfig::from_toml_str("[build]\nemit = \"wasm\""),
            Err(CompileError::Config(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("[build]\nopt-level = 3"),
            Err(CompileError::Config(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("[globals]\nBIG = 9999999999"),
            Err(CompileError::Config(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("[runtime]\nallocator = \"printf\""),
            Err(CompileError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = CompilerConfig::load("/definitely/not/here/eva.toml").unwrap_err();
        assert_eq!(err.code(), crate::error_codes::IO_ERROR);
    }

    #[test]
    fn test_emit_kind_from_str() {
        assert_eq!("llvm".parse::<EmitKind>(), Ok(EmitKind::Llvm));
        assert_eq!("json".parse::<EmitKind>(), Ok(EmitKind::Json));
        assert!("asm".parse::<EmitKind>().is_err());
    }
}
