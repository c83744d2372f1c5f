//! Error code registry for the Eva compiler
//!
//! Every [`CompileError`](crate::error::CompileError) kind carries a stable
//! code so diagnostics can be searched and documented.
//!
//! # Error Code Ranges
//!
//! - E0001-E0999: Reader errors and malformed special forms
//! - E1000-E1999: Type errors
//! - E2000-E2999: Name, class, field and method resolution
//! - E5000-E5999: Generated IR rejected by the validator
//! - E7000-E7999: Failures of the compiled program under the interpreter
//! - E8000-E8999: Configuration
//! - E9000-E9999: I/O and internal errors

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

pub const PARSE_ERROR: u16 = 1;
pub const MALFORMED_FORM: u16 = 101;
pub const TYPE_MISMATCH: u16 = 1001;
pub const UNDEFINED_SYMBOL: u16 = 2001;
pub const UNKNOWN_CLASS: u16 = 2002;
pub const UNKNOWN_FIELD: u16 = 2003;
pub const UNKNOWN_METHOD: u16 = 2004;
pub const DUPLICATE_CLASS: u16 = 2005;
pub const INVALID_IR: u16 = 5001;
pub const RUNTIME_ERROR: u16 = 7001;
pub const CONFIG_ERROR: u16 = 8001;
pub const IO_ERROR: u16 = 9001;
pub const INTERNAL_ERROR: u16 = 9002;

/// A registered diagnostic code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    pub code: u16,
    pub category: &'static str,
    pub description: &'static str,
    pub help: Option<&'static str>,
}

impl ErrorCode {
    pub const fn new(
        code: u16,
        category: &'static str,
        description: &'static str,
        help: Option<&'static str>,
    ) -> Self {
        Self {
            code,
            category,
            description,
            help,
        }
    }

    /// "E{code:04}", e.g. "E2001"
    pub fn format_code(&self) -> String {
        format_error_code(self.code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.format_code(),
            self.category,
            self.description
        )
    }
}

pub struct ErrorCodeRegistry {
    codes: HashMap<u16, ErrorCode>,
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCodeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            codes: HashMap::new(),
        };
        registry.register_all_codes();
        registry
    }

    pub fn get(&self, code: u16) -> Option<&ErrorCode> {
        self.codes.get(&code)
    }

    /// Look up by formatted code such as "E2002"
    pub fn get_by_string(&self, code_str: &str) -> Option<&ErrorCode> {
        parse_error_code(code_str).and_then(|code| self.get(code))
    }

    fn register(&mut self, error_code: ErrorCode) {
        self.codes.insert(error_code.code, error_code);
    }

    fn register_all_codes(&mut self) {
        // Reader and form shape
        self.register(ErrorCode::new(
            PARSE_ERROR,
            "Parser",
            "Malformed s-expression",
            Some("Check for unbalanced parentheses or an unterminated string"),
        ));
        self.register(ErrorCode::new(
            MALFORMED_FORM,
            "Syntax",
            "Special form has the wrong shape",
            Some("Compare the form against its expected arity, e.g. (var name value)"),
        ));

        // Types
        self.register(ErrorCode::new(
            TYPE_MISMATCH,
            "Type",
            "Type mismatch",
            Some("Declare the variable or parameter with a matching type annotation"),
        ));

        // Resolution
        self.register(ErrorCode::new(
            UNDEFINED_SYMBOL,
            "Symbol",
            "Undefined symbol",
            Some("Declare the name with var or def before using it"),
        ));
        self.register(ErrorCode::new(
            UNKNOWN_CLASS,
            "Symbol",
            "Unknown class",
            Some("Classes must be declared before they are instantiated or referenced"),
        ));
        self.register(ErrorCode::new(
            UNKNOWN_FIELD,
            "Symbol",
            "Unknown field",
            Some("Fields are declared with var inside the class body or a parent class"),
        ));
        self.register(ErrorCode::new(
            UNKNOWN_METHOD,
            "Symbol",
            "Unknown method",
            Some("Methods are declared with def inside the class body or a parent class"),
        ));
        self.register(ErrorCode::new(
            DUPLICATE_CLASS,
            "Symbol",
            "Class declared twice",
            Some("Rename one of the classes"),
        ));

        // Generated IR
        self.register(ErrorCode::new(
            INVALID_IR,
            "Codegen",
            "Generated IR failed validation",
            Some("This is an internal compiler error; please report it with the source"),
        ));

        // Running the program
        self.register(ErrorCode::new(
            RUNTIME_ERROR,
            "Runtime",
            "Program failed while running",
            Some("The program itself divided by zero, read an uninitialized value or ran too long"),
        ));

        // Configuration
        self.register(ErrorCode::new(
            CONFIG_ERROR,
            "Config",
            "Invalid compiler configuration",
            Some("Check eva.toml against the documented [build], [runtime] and [globals] keys"),
        ));

        // I/O
        self.register(ErrorCode::new(
            IO_ERROR,
            "IO",
            "File could not be read or written",
            None,
        ));
        self.register(ErrorCode::new(
            INTERNAL_ERROR,
            "Internal",
            "Unexpected compiler state",
            Some("This is an internal compiler error; please report it with the source"),
        ));
    }

    /// All codes in `start..=end`, sorted
    pub fn get_range(&self, start: u16, end: u16) -> Vec<&ErrorCode> {
        let mut codes: Vec<&ErrorCode> = self
            .codes
            .values()
            .filter(|code| code.code >= start && code.code <= end)
            .collect();
        codes.sort_by_key(|code| code.code);
        codes
    }

    pub fn is_valid_code(&self, code: u16) -> bool {
        self.codes.contains_key(&code)
    }
}

static REGISTRY: OnceLock<ErrorCodeRegistry> = OnceLock::new();

/// The process-wide registry
pub fn error_registry() -> &'static ErrorCodeRegistry {
    REGISTRY.get_or_init(ErrorCodeRegistry::new)
}

pub fn get_error_code(code: u16) -> Option<&'static ErrorCode> {
    error_registry().get(code)
}

pub fn format_error_code(code: u16) -> String {
    format!("E{:04}", code)
}

/// "E2001" -> Some(2001)
pub fn parse_error_code(code_str: &str) -> Option<u16> {
    code_str
        .strip_prefix('E')
        .and_then(|digits| digits.parse::<u16>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = ErrorCodeRegistry::new();
        let undefined = registry.get(UNDEFINED_SYMBOL).unwrap();
        assert_eq!(undefined.description, "Undefined symbol");
        assert_eq!(undefined.format_code(), "E2001");
        assert_eq!(registry.get_by_string("E2002").unwrap().code, UNKNOWN_CLASS);
        assert!(registry.get(4242).is_none());
        assert!(registry.get_by_string("2001").is_none());
    }

    #[test]
    fn test_resolution_range() {
        let registry = error_registry();
        let codes: Vec<u16> = registry
            .get_range(2000, 2999)
            .iter()
            .map(|code| code.code)
            .collect();
        assert_eq!(codes, vec![2001, 2002, 2003, 2004, 2005]);
    }

    #[test]
    fn test_global_registry_is_shared() {
        assert!(std::ptr::eq(error_registry(), error_registry()));
        assert!(error_registry().is_valid_code(MALFORMED_FORM));
    }

    #[test]
    fn test_format_and_parse() {
        assert_eq!(format_error_code(1), "E0001");
        assert_eq!(format_error_code(101), "E0101");
        assert_eq!(parse_error_code("E5001"), Some(5001));
        assert_eq!(parse_error_code("X5001"), None);
    }
}
