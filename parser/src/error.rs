//! Reader errors

use std::fmt;

/// A syntax error with a 1-based source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    /// Build an error pointing at `offset` bytes into `source`
    pub fn at_offset(message: impl Into<String>, source: &str, offset: usize) -> Self {
        let consumed = &source[..offset.min(source.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = match consumed.rfind('\n') {
            Some(newline) => consumed[newline + 1..].chars().count() + 1,
            None => consumed.chars().count() + 1,
        };
        Self::new(message, line, column)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_offset() {
        let source = "(var x 1)\n(set y\n  2";
        let err = ParseError::at_offset("boom", source, source.len());
        assert_eq!((err.line, err.column), (3, 4));

        let err = ParseError::at_offset("boom", source, 0);
        assert_eq!((err.line, err.column), (1, 1));
        assert_eq!(err.to_string(), "boom at 1:1");
    }
}
