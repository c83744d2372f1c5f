//! Eva AST
//!
//! The reader produces a tree of four node kinds. Special forms (`var`, `if`,
//! `class`, ...) are plain lists whose first element is a symbol; giving them
//! meaning is the compiler's job.

use std::fmt;

/// A parsed Eva expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exp {
    /// Integer literal
    Number(i64),

    /// String literal, raw contents between the quotes
    Str(String),

    /// Identifier or operator
    Symbol(String),

    /// Parenthesized sequence
    List(Vec<Exp>),
}

impl Exp {
    pub fn symbol(name: impl Into<String>) -> Self {
        Exp::Symbol(name.into())
    }

    /// Returns the identifier if this node is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Exp::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the elements if this node is a list
    pub fn as_list(&self) -> Option<&[Exp]> {
        match self {
            Exp::List(items) => Some(items),
            _ => None,
        }
    }

    /// The leading symbol of a list form, e.g. `var` for `(var x 1)`
    pub fn form_tag(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(Exp::as_symbol)
    }

    /// Check whether this node is a list form starting with `tag`
    pub fn is_form(&self, tag: &str) -> bool {
        self.form_tag() == Some(tag)
    }

    /// Human-readable node kind for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Exp::Number(_) => "number",
            Exp::Str(_) => "string",
            Exp::Symbol(_) => "symbol",
            Exp::List(_) => "list",
        }
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Number(value) => write!(f, "{}", value),
            Exp::Str(value) => write!(f, "\"{}\"", value),
            Exp::Symbol(name) => write!(f, "{}", name),
            Exp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_helpers() {
        let exp = Exp::List(vec![Exp::symbol("var"), Exp::symbol("x"), Exp::Number(42)]);
        assert!(exp.is_form("var"));
        assert!(!exp.is_form("set"));
        assert_eq!(exp.form_tag(), Some("var"));
        assert_eq!(exp.as_list().map(|items| items.len()), Some(3));
        assert_eq!(Exp::Number(1).form_tag(), None);
        assert_eq!(Exp::List(vec![]).form_tag(), None);
    }

    #[test]
    fn test_display_is_canonical() {
        let exp = Exp::List(vec![
            Exp::symbol("printf"),
            Exp::Str("x = %d\\n".to_string()),
            Exp::List(vec![Exp::symbol("+"), Exp::Number(1), Exp::Number(-2)]),
        ]);
        assert_eq!(exp.to_string(), "(printf \"x = %d\\n\" (+ 1 -2))");
    }
}
