//! S-expression reader
//!
//! Grammar:
//!
//! ```text
//! program    := expression*
//! expression := list | string | number | symbol
//! list       := '(' expression* ')'
//! string     := '"' [^"]* '"'
//! number     := '-'? [0-9]+        (not followed by a symbol character)
//! symbol     := [A-Za-z0-9_+\-*/=<>!?.%]+
//! ```
//!
//! Whitespace, `// line` and `/* block */` comments may appear between tokens.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace1, satisfy},
    combinator::{cut, map, not, opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
    IResult, Parser,
};

use crate::ast::Exp;
use crate::error::ParseError;

pub type PResult<'a, T> = IResult<&'a str, T>;

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_+-*/=<>!?.%".contains(c)
}

/// Line comment: // comment
fn line_comment(input: &str) -> PResult<&str> {
    recognize((tag("//"), take_while(|c: char| c != '\n'), opt(char('\n')))).parse(input)
}

/// Block comment: /* comment */
fn block_comment(input: &str) -> PResult<&str> {
    recognize((tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

/// Skip whitespace and comments
pub fn ws(input: &str) -> PResult<()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), line_comment),
            value((), block_comment),
        ))),
    )
    .parse(input)
}

fn number(input: &str) -> PResult<Exp> {
    let (rest, text) = terminated(
        recognize(pair(opt(char('-')), digit1)),
        not(satisfy(is_symbol_char)),
    )
    .parse(input)?;

    match text.parse::<i64>() {
        Ok(value) => Ok((rest, Exp::Number(value))),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

fn string(input: &str) -> PResult<Exp> {
    map(
        preceded(char('"'), cut(terminated(take_while(|c: char| c != '"'), char('"')))),
        |contents: &str| Exp::Str(contents.to_string()),
    )
    .parse(input)
}

fn symbol(input: &str) -> PResult<Exp> {
    map(take_while1(is_symbol_char), |name: &str| {
        Exp::Symbol(name.to_string())
    })
    .parse(input)
}

fn list(input: &str) -> PResult<Exp> {
    map(
        preceded(
            char('('),
            cut(terminated(many0(expression), preceded(ws, char(')')))),
        ),
        Exp::List,
    )
    .parse(input)
}

/// Parse one expression, skipping leading whitespace and comments
pub fn expression(input: &str) -> PResult<Exp> {
    preceded(ws, alt((list, string, number, symbol))).parse(input)
}

fn convert_error(source: &str, err: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = source.len() - e.input.len();
            let message = if e.input.is_empty() {
                "unexpected end of input".to_string()
            } else {
                match e.code {
                    ErrorKind::Char => match e.input.chars().next() {
                        Some(found) => format!("unexpected character '{}'", found),
                        None => "unexpected end of input".to_string(),
                    },
                    ErrorKind::Digit => "number literal out of range".to_string(),
                    kind => format!("invalid syntax ({:?})", kind),
                }
            };
            ParseError::at_offset(message, source, offset)
        }
        nom::Err::Incomplete(_) => {
            ParseError::at_offset("unexpected end of input", source, source.len())
        }
    }
}

/// Parse exactly one expression; trailing input other than whitespace is an error
pub fn parse_expression(source: &str) -> Result<Exp, ParseError> {
    let (rest, exp) = expression(source).map_err(|e| convert_error(source, e))?;
    let (rest, _) = ws(rest).map_err(|e| convert_error(source, e))?;
    if !rest.is_empty() {
        return Err(ParseError::at_offset(
            "unexpected trailing input",
            source,
            source.len() - rest.len(),
        ));
    }
    Ok(exp)
}

/// Parse a whole program and wrap it in an implicit `(begin ...)`
pub fn parse_program(source: &str) -> Result<Exp, ParseError> {
    let (rest, body) = many0(expression)
        .parse(source)
        .map_err(|e| convert_error(source, e))?;
    let (rest, _) = ws(rest).map_err(|e| convert_error(source, e))?;

    if !rest.is_empty() {
        let message = match rest.chars().next() {
            Some(')') => "unbalanced ')'".to_string(),
            Some(found) => format!("unexpected character '{}'", found),
            None => "unexpected end of input".to_string(),
        };
        return Err(ParseError::at_offset(message, source, source.len() - rest.len()));
    }

    if body.is_empty() {
        return Err(ParseError::at_offset("empty program", source, source.len()));
    }

    let mut program = Vec::with_capacity(body.len() + 1);
    program.push(Exp::symbol("begin"));
    program.extend(body);
    Ok(Exp::List(program))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Exp {
        Exp::symbol(name)
    }

    #[test]
    fn test_atoms() {
        assert_eq!(parse_expression("42").unwrap(), Exp::Number(42));
        assert_eq!(parse_expression("  -7 ").unwrap(), Exp::Number(-7));
        assert_eq!(parse_expression("foo_bar").unwrap(), sym("foo_bar"));
        assert_eq!(parse_expression("->").unwrap(), sym("->"));
        assert_eq!(parse_expression("-").unwrap(), sym("-"));
        assert_eq!(parse_expression(">=").unwrap(), sym(">="));
        assert_eq!(
            parse_expression("\"a\\nb\"").unwrap(),
            Exp::Str("a\\nb".to_string())
        );
    }

    #[test]
    fn test_number_prefix_of_symbol_is_symbol() {
        assert_eq!(parse_expression("3d").unwrap(), sym("3d"));
        assert_eq!(parse_expression("-x").unwrap(), sym("-x"));
    }

    #[test]
    fn test_nested_lists() {
        let exp = parse_expression("(def square (x) (* x x))").unwrap();
        assert_eq!(
            exp,
            Exp::List(vec![
                sym("def"),
                sym("square"),
                Exp::List(vec![sym("x")]),
                Exp::List(vec![sym("*"), sym("x"), sym("x")]),
            ])
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let exp = parse_expression(
            "// leading\n(var /* inline */ x // trailing\n 10)",
        )
        .unwrap();
        assert_eq!(exp.to_string(), "(var x 10)");
    }

    #[test]
    fn test_program_is_wrapped_in_begin() {
        let program = parse_program("(var x 1) (set x 2) x").unwrap();
        assert_eq!(program.to_string(), "(begin (var x 1) (set x 2) x)");
    }

    #[test]
    fn test_unclosed_list_reports_position() {
        let err = parse_program("(var x\n  (+ 1 2)").unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_unbalanced_paren() {
        let err = parse_program("(var x 1))").unwrap_err();
        assert_eq!(err.message, "unbalanced ')'");
        assert_eq!((err.line, err.column), (1, 10));
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse_program("(printf \"oops)").unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
    }

    #[test]
    fn test_empty_program() {
        let err = parse_program("  // nothing here\n").unwrap_err();
        assert_eq!(err.message, "empty program");
    }
}
