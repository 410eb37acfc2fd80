use std::{cmp::Ordering, fmt};

use nom::{
    error::{ContextError, ErrorKind},
    Err, InputLength,
};
use thiserror::Error;

use crate::parser::{ParseResult, Span};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("No character has code point \\u{{{0}}}")]
    BadUnicodeEscape(String),
    #[error("Unknown character name #\\{0}")]
    UnknownCharName(String),
    #[error("Dotted tail without a head")]
    MisplacedDot,
    #[error("Bad number: {0}")]
    BadNumber(String),
    #[error("{0:?}")]
    Nom(ErrorKind),
}

/// The furthest position the reader reached, what it wanted there and why
/// it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError<I> {
    pub input: I,
    pub expected: Option<&'static str>,
    pub errors: Vec<ParseErrorKind>,
}

impl<I> ParseError<I> {
    pub fn new(input: I, error: ParseErrorKind) -> Self {
        ParseError {
            input,
            expected: None,
            errors: vec![error],
        }
    }
}

impl<I: InputLength> ParseError<I> {
    /// Keeps whichever error got further into the input. Ties merge.
    fn furthest(self, mut other: Self) -> Self {
        match self.input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => self,
            Ordering::Greater => other,
            Ordering::Equal => {
                other.errors.extend(self.errors);
                other
            }
        }
    }
}

/// Stops the reader at `input`. No other alternative is tried, so the cause
/// reaches the caller intact.
pub fn fail<A>(input: Span<'_>, kind: ParseErrorKind) -> ParseResult<'_, A> {
    Err(Err::Failure(ParseError::new(input, kind)))
}

impl fmt::Display for ParseError<Span<'_>> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.input.location_line();
        let column = self.input.get_column();
        let gutter = format!("{line} | ");
        let text = String::from_utf8_lossy(self.input.get_line_beginning());
        writeln!(f, "at line {line}:{column}")?;
        writeln!(f, "{gutter}{text}")?;
        writeln!(f, "{}^", " ".repeat(gutter.len() + column - 1))?;
        if let Some(expected) = self.expected {
            writeln!(f, "Expected {expected}")?;
        }
        let reported = self
            .errors
            .iter()
            .filter(|kind| !matches!(kind, ParseErrorKind::Nom(_)))
            .collect::<Vec<_>>();
        if reported.is_empty() {
            return writeln!(f, "Internal parser error");
        }
        writeln!(f, "Reported errors:")?;
        for kind in reported {
            writeln!(f, "- {kind}")?;
        }
        Ok(())
    }
}

impl<I: InputLength> nom::error::ParseError<I> for ParseError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParseError::new(input, ParseErrorKind::Nom(kind))
    }

    fn append(input: I, kind: ErrorKind, other: Self) -> Self {
        Self::from_error_kind(input, kind).furthest(other)
    }

    fn or(self, other: Self) -> Self {
        self.furthest(other)
    }
}

impl<I: InputLength> ContextError<I> for ParseError<I> {
    fn add_context(input: I, ctx: &'static str, mut other: Self) -> Self {
        match input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => ParseError {
                input,
                expected: Some(ctx),
                errors: vec![],
            },
            Ordering::Equal => {
                other.expected.get_or_insert(ctx);
                other
            }
            Ordering::Greater => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::read;

    #[test]
    fn points_at_the_failure() {
        let err = fail::<()>(Span::new("#\\bogus"), ParseErrorKind::UnknownCharName("bogus".into()))
            .unwrap_err();
        let Err::Failure(err) = err else {
            panic!("expected the reader to stop");
        };
        let msg = err.to_string();
        assert!(msg.starts_with("at line 1:1\n1 | #\\bogus"), "{msg}");
        assert!(msg.contains("\n    ^\n"), "{msg}");
        assert!(msg.ends_with("Reported errors:\n- Unknown character name #\\bogus\n"), "{msg}");
    }

    #[test]
    fn reader_errors_name_their_cause() {
        let msg = read("(. 1)").unwrap_err().to_string();
        assert!(msg.contains("Dotted tail without a head"), "{msg}");
        let msg = read("\"\\u{d800}\"").unwrap_err().to_string();
        assert!(msg.contains("No character has code point \\u{d800}"), "{msg}");
        let msg = read("(list #\\bogus)").unwrap_err().to_string();
        assert!(msg.contains("Unknown character name #\\bogus"), "{msg}");
    }
}
