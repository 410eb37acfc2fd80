use nom::Err;
use nom_locate::LocatedSpan;
use thiserror::Error;

use crate::syntax::Syntax;

pub mod error;
pub mod position;
pub mod string;
pub mod syntax;

pub type Span<'a> = LocatedSpan<&'a str>;
pub type ParseResult<'a, R> = nom::IResult<Span<'a>, R, error::ParseError<Span<'a>>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Empty input error")]
    NoInput,
    #[error("Syntax error: {0}")]
    Syntax(String),
}

fn describe(e: Err<error::ParseError<Span<'_>>>) -> Error {
    match e {
        Err::Incomplete(_) => Error::NoInput,
        Err::Error(e) | Err::Failure(e) => Error::Syntax(format!("{e}")),
    }
}

/// Reads exactly one form.
pub fn read(input: &str) -> Result<Syntax, Error> {
    let mut forms = read_all(input)?;
    match forms.len() {
        0 => Err(Error::NoInput),
        1 => Ok(forms.remove(0)),
        n => Err(Error::Syntax(format!("expected one form, found {n}"))),
    }
}

/// Reads every form in `input`, failing on the first malformed one.
pub fn read_all(input: &str) -> Result<Vec<Syntax>, Error> {
    let mut forms = vec![];
    let mut span = Span::new(input);
    loop {
        let (rest, form) = syntax::parse_maybe_form(span).map_err(describe)?;
        match form {
            Some(form) => forms.push(form),
            None if rest.fragment().is_empty() => return Ok(forms),
            None => {
                return Err(describe(Err::Error(error::ParseError::new(
                    rest,
                    error::ParseErrorKind::Nom(nom::error::ErrorKind::Eof),
                ))))
            }
        }
        span = rest;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::syntax::test::arb_syntax;
    use proptest::prelude::*;

    #[test]
    fn read_many() {
        let forms = read_all("(define x 1) ; trailing\n x \"s\"").unwrap();
        assert_eq!(forms.len(), 3);
        assert_eq!(read("  "), Err(Error::NoInput));
        assert!(matches!(read("1 2"), Err(Error::Syntax(_))));
        assert!(matches!(read(")"), Err(Error::Syntax(_))));
    }

    proptest! {
        #[test]
        fn printed_syntax_reads_back(syn in arb_syntax()) {
            let printed = syn.to_string();
            prop_assert_eq!(read(&printed).unwrap(), syn);
        }
    }
}
