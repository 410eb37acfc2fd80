//! Bodies of `"strings"` and `|symbols|`, with backslash escapes.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while_m_n},
    character::complete::{anychar, char, multispace1},
    combinator::{map, map_opt, value},
    multi::fold_many0,
    sequence::{delimited, preceded},
};

use crate::parser::{
    error::{fail, ParseErrorKind},
    ParseResult, Span,
};

#[derive(Clone, Copy)]
enum Piece<'a> {
    Text(&'a str),
    Char(char),
    /// A backslash before whitespace: the whitespace is dropped.
    Gap,
}

/// `u{XXXX}` with one to six hex digits naming a code point.
fn unicode(from: Span<'_>) -> ParseResult<'_, char> {
    let (rest, digits) = delimited(
        tag("u{"),
        take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
        char('}'),
    )(from)?;
    match u32::from_str_radix(digits.fragment(), 16).ok().and_then(char::from_u32) {
        Some(c) => Ok((rest, c)),
        None => fail(from, ParseErrorKind::BadUnicodeEscape(digits.fragment().to_string())),
    }
}

fn escape<'a>(delim: char) -> impl FnMut(Span<'a>) -> ParseResult<'a, Piece<'a>> {
    preceded(
        char('\\'),
        alt((
            map(unicode, Piece::Char),
            value(Piece::Gap, multispace1),
            map_opt(anychar, move |c| {
                let c = match c {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    c if c == delim => c,
                    _ => return None,
                };
                Some(Piece::Char(c))
            }),
        )),
    )
}

/// Everything between the delimiters, escapes resolved.
pub fn string_body<'a>(delim: char) -> impl FnMut(Span<'a>) -> ParseResult<'a, String> {
    fold_many0(
        alt((
            map(take_till1(move |c: char| c == delim || c == '\\'), |s: Span<'a>| {
                Piece::Text(*s.fragment())
            }),
            escape(delim),
        )),
        String::new,
        |mut out, piece| {
            match piece {
                Piece::Text(s) => out.push_str(s),
                Piece::Char(c) => out.push(c),
                Piece::Gap => {}
            }
            out
        },
    )
}

pub fn string<'a>(delim: char) -> impl FnMut(Span<'a>) -> ParseResult<'a, String> {
    delimited(char(delim), string_body(delim), char(delim))
}
