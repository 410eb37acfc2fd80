use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of, satisfy},
    combinator::{eof, map, not, opt, peek, recognize, value, verify},
    error::context,
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
};
use num_bigint::BigInt;

use crate::{
    num::Num,
    parser::{
        error::{fail, ParseError, ParseErrorKind},
        position::Pos,
        string, ParseResult, Span,
    },
    symbol::{Symbol, DELIMITERS},
    syntax::Syntax,
};

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !DELIMITERS.contains(c)
}

pub fn parse_line_comment(i: Span<'_>) -> ParseResult<'_, Span<'_>> {
    let (i, _) = tag(";")(i)?;
    let (i, com) = take_till(|c| c == '\n')(i)?;
    Ok((i, com))
}

pub fn parse_space(i: Span<'_>) -> ParseResult<'_, Vec<Span<'_>>> {
    let (i, _) = multispace0(i)?;
    let (i, com) = many0(terminated(parse_line_comment, multispace0))(i)?;
    Ok((i, com))
}

/// Succeeds without consuming input if the next character ends a token.
fn token_end(i: Span<'_>) -> ParseResult<'_, ()> {
    alt((
        value((), eof),
        value((), peek(satisfy(|c| !is_symbol_char(c)))),
    ))(i)
}

pub fn parse_num(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (i, digits) = recognize(pair(opt(one_of("+-")), digit1))(from)?;
    let (upto, _) = token_end(i)?;
    let text = digits.fragment().trim_start_matches('+');
    let big = match text.parse::<BigInt>() {
        Ok(big) => big,
        Err(e) => return fail(from, ParseErrorKind::BadNumber(e.to_string())),
    };
    Ok((upto, Syntax::Num(Pos::from_upto(from, upto), Num::from(big))))
}

pub fn parse_bool(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (i, b) = alt((
        value(true, tag("#true")),
        value(false, tag("#false")),
        value(true, tag("#t")),
        value(false, tag("#f")),
    ))(from)?;
    let (upto, _) = token_end(i)?;
    Ok((upto, Syntax::Bool(Pos::from_upto(from, upto), b)))
}

pub fn parse_char(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (i, _) = tag("#\\")(from)?;
    let (i, first) = satisfy(|_| true)(i)?;
    let (upto, rest) = take_while1::<_, _, ParseError<Span<'_>>>(is_symbol_char)(i)
        .map(|(upto, rest)| (upto, Some(rest)))
        .unwrap_or((i, None));
    let c = match rest {
        None => first,
        Some(rest) => {
            let name = format!("{first}{}", rest.fragment());
            let named = match name.as_str() {
                "space" => Some(' '),
                "newline" => Some('\n'),
                "tab" => Some('\t'),
                "nul" => Some('\0'),
                _ => None,
            };
            match named {
                Some(c) => c,
                None => return fail(from, ParseErrorKind::UnknownCharName(name)),
            }
        }
    };
    Ok((upto, Syntax::Char(Pos::from_upto(from, upto), c)))
}

pub fn parse_string(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (upto, s) = string::string('"')(from)?;
    Ok((upto, Syntax::String(Pos::from_upto(from, upto), s)))
}

pub fn parse_symbol(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (upto, name) = alt((
        delimited(char('|'), string::string_body('|'), char('|')),
        map(
            preceded(
                not(char('#')),
                verify(take_while1(is_symbol_char), |s: &Span<'_>| *s.fragment() != "."),
            ),
            |s: Span<'_>| s.fragment().to_string(),
        ),
    ))(from)?;
    Ok((
        upto,
        Syntax::Symbol(Pos::from_upto(from, upto), Symbol::new(name)),
    ))
}

fn parse_prefixed(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (i, prefix) = alt((tag("'"), tag("`"), tag(",@"), tag(",")))(from)?;
    let (i, _) = parse_space(i)?;
    let (upto, x) = parse_syntax(i)?;
    let pos = Pos::from_upto(from, upto);
    let x = Box::new(x);
    let syn = match *prefix.fragment() {
        "'" => Syntax::Quote(pos, x),
        "`" => Syntax::Quasi(pos, x),
        ",@" => Syntax::UnquoteSplicing(pos, x),
        _ => Syntax::Unquote(pos, x),
    };
    Ok((upto, syn))
}

pub fn parse_list(from: Span<'_>) -> ParseResult<'_, Syntax> {
    let (i, _) = char('(')(from)?;
    let (i, xs) = many0(preceded(parse_space, parse_syntax))(i)?;
    let (i, _) = parse_space(i)?;
    let (i, end) = opt(preceded(
        terminated(char('.'), multispace1),
        preceded(parse_space, parse_syntax),
    ))(i)?;
    let (i, _) = parse_space(i)?;
    let (upto, _) = context("closing parenthesis", char(')'))(i)?;
    let pos = Pos::from_upto(from, upto);
    match end {
        Some(end) if !xs.is_empty() => Ok((upto, Syntax::Improper(pos, xs, Box::new(end)))),
        Some(_) => fail(from, ParseErrorKind::MisplacedDot),
        None => Ok((upto, Syntax::List(pos, xs))),
    }
}

pub fn parse_syntax(from: Span<'_>) -> ParseResult<'_, Syntax> {
    alt((
        parse_list,
        parse_prefixed,
        parse_string,
        parse_bool,
        parse_char,
        parse_num,
        parse_symbol,
    ))(from)
}

/// Parses one form surrounded by optional whitespace and comments.
pub fn parse_maybe_form(from: Span<'_>) -> ParseResult<'_, Option<Syntax>> {
    let (i, _) = parse_space(from)?;
    let (i, syn) = opt(parse_syntax)(i)?;
    let (i, _) = parse_space(i)?;
    Ok((i, syn))
}
