use std::fmt;

use crate::{num::Num, parser::position::Pos, symbol::Symbol, value::Value};

/// Reader output: one node per datum, with source positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Syntax {
    Num(Pos, Num),
    // #t, #f
    Bool(Pos, bool),
    // A character literal: #\a #\space #\λ
    Char(Pos, char),
    // A string literal: "foobar", "foo\nbar"
    String(Pos, String),
    Symbol(Pos, Symbol),
    // 'x
    Quote(Pos, Box<Syntax>),
    // `x
    Quasi(Pos, Box<Syntax>),
    // ,x
    Unquote(Pos, Box<Syntax>),
    // ,@x
    UnquoteSplicing(Pos, Box<Syntax>),
    // A nil-terminated list of expressions: (1 2 3)
    List(Pos, Vec<Syntax>),
    // An improper list of expressions: (1 2 . 3)
    Improper(Pos, Vec<Syntax>, Box<Syntax>),
}

impl Syntax {
    pub fn pos(&self) -> Pos {
        match self {
            Self::Num(p, _)
            | Self::Bool(p, _)
            | Self::Char(p, _)
            | Self::String(p, _)
            | Self::Symbol(p, _)
            | Self::Quote(p, _)
            | Self::Quasi(p, _)
            | Self::Unquote(p, _)
            | Self::UnquoteSplicing(p, _)
            | Self::List(p, _)
            | Self::Improper(p, _, _) => *p,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(_, s) => Some(s),
            _ => None,
        }
    }

    /// The datum this syntax denotes when quoted.
    pub fn to_value(&self) -> Value {
        let wrap = |name: &str, x: &Syntax| Value::list([Value::sym(name), x.to_value()]);
        match self {
            Self::Num(_, n) => Value::Num(n.clone()),
            Self::Bool(_, b) => Value::Bool(*b),
            Self::Char(_, c) => Value::Char(*c),
            Self::String(_, s) => Value::string(s),
            Self::Symbol(_, s) => Value::Sym(s.clone()),
            Self::Quote(_, x) => wrap("quote", x),
            Self::Quasi(_, x) => wrap("quasiquote", x),
            Self::Unquote(_, x) => wrap("unquote", x),
            Self::UnquoteSplicing(_, x) => wrap("unquote-splicing", x),
            Self::List(_, xs) => Value::list(xs.iter().map(Syntax::to_value).collect::<Vec<_>>()),
            Self::Improper(_, xs, end) => Value::list_with_tail(
                xs.iter().map(Syntax::to_value).collect::<Vec<_>>(),
                end.to_value(),
            ),
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(_, x) => write!(f, "{x}"),
            Self::Bool(_, true) => write!(f, "#t"),
            Self::Bool(_, false) => write!(f, "#f"),
            Self::Char(..) | Self::String(..) | Self::Symbol(..) => {
                write!(f, "{}", self.to_value())
            }
            Self::Quote(_, x) => write!(f, "'{x}"),
            Self::Quasi(_, x) => write!(f, "`{x}"),
            Self::Unquote(_, x) => write!(f, ",{x}"),
            Self::UnquoteSplicing(_, x) => write!(f, ",@{x}"),
            Self::List(_, xs) => {
                let mut iter = xs.iter().peekable();
                write!(f, "(")?;
                while let Some(x) = iter.next() {
                    match iter.peek() {
                        Some(_) => write!(f, "{x} ")?,
                        None => write!(f, "{x}")?,
                    }
                }
                write!(f, ")")
            }
            Self::Improper(_, xs, end) => {
                let mut iter = xs.iter().peekable();
                write!(f, "(")?;
                while let Some(x) = iter.next() {
                    match iter.peek() {
                        Some(_) => write!(f, "{x} ")?,
                        None => write!(f, "{x} . {end}")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn arb_syntax() -> impl Strategy<Value = Syntax> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(|x| Syntax::Num(Pos::No, Num::from(x))),
            any::<bool>().prop_map(|x| Syntax::Bool(Pos::No, x)),
            "[a-z][a-z0-9!?*<>=/+-]{0,6}".prop_map(|x| Syntax::Symbol(Pos::No, Symbol::new(x))),
            "[a-zA-Z0-9 ]{0,8}".prop_map(|x| Syntax::String(Pos::No, x)),
            proptest::char::range('a', 'z').prop_map(|x| Syntax::Char(Pos::No, x)),
        ];
        leaf.prop_recursive(6, 64, 6, |inner| {
            prop_oneof![
                inner
                    .clone()
                    .prop_map(|x| Syntax::Quote(Pos::No, Box::new(x))),
                prop::collection::vec(inner.clone(), 0..6).prop_map(|x| Syntax::List(Pos::No, x)),
                (prop::collection::vec(inner.clone(), 1..5), inner).prop_map(|(xs, x)| {
                    Syntax::Improper(Pos::No, xs, Box::new(x))
                })
            ]
        })
    }

    #[test]
    fn quoted_forms_become_lists() {
        let s = Syntax::Quote(
            Pos::No,
            Box::new(Syntax::Symbol(Pos::No, Symbol::new("x"))),
        );
        assert_eq!(
            s.to_value(),
            Value::list([Value::sym("quote"), Value::sym("x")])
        );
    }
}
