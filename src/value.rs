//! Guest-language values.

use std::{fmt, rc::Rc};

use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    eval::{procedure::Procedure, reclaim::Reclaim},
    num::Num,
    symbol::Symbol,
};

#[derive(Clone)]
pub enum Value {
    Nil,
    Unspecified,
    Bool(bool),
    Num(Num),
    Char(char),
    Str(Rc<str>),
    Sym(Symbol),
    Pair(Rc<Pair>),
    Proc(Rc<Procedure>),
    Condition(Rc<Condition>),
}

/// An immutable cons cell.
pub struct Pair {
    car: Value,
    cdr: Value,
}

impl Pair {
    #[inline]
    pub fn car(&self) -> &Value {
        &self.car
    }

    #[inline]
    pub fn cdr(&self) -> &Value {
        &self.cdr
    }
}

impl Pair {
    pub(crate) fn take_fields(&mut self) -> (Value, Value) {
        (
            std::mem::replace(&mut self.car, Value::Nil),
            std::mem::replace(&mut self.cdr, Value::Nil),
        )
    }
}

// Deep structure would otherwise be freed by one native frame per level.
impl Drop for Pair {
    fn drop(&mut self) {
        let (car, cdr) = self.take_fields();
        let mut r = Reclaim::default();
        r.value(car);
        r.value(cdr);
        r.run();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// A variable was read before its box was initialized.
    UnboundVariable,
    /// A top-level name was read before any definition.
    UndefinedGlobal,
    ArityMismatch,
    WrongType,
    /// `shift` was called with no enclosing `reset`.
    NoPrompt,
    /// Raised by `error`.
    User,
}

impl ConditionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnboundVariable => "unbound-variable",
            Self::UndefinedGlobal => "undefined-global",
            Self::ArityMismatch => "arity-mismatch",
            Self::WrongType => "wrong-type",
            Self::NoPrompt => "no-prompt",
            Self::User => "error",
        }
    }
}

/// A guest-visible error object. Conditions travel along the continuation
/// chain like any other thrown value.
#[derive(Debug)]
pub struct Condition {
    pub kind: ConditionKind,
    pub message: String,
    pub irritants: Vec<Value>,
}

impl Condition {
    pub fn new<S: Into<String>>(kind: ConditionKind, message: S, irritants: Vec<Value>) -> Self {
        Self {
            kind,
            message: message.into(),
            irritants,
        }
    }

    pub fn unbound(name: &Symbol) -> Self {
        Self::new(
            ConditionKind::UnboundVariable,
            format!("{name}: unbound variable"),
            vec![Value::Sym(name.clone())],
        )
    }

    pub fn undefined(name: &Symbol) -> Self {
        Self::new(
            ConditionKind::UndefinedGlobal,
            format!("{name}: undefined"),
            vec![Value::Sym(name.clone())],
        )
    }

    pub fn arity(who: &str, expected: usize, variadic: bool, got: usize) -> Self {
        let at_least = if variadic { "at least " } else { "" };
        Self::new(
            ConditionKind::ArityMismatch,
            format!("{who}: expected {at_least}{expected} arguments, got {got}"),
            vec![Value::int(got as i64)],
        )
    }

    pub fn wrong_type(who: &str, expected: &str, got: &Value) -> Self {
        Self::new(
            ConditionKind::WrongType,
            format!("{who}: expected {expected}"),
            vec![got.clone()],
        )
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        if !self.irritants.is_empty() {
            let mut r = Reclaim::default();
            r.values(self.irritants.drain(..));
            r.run();
        }
    }
}

impl From<Condition> for Value {
    fn from(c: Condition) -> Self {
        Value::Condition(Rc::new(c))
    }
}

impl Value {
    #[inline]
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    #[inline]
    pub fn sym(name: &str) -> Value {
        Value::Sym(Symbol::new(name))
    }

    #[inline]
    pub fn int(x: i64) -> Value {
        Value::Num(Num::from(x))
    }

    pub fn string<S: AsRef<str>>(s: S) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self::list_with_tail(items, Value::Nil)
    }

    pub fn list_with_tail<I>(items: I, tail: Value) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    /// Collects a proper list into a vector; `None` if `self` is not one.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut out = vec![];
        let mut cur = self;
        loop {
            match cur {
                Value::Nil => return Some(out),
                Value::Pair(p) => {
                    out.push(p.car.clone());
                    cur = &p.cdr;
                }
                _ => return None,
            }
        }
    }

    /// Reverses a proper list built by prepending, as the evaluator does when
    /// it accumulates operands.
    pub fn reverse_list(&self) -> Option<Value> {
        let mut acc = Value::Nil;
        let mut cur = self;
        loop {
            match cur {
                Value::Nil => return Some(acc),
                Value::Pair(p) => {
                    acc = Value::cons(p.car.clone(), acc);
                    cur = &p.cdr;
                }
                _ => return None,
            }
        }
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn as_pair(&self) -> Option<&Pair> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_proc(&self) -> Option<&Rc<Procedure>> {
        match self {
            Value::Proc(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<&Num> {
        match self {
            Value::Num(n) => Some(n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "null",
            Value::Unspecified => "unspecified",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::Sym(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Proc(_) => "procedure",
            Value::Condition(_) => "condition",
        }
    }

    /// `eqv?`: identity for heap objects, value equality for atoms.
    pub fn eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Unspecified, Value::Unspecified) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Sym(a), Value::Sym(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            (Value::Condition(a), Value::Condition(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `equal?`: structural equality on pairs and strings.
    pub fn equal(&self, other: &Value) -> bool {
        let mut todo = vec![(self, other)];
        while let Some((a, b)) = todo.pop() {
            match (a, b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if !Rc::ptr_eq(x, y) {
                        todo.push((&x.cdr, &y.cdr));
                        todo.push((&x.car, &y.car));
                    }
                }
                (Value::Str(x), Value::Str(y)) => {
                    if x != y {
                        return false;
                    }
                }
                _ => {
                    if !a.eqv(b) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// The `display` rendering: strings and chars without notation.
    pub fn display_string(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Char(c) => c.to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

fn write_char_literal(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    match c {
        ' ' => write!(f, "#\\space"),
        '\n' => write!(f, "#\\newline"),
        '\t' => write!(f, "#\\tab"),
        c => write!(f, "#\\{c}"),
    }
}

fn quote_prefix(p: &Pair) -> Option<(&'static str, &Value)> {
    let (Value::Sym(s), Some(rest)) = (&p.car, p.cdr.as_pair()) else {
        return None;
    };
    if !matches!(rest.cdr, Value::Nil) {
        return None;
    }
    let prefix = match s.name() {
        "quote" => "'",
        "quasiquote" => "`",
        "unquote" => ",",
        "unquote-splicing" => ",@",
        _ => return None,
    };
    Some((prefix, &rest.car))
}

/// Pending printer work. Nested data is printed from an explicit stack.
enum Print<'a> {
    Value(&'a Value),
    /// The remainder of a list whose head is already printed.
    Tail(&'a Value),
    Text(&'static str),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut todo = vec![Print::Value(self)];
        while let Some(task) = todo.pop() {
            match task {
                Print::Text(s) => f.write_str(s)?,
                Print::Tail(Value::Nil) => f.write_str(")")?,
                Print::Tail(Value::Pair(p)) => {
                    f.write_str(" ")?;
                    todo.push(Print::Tail(&p.cdr));
                    todo.push(Print::Value(&p.car));
                }
                Print::Tail(tail) => {
                    f.write_str(" . ")?;
                    todo.push(Print::Text(")"));
                    todo.push(Print::Value(tail));
                }
                Print::Value(Value::Pair(p)) => match quote_prefix(p) {
                    Some((prefix, quoted)) => {
                        f.write_str(prefix)?;
                        todo.push(Print::Value(quoted));
                    }
                    None => {
                        f.write_str("(")?;
                        todo.push(Print::Tail(&p.cdr));
                        todo.push(Print::Value(&p.car));
                    }
                },
                Print::Value(Value::Condition(c)) => {
                    write!(f, "#<condition {}: {}", c.kind.name(), c.message)?;
                    todo.push(Print::Text(">"));
                    for irritant in c.irritants.iter().rev() {
                        todo.push(Print::Value(irritant));
                        todo.push(Print::Text(" "));
                    }
                }
                Print::Value(Value::Nil) => f.write_str("()")?,
                Print::Value(Value::Unspecified) => f.write_str("#<unspecified>")?,
                Print::Value(Value::Bool(true)) => f.write_str("#t")?,
                Print::Value(Value::Bool(false)) => f.write_str("#f")?,
                Print::Value(Value::Num(n)) => write!(f, "{n}")?,
                Print::Value(Value::Char(c)) => write_char_literal(f, *c)?,
                Print::Value(Value::Str(s)) => write!(f, "\"{}\"", s.escape_default())?,
                Print::Value(Value::Sym(s)) => write!(f, "{s}")?,
                Print::Value(Value::Proc(p)) => write!(f, "{p}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Serializable image of a procedure-free value, used for literals inside
/// compiled expressions.
#[derive(Serialize, Deserialize)]
enum Datum {
    Nil,
    Unspecified,
    Bool(bool),
    Num(Num),
    Char(char),
    Str(String),
    Sym(Symbol),
    List(Vec<Datum>, Box<Datum>),
}

impl Datum {
    fn from_value(v: &Value) -> Option<Datum> {
        Some(match v {
            Value::Nil => Datum::Nil,
            Value::Unspecified => Datum::Unspecified,
            Value::Bool(b) => Datum::Bool(*b),
            Value::Num(n) => Datum::Num(n.clone()),
            Value::Char(c) => Datum::Char(*c),
            Value::Str(s) => Datum::Str(s.to_string()),
            Value::Sym(s) => Datum::Sym(s.clone()),
            Value::Pair(_) => {
                let mut items = vec![];
                let mut cur = v;
                while let Value::Pair(p) = cur {
                    items.push(Datum::from_value(&p.car)?);
                    cur = &p.cdr;
                }
                Datum::List(items, Box::new(Datum::from_value(cur)?))
            }
            Value::Proc(_) | Value::Condition(_) => return None,
        })
    }

    fn into_value(self) -> Value {
        match self {
            Datum::Nil => Value::Nil,
            Datum::Unspecified => Value::Unspecified,
            Datum::Bool(b) => Value::Bool(b),
            Datum::Num(n) => Value::Num(n),
            Datum::Char(c) => Value::Char(c),
            Datum::Str(s) => Value::string(s),
            Datum::Sym(s) => Value::Sym(s),
            Datum::List(items, tail) => Value::list_with_tail(
                items.into_iter().map(Datum::into_value).collect::<Vec<_>>(),
                tail.into_value(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match Datum::from_value(self) {
            Some(datum) => datum.serialize(serializer),
            None => Err(ser::Error::custom(format!(
                "{} values are only serializable inside a snapshot",
                self.type_name()
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Datum::deserialize(deserializer)
            .map(Datum::into_value)
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn printer() {
        let v = Value::list([
            Value::int(1),
            Value::string("two"),
            Value::Char('c'),
            Value::list([Value::sym("quote"), Value::sym("x")]),
        ]);
        expect![[r#"(1 "two" #\c 'x)"#]].assert_eq(&v.to_string());
        let dotted = Value::list_with_tail([Value::int(1)], Value::int(2));
        expect!["(1 . 2)"].assert_eq(&dotted.to_string());
    }

    #[test]
    fn equality_flavours() {
        let a = Value::list([Value::int(1), Value::int(2)]);
        let b = Value::list([Value::int(1), Value::int(2)]);
        assert!(a.equal(&b));
        assert!(!a.eqv(&b));
        assert!(a.eqv(&a.clone()));
    }

    #[test]
    fn dropping_a_long_list_does_not_recurse() {
        let mut list = Value::Nil;
        for i in 0..1_000_000 {
            list = Value::cons(Value::int(i), list);
        }
        drop(list);
    }

    fn nested(depth: usize) -> Value {
        let mut v = Value::int(0);
        for _ in 0..depth {
            v = Value::list([v, Value::Nil]);
        }
        v
    }

    #[test]
    fn deeply_nested_cars_compare_print_and_drop() {
        let a = nested(200_000);
        let b = nested(200_000);
        assert!(a.equal(&b));
        assert!(!a.equal(&nested(199_999)));

        let printed = a.to_string();
        assert_eq!(printed.len(), 200_000 * "( ())".len() + 1);
        assert!(printed.starts_with("(((("));
        assert!(printed.ends_with("0 ()) ()) ())"));
        drop(a);
        drop(b);
    }

    #[test]
    fn conditions_print_their_irritants() {
        let c: Value = Condition::new(
            ConditionKind::User,
            "bad",
            vec![Value::int(1), Value::list([Value::sym("quote"), Value::sym("x")])],
        )
        .into();
        expect!["#<condition error: bad 1 'x>"].assert_eq(&c.to_string());
        let bare: Value = Condition::new(ConditionKind::NoPrompt, "shift", vec![]).into();
        expect!["#<condition no-prompt: shift>"].assert_eq(&bare.to_string());
    }

    #[test]
    fn reverse_and_collect() {
        let v = Value::list([Value::int(1), Value::int(2), Value::int(3)]);
        let r = v.reverse_list().unwrap();
        assert_eq!(r.to_vec().unwrap(), vec![Value::int(3), Value::int(2), Value::int(1)]);
        assert!(Value::int(1).to_vec().is_none());
    }
}
