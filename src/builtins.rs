//! The built-in procedure catalog.
//!
//! Pure primitives map arguments to a value or a guest condition. Control
//! primitives build the next step themselves: they are how `call/cc`,
//! `dynamic-wind`, `shift` and friends reach the continuation of their caller.

use std::rc::Rc;

use crate::{
    error::ReductionError,
    eval::{
        cont::{self, Cont, Continuation, Kont},
        partial::PartialContinuation,
        procedure::{PrimKind, Primitive, Procedure},
        step::Step,
        wind::{self, Action},
    },
    num::Num,
    state::GlobalState,
    symbol::Symbol,
    value::{Condition, ConditionKind, Value},
};

macro_rules! pure {
    ($name:literal, $arity:literal, $variadic:literal, $f:expr) => {
        Primitive {
            name: $name,
            arity: $arity,
            variadic: $variadic,
            kind: PrimKind::Pure($f),
        }
    };
}

macro_rules! control {
    ($name:literal, $arity:literal, $variadic:literal, $f:expr) => {
        Primitive {
            name: $name,
            arity: $arity,
            variadic: $variadic,
            kind: PrimKind::Control($f),
        }
    };
}

pub static BUILTINS: &[Primitive] = &[
    pure!("+", 0, true, add),
    pure!("-", 1, true, sub),
    pure!("*", 0, true, mul),
    pure!("quotient", 2, false, |a| divide("quotient", a, Num::quotient)),
    pure!("remainder", 2, false, |a| divide("remainder", a, Num::remainder)),
    pure!("modulo", 2, false, |a| divide("modulo", a, Num::modulo)),
    pure!("=", 1, true, |a| compare("=", a, |x, y| x == y)),
    pure!("<", 1, true, |a| compare("<", a, |x, y| x < y)),
    pure!(">", 1, true, |a| compare(">", a, |x, y| x > y)),
    pure!("<=", 1, true, |a| compare("<=", a, |x, y| x <= y)),
    pure!(">=", 1, true, |a| compare(">=", a, |x, y| x >= y)),
    pure!("zero?", 1, false, |a| Ok(Value::Bool(number("zero?", &a[0])?.is_zero()))),
    pure!("number?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Num(_))))),
    pure!("cons", 2, false, |a| Ok(Value::cons(a[0].clone(), a[1].clone()))),
    pure!("car", 1, false, |a| Ok(pair("car", &a[0])?.0)),
    pure!("cdr", 1, false, |a| Ok(pair("cdr", &a[0])?.1)),
    pure!("list", 0, true, |a| Ok(Value::list(a.to_vec()))),
    pure!("length", 1, false, length),
    pure!("append", 0, true, append),
    pure!("reverse", 1, false, |a| {
        a[0].reverse_list()
            .ok_or_else(|| Condition::wrong_type("reverse", "list", &a[0]))
    }),
    pure!("list?", 1, false, |a| Ok(Value::Bool(a[0].to_vec().is_some()))),
    pure!("pair?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Pair(_))))),
    pure!("null?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Nil)))),
    pure!("symbol?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Sym(_))))),
    pure!("string?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Str(_))))),
    pure!("char?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Char(_))))),
    pure!("boolean?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Bool(_))))),
    pure!("procedure?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Proc(_))))),
    pure!("not", 1, false, |a| Ok(Value::Bool(!a[0].is_true()))),
    pure!("eq?", 2, false, |a| Ok(Value::Bool(a[0].eqv(&a[1])))),
    pure!("eqv?", 2, false, |a| Ok(Value::Bool(a[0].eqv(&a[1])))),
    pure!("equal?", 2, false, |a| Ok(Value::Bool(a[0].equal(&a[1])))),
    pure!("symbol->string", 1, false, |a| match &a[0] {
        Value::Sym(s) => Ok(Value::string(s.name())),
        other => Err(Condition::wrong_type("symbol->string", "symbol", other)),
    }),
    pure!("string->symbol", 1, false, |a| match &a[0] {
        Value::Str(s) => Ok(Value::Sym(Symbol::new(&**s))),
        other => Err(Condition::wrong_type("string->symbol", "string", other)),
    }),
    pure!("number->string", 1, false, |a| {
        Ok(Value::string(number("number->string", &a[0])?.to_string()))
    }),
    pure!("string-append", 0, true, string_append),
    pure!("error", 1, true, |a| {
        let message = a[0].display_string();
        Err(Condition::new(ConditionKind::User, message, a[1..].to_vec()))
    }),
    pure!("condition?", 1, false, |a| Ok(Value::Bool(matches!(a[0], Value::Condition(_))))),
    pure!("condition-kind", 1, false, |a| Ok(Value::sym(condition(&a[0])?.kind.name()))),
    pure!("condition-message", 1, false, |a| Ok(Value::string(&condition(&a[0])?.message))),
    pure!("condition-irritants", 1, false, |a| {
        Ok(Value::list(condition(&a[0])?.irritants.clone()))
    }),
    control!("display", 1, false, |gs, a, k| print(gs, a[0].display_string(), k)),
    control!("write", 1, false, |gs, a, k| print(gs, a[0].to_string(), k)),
    control!("newline", 0, false, |gs, _, k| print(gs, "\n".into(), k)),
    control!("throw", 1, false, throw),
    control!("raise", 1, false, throw),
    control!("apply", 1, true, apply),
    control!("map", 2, true, |_, a, k| map(a, true, k)),
    control!("for-each", 2, true, |_, a, k| map(a, false, k)),
    control!("call/cc", 1, false, call_cc),
    control!("call-with-current-continuation", 1, false, call_cc),
    control!("dynamic-wind", 3, false, dynamic_wind),
    control!("shift", 1, false, shift),
    control!("wait-signal", 1, false, wait_signal),
];

/// Finds a primitive by name.
pub fn lookup(name: &str) -> Option<&'static Primitive> {
    BUILTINS.iter().find(|p| p.name == name)
}

/// The catalog as top-level bindings.
pub fn bindings() -> impl Iterator<Item = (Symbol, Value)> {
    BUILTINS.iter().map(|p| {
        (
            Symbol::new(p.name),
            Value::Proc(Rc::new(Procedure::Primitive(p))),
        )
    })
}

fn number<'a>(who: &str, v: &'a Value) -> Result<&'a Num, Condition> {
    v.as_num()
        .ok_or_else(|| Condition::wrong_type(who, "number", v))
}

fn procedure<'a>(who: &str, v: &'a Value) -> Result<&'a Rc<Procedure>, Condition> {
    v.as_proc()
        .ok_or_else(|| Condition::wrong_type(who, "procedure", v))
}

fn pair(who: &str, v: &Value) -> Result<(Value, Value), Condition> {
    v.as_pair()
        .map(|p| (p.car().clone(), p.cdr().clone()))
        .ok_or_else(|| Condition::wrong_type(who, "pair", v))
}

fn condition<'a>(v: &'a Value) -> Result<&'a Condition, Condition> {
    match v {
        Value::Condition(c) => Ok(&**c),
        other => Err(Condition::wrong_type("condition accessor", "condition", other)),
    }
}

fn add(args: &[Value]) -> Result<Value, Condition> {
    let mut acc = Num::from(0);
    for arg in args {
        acc = acc.add(number("+", arg)?);
    }
    Ok(Value::Num(acc))
}

fn mul(args: &[Value]) -> Result<Value, Condition> {
    let mut acc = Num::from(1);
    for arg in args {
        acc = acc.mul(number("*", arg)?);
    }
    Ok(Value::Num(acc))
}

fn sub(args: &[Value]) -> Result<Value, Condition> {
    let first = number("-", &args[0])?;
    if args.len() == 1 {
        return Ok(Value::Num(first.neg()));
    }
    let mut acc = first.clone();
    for arg in &args[1..] {
        acc = acc.sub(number("-", arg)?);
    }
    Ok(Value::Num(acc))
}

fn divide(
    who: &str,
    args: &[Value],
    op: fn(&Num, &Num) -> Option<Num>,
) -> Result<Value, Condition> {
    let (a, b) = (number(who, &args[0])?, number(who, &args[1])?);
    op(a, b).map(Value::Num).ok_or_else(|| {
        Condition::new(
            ConditionKind::WrongType,
            format!("{who}: division by zero"),
            vec![args[0].clone(), args[1].clone()],
        )
    })
}

fn compare(who: &str, args: &[Value], holds: fn(&Num, &Num) -> bool) -> Result<Value, Condition> {
    let nums = args
        .iter()
        .map(|a| number(who, a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Bool(nums.windows(2).all(|w| holds(w[0], w[1]))))
}

fn length(args: &[Value]) -> Result<Value, Condition> {
    let items = args[0]
        .to_vec()
        .ok_or_else(|| Condition::wrong_type("length", "list", &args[0]))?;
    Ok(Value::int(items.len() as i64))
}

fn append(args: &[Value]) -> Result<Value, Condition> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Value::Nil);
    };
    let mut items = vec![];
    for list in init {
        items.extend(
            list.to_vec()
                .ok_or_else(|| Condition::wrong_type("append", "list", list))?,
        );
    }
    Ok(Value::list_with_tail(items, last.clone()))
}

fn string_append(args: &[Value]) -> Result<Value, Condition> {
    let mut out = String::new();
    for arg in args {
        match arg {
            Value::Str(s) => out.push_str(s),
            other => return Err(Condition::wrong_type("string-append", "string", other)),
        }
    }
    Ok(Value::string(out))
}

fn print(gs: &mut GlobalState, text: String, k: Cont) -> Result<Step, ReductionError> {
    gs.console().write_all(text.as_bytes())?;
    Ok(Step::Return(Value::Unspecified, k))
}

fn throw(_: &mut GlobalState, mut args: Vec<Value>, k: Cont) -> Result<Step, ReductionError> {
    Ok(Step::Throw(args.pop().unwrap_or(Value::Unspecified), k))
}

/// Turns a wrong argument into a thrown condition.
fn thrown(c: Condition, k: Cont) -> Result<Step, ReductionError> {
    Ok(Step::Throw(c.into(), k))
}

fn apply(_: &mut GlobalState, mut args: Vec<Value>, k: Cont) -> Result<Step, ReductionError> {
    let proc = match procedure("apply", &args[0]) {
        Ok(p) => p.clone(),
        Err(c) => return thrown(c, k),
    };
    let mut call_args = args.split_off(1);
    if let Some(list) = call_args.pop() {
        match list.to_vec() {
            Some(spread) => call_args.extend(spread),
            None => return thrown(Condition::wrong_type("apply", "list", &list), k),
        }
    }
    Ok(Step::Call(proc, call_args, k))
}

fn map(mut args: Vec<Value>, collect: bool, k: Cont) -> Result<Step, ReductionError> {
    let who = if collect { "map" } else { "for-each" };
    let proc = match procedure(who, &args[0]) {
        Ok(p) => p.clone(),
        Err(c) => return thrown(c, k),
    };
    let lists = args.split_off(1);
    Ok(cont::map_next(proc, &lists, Value::Nil, collect, k))
}

fn call_cc(_: &mut GlobalState, args: Vec<Value>, k: Cont) -> Result<Step, ReductionError> {
    let proc = match procedure("call/cc", &args[0]) {
        Ok(p) => p.clone(),
        Err(c) => return thrown(c, k),
    };
    let escape = Value::Proc(Rc::new(Procedure::Continuation(k.clone())));
    Ok(Step::Call(proc, vec![escape], k))
}

fn dynamic_wind(_: &mut GlobalState, args: Vec<Value>, k: Cont) -> Result<Step, ReductionError> {
    let mut thunks = Vec::with_capacity(3);
    for arg in &args {
        match procedure("dynamic-wind", arg) {
            Ok(p) => thunks.push(p.clone()),
            Err(c) => return thrown(c, k),
        }
    }
    let [before, thunk, after]: [Rc<Procedure>; 3] = match thunks.try_into() {
        Ok(thunks) => thunks,
        Err(_) => return Err(ReductionError::Malformed("dynamic-wind arguments")),
    };
    let k = Continuation::push(
        Kont::WindBody {
            before: before.clone(),
            thunk,
            after,
        },
        k,
    );
    Ok(Step::Call(before, vec![], k))
}

/// Captures the frames up to the nearest `reset` and calls the receiver in
/// the prompt's place.
fn shift(_: &mut GlobalState, args: Vec<Value>, k: Cont) -> Result<Step, ReductionError> {
    let proc = match procedure("shift", &args[0]) {
        Ok(p) => p.clone(),
        Err(c) => return thrown(c, k),
    };
    let Some(prompt) = Continuation::nearest_prompt(&k) else {
        return thrown(
            Condition::new(ConditionKind::NoPrompt, "shift: no enclosing reset", vec![]),
            k,
        );
    };
    let partial = PartialContinuation::capture(&k, &prompt)?;
    let captured = Value::Proc(Rc::new(Procedure::Partial(partial)));
    wind::transition(&k, Action::Call(proc, vec![captured], prompt))
}

fn wait_signal(gs: &mut GlobalState, args: Vec<Value>, k: Cont) -> Result<Step, ReductionError> {
    match &args[0] {
        Value::Sym(signal) => {
            gs.suspend(signal.clone(), k);
            Ok(Step::Suspend(signal.clone()))
        }
        other => thrown(Condition::wrong_type("wait-signal", "symbol", other), k),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_pure(name: &str, args: &[Value]) -> Result<Value, Condition> {
        match lookup(name).map(|p| p.kind) {
            Some(PrimKind::Pure(f)) => f(args),
            _ => panic!("{name} is not a pure primitive"),
        }
    }

    #[test]
    fn names_are_unique() {
        for (i, p) in BUILTINS.iter().enumerate() {
            assert!(
                BUILTINS[i + 1..].iter().all(|q| q.name != p.name),
                "duplicate primitive {}",
                p.name
            );
        }
    }

    #[test]
    fn arithmetic() {
        let args = [Value::int(10), Value::int(3), Value::int(2)];
        assert_eq!(call_pure("-", &args).unwrap(), Value::int(5));
        assert_eq!(call_pure("-", &args[..1]).unwrap(), Value::int(-10));
        assert_eq!(call_pure("*", &args).unwrap(), Value::int(60));
        assert_eq!(call_pure("+", &[]).unwrap(), Value::int(0));
        assert_eq!(call_pure("<", &args).unwrap(), Value::Bool(false));
        assert_eq!(call_pure(">", &args).unwrap(), Value::Bool(true));
    }

    #[test]
    fn type_errors_are_conditions() {
        let err = call_pure("+", &[Value::int(1), Value::sym("a")]).unwrap_err();
        assert_eq!(err.kind, ConditionKind::WrongType);
        let err = call_pure("quotient", &[Value::int(1), Value::int(0)]).unwrap_err();
        assert_eq!(err.message, "quotient: division by zero");
        let err = call_pure("car", &[Value::Nil]).unwrap_err();
        assert_eq!(err.kind, ConditionKind::WrongType);
    }

    #[test]
    fn append_keeps_last_tail() {
        let a = Value::list([Value::int(1), Value::int(2)]);
        let b = Value::list([Value::int(3)]);
        let out = call_pure("append", &[a, b]).unwrap();
        assert_eq!(out.to_string(), "(1 2 3)");
        let dotted = call_pure("append", &[Value::list([Value::int(1)]), Value::int(2)]).unwrap();
        assert_eq!(dotted.to_string(), "(1 . 2)");
    }
}
