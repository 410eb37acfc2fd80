//! Recognizes special forms in reader output and builds the source tree.
//!
//! Derived forms (`let*`, `cond`, `when`, `unless`, `define` sugar,
//! quasiquote, internal definitions) are lowered here, so the compiler only
//! sees the core forms.

use crate::{
    compiler::source::Source, error::CompileError, symbol::Symbol, syntax::Syntax, value::Value,
};

/// Name bound by `cond` for `=>` clauses. The reader never produces symbols
/// starting with `#`, so guest code cannot capture it.
const COND_VALUE: &str = "#cond-value";

/// Analyzes a form at the top level, where `define` is allowed.
pub fn analyze_toplevel(syn: &Syntax) -> Result<Source, CompileError> {
    if let Some((head, args)) = special(syn) {
        match head {
            "define" => return analyze_define(syn, args),
            "begin" => {
                return Ok(Source::Begin(
                    args.iter()
                        .map(analyze_toplevel)
                        .collect::<Result<_, _>>()?,
                ))
            }
            _ => (),
        }
    }
    analyze(syn)
}

/// The head symbol and argument forms of a proper list whose head is a symbol.
fn special(syn: &Syntax) -> Option<(&str, &[Syntax])> {
    match syn {
        Syntax::List(_, xs) => match xs.split_first() {
            Some((Syntax::Symbol(_, head), args)) => Some((head.name(), args)),
            _ => None,
        },
        _ => None,
    }
}

fn bad<R: Into<String>>(syn: &Syntax, reason: R) -> CompileError {
    CompileError::syntax(syn, reason)
}

fn symbol_of(syn: &Syntax, ctx: &Syntax) -> Result<Symbol, CompileError> {
    syn.as_symbol()
        .cloned()
        .ok_or_else(|| bad(ctx, format!("expected a symbol, found {syn}")))
}

pub fn analyze(syn: &Syntax) -> Result<Source, CompileError> {
    match syn {
        Syntax::Num(_, n) => Ok(Source::constant(Value::Num(n.clone()))),
        Syntax::Bool(_, b) => Ok(Source::constant(Value::Bool(*b))),
        Syntax::Char(_, c) => Ok(Source::constant(Value::Char(*c))),
        Syntax::String(_, s) => Ok(Source::constant(Value::string(s))),
        Syntax::Symbol(_, s) => Ok(Source::Var(s.clone())),
        Syntax::Quote(_, x) => Ok(Source::constant(x.to_value())),
        Syntax::Quasi(_, x) => quasi(x, 1),
        Syntax::Unquote(..) | Syntax::UnquoteSplicing(..) => Err(bad(syn, "unquote outside quasiquote")),
        Syntax::Improper(..) => Err(bad(syn, "improper list in expression position")),
        Syntax::List(_, xs) if xs.is_empty() => Ok(Source::constant(Value::Nil)),
        Syntax::List(_, xs) => match special(syn) {
            Some((head, args)) => analyze_special(syn, head, args)
                .unwrap_or_else(|| analyze_call(xs)),
            None => analyze_call(xs),
        },
    }
}

fn analyze_call(xs: &[Syntax]) -> Result<Source, CompileError> {
    Ok(Source::Call(xs.iter().map(analyze).collect::<Result<_, _>>()?))
}

fn analyze_seq(xs: &[Syntax]) -> Result<Vec<Source>, CompileError> {
    xs.iter().map(analyze).collect()
}

/// `None` when `head` names no special form.
fn analyze_special(syn: &Syntax, head: &str, args: &[Syntax]) -> Option<Result<Source, CompileError>> {
    let result = match head {
        "quote" => match args {
            [x] => Ok(Source::constant(x.to_value())),
            _ => Err(bad(syn, "expected exactly one datum")),
        },
        "quasiquote" => match args {
            [x] => quasi(x, 1),
            _ => Err(bad(syn, "expected exactly one template")),
        },
        "if" => analyze_if(syn, args),
        "define" => Err(bad(syn, "definition in expression context")),
        "set!" => analyze_set(syn, args),
        "lambda" => match args {
            [formals, body @ ..] => analyze_lambda(syn, None, formals, body),
            _ => Err(bad(syn, "missing formals")),
        },
        "begin" => analyze_seq(args).map(Source::Begin),
        "let" => analyze_let(syn, args),
        "let*" => analyze_let_star(syn, args),
        "letrec" | "letrec*" => analyze_letrec(syn, args),
        "and" => analyze_seq(args).map(Source::And),
        "or" => analyze_seq(args).map(Source::Or),
        "cond" => analyze_cond(syn, args),
        "when" | "unless" => analyze_when(syn, head == "when", args),
        "catch" => analyze_catch(syn, args),
        "dynamic-let" => analyze_dynamic_let(syn, args),
        "dynamic" => match args {
            [name] => symbol_of(name, syn).map(Source::Dynamic),
            _ => Err(bad(syn, "expected one name")),
        },
        "reset" => analyze_seq(args).map(|body| Source::Reset(Box::new(Source::Begin(body)))),
        _ => return None,
    };
    Some(result)
}

fn analyze_set(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    match args {
        [name, value] => Ok(Source::Set(symbol_of(name, syn)?, Box::new(analyze(value)?))),
        _ => Err(bad(syn, "expected a name and a value")),
    }
}

fn analyze_letrec(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    let [bindings, body @ ..] = args else {
        return Err(bad(syn, "missing bindings"));
    };
    Ok(Source::Letrec(
        analyze_bindings(syn, bindings)?,
        Box::new(analyze_body(syn, body)?),
    ))
}

fn analyze_when(syn: &Syntax, when: bool, args: &[Syntax]) -> Result<Source, CompileError> {
    let [test, body @ ..] = args else {
        return Err(bad(syn, "expected a test and a body"));
    };
    if body.is_empty() {
        return Err(bad(syn, "expected a test and a body"));
    }
    let test = Box::new(analyze(test)?);
    let body = Box::new(Source::Begin(analyze_seq(body)?));
    let skip = Box::new(Source::unspecified());
    Ok(if when {
        Source::If(test, body, skip)
    } else {
        Source::If(test, skip, body)
    })
}

fn analyze_catch(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    match args {
        [handler, body @ ..] if !body.is_empty() => Ok(Source::Catch(
            Box::new(analyze(handler)?),
            Box::new(Source::Begin(analyze_seq(body)?)),
        )),
        _ => Err(bad(syn, "expected a handler and a body")),
    }
}

fn analyze_if(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    let (test, then, els) = match args {
        [test, then] => (test, then, None),
        [test, then, els] => (test, then, Some(els)),
        _ => return Err(bad(syn, "expected a test and one or two branches")),
    };
    Ok(Source::If(
        Box::new(analyze(test)?),
        Box::new(analyze(then)?),
        Box::new(match els {
            Some(els) => analyze(els)?,
            None => Source::unspecified(),
        }),
    ))
}

fn analyze_formals(
    syn: &Syntax,
    formals: &Syntax,
) -> Result<(Vec<Symbol>, Option<Symbol>), CompileError> {
    match formals {
        Syntax::Symbol(_, rest) => Ok((vec![], Some(rest.clone()))),
        Syntax::List(_, xs) => Ok((
            xs.iter().map(|x| symbol_of(x, syn)).collect::<Result<_, _>>()?,
            None,
        )),
        Syntax::Improper(_, xs, rest) => Ok((
            xs.iter().map(|x| symbol_of(x, syn)).collect::<Result<_, _>>()?,
            Some(symbol_of(rest, syn)?),
        )),
        _ => Err(bad(syn, format!("bad formals {formals}"))),
    }
}

fn analyze_lambda(
    syn: &Syntax,
    name: Option<Symbol>,
    formals: &Syntax,
    body: &[Syntax],
) -> Result<Source, CompileError> {
    let (params, rest) = analyze_formals(syn, formals)?;
    Ok(Source::lambda(name, params, rest, analyze_body(syn, body)?))
}

/// `(define name value)`, `(define name)` or `(define (name . formals) body ...)`.
fn analyze_definition(syn: &Syntax, args: &[Syntax]) -> Result<(Symbol, Source), CompileError> {
    match args {
        [Syntax::Symbol(_, name)] => Ok((name.clone(), Source::unspecified())),
        [Syntax::Symbol(_, name), value] => Ok((name.clone(), analyze(value)?)),
        [Syntax::List(pos, sig), body @ ..] | [Syntax::Improper(pos, sig, _), body @ ..]
            if !sig.is_empty() =>
        {
            let name = symbol_of(&sig[0], syn)?;
            let formals = match &args[0] {
                Syntax::Improper(_, _, rest) => {
                    if sig.len() == 1 {
                        (**rest).clone()
                    } else {
                        Syntax::Improper(*pos, sig[1..].to_vec(), rest.clone())
                    }
                }
                _ => Syntax::List(*pos, sig[1..].to_vec()),
            };
            Ok((
                name.clone(),
                analyze_lambda(syn, Some(name), &formals, body)?,
            ))
        }
        _ => Err(bad(syn, "malformed definition")),
    }
}

fn analyze_define(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    let (name, value) = analyze_definition(syn, args)?;
    Ok(Source::Define(name, Box::new(value)))
}

/// A body: leading definitions become a `letrec*` around the remaining
/// expressions.
fn analyze_body(syn: &Syntax, body: &[Syntax]) -> Result<Source, CompileError> {
    let mut defines = vec![];
    let mut exprs = vec![];
    for form in body {
        match special(form) {
            Some(("define", args)) => {
                if !exprs.is_empty() {
                    return Err(bad(form, "definition after an expression"));
                }
                defines.push(analyze_definition(form, args)?);
            }
            _ => exprs.push(analyze(form)?),
        }
    }
    if exprs.is_empty() {
        return Err(bad(syn, "body has no expressions"));
    }
    let exprs = Source::Begin(exprs);
    if defines.is_empty() {
        Ok(exprs)
    } else {
        Ok(Source::Letrec(defines, Box::new(exprs)))
    }
}

fn analyze_bindings(syn: &Syntax, bindings: &Syntax) -> Result<Vec<(Symbol, Source)>, CompileError> {
    let Syntax::List(_, xs) = bindings else {
        return Err(bad(syn, format!("bad bindings {bindings}")));
    };
    xs.iter()
        .map(|binding| match binding {
            Syntax::List(_, pair) => match pair.as_slice() {
                [name, init] => Ok((symbol_of(name, syn)?, analyze(init)?)),
                _ => Err(bad(syn, format!("bad binding {binding}"))),
            },
            _ => Err(bad(syn, format!("bad binding {binding}"))),
        })
        .collect()
}

fn analyze_let(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    match args {
        [Syntax::Symbol(_, name), bindings, body @ ..] => Ok(Source::NamedLet(
            name.clone(),
            analyze_bindings(syn, bindings)?,
            Box::new(analyze_body(syn, body)?),
        )),
        [bindings, body @ ..] => Ok(Source::Let(
            analyze_bindings(syn, bindings)?,
            Box::new(analyze_body(syn, body)?),
        )),
        _ => Err(bad(syn, "missing bindings")),
    }
}

fn analyze_let_star(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    let [bindings, body @ ..] = args else {
        return Err(bad(syn, "missing bindings"));
    };
    let bindings = analyze_bindings(syn, bindings)?;
    let body = analyze_body(syn, body)?;
    if bindings.is_empty() {
        return Ok(Source::Let(vec![], Box::new(body)));
    }
    Ok(bindings
        .into_iter()
        .rev()
        .fold(body, |inner, binding| Source::Let(vec![binding], Box::new(inner))))
}

fn analyze_dynamic_let(syn: &Syntax, args: &[Syntax]) -> Result<Source, CompileError> {
    let [bindings, body @ ..] = args else {
        return Err(bad(syn, "missing bindings"));
    };
    let bindings = analyze_bindings(syn, bindings)?;
    let body = Source::Begin(analyze_seq(body)?);
    Ok(bindings
        .into_iter()
        .rev()
        .fold(body, |inner, (name, value)| {
            Source::DynamicLet(name, Box::new(value), Box::new(inner))
        }))
}

fn analyze_cond(syn: &Syntax, clauses: &[Syntax]) -> Result<Source, CompileError> {
    let mut result = Source::unspecified();
    for (i, clause) in clauses.iter().enumerate().rev() {
        let Syntax::List(_, parts) = clause else {
            return Err(bad(syn, format!("bad clause {clause}")));
        };
        result = match parts.as_slice() {
            [] => return Err(bad(syn, "empty clause")),
            [Syntax::Symbol(_, e), body @ ..] if e.name() == "else" => {
                if i + 1 != clauses.len() {
                    return Err(bad(syn, "else clause must be last"));
                }
                Source::Begin(analyze_seq(body)?)
            }
            [test] => Source::Or(vec![analyze(test)?, result]),
            [test, Syntax::Symbol(_, arrow), receiver] if arrow.name() == "=>" => {
                let tmp = Symbol::new(COND_VALUE);
                Source::Let(
                    vec![(tmp.clone(), analyze(test)?)],
                    Box::new(Source::If(
                        Box::new(Source::Var(tmp.clone())),
                        Box::new(Source::Call(vec![analyze(receiver)?, Source::Var(tmp)])),
                        Box::new(result),
                    )),
                )
            }
            [test, body @ ..] => Source::If(
                Box::new(analyze(test)?),
                Box::new(Source::Begin(analyze_seq(body)?)),
                Box::new(result),
            ),
        };
    }
    Ok(result)
}

fn quasi_wrap(tag: &str, inner: Source) -> Source {
    quasi_cons(
        Source::constant(Value::sym(tag)),
        quasi_cons(inner, Source::constant(Value::Nil), false),
        false,
    )
}

/// Folds constant cells back into a literal so unquote-free templates cost
/// nothing at runtime.
fn quasi_cons(car: Source, cdr: Source, splice: bool) -> Source {
    match (&car, &cdr, splice) {
        (Source::Const(a), Source::Const(d), false) => {
            Source::constant(Value::cons(a.clone(), d.clone()))
        }
        _ => Source::QuasiCons {
            car: Box::new(car),
            cdr: Box::new(cdr),
            splice,
        },
    }
}

fn quasi(syn: &Syntax, depth: usize) -> Result<Source, CompileError> {
    match syn {
        Syntax::Unquote(_, x) if depth == 1 => analyze(x),
        Syntax::Unquote(_, x) => Ok(quasi_wrap("unquote", quasi(x, depth - 1)?)),
        Syntax::UnquoteSplicing(..) if depth == 1 => {
            Err(bad(syn, "unquote-splicing outside a list"))
        }
        Syntax::UnquoteSplicing(_, x) => Ok(quasi_wrap("unquote-splicing", quasi(x, depth - 1)?)),
        Syntax::Quasi(_, x) => Ok(quasi_wrap("quasiquote", quasi(x, depth + 1)?)),
        Syntax::Quote(_, x) => Ok(quasi_wrap("quote", quasi(x, depth)?)),
        Syntax::List(_, xs) => quasi_list(xs, Source::constant(Value::Nil), depth),
        Syntax::Improper(_, xs, end) => quasi_list(xs, quasi(end, depth)?, depth),
        atom => Ok(Source::constant(atom.to_value())),
    }
}

fn quasi_list(xs: &[Syntax], tail: Source, depth: usize) -> Result<Source, CompileError> {
    xs.iter().rev().try_fold(tail, |cdr, x| match x {
        Syntax::UnquoteSplicing(_, spliced) if depth == 1 => {
            Ok(quasi_cons(analyze(spliced)?, cdr, true))
        }
        x => Ok(quasi_cons(quasi(x, depth)?, cdr, false)),
    })
}
