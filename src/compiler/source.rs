use std::{collections::HashSet, rc::Rc};

use crate::{
    compiler::{desc::EnvDesc, spec::EnvSpec},
    error::CompileError,
    eval::expr::{Body, Expr, ExprRef, Lambda},
    symbol::Symbol,
    value::Value,
};

/// Expression-source tree, one node per special form, literal, variable
/// reference or invocation. Names are still symbols here; `compile` erases
/// them into slot indices.
#[derive(Clone, Debug)]
pub enum Source {
    Const(Value),
    Var(Symbol),
    Set(Symbol, Box<Source>),
    If(Box<Source>, Box<Source>, Box<Source>),
    Begin(Vec<Source>),
    Lambda(Rc<LambdaSource>),
    Call(Vec<Source>),
    Let(Vec<(Symbol, Source)>, Box<Source>),
    /// Sequential recursive binding (`letrec*`); plain `letrec` lowers here too.
    Letrec(Vec<(Symbol, Source)>, Box<Source>),
    NamedLet(Symbol, Vec<(Symbol, Source)>, Box<Source>),
    And(Vec<Source>),
    Or(Vec<Source>),
    QuasiCons {
        car: Box<Source>,
        cdr: Box<Source>,
        splice: bool,
    },
    Catch(Box<Source>, Box<Source>),
    DynamicLet(Symbol, Box<Source>, Box<Source>),
    Dynamic(Symbol),
    Reset(Box<Source>),
    /// Top-level definition. Internal definitions become `Letrec`.
    Define(Symbol, Box<Source>),
}

#[derive(Clone, Debug)]
pub struct LambdaSource {
    pub name: Option<Symbol>,
    pub params: Vec<Symbol>,
    pub rest: Option<Symbol>,
    pub body: Source,
}

impl LambdaSource {
    fn formals(&self) -> Vec<Symbol> {
        let mut names = self.params.clone();
        names.extend(self.rest.iter().cloned());
        names
    }

    pub fn requirements(&self) -> EnvSpec {
        self.body.requirements().without(&self.formals())
    }

    pub fn compile(&self, desc: &EnvDesc) -> Result<Rc<Lambda>, CompileError> {
        let formals = self.formals();
        check_distinct(&formals)?;
        let (inner, capture) = desc.shadow_extend(&self.body.requirements(), &formals)?;
        Ok(Rc::new(Lambda {
            name: self.name.clone(),
            capture,
            arity: self.params.len(),
            variadic: self.rest.is_some(),
            body: self.body.compile(&inner)?,
        }))
    }
}

fn check_distinct(names: &[Symbol]) -> Result<(), CompileError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name) {
            return Err(CompileError::Duplicate(name.clone()));
        }
    }
    Ok(())
}

fn names_of(bindings: &[(Symbol, Source)]) -> Vec<Symbol> {
    bindings.iter().map(|(name, _)| name.clone()).collect()
}

fn compile_all<'a, I>(sources: I, desc: &EnvDesc) -> Result<Body, CompileError>
where
    I: IntoIterator<Item = &'a Source>,
{
    sources
        .into_iter()
        .map(|s| s.compile(desc))
        .collect::<Result<Vec<_>, _>>()
        .map(Rc::from)
}

impl Source {
    #[inline]
    pub fn constant(value: Value) -> Self {
        Self::Const(value)
    }

    #[inline]
    pub fn unspecified() -> Self {
        Self::Const(Value::Unspecified)
    }

    pub fn lambda(name: Option<Symbol>, params: Vec<Symbol>, rest: Option<Symbol>, body: Source) -> Self {
        Self::Lambda(Rc::new(LambdaSource {
            name,
            params,
            rest,
            body,
        }))
    }

    /// Free variables of this node.
    pub fn requirements(&self) -> EnvSpec {
        match self {
            Self::Const(_) | Self::Dynamic(_) => EnvSpec::empty(),
            Self::Var(name) => EnvSpec::single(name.clone()),
            Self::Set(name, value) | Self::Define(name, value) => {
                value.requirements().union(&EnvSpec::single(name.clone()))
            }
            Self::If(test, then, els) => test
                .requirements()
                .union(&then.requirements())
                .union(&els.requirements()),
            Self::Begin(xs) | Self::Call(xs) | Self::And(xs) | Self::Or(xs) => {
                EnvSpec::union_all(&xs.iter().map(Source::requirements).collect::<Vec<_>>())
            }
            Self::Lambda(lambda) => lambda.requirements(),
            Self::Let(bindings, body) => {
                let names = names_of(bindings);
                bindings
                    .iter()
                    .fold(body.requirements().without(&names), |acc, (_, init)| {
                        acc.union(&init.requirements())
                    })
            }
            Self::Letrec(bindings, body) => {
                let names = names_of(bindings);
                bindings
                    .iter()
                    .fold(body.requirements(), |acc, (_, init)| {
                        acc.union(&init.requirements())
                    })
                    .without(&names)
            }
            Self::NamedLet(name, bindings, body) => {
                let params = names_of(bindings);
                let own = body
                    .requirements()
                    .without(&params)
                    .without(std::slice::from_ref(name));
                bindings
                    .iter()
                    .fold(own, |acc, (_, init)| acc.union(&init.requirements()))
            }
            Self::QuasiCons { car, cdr, .. } => car.requirements().union(&cdr.requirements()),
            Self::Catch(handler, body) => handler.requirements().union(&body.requirements()),
            Self::DynamicLet(_, value, body) => value.requirements().union(&body.requirements()),
            Self::Reset(body) => body.requirements(),
        }
    }

    /// Lowers this node against `desc`. The result indexes frames built with
    /// exactly the extensions `desc` went through.
    pub fn compile(&self, desc: &EnvDesc) -> Result<ExprRef, CompileError> {
        let expr = match self {
            Self::Const(v) => Expr::Const(v.clone()),
            Self::Var(name) => {
                let binding = desc.resolve(name)?;
                Expr::Local {
                    slot: binding.slot,
                    name: name.clone(),
                    global: binding.global,
                }
            }
            Self::Set(name, value) => Expr::Assign {
                slot: desc.resolve(name)?.slot,
                value: value.compile(desc)?,
            },
            Self::Define(name, value) => {
                let assign = Rc::new(Expr::Assign {
                    slot: desc.resolve(name)?.slot,
                    value: value.compile(desc)?,
                });
                Expr::Seq(Rc::from(vec![
                    assign,
                    Rc::new(Expr::Const(Value::Sym(name.clone()))),
                ]))
            }
            Self::If(test, then, els) => Expr::If {
                test: test.compile(desc)?,
                then: then.compile(desc)?,
                els: els.compile(desc)?,
            },
            Self::Begin(xs) => match xs.as_slice() {
                [] => Expr::Const(Value::Unspecified),
                [x] => return x.compile(desc),
                xs => Expr::Seq(compile_all(xs, desc)?),
            },
            Self::Call(xs) => {
                if xs.is_empty() {
                    return Err(CompileError::syntax("()", "empty application"));
                }
                Expr::Call(compile_all(xs, desc)?)
            }
            Self::And(xs) => match xs.as_slice() {
                [] => Expr::Const(Value::Bool(true)),
                [x] => return x.compile(desc),
                xs => Expr::And(compile_all(xs, desc)?),
            },
            Self::Or(xs) => match xs.as_slice() {
                [] => Expr::Const(Value::Bool(false)),
                [x] => return x.compile(desc),
                xs => Expr::Or(compile_all(xs, desc)?),
            },
            Self::Lambda(lambda) => Expr::Lambda(lambda.compile(desc)?),
            Self::Let(bindings, body) => {
                let names = names_of(bindings);
                check_distinct(&names)?;
                let inits = compile_all(bindings.iter().map(|(_, init)| init), desc)?;
                let (inner, capture) = desc.shadow_extend(&body.requirements(), &names)?;
                Expr::Let {
                    capture,
                    inits,
                    body: body.compile(&inner)?,
                }
            }
            Self::Letrec(bindings, body) => {
                let names = names_of(bindings);
                check_distinct(&names)?;
                let mut parts = bindings
                    .iter()
                    .map(|(_, init)| init.requirements())
                    .collect::<Vec<_>>();
                parts.push(body.requirements());
                let parts = parts.iter().collect::<Vec<_>>();
                let (inner, capture) = desc.subset_shadow_extend(&parts, &names)?;
                Expr::Letrec {
                    capture,
                    inits: compile_all(bindings.iter().map(|(_, init)| init), &inner)?,
                    body: body.compile(&inner)?,
                }
            }
            Self::NamedLet(name, bindings, body) => {
                let lambda = LambdaSource {
                    name: Some(name.clone()),
                    params: names_of(bindings),
                    rest: None,
                    body: (**body).clone(),
                };
                let inits = compile_all(bindings.iter().map(|(_, init)| init), desc)?;
                let (inner, capture) =
                    desc.shadow_extend(&lambda.requirements(), std::slice::from_ref(name))?;
                Expr::NamedLet {
                    capture,
                    inits,
                    lambda: lambda.compile(&inner)?,
                }
            }
            Self::QuasiCons { car, cdr, splice } => Expr::QuasiCons {
                car: car.compile(desc)?,
                cdr: cdr.compile(desc)?,
                splice: *splice,
            },
            Self::Catch(handler, body) => Expr::Catch {
                handler: handler.compile(desc)?,
                body: body.compile(desc)?,
            },
            Self::DynamicLet(name, value, body) => Expr::DynamicLet {
                name: name.clone(),
                value: value.compile(desc)?,
                body: body.compile(desc)?,
            },
            Self::Dynamic(name) => Expr::Dynamic(name.clone()),
            Self::Reset(body) => Expr::Reset(body.compile(desc)?),
        };
        Ok(Rc::new(expr))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(name: &str) -> Source {
        Source::Var(Symbol::new(name))
    }

    fn sym(name: &str) -> Symbol {
        Symbol::new(name)
    }

    fn names(spec: &EnvSpec) -> Vec<&str> {
        spec.iter().map(Symbol::name).collect()
    }

    #[test]
    fn lambda_requirements_drop_parameters() {
        let body = Source::Call(vec![var("+"), var("x"), var("y")]);
        let lambda = Source::lambda(None, vec![sym("x")], None, body);
        assert_eq!(names(&lambda.requirements()), ["+", "y"]);
    }

    #[test]
    fn let_inits_see_outer_scope() {
        // (let ((a 1) (b a)) b): the `a` in the second init is free.
        let src = Source::Let(
            vec![
                (sym("a"), Source::Const(Value::int(1))),
                (sym("b"), var("a")),
            ],
            Box::new(var("b")),
        );
        assert_eq!(names(&src.requirements()), ["a"]);
    }

    #[test]
    fn letrec_names_are_not_free() {
        let src = Source::Letrec(
            vec![(sym("a"), var("b")), (sym("b"), Source::Const(Value::int(1)))],
            Box::new(var("a")),
        );
        assert!(src.requirements().is_empty());
    }

    #[test]
    fn closures_capture_only_what_they_use() {
        let desc = EnvDesc::root(["big", "y", "unused"].map(Symbol::new));
        let lambda = Source::lambda(None, vec![sym("x")], None, var("y"));
        let expr = lambda.compile(&desc).unwrap();
        match &*expr {
            Expr::Lambda(l) => {
                assert_eq!(l.capture, vec![1]);
                assert_eq!(l.arity, 1);
                assert!(!l.variadic);
            }
            other => panic!("expected a lambda, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let lambda = Source::lambda(None, vec![sym("x"), sym("x")], None, var("x"));
        assert_eq!(
            lambda.compile(&EnvDesc::default()).unwrap_err(),
            CompileError::Duplicate(sym("x"))
        );
    }

    #[test]
    fn free_variable_must_be_described() {
        assert_eq!(
            var("nowhere").compile(&EnvDesc::default()).unwrap_err(),
            CompileError::Unbound(sym("nowhere"))
        );
    }
}
