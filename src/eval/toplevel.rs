use tracing::debug;

use crate::{
    builtins,
    compiler::{analyze::analyze_toplevel, desc::EnvDesc},
    error::{Error, ReductionError},
    eval::{
        boxes::VarBox,
        env::Env,
        machine::{Machine, Outcome},
    },
    parser,
    snapshot::Snapshot,
    state::GlobalState,
    symbol::Symbol,
    syntax::Syntax,
    value::Value,
};

/// A growing root frame for interactive and file evaluation.
///
/// Every top-level name gets one box for the whole session. A name first
/// mentioned before it is defined gets an unbound box, so reading it throws
/// `undefined-global` while closures that mention it still link to the box a
/// later `define` fills.
pub struct TopLevel {
    desc: EnvDesc,
    env: Env,
    machine: Machine,
}

impl TopLevel {
    /// A top level with the built-in catalog installed.
    pub fn new(state: GlobalState, limit: Option<usize>) -> Self {
        let (names, values): (Vec<_>, Vec<_>) = builtins::bindings().unzip();
        Self {
            desc: EnvDesc::globals(names),
            env: Env::root(values),
            machine: Machine::new(state, limit),
        }
    }

    #[inline]
    pub fn machine(&mut self) -> &mut Machine {
        &mut self.machine
    }

    fn ensure(&mut self, names: Vec<Symbol>) {
        if names.is_empty() {
            return;
        }
        debug!(count = names.len(), "new top-level names");
        let boxes = names.iter().map(|_| VarBox::fresh()).collect::<Vec<_>>();
        self.desc.extend_globals(&names);
        self.env = self.env.extend_boxes(&boxes);
    }

    /// Binds `name` at the top level, creating it if needed.
    pub fn define(&mut self, name: Symbol, value: Value) {
        if self.desc.slot(&name).is_none() {
            self.ensure(vec![name.clone()]);
        }
        if let Some(slot) = self.desc.slot(&name) {
            if let Ok(cell) = self.env.slot(slot) {
                cell.set(value);
            }
        }
    }

    /// The current value of a top-level name, if it has one.
    pub fn lookup(&self, name: &Symbol) -> Option<Value> {
        let slot = self.desc.slot(name)?;
        self.env.lookup(slot).ok().flatten()
    }

    pub fn eval_syntax(&mut self, syn: &Syntax) -> Result<Outcome, Error> {
        let source = analyze_toplevel(syn)?;
        let missing = source
            .requirements()
            .iter()
            .filter(|name| self.desc.slot(name).is_none())
            .cloned()
            .collect();
        self.ensure(missing);
        let expr = source.compile(&self.desc)?;
        Ok(self
            .machine
            .run(Machine::start(expr, self.env.clone()))?)
    }

    /// Evaluates every form in `src` in order. Stops at the first form that
    /// does not produce a value and reports how it ended.
    pub fn eval_str(&mut self, src: &str) -> Result<Outcome, Error> {
        let mut last = Outcome::Value(Value::Unspecified);
        for form in parser::read_all(src)? {
            last = self.eval_syntax(&form)?;
            if !matches!(last, Outcome::Value(_)) {
                break;
            }
        }
        Ok(last)
    }

    /// Resumes the computation waiting on `signal` with `value`.
    pub fn post(&mut self, signal: &Symbol, value: Value) -> Result<Outcome, Error> {
        Ok(self.machine.post(signal, value)?)
    }

    /// Resumes the computation waiting on `signal` by throwing `error` into it.
    pub fn post_error(&mut self, signal: &Symbol, error: Value) -> Result<Outcome, Error> {
        Ok(self.machine.post_error(signal, error)?)
    }

    /// Captures the computation waiting on `signal`. It stays parked here.
    pub fn snapshot(&self, signal: &Symbol) -> Result<Snapshot, Error> {
        let k = self
            .machine
            .state()
            .pending(signal)
            .ok_or_else(|| ReductionError::NotWaiting(signal.clone()))?;
        Ok(Snapshot::of_continuation(k))
    }

    /// Parks a restored computation under `signal`, ready for `post`.
    ///
    /// The restored chain carries its own copies of every box it reached,
    /// top-level ones included, so it does not see this session's globals.
    pub fn resume_snapshot(&mut self, signal: Symbol, snapshot: &Snapshot) -> Result<(), Error> {
        let k = snapshot.restore_continuation()?;
        self.machine.park(signal, k);
        Ok(())
    }
}
