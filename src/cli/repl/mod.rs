mod meta_cmd;

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rustyline::{
    error::ReadlineError,
    history::DefaultHistory,
    validate::{MatchingBracketValidator, ValidationContext, ValidationResult, Validator},
    Config, Editor,
};
use rustyline_derive::{Completer, Helper, Highlighter, Hinter};
use std::{collections::HashMap, fs::read_to_string};
use tracing::{info, warn};

use crate::{
    eval::{Outcome, TopLevel},
    parser,
    state::GlobalState,
    symbol::Symbol,
    syntax::Syntax,
    value::Value,
};

use meta_cmd::MetaCmd;

#[derive(Completer, Helper, Highlighter, Hinter)]
struct InputValidator {
    brackets: MatchingBracketValidator,
}

impl Validator for InputValidator {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        self.brackets.validate(ctx)
    }
}

pub(crate) struct Repl {
    top: TopLevel,
    pwd_path: Utf8PathBuf,
    history: Utf8PathBuf,
    meta: HashMap<&'static str, MetaCmd>,
}

impl Repl {
    fn peek1<'a>(&self, cmd: &str, args: &'a [Syntax]) -> Result<&'a Syntax> {
        match args {
            [first] => Ok(first),
            _ => bail!("`{cmd}` accepts exactly one argument"),
        }
    }

    fn peek2<'a>(&self, cmd: &str, args: &'a [Syntax]) -> Result<(&'a Syntax, &'a Syntax)> {
        match args {
            [first, second] => Ok((first, second)),
            _ => bail!("`{cmd}` accepts exactly two arguments"),
        }
    }

    fn get_string(&self, syn: &Syntax) -> Result<String> {
        match syn {
            Syntax::String(_, s) => Ok(s.clone()),
            _ => bail!("Expected a string, got {syn}"),
        }
    }

    /// Signals may be written bare or quoted: `tick` or `'tick`
    fn get_symbol(&self, syn: &Syntax) -> Result<Symbol> {
        match syn {
            Syntax::Symbol(_, s) => Ok(s.clone()),
            Syntax::Quote(_, inner) => self.get_symbol(inner),
            _ => bail!("Expected a symbol, got {syn}"),
        }
    }
}

impl Repl {
    pub(crate) fn new(limit: Option<usize>, history: Utf8PathBuf) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let pwd_path = Utf8PathBuf::from_path_buf(current_dir)
            .map_err(|path| anyhow::anyhow!("Current directory {path:?} is not UTF-8"))?;
        Ok(Self {
            top: TopLevel::new(GlobalState::default(), limit),
            pwd_path,
            history,
            meta: MetaCmd::cmds(),
        })
    }

    /// Evaluates `syn`, requiring it to return normally
    fn eval_value(&mut self, syn: &Syntax) -> Result<Value> {
        match self.top.eval_syntax(syn)? {
            Outcome::Value(v) => Ok(v),
            other => bail!("{syn} did not return a value: {other}"),
        }
    }

    fn report(&self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Value(v) => println!("=> {v}"),
            Outcome::Suspended(signal) => println!("Suspended on {signal}"),
            Outcome::Uncaught(v) => bail!("Uncaught: {v}"),
        }
        Ok(())
    }

    fn handle_non_meta(&mut self, syn: &Syntax) -> Result<()> {
        let outcome = self.top.eval_syntax(syn)?;
        self.report(outcome)
    }

    fn handle_meta(&mut self, syn: &Syntax) -> Result<()> {
        let Syntax::List(_, items) = syn else {
            bail!("Meta command must be a list. Found {syn}");
        };
        let Some((head, args)) = items.split_first() else {
            bail!("Empty meta command");
        };
        let Some(name) = head.as_symbol() else {
            bail!("Meta command must be a symbol. Found {head}");
        };
        match self.meta.get(name.name()) {
            Some(cmd) => {
                let run = cmd.run;
                if let Err(e) = run(self, name.name(), args) {
                    bail!("Meta command failed with: {e}")
                }
            }
            None => bail!("Unsupported meta command: {name}"),
        }
        Ok(())
    }

    /// Runs every form in `input`. A `!` followed by a list is a meta command.
    fn handle_forms(&mut self, input: &str) -> Result<()> {
        let mut forms = parser::read_all(input)?.into_iter();
        while let Some(form) = forms.next() {
            match form.as_symbol() {
                Some(bang) if bang.name() == "!" => match forms.next() {
                    Some(cmd) => self.handle_meta(&cmd)?,
                    None => bail!("Expected a meta command after `!`"),
                },
                _ => self.handle_non_meta(&form)?,
            }
        }
        Ok(())
    }

    pub(crate) fn load_file(&mut self, file_path: &Utf8Path) -> Result<()> {
        let input = read_to_string(file_path).with_context(|| format!("reading {file_path}"))?;
        println!("Loading {file_path}");
        info!(%file_path, "loading");

        let parent = file_path
            .parent()
            .map(|dir| self.pwd_path.join(dir))
            .unwrap_or_else(|| self.pwd_path.clone());
        let pwd_path = std::mem::replace(&mut self.pwd_path, parent);
        let result = self.handle_forms(&input);
        self.pwd_path = pwd_path;
        result
    }

    pub(crate) fn start(&mut self) -> Result<()> {
        println!("rewind REPL welcomes you.");

        let mut editor: Editor<InputValidator, DefaultHistory> = Editor::with_config(
            Config::builder()
                .color_mode(rustyline::ColorMode::Enabled)
                .auto_add_history(true)
                .build(),
        )?;

        editor.set_helper(Some(InputValidator {
            brackets: MatchingBracketValidator::new(),
        }));

        if let Some(dir) = self.history.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(%dir, "cannot create history directory: {e}");
            }
        }
        if self.history.exists() {
            if let Err(e) = editor.load_history(&self.history) {
                warn!(history = %self.history, "cannot load history: {e}");
            }
        }

        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    if let Err(e) = editor.save_history(&self.history) {
                        warn!(history = %self.history, "cannot save history: {e}");
                    }
                    if let Err(e) = self.handle_forms(&line) {
                        match e.downcast_ref::<parser::Error>() {
                            Some(parser::Error::NoInput) => (),
                            Some(e) => eprintln!("Read error: {e}"),
                            None => eprintln!("Error: {e}"),
                        }
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    println!("Exiting...");
                    break;
                }
                Err(e) => {
                    eprintln!("Read line error: {e}");
                    break;
                }
            }
        }
        Ok(())
    }
}
