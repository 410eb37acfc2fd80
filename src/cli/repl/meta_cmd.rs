use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use std::{collections::HashMap, fs, process};

use crate::{eval::Outcome, snapshot::Snapshot, syntax::Syntax, value::Value};

use super::Repl;

pub(super) struct MetaCmd {
    name: &'static str,
    summary: &'static str,
    format: &'static str,
    description: &'static [&'static str],
    example: &'static [&'static str],
    pub(super) run: fn(repl: &mut Repl, cmd: &str, args: &[Syntax]) -> Result<()>,
}

impl MetaCmd {
    const LOAD: MetaCmd = MetaCmd {
        name: "load",
        summary: "Load expressions from a file path.",
        format: "!(load <string>)",
        description: &["Relative paths are resolved against the directory of the current file."],
        example: &["!(load \"lib.scm\")"],
        run: |repl, cmd, args| {
            let path = repl.get_string(repl.peek1(cmd, args)?)?;
            let joined = repl.pwd_path.join(Utf8Path::new(&path));
            repl.load_file(&joined)
        },
    };
}

impl MetaCmd {
    const ASSERT: MetaCmd = MetaCmd {
        name: "assert",
        summary: "Assert that an expression evaluates to a true value.",
        format: "!(assert <expr>)",
        description: &["Anything but #f counts as true. Exits with status 1 on failure."],
        example: &["!(assert #t)", "!(assert (= 3 (+ 1 2)))"],
        run: |repl, cmd, args| {
            let first = repl.peek1(cmd, args)?;
            let value = repl.eval_value(first)?;
            if !value.is_true() {
                eprintln!("`assert` failed. {first} evaluates to #f");
                process::exit(1);
            }
            Ok(())
        },
    };
}

impl MetaCmd {
    const ASSERT_EQ: MetaCmd = MetaCmd {
        name: "assert-eq",
        summary: "Assert that two expressions evaluate to `equal?` values.",
        format: "!(assert-eq <expr> <expr>)",
        description: &["Exits with status 1 on failure."],
        example: &["!(assert-eq 3 (+ 1 2))"],
        run: |repl, cmd, args| {
            let (first, second) = repl.peek2(cmd, args)?;
            let first_value = repl
                .eval_value(first)
                .with_context(|| "evaluating first arg")?;
            let second_value = repl
                .eval_value(second)
                .with_context(|| "evaluating second arg")?;
            if !first_value.equal(&second_value) {
                eprintln!(
                    "`assert-eq` failed. Expected:\n  {first} = {second}\nGot:\n  {first_value} ≠ {second_value}"
                );
                process::exit(1);
            }
            Ok(())
        },
    };
}

impl MetaCmd {
    const ASSERT_ERROR: MetaCmd = MetaCmd {
        name: "assert-error",
        summary: "Assert that evaluating an expression throws.",
        format: "!(assert-error <expr>)",
        description: &["Exits with status 1 if the expression returns or suspends."],
        example: &["!(assert-error (car 1))", "!(assert-error (throw 'oops))"],
        run: |repl, cmd, args| {
            let first = repl.peek1(cmd, args)?;
            match repl.top.eval_syntax(first)? {
                Outcome::Uncaught(_) => Ok(()),
                other => {
                    eprintln!("`assert-error` failed. {first} ended with {other}");
                    process::exit(1);
                }
            }
        },
    };
}

impl MetaCmd {
    const POST: MetaCmd = MetaCmd {
        name: "post",
        summary: "Resume the computation waiting on a signal with a value.",
        format: "!(post <signal> <expr>)",
        description: &["The expression is evaluated first. Its value becomes the result of `wait-signal`."],
        example: &["(+ 1 (wait-signal 'tick))", "!(post tick 41)"],
        run: |repl, cmd, args| {
            let (first, second) = repl.peek2(cmd, args)?;
            let signal = repl.get_symbol(first)?;
            let value = repl.eval_value(second)?;
            let outcome = repl.top.post(&signal, value)?;
            repl.report(outcome)
        },
    };
}

impl MetaCmd {
    const POST_ERROR: MetaCmd = MetaCmd {
        name: "post-error",
        summary: "Resume the computation waiting on a signal by throwing into it.",
        format: "!(post-error <signal> <expr>)",
        description: &["The value is thrown from the `wait-signal` call site."],
        example: &[
            "(catch (lambda (e) (list 'caught e)) (wait-signal 'tick))",
            "!(post-error tick 'timeout)",
        ],
        run: |repl, cmd, args| {
            let (first, second) = repl.peek2(cmd, args)?;
            let signal = repl.get_symbol(first)?;
            let error = repl.eval_value(second)?;
            let outcome = repl.top.post_error(&signal, error)?;
            repl.report(outcome)
        },
    };
}

impl MetaCmd {
    const SAVE: MetaCmd = MetaCmd {
        name: "save",
        summary: "Write the computation waiting on a signal to a file.",
        format: "!(save <signal> <string>)",
        description: &[
            "The computation stays parked in this session.",
            "A later `restore` in any session can resume it.",
        ],
        example: &["(* 2 (wait-signal 'tick))", "!(save tick \"tick.snap\")"],
        run: |repl, cmd, args| {
            let (first, second) = repl.peek2(cmd, args)?;
            let signal = repl.get_symbol(first)?;
            let path = repl.pwd_path.join(repl.get_string(second)?);
            let snapshot = repl.top.snapshot(&signal)?;
            fs::write(&path, snapshot.to_bytes()?)
                .with_context(|| format!("writing snapshot to {path}"))?;
            println!("Saved {} nodes to {path}", snapshot.len());
            Ok(())
        },
    };
}

impl MetaCmd {
    const RESTORE: MetaCmd = MetaCmd {
        name: "restore",
        summary: "Park a saved computation under a signal.",
        format: "!(restore <signal> <string>)",
        description: &["Replaces any computation already waiting on the signal."],
        example: &["!(restore tick \"tick.snap\")", "!(post tick 21)"],
        run: |repl, cmd, args| {
            let (first, second) = repl.peek2(cmd, args)?;
            let signal = repl.get_symbol(first)?;
            let path = repl.pwd_path.join(repl.get_string(second)?);
            let bytes = fs::read(&path).with_context(|| format!("reading snapshot from {path}"))?;
            let snapshot = Snapshot::from_bytes(&bytes)?;
            repl.top.resume_snapshot(signal.clone(), &snapshot)?;
            println!("Waiting on {signal}");
            Ok(())
        },
    };
}

impl MetaCmd {
    const LIMIT: MetaCmd = MetaCmd {
        name: "limit",
        summary: "Set the iteration limit for each evaluation.",
        format: "!(limit <integer>)",
        description: &["A limit of 0 removes the limit."],
        example: &["!(limit 1000000)", "!(limit 0)"],
        run: |repl, cmd, args| {
            let first = repl.peek1(cmd, args)?;
            let Value::Num(n) = repl.eval_value(first)? else {
                bail!("Argument of `limit` must be a number");
            };
            let Some(limit) = n.as_usize() else {
                bail!("Argument of `limit` must be a non-negative integer");
            };
            let limit = (limit != 0).then_some(limit);
            repl.top.machine().set_limit(limit);
            Ok(())
        },
    };
}

impl MetaCmd {
    const HELP: MetaCmd = MetaCmd {
        name: "help",
        summary: "Print help message.",
        format: "!(help <string>)",
        description: &[
            "Without arguments it prints a summary of all available commands.",
            "Otherwise the full help for the command in the first argument is printed.",
        ],
        example: &["!(help)", "!(help \"load\")", "!(help save)"],
        run: |repl, _cmd, args| {
            match args.first() {
                None => {
                    println!("Available commands:");
                    let mut cmds = repl.meta.values().collect::<Vec<_>>();
                    cmds.sort_by_key(|cmd| cmd.name);
                    for cmd in cmds {
                        println!("  {} - {}", cmd.name, cmd.summary);
                    }
                }
                Some(arg) => {
                    let name = match arg {
                        Syntax::String(_, s) => s.clone(),
                        other => repl.get_symbol(other)?.name().to_owned(),
                    };
                    match repl.meta.get(name.as_str()) {
                        Some(cmd) => cmd.print_help(),
                        None => println!("Unknown command {name}"),
                    }
                }
            }
            Ok(())
        },
    };

    fn print_help(&self) {
        println!("{} - {}", self.name, self.summary);
        for line in self.description {
            println!("  {line}");
        }
        println!("  Usage: {}", self.format);
        if !self.example.is_empty() {
            println!("  Example:");
        }
        for line in self.example {
            println!("    {line}");
        }
    }
}

impl MetaCmd {
    pub(super) fn cmds() -> HashMap<&'static str, MetaCmd> {
        HashMap::from([
            (Self::LOAD.name, Self::LOAD),
            (Self::ASSERT.name, Self::ASSERT),
            (Self::ASSERT_EQ.name, Self::ASSERT_EQ),
            (Self::ASSERT_ERROR.name, Self::ASSERT_ERROR),
            (Self::POST.name, Self::POST),
            (Self::POST_ERROR.name, Self::POST_ERROR),
            (Self::SAVE.name, Self::SAVE),
            (Self::RESTORE.name, Self::RESTORE),
            (Self::LIMIT.name, Self::LIMIT),
            (Self::HELP.name, Self::HELP),
        ])
    }
}
