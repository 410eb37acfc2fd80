mod repl;

use std::collections::HashMap;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::{rewind_config, Settings};

use self::repl::Repl;

#[derive(Parser, Debug)]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Loads a file, processing forms sequentially ("load" can be elided)
    Load(LoadArgs),
    /// Enters the REPL ("repl" can be elided)
    Repl(ReplArgs),
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// The file to be loaded
    #[clap(value_parser)]
    file: Utf8PathBuf,

    /// Maximum number of iterations allowed per evaluation (unlimited by default)
    #[clap(long, value_parser)]
    limit: Option<usize>,

    /// Config file, containing the lowest precedence parameters
    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,
}

#[derive(Parser, Debug)]
struct LoadCli {
    #[clap(value_parser)]
    file: Utf8PathBuf,

    #[clap(long, value_parser)]
    limit: Option<usize>,

    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,
}

impl LoadArgs {
    fn into_cli(self) -> LoadCli {
        LoadCli {
            file: self.file,
            limit: self.limit,
            config: self.config,
        }
    }
}

#[derive(Args, Debug)]
struct ReplArgs {
    /// Optional file to be loaded before entering the REPL
    #[clap(long, value_parser)]
    load: Option<Utf8PathBuf>,

    /// Maximum number of iterations allowed per evaluation (unlimited by default)
    #[clap(long, value_parser)]
    limit: Option<usize>,

    /// Config file, containing the lowest precedence parameters
    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,
}

#[derive(Parser, Debug)]
struct ReplCli {
    #[clap(long, value_parser)]
    load: Option<Utf8PathBuf>,

    #[clap(long, value_parser)]
    limit: Option<usize>,

    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,
}

impl ReplArgs {
    fn into_cli(self) -> ReplCli {
        ReplCli {
            load: self.load,
            limit: self.limit,
            config: self.config,
        }
    }
}

/// CLI arguments take precedence over the config file and environment.
fn settings(config: Option<&Utf8PathBuf>, limit: Option<usize>) -> &'static Settings {
    let mut overrides = HashMap::new();
    if let Some(limit) = limit {
        overrides.insert("limit", limit.to_string());
    }
    let settings = rewind_config(config, Some(&overrides));
    info!(limit = ?settings.limit, history = %settings.history, "settings loaded");
    settings
}

impl ReplCli {
    fn run(&self) -> Result<()> {
        let settings = settings(self.config.as_ref(), self.limit);
        let mut repl = Repl::new(settings.limit, settings.history.clone())?;
        if let Some(file) = &self.load {
            repl.load_file(file)?;
        }
        repl.start()
    }
}

impl LoadCli {
    fn run(&self) -> Result<()> {
        let settings = settings(self.config.as_ref(), self.limit);
        let mut repl = Repl::new(settings.limit, settings.history.clone())?;
        repl.load_file(&self.file)
    }
}

/// Parses CLI arguments and continues the program flow accordingly
pub fn parse_and_run() -> Result<()> {
    if let Ok(cli) = Cli::try_parse() {
        match cli.command {
            Command::Repl(repl_args) => repl_args.into_cli().run(),
            Command::Load(load_args) => load_args.into_cli().run(),
        }
    } else if let Ok(repl_cli) = ReplCli::try_parse() {
        repl_cli.run()
    } else if let Ok(load_cli) = LoadCli::try_parse() {
        load_cli.run()
    } else {
        // Reports the usage error (or help/version) and exits
        match Cli::parse().command {
            Command::Repl(repl_args) => repl_args.into_cli().run(),
            Command::Load(load_args) => load_args.into_cli().run(),
        }
    }
}
