use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

fn main() -> Result<()> {
    let subscriber = Registry::default()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env());
    tracing::subscriber::set_global_default(subscriber)?;

    rewind::cli::parse_and_run()
}
