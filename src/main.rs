use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hql::cli::{self, args::HqlArgs};

fn main() -> ExitCode {
    let args = HqlArgs::parse();

    let default_level = if args.timing || args.verbose {
        "hql=info"
    } else {
        "hql=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cli::run(args)
}
