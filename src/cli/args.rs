//! Command-line arguments, clap derive style.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "hql",
    version,
    about = "Compile HQL, a Lisp dialect, to ECMAScript modules with source maps."
)]
pub struct HqlArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Log pipeline progress.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Emit per-phase timings.
    #[arg(long, global = true)]
    pub timing: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile a source file to an ECMAScript module.
    Compile {
        /// The file to compile.
        #[arg(required = true)]
        file: PathBuf,

        /// Output path; defaults to the input with a .js extension.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the .js.map that file compiles write by default.
        #[arg(long)]
        no_source_map: bool,

        /// Print the compiled module instead of writing it.
        #[arg(long)]
        print: bool,
    },
    /// Print the macro-expanded program.
    Expand {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Dump the typed IR as JSON.
    Ast {
        #[arg(required = true)]
        file: PathBuf,
    },
}
