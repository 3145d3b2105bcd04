//! CLI output channels.
//!
//! Diagnostics render through miette's report machinery; informational
//! messages go through termcolor so success lines read distinctly from
//! compiler output on a terminal.

use std::io::Write;

use miette::Report;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::errors::HqlError;

/// Prints a diagnostic with full context rendering. Honors the
/// report-once contract: a second call for the same error is a no-op.
pub fn report_error(error: HqlError) {
    if !error.mark_reported() {
        return;
    }
    let report = Report::new(error);
    eprintln!("{report:?}");
}

pub fn success(message: &str) {
    let mut stream = StandardStream::stdout(ColorChoice::Auto);
    let _ = stream.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    let _ = write!(stream, "ok");
    let _ = stream.reset();
    let _ = writeln!(stream, " {}", message);
}
