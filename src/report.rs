//! Operator-facing output: action banners, message lines, failures and the run summary.
//!
//! As with most output code here, each [Report] method of [ConsoleReporter] locks stdout or
//! stderr and hands it to a testable `_function` that does the actual writing. Tests call the
//! `_function`s directly with byte buffers.
//!
//! Diagnostic output (assembled command lines, captured output) goes through `tracing` instead.

use crate::core::Action;
use crate::error::ActionError;
use crate::run_plan::RunSummary;
use colored::Colorize;
use std::io::{self, Write};

/// Receives the events of a run that the operator should see.
pub trait Report {
    /// An action is about to be dispatched to a host.
    fn starting(&mut self, host: &str, action: &Action) -> io::Result<()>;

    /// An action's guard evaluated falsy.
    fn skipped(&mut self, host: &str, action: &Action) -> io::Result<()>;

    /// One evaluated `message` item.
    fn message(&mut self, host: &str, line: &str) -> io::Result<()>;

    /// An action failed on a host. The host receives no further actions.
    fn failed(&mut self, host: &str, action: &Action, error: &ActionError) -> io::Result<()>;

    /// The run is over.
    fn summary(&mut self, summary: &RunSummary) -> io::Result<()>;
}

impl<R: Report + ?Sized> Report for &mut R {
    fn starting(&mut self, host: &str, action: &Action) -> io::Result<()> {
        (**self).starting(host, action)
    }

    fn skipped(&mut self, host: &str, action: &Action) -> io::Result<()> {
        (**self).skipped(host, action)
    }

    fn message(&mut self, host: &str, line: &str) -> io::Result<()> {
        (**self).message(host, line)
    }

    fn failed(&mut self, host: &str, action: &Action, error: &ActionError) -> io::Result<()> {
        (**self).failed(host, action, error)
    }

    fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        (**self).summary(summary)
    }
}

/// The production [Report] implementation. Writes to the real stdout and stderr.
#[derive(Clone, Copy, Debug)]
pub struct ConsoleReporter {
    pub colorize: bool,
}

impl ConsoleReporter {
    pub fn new(colorize: bool) -> Self {
        ConsoleReporter { colorize }
    }
}

impl Report for ConsoleReporter {
    fn starting(&mut self, host: &str, action: &Action) -> io::Result<()> {
        _starting(io::stdout().lock(), self.colorize, host, action)
    }

    fn skipped(&mut self, host: &str, action: &Action) -> io::Result<()> {
        _skipped(io::stdout().lock(), host, action)
    }

    fn message(&mut self, host: &str, line: &str) -> io::Result<()> {
        _message(io::stdout().lock(), self.colorize, host, line)
    }

    fn failed(&mut self, host: &str, action: &Action, error: &ActionError) -> io::Result<()> {
        _failed(io::stderr().lock(), self.colorize, host, action, error)
    }

    fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        _summary(io::stdout().lock(), summary)
    }
}

fn paint(text: &str, colorize: bool, style: fn(&str) -> colored::ColoredString) -> String {
    match colorize {
        true => style(text).to_string(),
        false => text.to_owned(),
    }
}

fn write_indented(mut writer: impl Write, header: &str, content: &str) -> io::Result<()> {
    //                1234
    writeln!(writer, "    {header}")?;
    for line in content.lines() {
        //                12345678
        writeln!(writer, "        {line}")?;
    }
    Ok(())
}

pub fn _starting(
    mut stdout: impl Write,
    colorize: bool,
    host: &str,
    action: &Action,
) -> io::Result<()> {
    let banner = format!("[{host}] Starting {action}");
    writeln!(stdout, "{}", paint(&banner, colorize, |s| s.bold()))
}

pub fn _skipped(mut stdout: impl Write, host: &str, action: &Action) -> io::Result<()> {
    writeln!(stdout, "[{host}] Skipped  {action}")
}

pub fn _message(mut stdout: impl Write, colorize: bool, host: &str, line: &str) -> io::Result<()> {
    let line = format!("[{host}] {line}");
    writeln!(stdout, "{}", paint(&line, colorize, |s| s.yellow()))
}

pub fn _failed(
    mut stderr: impl Write,
    colorize: bool,
    host: &str,
    action: &Action,
    error: &ActionError,
) -> io::Result<()> {
    let headline = format!("[{host}] Failed   {action}");
    writeln!(stderr, "{}", paint(&headline, colorize, |s| s.red()))?;
    write_indented(&mut stderr, "Error:", &error.to_string())?;
    if let ActionError::Transport { output, .. } = error {
        if !output.trim().is_empty() {
            write_indented(&mut stderr, "Captured output:", output)?;
        }
    }
    Ok(())
}

pub fn _summary(mut stdout: impl Write, summary: &RunSummary) -> io::Result<()> {
    writeln!(stdout)?;
    for host in &summary.hosts {
        writeln!(
            stdout,
            "[{}] succeeded: {}, skipped: {}, failed: {}",
            host.name, host.state.succeeded, host.state.skipped, host.state.errors,
        )?;
    }
    writeln!(
        stdout,
        "Started {}, finished {} ({:.1}s)",
        summary.started.format("%Y-%m-%d %H:%M:%S"),
        summary.finished.format("%H:%M:%S"),
        summary.elapsed().num_milliseconds() as f64 / 1000.0,
    )
}
