//! Runs assembled command lines on the control node.
//!
//! The transport knows nothing about SSH or rsync. [crate::command] builds a complete
//! `ssh ...` or `rsync ...` command line, and a [Transport] runs it and reports what happened.

use std::io;
use std::process::Command;

/// Captured result of one command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportOutput {
    /// Combined standard output and standard error.
    pub text: String,

    /// Whether the command exited successfully.
    pub success: bool,

    /// The exit code, if the process exited normally.
    pub code: Option<i32>,
}

impl TransportOutput {
    /// A successful result with the given output.
    pub fn ok(text: impl Into<String>) -> Self {
        TransportOutput {
            text: text.into(),
            success: true,
            code: Some(0),
        }
    }

    /// A failed result with the given output and exit code.
    pub fn failed(text: impl Into<String>, code: i32) -> Self {
        TransportOutput {
            text: text.into(),
            success: false,
            code: Some(code),
        }
    }
}

/// Executes command lines. Calls block until the command finishes.
pub trait Transport {
    /// Run a remote command, i.e. an `ssh` command line.
    fn run_command(&mut self, command_line: &str) -> io::Result<TransportOutput>;

    /// Run a file transfer, i.e. an `rsync` command line.
    fn transfer_file(&mut self, command_line: &str) -> io::Result<TransportOutput>;
}

/// Production implementation of [Transport]. Runs each command line with `sh -c`.
#[derive(Clone, Debug, Default)]
pub struct ShellTransport;

impl ShellTransport {
    fn run(&self, command_line: &str) -> io::Result<TransportOutput> {
        // Merge stderr into stdout in the shell so the captured text keeps its interleaving.
        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("{{ {command_line}\n}} 2>&1"))
            .output()?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(TransportOutput {
            text,
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

impl Transport for ShellTransport {
    fn run_command(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        self.run(command_line)
    }

    fn transfer_file(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        self.run(command_line)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn run_command(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        (**self).run_command(command_line)
    }

    fn transfer_file(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        (**self).transfer_file(command_line)
    }
}
