//! Runs remote commands and transfers for one host.

use crate::command::{Remote, ShellOptions, Transfer};
use crate::core::{Action, Host};
use crate::error::{ActionError, Result};
use crate::expression::{PathKind, PathProbe};
use crate::template::Renderer;
use crate::transport::{Transport, TransportOutput};
use tracing::{debug, info};

/// Transport settings shared by every host in a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Build and log every command line but never run one.
    pub dry_run: bool,

    pub ssh_options: String,
    pub rsync_options: String,
}

/// One host's view of the transport.
///
/// A session renders templates against the host's context, assembles the final command lines,
/// logs them, and hands them to the [Transport]. A non-zero exit becomes an
/// [ActionError::Transport].
pub struct Session<'a, T: Transport> {
    host: &'a Host,
    address: String,
    renderer: Renderer,
    transport: &'a mut T,
    options: &'a SessionOptions,
}

enum Channel {
    Command,
    Transfer,
}

impl<'a, T: Transport> Session<'a, T> {
    pub fn new(host: &'a Host, transport: &'a mut T, options: &'a SessionOptions) -> Self {
        Session {
            host,
            address: host.remote_address(),
            renderer: Renderer::new(&host.context),
            transport,
            options,
        }
    }

    /// Renders `template` against the host's context.
    pub fn render(&mut self, template: &str) -> Result<String> {
        self.renderer.render(template)
    }

    fn remote(&self) -> Remote<'_> {
        Remote {
            address: &self.address,
            ssh_options: &self.options.ssh_options,
            rsync_options: &self.options.rsync_options,
        }
    }

    /// Runs already rendered `lines` as one remote command and returns its output.
    pub fn run_ssh<S: AsRef<str>>(
        &mut self,
        lines: &[S],
        options: ShellOptions<'_>,
    ) -> Result<String> {
        let command_line = self.remote().ssh(lines, options);
        let output = self.execute(&command_line, Channel::Command)?;
        self.check(command_line, output)
    }

    /// Uploads one local file and returns the transfer's output.
    pub fn run_rsync(
        &mut self,
        transfer: &Transfer<'_>,
        options: ShellOptions<'_>,
    ) -> Result<String> {
        let command_line = self.remote().rsync(transfer, options);
        let output = self.execute(&command_line, Channel::Transfer)?;
        self.check(command_line, output)
    }

    /// Runs `line` and reports whether it exited successfully. A failure is not an error here.
    /// Always false in a dry run.
    pub fn succeeds(&mut self, line: &str, options: ShellOptions<'_>) -> Result<bool> {
        if self.options.dry_run {
            return Ok(false);
        }
        let command_line = self.remote().ssh(&[line], options);
        Ok(self.execute(&command_line, Channel::Command)?.success)
    }

    fn execute(&mut self, command_line: &str, channel: Channel) -> Result<TransportOutput> {
        debug!(host = %self.host.name, "{command_line}");
        if self.options.dry_run {
            return Ok(TransportOutput::ok(""));
        }

        let result = match channel {
            Channel::Command => self.transport.run_command(command_line),
            Channel::Transfer => self.transport.transfer_file(command_line),
        };
        let output = result.map_err(|source| ActionError::TransportUnavailable {
            command: command_line.to_owned(),
            source,
        })?;

        if !output.text.is_empty() {
            debug!(host = %self.host.name, "{}", output.text.trim_end());
        }
        Ok(output)
    }

    fn check(&self, command: String, output: TransportOutput) -> Result<String> {
        match output.success {
            true => Ok(output.text),
            false => Err(ActionError::Transport {
                command,
                code: output.code,
                output: output.text,
            }),
        }
    }
}

impl<T: Transport> PathProbe for Session<'_, T> {
    // `test -d` or `test -e`, from the remote user's home directory.
    fn path_exists(&mut self, path: &str, kind: PathKind, action: Option<&Action>) -> Result<bool> {
        let (flag, noun) = match kind {
            PathKind::Dir => ("d", "dir"),
            PathKind::File => ("e", "file"),
        };

        let options = ShellOptions {
            elevate: action.is_some_and(|a| a.elevate),
            elevate_user: action.map(|a| a.elevate_user.as_str()).unwrap_or_default(),
            wrap_bash: true,
            timeout: action.map(|a| a.timeout).unwrap_or_default(),
        };
        let exists = self.succeeds(&format!("test -{flag} \"{path}\""), options)?;

        info!(
            host = %self.host.name,
            "{noun} \"{path}\" was {}found",
            if exists { "" } else { "not " }
        );
        Ok(exists)
    }
}
