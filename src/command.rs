//! Builds the exact command lines handed to the external `ssh` and `rsync` clients.
//!
//! Nothing here runs anything. The output is a single shell command line that the transport
//! executes with `sh -c`.
//!
//! # Quoting
//!
//! The remote command travels as one double-quoted `ssh` argument. Every double quote inside it
//! is backslash-escaped, and nothing else is. Action files depend on this exact rule: wrapping a
//! `psql -c "..."` command lets SQL inside it use single quotes freely.
//!
//! ```
//! # use mindeploy::command::{Remote, ShellOptions};
//! let remote = Remote::new("master@10.0.0.5");
//! let options = ShellOptions {
//!     elevate: true,
//!     elevate_user: "postgres",
//!     wrap_bash: false,
//!     timeout: 5,
//! };
//! assert_eq!(
//!     r#"ssh -o ConnectTimeout=5 master@10.0.0.5 "sudo -H --non-interactive -u postgres psql -c \"SELECT 'hi'\"""#,
//!     remote.ssh(&[r#"psql -c "SELECT 'hi'""#], options),
//! );
//! ```

/// How a remote command is wrapped before it is sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShellOptions<'a> {
    /// Prefix with `sudo -H --non-interactive`.
    pub elevate: bool,

    /// The `sudo -u` target. Empty means the default privileged account.
    pub elevate_user: &'a str,

    /// Run inside `/bin/bash -c "cd && ..."`, i.e. from the remote user's home directory.
    pub wrap_bash: bool,

    /// Connection timeout in seconds. Zero omits the option.
    pub timeout: u64,
}

impl<'a> ShellOptions<'a> {
    /// The same options without the bash wrapper.
    pub fn without_bash(self) -> Self {
        ShellOptions {
            wrap_bash: false,
            ..self
        }
    }
}

/// Backslash-escapes every double quote in `command`.
pub fn escape_double_quotes(command: &str) -> String {
    command.replace('"', "\\\"")
}

/// Assembles and escapes the remote side of an `ssh` invocation.
///
/// Rules, in order: join the lines with ` && `; wrap in bash if asked; prefix with `sudo` if
/// asked; escape double quotes.
pub fn inner_command<S: AsRef<str>>(lines: &[S], options: ShellOptions<'_>) -> String {
    let mut inner = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" && ");

    if options.wrap_bash {
        inner = format!("/bin/bash -c \"cd && {inner}\"");
    }

    if options.elevate {
        let mut prefix = "sudo -H --non-interactive ".to_owned();
        if !options.elevate_user.is_empty() {
            prefix.push_str(&format!("-u {} ", options.elevate_user));
        }
        inner = prefix + &inner;
    }

    escape_double_quotes(&inner)
}

/// Prefixes `command` with a change into `directory`.
///
/// The directory goes in unquoted, so the remote shell still expands `~` and `$VAR` in it.
pub fn in_directory(directory: &str, command: &str) -> String {
    format!("cd {directory} && {command}")
}

/// A file transfer from the control node to a host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transfer<'a> {
    /// Local path.
    pub source: &'a str,

    /// Remote path.
    pub destination: &'a str,

    /// Pass `--ignore-existing`, leaving files already on the host alone.
    pub ignore_existing: bool,

    /// `--chmod` argument, if not empty.
    pub mode: &'a str,

    pub owner: &'a str,
    pub group: &'a str,
}

/// The transport endpoint for one host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Remote<'a> {
    /// `[user@]address`.
    pub address: &'a str,

    /// Extra options placed right after `ssh`.
    pub ssh_options: &'a str,

    /// Extra options placed right before the `rsync` source argument.
    pub rsync_options: &'a str,
}

impl<'a> Remote<'a> {
    pub fn new(address: &'a str) -> Self {
        Remote {
            address,
            ..Remote::default()
        }
    }

    /// Builds `ssh [options] [-o ConnectTimeout=N] address "<inner command>"`.
    pub fn ssh<S: AsRef<str>>(&self, lines: &[S], options: ShellOptions<'_>) -> String {
        let mut command = "ssh ".to_owned();
        if !self.ssh_options.is_empty() {
            command.push_str(self.ssh_options);
            command.push(' ');
        }
        if options.timeout > 0 {
            command.push_str(&format!("-o ConnectTimeout={} ", options.timeout));
        }
        command.push_str(self.address);
        command.push_str(&format!(" \"{}\"", inner_command(lines, options)));
        command
    }

    /// Builds an `rsync` invocation that uploads `transfer.source` to `transfer.destination`.
    ///
    /// Privilege elevation applies to the remote `rsync` process only, via `--rsync-path`. It
    /// targets `root` unless a user is given. The bash wrapper does not apply to transfers.
    pub fn rsync(&self, transfer: &Transfer<'_>, options: ShellOptions<'_>) -> String {
        let mut command = "rsync -avz --progress ".to_owned();
        if options.timeout > 0 {
            command.push_str(&format!("--timeout={} ", options.timeout));
        }
        if transfer.ignore_existing {
            command.push_str("--ignore-existing ");
        }
        if !transfer.mode.is_empty() {
            command.push_str(&format!("--chmod=\"{}\" ", transfer.mode));
        }
        let chown = format!("{}:{}", transfer.owner, transfer.group);
        if chown.len() > 1 {
            command.push_str(&format!("--chown=\"{chown}\" "));
        }
        if options.elevate {
            let user = match options.elevate_user {
                "" => "root",
                user => user,
            };
            command.push_str(&format!("--rsync-path=\"sudo -u {user} rsync\" "));
        }
        if !self.rsync_options.is_empty() {
            command.push_str(self.rsync_options);
            command.push(' ');
        }
        command.push_str(&format!(
            "\"{}\" \"{}:{}\"",
            transfer.source, self.address, transfer.destination
        ));
        command
    }
}
