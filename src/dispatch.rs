//! Runs one [Action] on one host.
//!
//! ```text
//! Pending ──guard──▶ Skipped
//!    │
//!    └──▶ Dispatched ──▶ Succeeded | Failed
//! ```
//!
//! An action without a `when` guard goes straight to dispatch. A failure is returned to the
//! caller as an [ActionError]. Counting it against the host is the run loop's job.

use crate::command::{in_directory, Transfer};
use crate::core::{Action, ActionType, Host, HostState};
use crate::error::{ActionError, Result};
use crate::expression::{self, display, is_truthy, PathKind};
use crate::report::Report;
use crate::session::{Session, SessionOptions};
use crate::transport::Transport;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The `stat --format` letters collected by `stat_dir` and `stat_file`, in output order.
///
/// | letter | field                                   |
/// |--------|-----------------------------------------|
/// | `a`    | access rights in octal                  |
/// | `A`    | access rights in human readable form    |
/// | `F`    | file type                               |
/// | `g`    | group ID of owner                       |
/// | `G`    | group name of owner                     |
/// | `i`    | inode number                            |
/// | `n`    | file name                               |
/// | `N`    | quoted file name, dereferenced if a symbolic link |
/// | `s`    | total size in bytes                     |
/// | `u`    | user ID of owner                        |
/// | `U`    | user name of owner                      |
/// | `X`    | time of last access, epoch seconds      |
/// | `Y`    | time of last data modification, epoch seconds |
/// | `Z`    | time of last status change, epoch seconds |
pub const STAT_FIELDS: &str = "aAFgGinNsuUXYZ";

/// How a dispatched action ended, short of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Succeeded,
}

/// Settings for every dispatch in a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    pub session: SessionOptions,

    /// Root directory that `copy` items are resolved against.
    pub files_dir: PathBuf,

    /// Log the full form of every host and action before dispatch.
    pub extra_debug: bool,
}

pub struct Dispatcher<T: Transport, R: Report> {
    transport: T,
    reporter: R,
    options: DispatchOptions,
}

impl<T: Transport, R: Report> Dispatcher<T, R> {
    pub fn new(transport: T, reporter: R, options: DispatchOptions) -> Self {
        Dispatcher {
            transport,
            reporter,
            options,
        }
    }

    pub fn reporter(&mut self) -> &mut R {
        &mut self.reporter
    }

    /// Evaluates the action's guard against `host`, then runs the action.
    ///
    /// Results are recorded in `state.results` when the action declares `register`.
    pub fn dispatch(
        &mut self,
        action: &Action,
        host: &Host,
        state: &mut HostState,
    ) -> Result<Outcome> {
        if self.options.extra_debug {
            debug!(?host, ?action, "dispatching");
        }

        let mut session = Session::new(host, &mut self.transport, &self.options.session);

        if let Some(guard) = action.guard() {
            let verdict = expression::evaluate(guard, host, state, Some(action), &mut session)?;
            if !is_truthy(&verdict) {
                debug!(host = %host.name, %guard, "guard is falsy");
                return Ok(Outcome::Skipped);
            }
        }

        use ActionType::*;
        match &action.kind {
            Command => run_commands(&mut session, action, state)?,
            Mkdirs => make_dirs(&mut session, action, state)?,
            Message => {
                for item in &action.items {
                    let value = expression::evaluate(item, host, state, None, &mut session)?;
                    self.reporter
                        .message(&host.name, &display(&value))
                        .map_err(ActionError::Output)?;
                }
            }
            StatDir => stat(&mut session, action, state, PathKind::Dir)?,
            StatFile => stat(&mut session, action, state, PathKind::File)?,
            Copy => copy(&mut session, &self.options.files_dir, action, state)?,
            Other(kind) => return Err(ActionError::UnknownActionType(kind.clone())),
        }
        Ok(Outcome::Succeeded)
    }
}

fn register(action: &Action, state: &mut HostState, value: impl Into<Value>) {
    if let Some(name) = action.register_name() {
        state.results.record(name, value);
    }
}

// Items starting with `#` are comments.
fn run_commands<T: Transport>(
    session: &mut Session<'_, T>,
    action: &Action,
    state: &mut HostState,
) -> Result<()> {
    let chdir = match action.extra.get("chdir") {
        Some(dir) => session.render(&dir.to_string())?,
        None => String::new(),
    };

    for item in action.items.iter().filter(|item| !item.starts_with('#')) {
        let mut command = session.render(item)?;
        if !chdir.is_empty() {
            command = in_directory(&chdir, &command);
        }
        let output = session.run_ssh(&[command], action.shell_options())?;
        register(action, state, output);
    }
    Ok(())
}

fn make_dirs<T: Transport>(
    session: &mut Session<'_, T>,
    action: &Action,
    state: &mut HostState,
) -> Result<()> {
    if action.items.is_empty() {
        return Err(ActionError::config("missing attribute \"items\""));
    }

    let mut command = "mkdir -p ".to_owned();
    if let Some(mode) = action.extra.get("mode") {
        command.push_str(&format!("-m {} ", session.render(&mode.to_string())?));
    }
    command.push_str(&session.render(&action.items.join(" "))?);

    let output = session.run_ssh(&[command], action.shell_options())?;
    register(action, state, output);
    Ok(())
}

fn stat<T: Transport>(
    session: &mut Session<'_, T>,
    action: &Action,
    state: &mut HostState,
    kind: PathKind,
) -> Result<()> {
    let name = action.require_register()?;
    let path = session.render(&action.extra.require("path")?.to_string())?;

    // The output is parsed, so the bash wrapper stays off.
    let options = action.shell_options().without_bash();
    let flag = match kind {
        PathKind::Dir => 'd',
        PathKind::File => 'e',
    };

    let mut result = Map::new();
    result.insert("exists".into(), Value::Bool(false));

    if session.succeeds(&format!("test -{flag} \"{path}\""), options)? {
        let query = format!("stat --format=\"{}\" \"{path}\"", stat_format());
        match session.run_ssh(&[query], options) {
            Ok(output) => {
                result.insert("exists".into(), Value::Bool(true));
                result.extend(parse_stat(&output));
            }
            // Vanished between the two calls.
            Err(ActionError::Transport { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    state.results.record(name, Value::Object(result));
    Ok(())
}

/// `a:%a|A:%A|...` over [STAT_FIELDS].
pub fn stat_format() -> String {
    STAT_FIELDS
        .chars()
        .map(|c| format!("{c}:%{c}"))
        .collect::<Vec<_>>()
        .join("|")
}

/// Parses `stat` output in [stat_format] into a field mapping.
///
/// Each `|`-separated piece contributes one field. The key is the text before the first `:` and
/// the value everything after it, both trimmed. Pieces without a `:` are ignored.
///
/// ```
/// # use mindeploy::dispatch::parse_stat;
/// let fields = parse_stat("a:755|F:directory|Y:1688596626\n");
/// assert_eq!("755", fields["a"]);
/// assert_eq!("1688596626", fields["Y"]);
/// ```
pub fn parse_stat(output: &str) -> Map<String, Value> {
    output
        .split('|')
        .filter_map(|piece| piece.split_once(':'))
        .map(|(key, value)| (key.trim().to_owned(), Value::String(value.trim().to_owned())))
        .collect()
}

fn copy<T: Transport>(
    session: &mut Session<'_, T>,
    files_dir: &Path,
    action: &Action,
    state: &mut HostState,
) -> Result<()> {
    let destination = session.render(&action.extra.require("destination")?.to_string())?;
    let mode = session.render(&action.extra.text("mode"))?;
    let owner = session.render(&action.extra.text("owner"))?;
    let group = session.render(&action.extra.text("group"))?;

    for item in &action.items {
        let source = files_dir.join(session.render(item)?);
        if !source.is_file() {
            return Err(ActionError::FileNotFound(source.display().to_string()));
        }
        let source = source.to_string_lossy();
        let transfer = Transfer {
            source: &source,
            destination: &destination,
            ignore_existing: !action.extra.flag("force"),
            mode: &mode,
            owner: &owner,
            group: &group,
        };
        let output = session.run_rsync(&transfer, action.shell_options())?;
        register(action, state, output);
    }
    Ok(())
}
