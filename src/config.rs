//! Run settings: where the definition files live and how the transport behaves.

use crate::dispatch::DispatchOptions;
use crate::session::SessionOptions;
use std::path::{Path, PathBuf};

/// Extensions tried, in order, for a definition file named without one.
pub const DEFINITION_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Mapping of host name to host record.
    pub hosts_file: PathBuf,

    /// Global template variables, merged under every host's own `vars`.
    pub vars_file: PathBuf,

    /// Ordered list of action records.
    pub actions_file: PathBuf,

    /// Root that `copy` items are resolved against.
    pub files_dir: PathBuf,

    pub dry_run: bool,
    pub extra_debug: bool,
    pub colorize: bool,

    /// Inserted right after `ssh` on every remote command line.
    pub ssh_options: String,

    /// Inserted before the source argument of every `rsync` command line.
    pub rsync_options: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hosts_file: "hosts.json".into(),
            vars_file: "vars.json".into(),
            actions_file: "deployment".into(),
            files_dir: "files".into(),
            dry_run: false,
            extra_debug: false,
            colorize: true,
            ssh_options: String::new(),
            rsync_options: String::new(),
        }
    }
}

impl Settings {
    /// The settings the dispatcher needs, with `~/` expanded in the files root.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            session: SessionOptions {
                dry_run: self.dry_run,
                ssh_options: self.ssh_options.clone(),
                rsync_options: self.rsync_options.clone(),
            },
            files_dir: expand_home(&self.files_dir),
            extra_debug: self.extra_debug,
        }
    }
}

/// Replaces a leading `~/` with the current user's home directory.
///
/// Other paths, and every path when no home directory can be determined, are returned as is.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_owned(),
    }
}

/// Finds the file a definition path refers to.
///
/// A path ending in one of [DEFINITION_EXTENSIONS] is used as is (after `~/` expansion). Any
/// other path, dotted or not, gets each extension appended in turn and the first file that exists
/// wins. If none exists, the `.json` form is returned so that the error names it.
pub fn resolve_definition_file(path: &Path) -> PathBuf {
    let path = expand_home(path);
    let known = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DEFINITION_EXTENSIONS.contains(&ext));
    if known {
        return path;
    }

    let with_extension = |ext: &str| PathBuf::from(format!("{}.{ext}", path.display()));
    DEFINITION_EXTENSIONS
        .iter()
        .map(|ext| with_extension(ext))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| with_extension(DEFINITION_EXTENSIONS[0]))
}
