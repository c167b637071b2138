//! Types for representing deploy targets and their per-run state.

use crate::core::context::{self, Context};
use crate::registry::Registry;
use serde::Deserialize;
use std::fmt::{self, Display};

/// One deploy target.
///
/// A [Host] is built once per run and never changes. Everything that changes while the run
/// proceeds lives in a separate [HostState].
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    /// Unique key, as written in the hosts file.
    pub name: String,

    /// Hostname or IP address handed to `ssh` and `rsync`.
    pub address: String,

    /// The login user. If empty, the transport's default applies.
    pub ssh_user: Option<String>,

    /// Global variables merged with this host's own variables.
    pub context: Context,
}

impl Host {
    /// Builds a host from its hosts-file record, merging `global` variables under the host's.
    pub fn from_record(name: impl Into<String>, record: HostRecord, global: &Context) -> Self {
        Host {
            name: name.into(),
            address: record.address,
            ssh_user: record.ssh_user.filter(|u| !u.is_empty()),
            context: context::merge(global, &record.vars),
        }
    }

    /// The `[user@]address` form used on `ssh` and `rsync` command lines.
    pub fn remote_address(&self) -> String {
        match &self.ssh_user {
            Some(user) => format!("{user}@{}", self.address),
            None => self.address.clone(),
        }
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A host as written in the hosts file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostRecord {
    pub address: String,

    #[serde(default)]
    pub ssh_user: Option<String>,

    /// Host-level variables. These override global variables of the same name.
    #[serde(default)]
    pub vars: Context,

    /// Disabled hosts are dropped at load time.
    #[serde(default)]
    pub disabled: bool,
}

/// The mutable execution state of one host during a run.
///
/// Only the run loop's single thread touches this, one host at a time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostState {
    /// Failed actions. Once this is non-zero, the host receives no further actions.
    pub errors: u32,

    /// Results registered by earlier actions.
    pub results: Registry,

    /// Actions that ran to completion.
    pub succeeded: u32,

    /// Actions whose guard evaluated falsy.
    pub skipped: u32,
}

impl HostState {
    /// Whether the host may still receive actions.
    pub fn is_active(&self) -> bool {
        self.errors == 0
    }

    /// Total actions handed to the dispatcher for this host.
    pub fn dispatched(&self) -> u32 {
        self.succeeded + self.skipped + self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_record_merges_vars() {
        let record: HostRecord = serde_yaml::from_str(
            r#"{"address": "10.0.0.5", "ssh_user": "master", "vars": {"username": "web"}}"#,
        )
        .unwrap();
        let global = Context::from([
            ("username".into(), json!("nobody")),
            ("project".into(), json!("shop")),
        ]);
        let host = Host::from_record("staging", record, &global);
        assert_eq!("staging", host.name);
        assert_eq!(json!("web"), host.context["username"]);
        assert_eq!(json!("shop"), host.context["project"]);
        assert_eq!("master@10.0.0.5", host.remote_address());
    }

    #[test]
    fn empty_ssh_user_is_none() {
        let record = HostRecord {
            address: "example.com".into(),
            ssh_user: Some(String::new()),
            ..HostRecord::default()
        };
        let host = Host::from_record("prod", record, &Context::new());
        assert_eq!("example.com", host.remote_address());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<HostRecord, _> =
            serde_yaml::from_str(r#"{"address": "a", "adress": "b"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn state_counts_dispatches() {
        let state = HostState {
            errors: 1,
            succeeded: 3,
            skipped: 2,
            ..HostState::default()
        };
        assert!(!state.is_active());
        assert_eq!(6, state.dispatched());
    }
}
