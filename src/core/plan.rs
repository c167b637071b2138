//! Loading the hosts, variables and actions of one run.

use crate::config::{resolve_definition_file, Settings};
use crate::core::action::{Action, ActionRecord};
use crate::core::context::Context;
use crate::core::host::{Host, HostRecord};
use anyhow::{bail, Context as _};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Selects every enabled host.
pub const ALL_HOSTS: &str = "*";

/// Everything a run needs: the selected hosts, and the actions to replay on each, in order.
///
/// Disabled records and actions filtered out by tag never make it into a [Plan].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    pub hosts: Vec<Host>,
    pub actions: Vec<Action>,
}

impl Plan {
    /// Reads the definition files named in `settings`.
    ///
    /// `selection` names the hosts to deploy to, or contains [ALL_HOSTS]. When `tags` is not
    /// empty, only actions carrying at least one of them are kept. A missing vars file counts as
    /// no global variables; every other problem is an error.
    pub fn load(
        settings: &Settings,
        selection: &[String],
        tags: &[String],
    ) -> anyhow::Result<Self> {
        let hosts: IndexMap<String, HostRecord> = read_definition(&settings.hosts_file)?;

        let vars_file = resolve_definition_file(&settings.vars_file);
        let vars: Context = match vars_file.try_exists() {
            Ok(true) => read_definition(&vars_file)?,
            _ => {
                debug!("no vars file at {}", vars_file.display());
                Context::new()
            }
        };

        let actions: Vec<ActionRecord> = read_definition(&settings.actions_file)?;

        Ok(Plan {
            hosts: select_hosts(hosts, &vars, selection)?,
            actions: select_actions(actions, tags),
        })
    }
}

/// Parses a JSON or YAML definition file.
pub fn read_definition<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let path = resolve_definition_file(path);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Builds the selected, enabled hosts in file order, merging `global` variables into each.
///
/// # Errors
///
/// Fails if `selection` names a host that is not in `records` or is disabled. The error lists
/// the hosts that could have been selected.
pub fn select_hosts(
    records: IndexMap<String, HostRecord>,
    global: &Context,
    selection: &[String],
) -> anyhow::Result<Vec<Host>> {
    let enabled: IndexMap<String, HostRecord> = records
        .into_iter()
        .filter(|(name, record)| {
            if record.disabled {
                warn!("ignoring disabled host {name}");
            }
            !record.disabled
        })
        .collect();

    let all = selection.iter().any(|name| name == ALL_HOSTS);
    if !all {
        for name in selection {
            if !enabled.contains_key(name) {
                let available: Vec<&str> = enabled.keys().map(String::as_str).collect();
                bail!(
                    "unknown host \"{name}\"; available hosts: {}",
                    available.join(", ")
                );
            }
        }
    }

    Ok(enabled
        .into_iter()
        .filter(|(name, _)| all || selection.contains(name))
        .map(|(name, record)| Host::from_record(name, record, global))
        .collect())
}

/// Drops disabled records, then keeps those matching `tags` if any are given.
pub fn select_actions(records: Vec<ActionRecord>, tags: &[String]) -> Vec<Action> {
    records
        .into_iter()
        .filter(|record| {
            if record.disabled {
                warn!("ignoring disabled action {}", record.action);
            }
            !record.disabled
        })
        .filter(|record| tags.is_empty() || record.matches_any(tags))
        .map(|record| record.action)
        .collect()
}
