//! The run loop: every action, in order, against every host that has not failed yet.

use crate::core::{HostState, Plan};
use crate::dispatch::{Dispatcher, Outcome};
use crate::report::Report;
use crate::transport::Transport;
use chrono::{DateTime, Local, TimeDelta};
use std::io;
use tracing::{debug, warn};

/// One host's final state.
#[derive(Clone, Debug, PartialEq)]
pub struct HostSummary {
    pub name: String,
    pub state: HostState,
}

/// What happened during a run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,

    /// In the plan's host order.
    pub hosts: Vec<HostSummary>,
}

impl RunSummary {
    pub fn elapsed(&self) -> TimeDelta {
        self.finished - self.started
    }

    /// The final state of the host named `name`.
    pub fn state(&self, name: &str) -> Option<&HostState> {
        self.hosts.iter().find(|h| h.name == name).map(|h| &h.state)
    }

    /// Names of the hosts that stopped on a failed action.
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| !h.state.is_active())
            .map(|h| h.name.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.hosts.iter().all(|h| h.state.is_active())
    }
}

/// Replays `plan` through `dispatcher`.
///
/// Actions form the outer loop and hosts the inner one, so every host finishes action `n` before
/// any host starts action `n + 1`. A host whose action fails gets no further actions. The other
/// hosts carry on.
///
/// Action failures never abort the run. They are counted in the returned summary.
pub fn run_plan<T: Transport, R: Report>(
    plan: &Plan,
    dispatcher: &mut Dispatcher<T, R>,
) -> RunSummary {
    let started = Local::now();
    let mut states = vec![HostState::default(); plan.hosts.len()];

    for action in &plan.actions {
        for (host, state) in plan.hosts.iter().zip(states.iter_mut()) {
            if !state.is_active() {
                debug!(host = %host.name, "excluded after a failure, skipping {action}");
                continue;
            }

            report(dispatcher.reporter().starting(&host.name, action));
            match dispatcher.dispatch(action, host, state) {
                Ok(Outcome::Succeeded) => state.succeeded += 1,
                Ok(Outcome::Skipped) => {
                    state.skipped += 1;
                    report(dispatcher.reporter().skipped(&host.name, action));
                }
                Err(error) => {
                    state.errors += 1;
                    debug!(host = %host.name, ?error);
                    warn!(
                        host = %host.name,
                        "action failed, skipping remaining actions for this host"
                    );
                    report(dispatcher.reporter().failed(&host.name, action, &error));
                }
            }
        }
    }

    let summary = RunSummary {
        started,
        finished: Local::now(),
        hosts: plan
            .hosts
            .iter()
            .zip(states)
            .map(|(host, state)| HostSummary {
                name: host.name.clone(),
                state,
            })
            .collect(),
    };
    report(dispatcher.reporter().summary(&summary));
    summary
}

// Output trouble is not an action failure.
fn report(result: io::Result<()>) {
    if let Err(e) = result {
        warn!("failed to write output: {e}");
    }
}

#[cfg(test)]
mod test;
