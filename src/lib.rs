//! Replays a declarative list of deployment actions against remote hosts over SSH and rsync.
//!
//! # Definition files
//!
//! A run reads three files, each JSON or YAML:
//!
//! * a hosts file mapping host names to an `address`, an optional `ssh_user`, host-level `vars`
//!   and a `disabled` flag,
//! * a vars file holding global template variables,
//! * an actions file holding the ordered list of [Action]s.
//!
//! # Program flow
//!
//! 1. [Plan::load] reads the files, drops disabled records, and applies host and tag selection.
//!
//! 2. [run_plan] walks the actions in order. For each action it visits every host that has not
//!    failed yet and hands the pair to the [Dispatcher](dispatch::Dispatcher).
//!
//! 3. The dispatcher evaluates the action's `when` guard with the [expression] language, renders
//!    every template against the host's variables with [template], builds `ssh` or `rsync`
//!    command lines with [command], and runs them through a [Transport](transport::Transport).
//!    Results named by `register` go into the host's [Registry](registry::Registry), where later
//!    guards and messages can read them.
//!
//! 4. A failed action counts against its host, which then receives nothing further. The other
//!    hosts carry on. [run_plan] returns a [RunSummary](run_plan::RunSummary).
//!
//! [Action]: core::Action
//! [Plan::load]: core::Plan::load

pub mod command;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod expression;
pub mod registry;
pub mod report;
pub mod run_plan;
pub mod session;
pub mod template;
pub mod transport;

#[doc(inline)]
pub use run_plan::run_plan;
