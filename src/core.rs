//! Provides types that represent the user's instructions: hosts, variables and actions.

pub mod action;
pub mod context;
pub mod host;
pub mod plan;

#[doc(inline)]
pub use action::{Action, ActionRecord, ActionType, Extra, ExtraValue};

#[doc(inline)]
pub use context::Context;

#[doc(inline)]
pub use host::{Host, HostRecord, HostState};

#[doc(inline)]
pub use plan::Plan;
