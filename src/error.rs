//! The errors that can end a single [Action] on a single host.
//!
//! None of these are fatal to a run. The run loop catches every [ActionError] at the dispatcher
//! boundary, counts it against the host, and keeps going with the other hosts.
//!
//! [Action]: crate::core::Action

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    /// A required action field or `extra` parameter is missing or malformed.
    #[error("{0}")]
    Config(String),

    #[error("unknown action type \"{0}\"")]
    UnknownActionType(String),

    #[error("undefined variable `{name}` in template: {template}")]
    UndefinedVariable { name: String, template: String },

    #[error("template did not settle after {passes} rendering passes: {template}")]
    UnstableTemplate { passes: usize, template: String },

    /// Any other template failure, e.g. a syntax error.
    #[error("template error: {0}")]
    Template(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid expression \"{expression}\": {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("command exited with {}: {command}", exit_code_message(.code))]
    Transport {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to start command: {command}")]
    TransportUnavailable {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("file \"{0}\" not found")]
    FileNotFound(String),

    /// Writing to the operator's terminal failed.
    #[error("failed to write output")]
    Output(#[source] io::Error),
}

impl ActionError {
    /// Shorthand for [ActionError::Config].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.to_owned(),
            reason: reason.into(),
        }
    }
}

fn exit_code_message(code: &Option<i32>) -> String {
    match code {
        Some(i) => format!("exit code {i}"),
        None => "error".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ActionError>;
