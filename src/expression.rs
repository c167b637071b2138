//! The expression language of `when` guards and `message` items.
//!
//! An expression is first rendered as a template against the host's context, then classified by
//! its leading text. The first matching prefix wins:
//!
//! | prefix             | meaning                                                       |
//! |--------------------|---------------------------------------------------------------|
//! | `results[`         | the whole text, evaluated with the host's registry in scope   |
//! | `eval(`            | the inner text, evaluated with `self` and `results` in scope  |
//! | `not_exists_dir(`  | the inner text names a path; true if it is not a directory    |
//! | `exists_dir(`      | true if the path is a directory on the host                   |
//! | `not_exists_file(` | true if the path does not exist                               |
//! | `exists_file(`     | true if the path exists                                       |
//! | anything else      | the text itself, as a string                                  |
//!
//! The "inner text" runs from the prefix's `(` to the *first* `)` in the expression. Nested
//! parentheses are therefore not supported: `eval((1 + 2) * 3)` evaluates `(1 + 2`, which is a
//! syntax error.
//!
//! Inner text is evaluated by the small grammar in [embedded].

pub mod embedded;

use crate::core::{Action, Host, HostState};
use crate::error::{ActionError, Result};
use crate::template;
use embedded::Scope;
use serde_json::{json, Value};

pub use embedded::is_truthy;

/// Which kind of remote path a path check asks about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    /// `test -d`
    Dir,
    /// `test -e`
    File,
}

/// A classified, rendered expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    /// `results[...]`, kept whole.
    ResultLookup(String),

    /// The inner text of `eval(...)`.
    RawEval(String),

    /// One of the four path checks. `path_expr` is the inner text.
    PathCheck {
        negate: bool,
        kind: PathKind,
        path_expr: String,
    },

    Literal(String),
}

const PATH_CHECKS: [(&str, bool, PathKind); 4] = [
    ("not_exists_dir(", true, PathKind::Dir),
    ("exists_dir(", false, PathKind::Dir),
    ("not_exists_file(", true, PathKind::File),
    ("exists_file(", false, PathKind::File),
];

impl Expression {
    /// Classifies already rendered text.
    ///
    /// ```
    /// # use mindeploy::expression::{Expression, PathKind};
    /// assert_eq!(
    ///     Expression::PathCheck {
    ///         negate: true,
    ///         kind: PathKind::Dir,
    ///         path_expr: "'/srv/app'".into(),
    ///     },
    ///     Expression::parse("not_exists_dir('/srv/app')").unwrap(),
    /// );
    /// assert_eq!(Expression::Literal("hello".into()), Expression::parse("hello").unwrap());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        if text.starts_with("results[") {
            return Ok(Expression::ResultLookup(text.to_owned()));
        }
        if text.starts_with("eval(") {
            return Ok(Expression::RawEval(inner(text)?.to_owned()));
        }
        for (prefix, negate, kind) in PATH_CHECKS {
            if text.starts_with(prefix) {
                return Ok(Expression::PathCheck {
                    negate,
                    kind,
                    path_expr: inner(text)?.to_owned(),
                });
            }
        }
        Ok(Expression::Literal(text.to_owned()))
    }
}

// The text between the first `(` and the first `)`.
fn inner(text: &str) -> Result<&str> {
    let open = text.find('(').map(|i| i + 1).unwrap_or_default();
    let close = text
        .find(')')
        .ok_or_else(|| ActionError::invalid_expression(text, "missing ')'"))?;
    Ok(text.get(open..close).unwrap_or_default())
}

/// Answers remote path checks on behalf of the evaluator.
pub trait PathProbe {
    /// Whether `path` exists on the host as the given kind. `action`, if any, supplies the
    /// privilege settings the check runs with.
    fn path_exists(&mut self, path: &str, kind: PathKind, action: Option<&Action>) -> Result<bool>;
}

/// Renders, classifies and evaluates `expression` for one host.
pub fn evaluate(
    expression: &str,
    host: &Host,
    state: &HostState,
    action: Option<&Action>,
    probe: &mut dyn PathProbe,
) -> Result<Value> {
    let rendered = template::render(expression, &host.context)?;
    let scope = HostScope { host, state };

    match Expression::parse(&rendered)? {
        Expression::ResultLookup(code) | Expression::RawEval(code) => {
            embedded::evaluate(&code, &scope)
        }
        Expression::PathCheck {
            negate,
            kind,
            path_expr,
        } => {
            let path = display(&embedded::evaluate(&path_expr, &scope)?);
            let exists = probe.path_exists(&path, kind, action)?;
            Ok(Value::Bool(exists != negate))
        }
        Expression::Literal(text) => Ok(Value::String(text)),
    }
}

/// How an evaluated value is shown to the operator.
///
/// ```
/// # use mindeploy::expression::display;
/// # use serde_json::json;
/// assert_eq!("v1.2", display(&json!("  v1.2\n")));
/// assert_eq!("true", display(&json!(true)));
/// assert_eq!("", display(&json!(null)));
/// assert_eq!(r#"{"exists":false}"#, display(&json!({"exists": false})));
/// ```
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Names visible to embedded code.
struct HostScope<'a> {
    host: &'a Host,
    state: &'a HostState,
}

impl Scope for HostScope<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        match name {
            "results" => Some(self.state.results.to_value()),
            "self" => Some(json!({
                "name": self.host.name,
                "address": self.host.address,
                "ssh_user": self.host.ssh_user,
                "errors": self.state.errors,
                "results": self.state.results.to_value(),
                "context": self.host.context,
            })),
            _ => None,
        }
    }
}
