//! Types for representing individual actions.

use crate::command::ShellOptions;
use crate::error::{ActionError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt::{self, Display};

/// The kinds of action the dispatcher knows how to run.
///
/// Unknown kinds deserialize to [ActionType::Other] rather than failing the whole action file.
/// Dispatching one is an error for that action alone.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ActionType {
    Command,
    Mkdirs,
    Message,
    StatDir,
    StatFile,
    Copy,
    Other(String),
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        use ActionType::*;
        match value.as_str() {
            "command" => Command,
            "mkdirs" => Mkdirs,
            "message" => Message,
            "stat_dir" => StatDir,
            "stat_file" => StatFile,
            "copy" => Copy,
            _ => Other(value),
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ActionType::*;
        let name = match self {
            Command => "command",
            Mkdirs => "mkdirs",
            Message => "message",
            StatDir => "stat_dir",
            StatFile => "stat_file",
            Copy => "copy",
            Other(name) => name,
        };
        f.write_str(name)
    }
}

/// One value in an action's `extra` parameters.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl ExtraValue {
    /// Truthiness as the action files expect it: `false`, `0` and `""` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            ExtraValue::Bool(b) => *b,
            ExtraValue::Int(i) => *i != 0,
            ExtraValue::String(s) => !s.is_empty(),
        }
    }
}

impl Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Bool(b) => write!(f, "{b}"),
            ExtraValue::Int(i) => write!(f, "{i}"),
            ExtraValue::String(s) => f.write_str(s),
        }
    }
}

/// Type-specific action parameters, e.g. `path`, `destination`, `mode`, `owner`, `group`, `force`.
///
/// Each handler in the dispatcher declares which keys it requires and validates them before it
/// runs anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Extra(pub IndexMap<String, ExtraValue>);

impl Extra {
    pub fn get(&self, key: &str) -> Option<&ExtraValue> {
        self.0.get(key)
    }

    /// Returns the parameter `key` or a [ActionError::Config] naming it.
    pub fn require(&self, key: &str) -> Result<&ExtraValue> {
        self.0
            .get(key)
            .ok_or_else(|| ActionError::config(format!("missing attribute extra[\"{key}\"]")))
    }

    /// Returns the parameter `key` as text, or an empty string if it is absent.
    pub fn text(&self, key: &str) -> String {
        self.0.get(key).map(ToString::to_string).unwrap_or_default()
    }

    /// Returns whether the parameter `key` is present and truthy.
    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(ExtraValue::is_truthy)
    }
}

/// One step of a deployment procedure.
///
/// An [Action] is loaded once and then replayed, unchanged, against every selected host. The
/// per-host outcome lives in [HostState](crate::core::HostState), never in the action itself.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Action {
    /// Display label.
    pub title: String,

    #[serde(rename = "type")]
    pub kind: ActionType,

    /// Run remote commands through `sudo`.
    #[serde(rename = "become")]
    pub elevate: bool,

    /// The account `sudo` switches to. Only meaningful when [Self::elevate] is set; empty
    /// means the default privileged account.
    #[serde(rename = "become_user")]
    pub elevate_user: String,

    /// Connection timeout in seconds. Zero means no timeout.
    pub timeout: u64,

    /// Wrap remote commands in `/bin/bash -c "cd && ..."`.
    pub wrap_bash: bool,

    /// Guard expression. The action is skipped for a host when it evaluates falsy.
    pub when: Option<String>,

    /// Name under which this action's result is stored in the host's registry.
    pub register: Option<String>,

    /// Command lines, message lines or file names, depending on [Self::kind].
    pub items: Vec<String>,

    pub extra: Extra,
}

impl Default for Action {
    fn default() -> Self {
        Action {
            title: String::new(),
            kind: ActionType::Other(String::new()),
            elevate: false,
            elevate_user: String::new(),
            timeout: 0,
            wrap_bash: true,
            when: None,
            register: None,
            items: Vec::new(),
            extra: Extra::default(),
        }
    }
}

impl Action {
    /// The guard expression, if one is declared. A blank `when` counts as no guard.
    pub fn guard(&self) -> Option<&str> {
        self.when.as_deref().filter(|w| !w.trim().is_empty())
    }

    /// The register name, if one is declared. A blank `register` counts as none.
    pub fn register_name(&self) -> Option<&str> {
        self.register.as_deref().filter(|r| !r.is_empty())
    }

    /// Returns the register name or a [ActionError::Config] if the action declares none.
    pub fn require_register(&self) -> Result<&str> {
        self.register_name()
            .ok_or_else(|| ActionError::config("missing attribute \"register\""))
    }

    /// The remote shell options this action asks for.
    pub fn shell_options(&self) -> ShellOptions<'_> {
        ShellOptions {
            elevate: self.elevate,
            elevate_user: &self.elevate_user,
            wrap_bash: self.wrap_bash,
            timeout: self.timeout,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{}: {}", self.kind, self.items.join("; "))
        } else {
            f.write_str(&self.title)
        }
    }
}

/// An action as written in an action file, before filtering.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActionRecord {
    /// Used to select a subset of actions on the command line.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Disabled actions are dropped at load time.
    #[serde(default)]
    pub disabled: bool,

    #[serde(flatten)]
    pub action: Action,
}

impl ActionRecord {
    /// Whether any of this record's tags appears in `tags`.
    pub fn matches_any(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|tag| tags.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod deserialize {
        use super::*;

        #[test]
        fn applies_defaults() {
            let action: Action = serde_yaml::from_str("type: command\nitems: [whoami]").unwrap();
            assert_eq!(ActionType::Command, action.kind);
            assert!(action.wrap_bash);
            assert!(!action.elevate);
            assert_eq!(0, action.timeout);
            assert_eq!(None, action.guard());
            assert_eq!(None, action.register_name());
        }

        #[test]
        fn reads_json() {
            let json = r#"{
                "title": "Collect file stats",
                "type": "stat_file",
                "become": true,
                "become_user": "deploy",
                "register": "result1",
                "extra": {"path": "/home/{{username}}/logs/access.log", "force": false, "mode": 644}
            }"#;
            let action: Action = serde_yaml::from_str(json).unwrap();
            assert_eq!(ActionType::StatFile, action.kind);
            assert!(action.elevate);
            assert_eq!("deploy", action.elevate_user);
            assert_eq!(Some("result1"), action.register_name());
            assert_eq!(
                Some(&ExtraValue::Bool(false)),
                action.extra.get("force"),
            );
            assert_eq!(Some(&ExtraValue::Int(644)), action.extra.get("mode"));
            assert_eq!("644", action.extra.text("mode"));
        }

        #[test]
        fn keeps_unknown_types() {
            let action: Action = serde_yaml::from_str("type: template").unwrap();
            assert_eq!(ActionType::Other("template".into()), action.kind);
        }

        #[test]
        fn record_carries_tags_and_disabled() {
            let yaml = "type: message\nitems: [hi]\ntags: [testme]\ndisabled: true\n";
            let record: ActionRecord = serde_yaml::from_str(yaml).unwrap();
            assert!(record.disabled);
            assert!(record.matches_any(&["testme".to_string()]));
            assert!(!record.matches_any(&["other".to_string()]));
            assert_eq!(ActionType::Message, record.action.kind);
        }
    }

    mod extra {
        use super::*;

        #[test]
        fn require_names_missing_key() {
            let err = Extra::default().require("path").unwrap_err();
            assert_eq!("missing attribute extra[\"path\"]", err.to_string());
        }

        #[test]
        fn flag_uses_truthiness() {
            let extra = Extra(IndexMap::from([
                ("a".to_string(), ExtraValue::String("yes".into())),
                ("b".to_string(), ExtraValue::String(String::new())),
                ("c".to_string(), ExtraValue::Int(0)),
            ]));
            assert!(extra.flag("a"));
            assert!(!extra.flag("b"));
            assert!(!extra.flag("c"));
            assert!(!extra.flag("missing"));
        }
    }

    #[test]
    fn blank_guard_is_no_guard() {
        let action = Action {
            when: Some("  ".into()),
            ..Action::default()
        };
        assert_eq!(None, action.guard());
    }

    #[test]
    fn require_register_fails_without_name() {
        let action = Action {
            register: Some(String::new()),
            ..Action::default()
        };
        assert!(matches!(
            action.require_register(),
            Err(ActionError::Config(_))
        ));
    }

    #[test]
    fn display_falls_back_to_kind_and_items() {
        let action = Action {
            kind: ActionType::Command,
            items: vec!["echo hi".into(), "pwd".into()],
            ..Action::default()
        };
        assert_eq!("command: echo hi; pwd", action.to_string());
    }
}
