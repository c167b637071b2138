//! Drives whole runs: definition files on disk, through [Plan::load] and [run_plan], against a
//! scripted transport.

use mindeploy::config::Settings;
use mindeploy::core::{Action, Plan};
use mindeploy::dispatch::Dispatcher;
use mindeploy::error::ActionError;
use mindeploy::report::Report;
use mindeploy::run_plan::{run_plan, RunSummary};
use mindeploy::transport::{Transport, TransportOutput};
use serde_json::json;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempDir;

/// Answers command lines containing a pattern with a canned result; anything else succeeds
/// silently. Records every command line.
#[derive(Default)]
struct ScriptedTransport {
    rules: Vec<(&'static str, TransportOutput)>,
    commands: Vec<String>,
}

impl ScriptedTransport {
    fn on(mut self, pattern: &'static str, output: TransportOutput) -> Self {
        self.rules.push((pattern, output));
        self
    }

    fn answer(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        self.commands.push(command_line.to_owned());
        Ok(self
            .rules
            .iter()
            .find(|(pattern, _)| command_line.contains(pattern))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| TransportOutput::ok("")))
    }

    fn commands_for(&self, address: &str) -> Vec<&str> {
        self.commands
            .iter()
            .filter(|c| c.contains(address))
            .map(String::as_str)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn run_command(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        self.answer(command_line)
    }

    fn transfer_file(&mut self, command_line: &str) -> io::Result<TransportOutput> {
        self.answer(command_line)
    }
}

#[derive(Default)]
struct Messages {
    lines: Vec<String>,
    failures: Vec<String>,
}

impl Report for Messages {
    fn starting(&mut self, _: &str, _: &Action) -> io::Result<()> {
        Ok(())
    }

    fn skipped(&mut self, host: &str, action: &Action) -> io::Result<()> {
        self.lines.push(format!("{host}: skipped {action}"));
        Ok(())
    }

    fn message(&mut self, host: &str, line: &str) -> io::Result<()> {
        self.lines.push(format!("{host}: {line}"));
        Ok(())
    }

    fn failed(&mut self, host: &str, _: &Action, error: &ActionError) -> io::Result<()> {
        self.failures.push(format!("{host}: {error}"));
        Ok(())
    }

    fn summary(&mut self, _: &RunSummary) -> io::Result<()> {
        Ok(())
    }
}

const HOSTS: &str = r#"{
    "A": {"address": "a.example.com", "ssh_user": "master"},
    "B": {"address": "b.example.com", "vars": {"username": "shop"}},
    "C": {"address": "c.example.com", "disabled": true}
}"#;

const VARS: &str = r#"{"username": "web", "logs": "/home/{{ username }}/logs"}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(actions: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hosts.json"), HOSTS).unwrap();
        fs::write(dir.path().join("vars.json"), VARS).unwrap();
        fs::write(dir.path().join("deployment.json"), actions).unwrap();
        fs::create_dir(dir.path().join("files")).unwrap();
        Workspace { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn settings(&self) -> Settings {
        Settings {
            hosts_file: self.path().join("hosts.json"),
            vars_file: self.path().join("vars.json"),
            actions_file: self.path().join("deployment"),
            files_dir: self.path().join("files"),
            ..Settings::default()
        }
    }

    fn run(
        &self,
        settings: &Settings,
        tags: &[&str],
        transport: &mut ScriptedTransport,
        messages: &mut Messages,
    ) -> RunSummary {
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let plan = Plan::load(settings, &["*".to_owned()], &tags).unwrap();
        let mut dispatcher = Dispatcher::new(transport, messages, settings.dispatch_options());
        run_plan(&plan, &mut dispatcher)
    }
}

#[test]
fn failure_on_one_host_leaves_the_other_untouched() {
    let workspace = Workspace::new(
        r#"[
            {"title": "Greet", "type": "command", "items": ["echo hi"]},
            {"title": "Build", "type": "command", "items": ["make"]},
            {"title": "Done", "type": "message", "items": ["done"]}
        ]"#,
    );
    let mut transport = ScriptedTransport::default()
        .on("a.example.com", TransportOutput::failed("Permission denied\n", 255));
    let mut messages = Messages::default();

    let summary = workspace.run(&workspace.settings(), &[], &mut transport, &mut messages);

    let a = summary.state("A").unwrap();
    let b = summary.state("B").unwrap();
    assert_eq!(1, a.errors);
    assert_eq!(1, transport.commands_for("a.example.com").len());
    assert_eq!(0, b.errors);
    assert_eq!(3, b.succeeded);
    assert_eq!(2, transport.commands_for("b.example.com").len());
    assert_eq!(vec!["B: done"], messages.lines);
    assert_eq!(1, messages.failures.len());
    assert!(messages.failures[0].starts_with("A: command exited with exit code 255"));
    assert!(summary.state("C").is_none());
}

#[test]
fn stat_results_drive_later_guards() {
    let workspace = Workspace::new(
        r#"[
            {
                "title": "Collect log stats",
                "type": "stat_file",
                "become": true,
                "register": "log",
                "extra": {"path": "{{ logs }}/access.log"}
            },
            {
                "title": "present",
                "type": "message",
                "items": ["size eval(self.results['log']['s'])", "eval(results['log']['s'])"],
                "when": "eval(self.results['log']['exists'])"
            },
            {
                "title": "absent",
                "type": "message",
                "items": ["no log for {{ username }}"],
                "when": "eval(not self.results['log']['exists'])"
            }
        ]"#,
    );
    let stat_output = "a:644|A:-rw-r--r--|F:regular file|g:1003|G:web|i:683581|\
        n:/home/web/logs/access.log|N:'/home/web/logs/access.log'|s:4096|u:1003|U:web|\
        X:1688596627|Y:1688596626|Z:1688596626\n";
    let mut transport = ScriptedTransport::default()
        .on("b.example.com \"sudo -H --non-interactive test -e", TransportOutput::failed("", 1))
        .on("stat --format", TransportOutput::ok(stat_output));
    let mut messages = Messages::default();

    let summary = workspace.run(&workspace.settings(), &[], &mut transport, &mut messages);

    let a = summary.state("A").unwrap();
    let b = summary.state("B").unwrap();
    let log = a.results.get("log").unwrap().as_object().unwrap();
    assert_eq!(15, log.len());
    assert_eq!(json!(true), log["exists"]);
    assert_eq!(Some(&json!({"exists": false})), b.results.get("log"));
    assert_eq!(
        vec![
            "A: size eval(self.results['log']['s'])",
            "A: 4096",
            "B: skipped present",
            "A: skipped absent",
            "B: no log for shop",
        ],
        messages.lines
    );
    assert!(transport.commands_for("a.example.com")[0]
        .contains(r#"sudo -H --non-interactive test -e \"/home/web/logs/access.log\""#));
}

#[test]
fn tags_select_actions() {
    let workspace = Workspace::new(
        r#"[
            {"type": "command", "items": ["migrate"], "tags": ["db"]},
            {"type": "command", "items": ["restart"], "tags": ["web"]},
            {"type": "command", "items": ["vacuum"], "tags": ["db"], "disabled": true}
        ]"#,
    );
    let mut transport = ScriptedTransport::default();
    let mut messages = Messages::default();

    workspace.run(&workspace.settings(), &["db"], &mut transport, &mut messages);

    assert_eq!(2, transport.commands.len());
    assert!(transport.commands.iter().all(|c| c.contains("migrate")));
}

#[test]
fn dry_run_builds_but_never_runs() {
    let workspace = Workspace::new(
        r#"[
            {"type": "mkdirs", "items": ["{{ logs }}"], "extra": {"mode": 750}},
            {"type": "stat_dir", "register": "d", "extra": {"path": "{{ logs }}"}},
            {"type": "message", "items": ["eval(self.results['d'])"]}
        ]"#,
    );
    let settings = Settings {
        dry_run: true,
        ..workspace.settings()
    };
    let mut transport = ScriptedTransport::default();
    let mut messages = Messages::default();

    let summary = workspace.run(&settings, &[], &mut transport, &mut messages);

    assert!(summary.is_success());
    assert!(transport.commands.is_empty());
    assert_eq!(
        vec![r#"A: {"exists":false}"#, r#"B: {"exists":false}"#],
        messages.lines
    );
}

#[test]
fn copy_resolves_against_files_dir() {
    let workspace = Workspace::new(
        r#"[
            {
                "type": "copy",
                "items": ["nginx.conf"],
                "become": true,
                "extra": {"destination": "/etc/nginx/", "owner": "root", "group": "root", "force": true}
            }
        ]"#,
    );
    fs::write(workspace.path().join("files/nginx.conf"), "worker_processes 1;\n").unwrap();
    let mut transport = ScriptedTransport::default();
    let mut messages = Messages::default();

    let summary = workspace.run(&workspace.settings(), &[], &mut transport, &mut messages);

    assert!(summary.is_success());
    let source = workspace.path().join("files/nginx.conf");
    assert_eq!(
        vec![format!(
            "rsync -avz --progress --chown=\"root:root\" --rsync-path=\"sudo -u root rsync\" \
            \"{}\" \"master@a.example.com:/etc/nginx/\"",
            source.display()
        )],
        transport.commands_for("a.example.com")
    );
}

#[test]
fn unknown_action_type_fails_every_host_without_aborting() {
    let workspace = Workspace::new(
        r#"[
            {"title": "Render", "type": "template", "items": ["x"]},
            {"type": "command", "items": ["never"]}
        ]"#,
    );
    let mut transport = ScriptedTransport::default();
    let mut messages = Messages::default();

    let summary = workspace.run(&workspace.settings(), &[], &mut transport, &mut messages);

    assert_eq!(vec!["A", "B"], summary.failed_hosts());
    assert!(transport.commands.is_empty());
    assert_eq!(
        vec![
            "A: unknown action type \"template\"",
            "B: unknown action type \"template\"",
        ],
        messages.failures
    );
}
