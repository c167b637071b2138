use super::*;
use crate::core::fixtures::{command_action, host, TestReporter, TestTransport};
use crate::core::Action;
use crate::dispatch::DispatchOptions;

fn plan(hosts: &[&str], actions: Vec<Action>) -> Plan {
    Plan {
        hosts: hosts.iter().map(|name| host(name)).collect(),
        actions,
    }
}

fn run(plan: &Plan, transport: &mut TestTransport, reporter: &mut TestReporter) -> RunSummary {
    let mut dispatcher = Dispatcher::new(transport, reporter, DispatchOptions::default());
    run_plan(plan, &mut dispatcher)
}

#[test]
fn failing_host_is_excluded_while_others_continue() {
    let plan = plan(
        &["A", "B"],
        vec![command_action(&["echo hi"]), command_action(&["echo bye"])],
    );
    let mut transport = TestTransport::new();
    transport.fail("A.example.com", "connection refused\n");
    let mut reporter = TestReporter::new();

    let summary = run(&plan, &mut transport, &mut reporter);

    let a = summary.state("A").unwrap();
    let b = summary.state("B").unwrap();
    assert_eq!(1, a.errors);
    assert_eq!(1, a.dispatched());
    assert_eq!(0, b.errors);
    assert_eq!(2, b.succeeded);

    let a_commands = transport
        .commands()
        .into_iter()
        .filter(|c| c.contains("A.example.com"))
        .count();
    assert_eq!(1, a_commands);
    assert_eq!(3, transport.commands().len());

    assert!(!summary.is_success());
    assert_eq!(vec!["A"], summary.failed_hosts());
}

#[test]
fn actions_are_the_outer_loop() {
    let plan = plan(
        &["A", "B"],
        vec![command_action(&["first"]), command_action(&["second"])],
    );
    let mut transport = TestTransport::new();
    let mut reporter = TestReporter::new();

    run(&plan, &mut transport, &mut reporter);

    let order: Vec<_> = transport
        .commands()
        .iter()
        .map(|c| {
            let host = if c.contains("A.example.com") { "A" } else { "B" };
            let step = if c.contains("first") { "first" } else { "second" };
            format!("{host}:{step}")
        })
        .collect();
    assert_eq!(vec!["A:first", "B:first", "A:second", "B:second"], order);
}

#[test]
fn reports_every_event() {
    let mut skipped = command_action(&["never"]);
    skipped.title = "Maybe".into();
    skipped.when = Some("eval(False)".into());
    let plan = plan(&["A"], vec![skipped, command_action(&["make"])]);
    let mut transport = TestTransport::new();
    transport.fail("make", "");
    let mut reporter = TestReporter::new();

    run(&plan, &mut transport, &mut reporter);

    assert_eq!(
        vec![
            "starting [A] Maybe".to_owned(),
            "skipped [A] Maybe".to_owned(),
            "starting [A] command: make".to_owned(),
            format!(
                "failed [A] command: make: command exited with exit code 1: {}",
                r#"ssh deploy@A.example.com "/bin/bash -c \"cd && make\"""#
            ),
            "summary 1 hosts".to_owned(),
        ],
        reporter.events
    );
}

#[test]
fn registry_is_per_host() {
    let mut register = command_action(&["hostname"]);
    register.register = Some("name".into());
    let plan = plan(&["A", "B"], vec![register]);
    let mut transport = TestTransport::new();
    transport.respond("A.example.com", "a-box\n");
    transport.respond("B.example.com", "b-box\n");
    let mut reporter = TestReporter::new();

    let summary = run(&plan, &mut transport, &mut reporter);

    let a = summary.state("A").unwrap();
    let b = summary.state("B").unwrap();
    assert_eq!(Some(&serde_json::json!("a-box\n")), a.results.get("name"));
    assert_eq!(Some(&serde_json::json!("b-box\n")), b.results.get("name"));
}

#[test]
fn empty_plan_is_a_success() {
    let plan = plan(&[], vec![command_action(&["uptime"])]);
    let summary = run(&plan, &mut TestTransport::new(), &mut TestReporter::new());
    assert!(summary.is_success());
    assert!(summary.hosts.is_empty());
}
