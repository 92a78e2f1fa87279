mod support;

use predicates::str::contains;
use serde_json::Value;

use support::TestProject;

#[test]
fn init_creates_store_layout() {
    let project = TestProject::new();
    project
        .bk()
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Backlog store initialized"));

    assert!(project.path().join(".backlog").is_dir());
    assert!(project.path().join(".backlog/backlog.json").is_file());
    assert!(project.path().join(".backlog/events.jsonl").is_file());
}

#[test]
fn init_is_idempotent() {
    let project = TestProject::init();
    project
        .bk()
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already initialized"));
}

#[test]
fn commands_without_init_fail_with_hint() {
    let project = TestProject::new();
    project
        .bk()
        .arg("list")
        .assert()
        .failure()
        .code(2)
        .stderr(contains("No backlog store found"))
        .stderr(contains("bk init"));
}

#[test]
fn add_assigns_first_id() {
    let project = TestProject::init();
    let id = project.add_task("First task");
    assert_eq!(id, "TASK-001");

    let second = project.add_task("Second task");
    assert_eq!(second, "TASK-002");
}

#[test]
fn add_json_envelope_has_versioned_schema() {
    let project = TestProject::init();
    let output = project
        .bk()
        .args(["add", "Enveloped", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["schema_version"], "backlog.v1");
    assert_eq!(value["command"], "add");
    assert_eq!(value["status"], "success");
    assert_eq!(value["data"]["status"], "not-started");
    assert_eq!(value["data"]["priority"], "P2");
}

#[test]
fn add_rejects_empty_title() {
    let project = TestProject::init();
    project
        .bk()
        .args(["add", "   "])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("title cannot be empty"));
}

#[test]
fn add_rejects_unknown_priority() {
    let project = TestProject::init();
    project
        .bk()
        .args(["add", "Prioritized", "--priority", "P9"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("unknown task priority"));
}

#[test]
fn show_unknown_task_is_user_error() {
    let project = TestProject::init();
    project
        .bk()
        .args(["show", "TASK-999"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Task not found"));
}

#[test]
fn json_error_envelope_carries_kind_and_code() {
    let project = TestProject::init();
    let output = project
        .bk()
        .args(["show", "TASK-999", "--json"])
        .assert()
        .failure()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["kind"], "user_error");
    assert_eq!(value["error"]["code"], 2);
}

#[test]
fn list_filters_by_status() {
    let project = TestProject::init();
    let first = project.add_task("one");
    project.add_task("two");
    project.bk().args(["start", &first]).assert().success();

    let output = project
        .bk()
        .args(["list", "--status", "in-progress", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["data"]["total"], 1);
    assert_eq!(value["data"]["tasks"][0]["id"], "TASK-001");
}

#[test]
fn quiet_suppresses_human_output() {
    let project = TestProject::init();
    let output = project
        .bk()
        .args(["add", "Silent", "--quiet"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(output.is_empty());
}

#[test]
fn log_reports_events_most_recent_first() {
    let project = TestProject::init();
    let id = project.add_task("tracked");
    project.bk().args(["start", &id]).assert().success();

    let output = project
        .bk()
        .args(["log", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["data"]["total"], 2);
    assert_eq!(value["data"]["events"][0]["operation"], "updateTask");
    assert_eq!(value["data"]["events"][1]["operation"], "addTask");
    assert_eq!(value["data"]["events"][1]["taskId"], id);
}
