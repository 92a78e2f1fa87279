use std::path::Path;

use assert_cmd::Command;
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;

use backlog::state::{rebuild_snapshot, Event, Operation};
use backlog::storage::Storage;
use backlog::task::{Task, TaskId};

/// A temp project directory the bk binary runs against.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    /// Create the project and run `bk init`.
    pub fn init() -> Self {
        let project = Self::new();
        project.bk().arg("init").assert().success();
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A bk command rooted at this project.
    pub fn bk(&self) -> Command {
        let mut cmd = Command::cargo_bin("bk").expect("bk binary");
        cmd.current_dir(self.path());
        cmd
    }

    #[allow(dead_code)]
    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.path().join(".backlog.toml"), contents).expect("write config");
    }

    /// Create a task via the CLI and return its id.
    #[allow(dead_code)]
    pub fn add_task(&self, title: &str) -> String {
        let output = self
            .bk()
            .args(["add", title, "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("add json");
        value["data"]["id"].as_str().expect("task id").to_string()
    }

    /// Fetch a task as JSON via `bk show`.
    #[allow(dead_code)]
    pub fn show_task(&self, id: &str) -> Value {
        let output = self
            .bk()
            .args(["show", id, "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("show json")
    }

    /// Drive a task to completed through the legal edges.
    #[allow(dead_code)]
    pub fn finish_task(&self, id: &str) {
        self.bk().args(["start", id]).assert().success();
        self.bk()
            .args(["update", id, "--progress", "100"])
            .assert()
            .success();
        self.bk().args(["complete", id]).assert().success();
    }

    /// Forge the store so a task sits in a state the state machine
    /// would not normally reach, the way an uncoordinated external
    /// tool writing the files directly would leave it. Journal and
    /// snapshot stay mutually consistent.
    #[allow(dead_code)]
    pub fn force_task_state(&self, id: &str, mutate: impl FnOnce(&mut Task)) {
        let storage = Storage::new(self.path().to_path_buf());
        let id: TaskId = id.parse().expect("task id");

        let mut events: Vec<Event> = storage
            .read_jsonl(&storage.events_path())
            .expect("read events");
        let position = events
            .iter()
            .rposition(|e| e.task_id == id)
            .expect("task has events");

        let mut task = events[position].after.clone();
        mutate(&mut task);
        task.updated_at = Utc::now();

        let forged = Event {
            event_id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            operation: Operation::UpdateTask,
            task_id: id,
            before: Some(events[position].after.clone()),
            after: task,
        };
        storage
            .append_jsonl(&storage.events_path(), &forged)
            .expect("append event");
        events.push(forged);
        storage
            .write_json(&storage.snapshot_path(), &rebuild_snapshot(&events))
            .expect("write snapshot");
    }
}
