mod support;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::Value;

use support::TestProject;

/// Parallel bk invocations must serialize through the store lock:
/// no lost updates, no duplicate ids.
#[test]
fn parallel_adds_never_lose_updates() {
    let project = TestProject::init();
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let path = project.path().to_path_buf();

    let mut handles = Vec::with_capacity(writers);
    for idx in 0..writers {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut cmd = assert_cmd::Command::cargo_bin("bk").expect("bk binary");
            cmd.current_dir(&path)
                .args(["add", &format!("parallel task {idx}"), "--json"])
                .assert()
                .success();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let output = project
        .bk()
        .args(["list", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["data"]["total"], writers);

    let ids: HashSet<String> = value["data"]["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), writers);

    // One journal record per mutation, no interleaved losses
    let log = project
        .bk()
        .args(["log", "--limit", "100", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let log: Value = serde_json::from_slice(&log).unwrap();
    assert_eq!(log["data"]["total"], writers);
}

/// Concurrent updates to one task all land, serialized by the lock.
#[test]
fn parallel_updates_serialize() {
    let project = TestProject::init();
    let id = project.add_task("contended");
    project.bk().args(["start", &id]).assert().success();

    let writers = 6;
    let barrier = Arc::new(Barrier::new(writers));
    let path = project.path().to_path_buf();

    let mut handles = Vec::with_capacity(writers);
    for idx in 0..writers {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        let id = id.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let progress = (idx + 1) * 10;
            let mut cmd = assert_cmd::Command::cargo_bin("bk").expect("bk binary");
            cmd.current_dir(&path)
                .args(["update", &id, "--progress", &progress.to_string()])
                .assert()
                .success();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // add + start + N updates
    let log = project
        .bk()
        .args(["log", "--limit", "100", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let log: Value = serde_json::from_slice(&log).unwrap();
    assert_eq!(log["data"]["total"], writers + 2);

    let shown = project.show_task(&id);
    let progress = shown["data"]["progress"].as_u64().unwrap();
    assert!((10..=60).contains(&progress));
    assert_eq!(progress % 10, 0);
}
