use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

/// Runs the binary isolated from any user config or graph in the environment.
fn pipewalk(config_dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("pipewalk");
    cmd.env_remove("PIPEWALK_GRAPH")
        .env_remove("PIPEWALK_PROFILE")
        .env("PIPEWALK_CONFIG", config_dir.join("pipewalk.toml"));
    cmd
}

fn json_output(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("json output")
}

fn write_triangle(dir: &Path) -> PathBuf {
    let path = dir.join("triangle.json");
    fs::write(
        &path,
        r#"{
            "vertices": [
                {"id": 1, "properties": {"name": "hub"}},
                {"id": 2, "properties": {"name": "left"}},
                {"id": 3, "properties": {"name": "right"}}
            ],
            "edges": [
                {"out": 1, "in": 2, "label": "link"},
                {"out": 1, "in": 3, "label": "link"},
                {"out": 2, "in": 3, "label": "link"}
            ]
        }"#,
    )
    .expect("write graph");
    path
}

#[test]
fn stats_reports_demo_graph() {
    let dir = TempDir::new().expect("tempdir");
    let report = json_output(pipewalk(dir.path()).args(["--format", "json", "stats"]));
    assert_eq!(report["vertices"], 6);
    assert_eq!(report["edges"], 6);
    assert_eq!(report["labels"]["created"], 4);
    assert_eq!(report["labels"]["knows"], 2);
}

#[test]
fn reach_lists_vertices_within_depth() {
    let dir = TempDir::new().expect("tempdir");
    let entries = json_output(pipewalk(dir.path()).args([
        "--format", "json", "reach", "--from", "1", "--depth", "2",
    ]));
    let ids: Vec<u64> = entries
        .as_array()
        .expect("array")
        .iter()
        .map(|entry| entry["id"].as_u64().expect("id"))
        .collect();
    assert_eq!(ids, vec![2, 4, 3, 5]);
    assert_eq!(entries[0]["name"], "vadas");
}

#[test]
fn reach_respects_labels() {
    let dir = TempDir::new().expect("tempdir");
    let entries = json_output(pipewalk(dir.path()).args([
        "--format", "json", "reach", "--from", "1", "--depth", "3", "--label", "knows",
    ]));
    assert_eq!(entries.as_array().map(Vec::len), Some(2));
}

#[test]
fn paths_finds_every_simple_route() {
    let dir = TempDir::new().expect("tempdir");
    let report = json_output(pipewalk(dir.path()).args([
        "--format", "json", "paths", "--from", "1", "--to", "3",
    ]));
    assert_eq!(report["paths"], serde_json::json!([[1, 3], [1, 4, 3]]));
}

#[test]
fn top_ranks_loaded_graph_by_degree() {
    let dir = TempDir::new().expect("tempdir");
    let graph = write_triangle(dir.path());
    let entries = json_output(
        pipewalk(dir.path())
            .arg("--graph")
            .arg(&graph)
            .args(["--format", "json", "top", "--limit", "1", "--direction", "out"]),
    );
    assert_eq!(entries[0]["name"], "hub");
    assert_eq!(entries[0]["degree"], 2);
    assert_eq!(entries.as_array().map(Vec::len), Some(1));
}

#[test]
fn config_file_supplies_graph_and_settings() {
    let dir = TempDir::new().expect("tempdir");
    let graph = write_triangle(dir.path());
    fs::write(
        dir.path().join("pipewalk.toml"),
        format!(
            "graph = {:?}\n\n[traversal]\nmax_loop_depth = 1\n",
            graph.display().to_string()
        ),
    )
    .expect("write config");
    let entries = json_output(pipewalk(dir.path()).args([
        "--format", "json", "reach", "--from", "1", "--depth", "5",
    ]));
    let names: Vec<&str> = entries
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert_eq!(names, vec!["left", "right"]);
}

#[test]
fn init_config_writes_once() {
    let dir = TempDir::new().expect("tempdir");
    pipewalk(dir.path()).arg("init-config").assert().success();
    let written = fs::read_to_string(dir.path().join("pipewalk.toml")).expect("config");
    assert!(written.contains("[traversal]"));
    pipewalk(dir.path()).arg("init-config").assert().failure();
}

#[test]
fn malformed_graph_fails_cleanly() {
    let dir = TempDir::new().expect("tempdir");
    let graph = dir.path().join("broken.json");
    fs::write(&graph, "{ not json").expect("write graph");
    let output = pipewalk(dir.path())
        .arg("--graph")
        .arg(&graph)
        .arg("stats")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("invalid graph document"), "stderr: {stderr}");
}

#[test]
fn text_output_renders_reports() {
    let dir = TempDir::new().expect("tempdir");
    let stats = pipewalk(dir.path()).arg("stats").assert().success().get_output().stdout.clone();
    let stats = String::from_utf8_lossy(&stats);
    assert!(stats.contains("6 vertices, 6 edges"), "stdout: {stats}");
    assert!(stats.contains("created"), "stdout: {stats}");

    let paths = pipewalk(dir.path())
        .args(["paths", "--from", "1", "--to", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let paths = String::from_utf8_lossy(&paths);
    assert!(paths.contains("1 → 4 → 3  (2 hops)"), "stdout: {paths}");
    assert!(paths.contains("1 → 3  (1 hop)"), "stdout: {paths}");
}
