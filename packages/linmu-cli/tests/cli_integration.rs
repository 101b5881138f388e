use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Command isolated from any user or environment configuration
fn linmu(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("linmu").unwrap();
    cmd.env_remove("LINMU_CONFIG")
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

/// Animal "rat" with one recorded epoch (1, 2) on a straight 100 cm track
fn fixture() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("rat");
    fs::create_dir_all(&data).unwrap();

    let mut position = String::new();
    for i in 0..=50 {
        let t = 10.0 + i as f64 * 0.02;
        writeln!(position, "{t} {} 0 0 5", i as f64 * 2.0).unwrap();
    }
    fs::write(data.join("ratpos01-02.txt"), position).unwrap();
    fs::write(
        data.join("rattetinfo.json"),
        r#"[{"day": 1, "epoch": 2, "tetrode_number": 1, "area": "CA1"},
            {"day": 1, "epoch": 3, "tetrode_number": 1, "area": "CA1"}]"#,
    )
    .unwrap();
    fs::write(data.join("ratmarks01-02-01.txt"), "10.1 1 2 3 4\n10.5 5 6 7 8\n").unwrap();

    let config = json!({
        "animals": {"rat": {"directory": data, "short_name": "rat"}},
        "track": {"node_positions": [[0.0, 0.0], [100.0, 0.0]], "edges": [[0, 1]]},
        "linearization": {"edge_order": [[0, 1]], "edge_spacing": 0.0}
    });
    let config_path = tmp.path().join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    (tmp, config_path)
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    let tmp = TempDir::new().unwrap();
    linmu(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    let tmp = TempDir::new().unwrap();
    linmu(tmp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("linmu"));
}

// =============================================================================
// CONFIG / VALIDATE
// =============================================================================

#[test]
fn test_config_defaults() {
    let tmp = TempDir::new().unwrap();
    let output = linmu(tmp.path()).args(["config", "--defaults"]).assert().success();
    let config = stdout_json(output.get_output());
    assert_eq!(config["linearization"]["edge_order"].as_array().unwrap().len(), 17);
    assert_eq!(config["sampling_frequency"], 500.0);
    assert!(config["animals"].get("CH105").is_some());
}

#[test]
fn test_config_from_environment() {
    let (tmp, config_path) = fixture();
    let output = linmu(tmp.path())
        .env("LINMU_CONFIG", &config_path)
        .arg("config")
        .assert()
        .success();
    let config = stdout_json(output.get_output());
    assert_eq!(config["track"]["edges"].as_array().unwrap().len(), 1);
}

#[test]
fn test_config_from_user_directory() {
    let (tmp, config_path) = fixture();
    let user_dir = tmp.path().join(".config").join("linmu");
    fs::create_dir_all(&user_dir).unwrap();
    fs::copy(&config_path, user_dir.join("config.json")).unwrap();

    let output = linmu(tmp.path()).arg("config").assert().success();
    let config = stdout_json(output.get_output());
    assert!(config["animals"].get("rat").is_some());
}

#[test]
fn test_validate_good_config() {
    let (tmp, config_path) = fixture();
    linmu(tmp.path())
        .args(["validate", "--file"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_validate_bad_edge() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.json");
    fs::write(
        &path,
        r#"{"track": {"node_positions": [[0, 0], [1, 0]], "edges": [[0, 5]]}}"#,
    )
    .unwrap();
    let output = linmu(tmp.path())
        .args(["validate", "--json", "--file"])
        .arg(&path)
        .assert()
        .code(3);
    let result = stdout_json(output.get_output());
    assert_eq!(result["valid"], false);
    assert!(result["error"].as_str().unwrap().contains("node 5"));
}

#[test]
fn test_validate_missing_file() {
    let tmp = TempDir::new().unwrap();
    linmu(tmp.path())
        .args(["validate", "--file", "/nonexistent_dir_12345/config.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("File not found"));
}

// =============================================================================
// GRAPH / ANIMALS
// =============================================================================

#[test]
fn test_default_graph_layout() {
    let tmp = TempDir::new().unwrap();
    let output = linmu(tmp.path()).args(["graph", "--json"]).assert().success();
    let report = stdout_json(output.get_output());
    let layout = report["layout"].as_array().unwrap();
    assert_eq!(layout.len(), 17);
    assert_eq!(layout[0]["from_node"], 17);
    assert_eq!(layout[0]["start"], 0.0);
    assert_eq!(report["track_graph"]["node_positions"].as_array().unwrap().len(), 18);
}

#[test]
fn test_graph_table() {
    let (tmp, config_path) = fixture();
    linmu(tmp.path())
        .args(["graph", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 nodes, 1 edges"))
        .stdout(predicate::str::contains("Linear axis length: 100.00"));
}

#[test]
fn test_animals_json() {
    let (tmp, config_path) = fixture();
    let output = linmu(tmp.path())
        .args(["animals", "--json", "--config"])
        .arg(&config_path)
        .assert()
        .success();
    let animals = stdout_json(output.get_output());
    assert_eq!(animals[0]["name"], "rat");
    assert_eq!(animals[0]["available"], true);
}

// =============================================================================
// BUILD
// =============================================================================

#[test]
fn test_build_summary() {
    let (tmp, config_path) = fixture();
    let output = linmu(tmp.path())
        .args(["build", "--epoch", "rat:1:2", "--summary", "--quiet", "--config"])
        .arg(&config_path)
        .assert()
        .success();
    let record = stdout_json(output.get_output());
    assert_eq!(record["samples"], 501);
    assert_eq!(record["dropped_samples"], 0);
    assert_eq!(record["multiunit_groups"], 1);
    assert_eq!(record["spike_bins"], 2);
    assert_eq!(record["decoder"], "greedy_nearest_edge");
    assert!(record["id"].as_str().is_some());
    assert!(record["created_at"].as_str().is_some());
}

#[test]
fn test_build_dataset_to_file() {
    let (tmp, config_path) = fixture();
    let out = tmp.path().join("dataset.json");
    linmu(tmp.path())
        .args(["build", "--epoch", "rat:1:2", "--decoder", "hmm", "--compact", "--config"])
        .arg(&config_path)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Built rat:1:2"));

    let dataset: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    for field in [
        "position_info",
        "tetrode_info",
        "multiunits",
        "multiunit_firing_rate",
        "track_graph",
    ] {
        assert!(dataset.get(field).is_some(), "missing {}", field);
    }
    let n = dataset["position_info"]["time"].as_array().unwrap().len();
    assert_eq!(dataset["multiunit_firing_rate"]["firing_rate"].as_array().unwrap().len(), n);
}

#[test]
fn test_build_unknown_animal() {
    let (tmp, config_path) = fixture();
    linmu(tmp.path())
        .args(["build", "--epoch", "mouse:1:2", "--config"])
        .arg(&config_path)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown animal"));
}

#[test]
fn test_build_missing_position() {
    let (tmp, config_path) = fixture();
    linmu(tmp.path())
        .args(["build", "--epoch", "rat:1:3", "--config"])
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Missing data"));
}

#[test]
fn test_build_epoch_missing_from_tetinfo() {
    let (tmp, config_path) = fixture();
    let mut position = String::new();
    for i in 0..=10 {
        writeln!(position, "{} {} 0 0 5", 10.0 + i as f64 * 0.02, i as f64).unwrap();
    }
    fs::write(tmp.path().join("rat").join("ratpos01-05.txt"), position).unwrap();
    linmu(tmp.path())
        .args(["build", "--epoch", "rat:1:5", "--config"])
        .arg(&config_path)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown epoch"));
}

#[test]
fn test_build_rejects_bad_epoch_key() {
    let tmp = TempDir::new().unwrap();
    linmu(tmp.path())
        .args(["build", "--epoch", "rat-1-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("animal:day:epoch"));
}

// =============================================================================
// BATCH
// =============================================================================

#[test]
fn test_batch_dry_run_discovers_epochs() {
    let (tmp, config_path) = fixture();
    linmu(tmp.path())
        .args(["batch", "--animals", "rat", "--dry-run", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("rat:1:2"));
}

#[test]
fn test_batch_partial_failure() {
    let (tmp, config_path) = fixture();
    let output = linmu(tmp.path())
        .args([
            "batch",
            "--epochs",
            "rat:1:2",
            "rat:1:3",
            "--continue-on-error",
            "--jobs",
            "2",
            "--config",
        ])
        .arg(&config_path)
        .assert()
        .code(4);
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["epoch"]["animal"], "rat");
}

#[test]
fn test_batch_output_dir() {
    let (tmp, config_path) = fixture();
    let out_dir = tmp.path().join("out");
    linmu(tmp.path())
        .args(["batch", "--animals", "rat", "--quiet", "--config"])
        .arg(&config_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .success();
    assert!(out_dir.join("rat_01_02.json").is_file());
}
