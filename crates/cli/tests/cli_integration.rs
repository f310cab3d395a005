// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("rvperiph-tests")
        .join(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let path = temp_dir(prefix).join("file.yaml");
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn run(script: &PathBuf, extra: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_rvperiph"))
        .arg("run")
        .arg("--script")
        .arg(script)
        .args(extra)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_rvperiph"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("rvperiph device bench"));
}

#[test]
fn test_uart_irq_script_passes() {
    let output = run(&demo("uart_rx_irq.yaml"), &["--no-uart-stdout"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_spi_script_passes() {
    let output = run(&demo("spi_loopback.yaml"), &["--no-uart-stdout"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_json_record_carries_uart_output() {
    let output = run(&demo("uart_hello.yaml"), &["--json"]);
    assert_eq!(output.status.code(), Some(0));

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["status"], "pass");
    assert_eq!(record["steps_executed"], 4);
    assert_eq!(record["uart_tx"], "hi");
    assert_eq!(record["failures"].as_array().unwrap().len(), 0);
}

#[test]
fn test_assertion_failure_exit_1() {
    let output = run(&demo("failing.yaml"), &["--json"]);
    assert_eq!(output.status.code(), Some(1));

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["status"], "fail");
    assert_eq!(record["failures"][0]["op"], "read");
}

#[test]
fn test_bad_script_exit_2() {
    let script = write_temp_file(
        "bad-version",
        r#"
schema_version: "2.0"
manifest: "bench.yaml"
steps:
  - op: reset
"#,
    );
    let output = run(&script, &[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_manifest_exit_2() {
    let script = write_temp_file(
        "missing-manifest",
        r#"
schema_version: "1.0"
manifest: "does-not-exist.yaml"
steps:
  - op: reset
"#,
    );
    let output = run(&script, &[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unmapped_access_exit_3() {
    let script = write_temp_file(
        "unmapped",
        r#"
schema_version: "1.0"
manifest:
  name: "inline"
  peripherals:
    - id: "uart0"
      type: "uart"
      base_address: 0x1000
      size: "8B"
steps:
  - op: write
    address: 0x2000
    value: 1
"#,
    );
    let output = run(&script, &["--json"]);
    assert_eq!(output.status.code(), Some(3));

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["status"], "error");
    assert!(record["message"]
        .as_str()
        .unwrap()
        .contains("Memory access violation"));
}

#[test]
fn test_output_dir_artifacts_and_restore() {
    let out = temp_dir("artifacts");
    let output = run(
        &demo("uart_hello.yaml"),
        &["--no-uart-stdout", "--output-dir", out.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(0));

    let result: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("result.json")).unwrap()).unwrap();
    assert_eq!(result["status"], "pass");
    assert_eq!(std::fs::read(out.join("uart.log")).unwrap(), b"hi");

    // The saved state has EN set; a restored bench sees it without writing CTRL.
    let script = write_temp_file(
        "restored",
        &format!(
            r#"
schema_version: "1.0"
manifest: "{}"
steps:
  - op: read
    address: 0x10000000
    expect: 0x1
    mask: 0x1
"#,
            demo("bench.yaml").display()
        ),
    );
    let snapshot = out.join("snapshot.json");
    let output = run(
        &script,
        &["--no-uart-stdout", "--restore", snapshot.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_check_manifest() {
    let output = Command::new(env!("CARGO_BIN_EXE_rvperiph"))
        .args(["check", "--manifest"])
        .arg(demo("bench.yaml"))
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("uart0"));
    assert!(stdout.contains("spi0"));
}

#[test]
fn test_check_rejects_overlap() {
    let manifest = write_temp_file(
        "overlap",
        r#"
name: "overlap"
peripherals:
  - id: "a"
    type: "uart"
    base_address: 0x0
    size: "8B"
  - id: "b"
    type: "spi"
    base_address: 0x4
    size: "8B"
"#,
    );
    let output = Command::new(env!("CARGO_BIN_EXE_rvperiph"))
        .args(["check", "--manifest"])
        .arg(&manifest)
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(2));
}
