//! Run the `preproc` binary on documents and check stdout, stderr and the
//! exit status.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_preproc"))
}

fn command() -> Command {
    let mut cmd = Command::new(binary());
    // Keep a developer's own config file out of the picture.
    cmd.env_remove("PREPROC_CONFIG");
    cmd.env("XDG_CONFIG_HOME", std::env::temp_dir().join("preproc-cli-tests-none"));
    cmd
}

fn run_stdin(args: &[&str], input: &str) -> Output {
    let mut child = command()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn preproc");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for preproc")
}

fn run_file(args: &[&str], file: &Path) -> Output {
    command()
        .args(args)
        .arg(file)
        .output()
        .expect("failed to run preproc")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn expands_stdin() {
    let out = run_stdin(&[], "!$who = \"Bob\"\nAlice -> $who\n");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "Alice -> Bob\n");
}

#[test]
fn defines_from_command_line() {
    let out = run_stdin(&["-D", "n=3", "-Dname=Ann", "-"], "!total = n * 2\nname: total\n");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "Ann: 6\n");
}

#[test]
fn resources_resolve_next_to_the_input() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hosts.json"), r#"{"db": "10.0.0.5"}"#).unwrap();
    let doc = dir.path().join("net.puml");
    std::fs::write(&doc, "!hosts = %load_json(\"hosts.json\")\ndb at $hosts.db\n").unwrap();

    let out = run_file(&[], &doc);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "db at 10.0.0.5\n");
}

#[test]
fn errors_report_location_and_code() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("bad.puml");
    std::fs::write(&doc, "first\nA -> %bogus()\n").unwrap();

    let out = run_file(&[], &doc);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).is_empty());
    let expected = format!("preproc: {}:2:6: E_UNKNOWN_FUNCTION: unknown function %bogus", doc.display());
    assert!(stderr(&out).contains(&expected), "stderr: {}", stderr(&out));
}

#[test]
fn config_file_sets_limits() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("engine.conf");
    std::fs::write(&conf, "max_loop_iterations = 2\n").unwrap();

    let conf_arg = conf.display().to_string();
    let out = run_stdin(&["-c", &conf_arg], "!i = 0\n!while i < 5\n!i = i + 1\n!endwhile\n");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("E_LOOP_LIMIT"), "stderr: {}", stderr(&out));
}

#[test]
fn config_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("engine.conf");
    std::fs::write(&conf, "allow_resource_loading = false\n").unwrap();

    let mut child = command()
        .env("PREPROC_CONFIG", &conf)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn preproc");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(b"!x = %load_csv(\"a.csv\")\n")
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("E_RESOURCE"), "stderr: {}", stderr(&out));
}

#[test]
fn bad_config_lines_are_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("engine.conf");
    std::fs::write(&conf, "colour = blue\n").unwrap();

    let conf_arg = conf.display().to_string();
    let out = run_stdin(&["-c", &conf_arg], "ok\n");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "ok\n");
    assert!(stderr(&out).contains("unknown setting"), "stderr: {}", stderr(&out));
}

#[test]
fn missing_input_file() {
    let out = run_file(&[], Path::new("/nonexistent/doc.puml"));
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("/nonexistent/doc.puml"));
}

#[test]
fn usage_errors_exit_2() {
    let out = run_stdin(&["-z"], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Usage: preproc"));
}

#[test]
fn long_operator_chain_is_a_syntax_error() {
    let doc = format!("!x = {}\n", vec!["1"; 50_000].join("+"));
    let out = run_stdin(&[], &doc);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("E_SYNTAX"), "stderr: {}", stderr(&out));
}

#[test]
fn deeply_nested_blocks_are_a_syntax_error() {
    let depth = 20_000;
    let doc = format!("{}x\n{}", "!if true\n".repeat(depth), "!endif\n".repeat(depth));
    let out = run_stdin(&[], &doc);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("E_SYNTAX"), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("nested deeper"), "stderr: {}", stderr(&out));
}

#[test]
fn oversized_call_depth_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("engine.conf");
    std::fs::write(&conf, "max_call_depth = 3000\n").unwrap();

    let conf_arg = conf.display().to_string();
    let out = run_stdin(&["-c", &conf_arg], "!function f(n)\n!return f(n + 1)\n!endfunction\n!x = f(0)\n");
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("must be at most 256"), "stderr: {err}");
    assert!(err.contains("E_RECURSION_LIMIT"), "stderr: {err}");
    assert!(err.contains("call depth limit of 100"), "stderr: {err}");
}
