use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn demos_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos")
}

fn state_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("convoflow-rs-demo-{}-{}.json", name, std::process::id()))
}

fn convoflow(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_convoflow"))
        .args(args)
        .output()
        .expect("cli should execute")
}

fn stdout_of(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(
        output.status.success(),
        "cli failed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    stdout
}

fn messages(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("MESSAGE_JSON:"))
        .map(|raw| serde_json::from_str(raw).expect("message line should be json"))
        .collect()
}

#[test]
fn agent_start_runs_every_demo() {
    let mut directories = fs::read_dir(demos_root())
        .expect("demos root must exist")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    directories.sort();
    assert!(!directories.is_empty(), "expected demo dialogs");

    for directory in directories {
        let name = directory
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let state_out = state_path(&name);
        let stdout = stdout_of(&convoflow(&[
            "agent",
            "start",
            "--dialogs-dir",
            &directory.to_string_lossy(),
            "--state-out",
            &state_out.to_string_lossy(),
        ]));
        assert!(stdout.contains("RESULT:OK"), "missing RESULT:OK for {}", name);
        assert!(stdout.contains("EVENT:"), "missing EVENT for {}", name);
    }
}

#[test]
fn echo_demo_finishes_in_one_turn() {
    let state_out = state_path("echo-end");
    let stdout = stdout_of(&convoflow(&[
        "agent",
        "start",
        "--dialogs-dir",
        &demos_root().join("echo").to_string_lossy(),
        "--state-out",
        &state_out.to_string_lossy(),
    ]));
    assert!(stdout.contains("EVENT:END"));
    assert!(stdout.contains("STATE_OUT:NONE"));
    assert_eq!(messages(&stdout)[0]["text"], "Hello there");
}

#[test]
fn quiz_demo_round_trips_through_saved_state() {
    let dialogs_dir = demos_root().join("quiz");
    let first = state_path("quiz-1");
    let stdout = stdout_of(&convoflow(&[
        "agent",
        "start",
        "--dialogs-dir",
        &dialogs_dir.to_string_lossy(),
        "--state-out",
        &first.to_string_lossy(),
    ]));
    assert!(stdout.contains("EVENT:WAITING"));
    let sent = messages(&stdout);
    assert_eq!(sent[0]["text"], "Roses are red");
    assert_eq!(sent[1]["text"], "Take the quiz?");
    let yes = sent[1]["actions"][0]["payload"]
        .as_str()
        .expect("reply action carries a payload key")
        .to_string();

    let second = state_path("quiz-2");
    let stdout = stdout_of(&convoflow(&[
        "agent",
        "payload",
        "--state-in",
        &first.to_string_lossy(),
        "--key",
        &yes,
        "--state-out",
        &second.to_string_lossy(),
    ]));
    let texts = messages(&stdout)
        .iter()
        .map(|message| message["text"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["You scored 3", "See you"]);

    let stdout = stdout_of(&convoflow(&[
        "agent",
        "message",
        "--state-in",
        &second.to_string_lossy(),
        "--text",
        "what now",
        "--intent",
        "help",
        "--state-out",
        &state_path("quiz-3").to_string_lossy(),
    ]));
    assert_eq!(messages(&stdout)[0]["text"], "Pick Yes or No");
}

#[test]
fn inspect_prints_routing_tables() {
    let stdout = stdout_of(&convoflow(&[
        "inspect",
        "--dialogs-dir",
        &demos_root().join("quiz").to_string_lossy(),
    ]));
    assert!(stdout.contains("ENTRY:main"));
    assert!(stdout.contains("DIALOG:quiz"));
    assert!(stdout.contains("RESULT_HANDLER:"));
    assert!(stdout.contains("PAYLOAD:"));
}
