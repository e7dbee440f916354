use assert_cmd::prelude::*;
use serde_json::Value;
use std::io::Write;
use std::process::Command;

const RECORDING: &str = r#"{"method":"WebAudio.contextCreated","params":{"context":{"contextId":"ctx-live","contextType":"realtime","contextState":"running","sampleRate":44100}}}
{"method":"WebAudio.audioNodeCreated","params":{"node":{"nodeId":"osc","contextId":"ctx-live","nodeType":"OscillatorNode"}}}
{"method":"WebAudio.audioNodeCreated","params":{"node":{"nodeId":"out","contextId":"ctx-live","nodeType":"AudioDestinationNode"}}}
{"method":"WebAudio.nodesConnected","params":{"contextId":"ctx-live","sourceId":"osc","destinationId":"out"}}

{"method":"WebAudio.contextCreated","params":{"context":{"contextId":"ctx-gone","contextType":"offline","contextState":"suspended"}}}
{"method":"WebAudio.contextWillBeDestroyed","params":{"contextId":"ctx-gone"}}
{"method":"Page.loadEventFired","params":{"timestamp":12.5}}
"#;

fn audion() -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("audion");
    let mut cmd = Command::new(bin);
    cmd.env("AUDION_LOG_LEVEL", "warn").env_remove("RUST_LOG");
    cmd
}

fn lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8(stdout.to_vec())
        .expect("utf8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn replay_prints_panel_messages_and_final_graphs() {
    let mut recording = tempfile::NamedTempFile::new().unwrap();
    recording.write_all(RECORDING.as_bytes()).unwrap();

    let assert = audion()
        .args(["replay", "--no-realtime", recording.path().to_str().unwrap()])
        .assert()
        .success();
    let messages = lines(&assert.get_output().stdout);

    assert_eq!(messages.first(), Some(&serde_json::json!({"allGraphs": {}})));
    let updates: Vec<_> = messages
        .iter()
        .filter_map(|message| message.get("graphContext"))
        .collect();
    assert!(updates
        .iter()
        .any(|update| update["id"] == "ctx-gone" && update["graph"].is_null()));

    let last = messages.last().expect("final message");
    let graphs = last["allGraphs"].as_object().expect("final allGraphs");
    assert_eq!(graphs.len(), 1);
    let live = &graphs["ctx-live"];
    assert_eq!(live["graph"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(live["graph"]["edges"][0]["name"], "0,0");
    assert_eq!(live["isIframe"], false);
}

#[test]
fn replay_rejects_malformed_recording() {
    let mut recording = tempfile::NamedTempFile::new().unwrap();
    writeln!(recording, "{{\"method\":\"WebAudio.contextCreated\",\"params\":{{}}}}").unwrap();
    writeln!(recording, "garbage").unwrap();

    let assert = audion()
        .args(["replay", "--no-realtime", recording.path().to_str().unwrap()])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("line 2"), "stderr: {stderr}");
}

#[test]
fn config_command_prints_effective_yaml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "integrator:\n  debounce_ms: 40").unwrap();

    let assert = audion()
        .args(["--config", file.path().to_str().unwrap(), "config"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("debounce_ms: 40"), "stdout: {stdout}");
    assert!(stdout.contains("realtime_interval_ms: 1000"));
}
