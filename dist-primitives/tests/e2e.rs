use anyhow::{Context, Result};
use assert_cmd::Command;
use serde_json::{Value, json};

fn lines(messages: &[Value]) -> String {
    messages.iter().map(|message| format!("{message}\n")).collect()
}

fn run_node(args: &[&str], input: &[Value]) -> Result<Vec<Value>> {
    let output = Command::cargo_bin("node")
        .context("node binary not built")?
        .args(args)
        .env("RUST_LOG", "warn")
        .write_stdin(lines(input))
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    String::from_utf8(output)
        .context("stdout is not utf-8")?
        .lines()
        .map(|line| serde_json::from_str(line).with_context(|| format!("bad output line '{line}'")))
        .collect()
}

fn reply_to(out: &[Value], msg_id: u64) -> &Value {
    out.iter()
        .find(|message| message["body"]["in_reply_to"] == json!(msg_id))
        .unwrap_or_else(|| panic!("no reply to {msg_id} in {out:?}"))
}

fn init() -> Value {
    json!({"src": "c0", "dest": "n1", "body": {"type": "init", "msg_id": 1, "node_id": "n1", "node_ids": ["n1"]}})
}

#[test]
fn echo_over_stdio() -> Result<()> {
    let out = run_node(
        &["--workload", "echo"],
        &[
            init(),
            json!({"src": "c1", "dest": "n1", "body": {"type": "echo", "msg_id": 2, "echo": "please echo 35"}}),
        ],
    )?;

    assert_eq!(reply_to(&out, 1)["body"]["type"], "init_ok");
    let echo = reply_to(&out, 2);
    assert_eq!(echo["src"], "n1");
    assert_eq!(echo["dest"], "c1");
    assert_eq!(echo["body"]["type"], "echo_ok");
    assert_eq!(echo["body"]["echo"], "please echo 35");
    Ok(())
}

#[test]
fn kafka_with_memory_backend_over_stdio() -> Result<()> {
    let send = |msg_id: u64, key: &str, msg: i64| {
        json!({"src": "c1", "dest": "n1", "body": {"type": "send", "msg_id": msg_id, "key": key, "msg": msg}})
    };
    let out = run_node(
        &["--workload", "kafka", "--log-backend", "memory"],
        &[
            init(),
            send(2, "k1", 123),
            send(3, "k2", 1234),
            json!({"src": "c1", "dest": "n1", "body": {"type": "commit_offsets", "msg_id": 4, "offsets": {"k1": 0}}}),
            json!({"src": "c1", "dest": "n1", "body": {"type": "list_committed_offsets", "msg_id": 5, "keys": ["k1", "k9"]}}),
        ],
    )?;

    assert_eq!(reply_to(&out, 2)["body"]["offset"], 0);
    assert_eq!(reply_to(&out, 3)["body"]["offset"], 0);
    assert_eq!(reply_to(&out, 4)["body"]["type"], "commit_offsets_ok");
    // Requests run concurrently, so the listing may or may not see the commit.
    let offsets = &reply_to(&out, 5)["body"]["offsets"];
    assert!(offsets == &json!({"k1": 0}) || offsets == &json!({}), "{offsets}");
    Ok(())
}

#[test]
fn unknown_workload_is_rejected() {
    Command::cargo_bin("node")
        .expect("node binary")
        .args(["--workload", "gossip"])
        .assert()
        .failure();
}
