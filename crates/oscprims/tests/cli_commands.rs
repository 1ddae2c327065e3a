#![cfg(feature = "cli")]

use std::net::{SocketAddr, UdpSocket};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use oscprims::codec::{decode_message, encode, encode_bundle_to_bytes, Message, Value};

fn oscprims() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_oscprims"));
    command.arg("--log-level").arg("error");
    command
}

fn free_udp_addr() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("scratch socket should bind");
    socket.local_addr().expect("scratch socket should have an address")
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if child.try_wait().expect("child status should be readable").is_some() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

/// Resend `datagram` until the listener exits (it was started with --count).
fn feed_until_exit(mut child: Child, target: SocketAddr, datagram: &[u8]) -> Output {
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender should bind");
    let start = Instant::now();
    loop {
        sender
            .send_to(datagram, target)
            .expect("datagram should send");
        if wait_with_timeout(&mut child, Duration::from_millis(100)) {
            break;
        }
        if start.elapsed() > Duration::from_secs(10) {
            let _ = child.kill();
            panic!("listener did not exit");
        }
    }
    child
        .wait_with_output()
        .expect("listener output should be readable")
}

fn json_lines(output: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn send_delivers_typed_message() {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("receiver should bind");
    receiver
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should be settable");
    let target = receiver.local_addr().expect("receiver address");

    let status = oscprims()
        .arg("send")
        .arg(target.to_string())
        .arg("/track/3/select")
        .arg("i:3")
        .arg("f:0.5")
        .arg("s:bass")
        .arg("b:0102")
        .arg("T")
        .arg("N")
        .status()
        .expect("send command should run");
    assert!(status.success());

    let mut buf = [0u8; 512];
    let (len, _) = receiver.recv_from(&mut buf).expect("datagram should arrive");
    let message = decode_message(&buf[..len]).expect("datagram should decode");

    assert_eq!(message.address(), "/track/3/select");
    assert_eq!(
        message.args(),
        &[
            Value::Int32(3),
            Value::Float32(0.5),
            Value::from("bass"),
            Value::from(vec![1u8, 2]),
            Value::True,
            Value::Nil,
        ]
    );
}

#[test]
fn send_rejects_bad_arguments_with_usage_code() {
    let output = oscprims()
        .arg("send")
        .arg("127.0.0.1:9")
        .arg("/x")
        .arg("i:notanumber")
        .output()
        .expect("send command should run");
    assert_eq!(output.status.code(), Some(64));

    let output = oscprims()
        .arg("send")
        .arg("127.0.0.1:9")
        .arg("no-slash")
        .output()
        .expect("send command should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_prints_received_messages_as_json() {
    let addr = free_udp_addr();
    let child = oscprims()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(addr.to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    let datagram = encode(&Message::new("/clip/play").arg_value(7).arg_value("go"));
    let output = feed_until_exit(child, addr, &datagram);
    assert!(output.status.success());

    let lines = json_lines(&output.stdout);
    let first = lines.first().expect("one message should be printed");
    assert_eq!(first["address"], "/clip/play");
    assert_eq!(first["type_tags"], ",is");
    assert_eq!(first["args"][0]["value"], 7);
    assert_eq!(first["args"][1]["type"], "string");
}

#[test]
fn listen_pattern_filters_and_survives_garbage() {
    let addr = free_udp_addr();
    let child = oscprims()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(addr.to_string())
        .arg("--pattern")
        .arg("^/clip/")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    // Sent before the listener may be ready; losing them is fine.
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender should bind");
    sender.send_to(b"garbage!", addr).ok();
    sender
        .send_to(&encode(&Message::new("/track/1/select")), addr)
        .ok();

    let bundle = encode_bundle_to_bytes(
        1,
        &[
            Message::new("/track/2/select"),
            Message::new("/clip/stop").arg_value(2),
        ],
    );
    let output = feed_until_exit(child, addr, &bundle);
    assert!(output.status.success());

    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["address"], "/clip/stop");
}

#[test]
fn listen_rejects_invalid_pattern() {
    let output = oscprims()
        .arg("listen")
        .arg(free_udp_addr().to_string())
        .arg("--pattern")
        .arg("/clip/(")
        .output()
        .expect("listen command should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_rejects_zero_count() {
    let output = oscprims()
        .arg("listen")
        .arg(free_udp_addr().to_string())
        .arg("--count")
        .arg("0")
        .output()
        .expect("listen command should run");
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn decode_prints_messages_and_flags_malformed_input() {
    let wire = encode(&Message::new("/ping").arg_value(Value::Nil));
    let output = oscprims()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg(hex::encode(&wire))
        .output()
        .expect("decode command should run");
    assert!(output.status.success());
    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["address"], "/ping");
    assert_eq!(lines[0]["args"][0]["type"], "nil");

    let output = oscprims()
        .arg("decode")
        .arg(hex::encode(b"/bad\0\0\0\0,z\0\0"))
        .output()
        .expect("decode command should run");
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("malformed message"));
}

#[test]
fn version_reports_crate_version() {
    let output = oscprims()
        .arg("version")
        .output()
        .expect("version command should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("oscprims {}", env!("CARGO_PKG_VERSION"))
    );
}
