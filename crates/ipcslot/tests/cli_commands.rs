#![cfg(all(unix, feature = "cli"))]

use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use ipcslot::sys::{NamedSegment, NamedSignal, Semaphore, SharedMemory};
use ipcslot::{Channel, ChannelConfig, Requester};

fn unique(tag: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("cli-{tag}-{:x}-{n:x}", std::process::id())
}

fn ipcslot() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ipcslot"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn run(args: &[&str]) -> Output {
    ipcslot().args(args).output().expect("ipcslot should run")
}

fn wait_for_server(name: &str, size: usize, timeout: Duration) {
    let config = ChannelConfig::default().with_size(size);
    let start = Instant::now();
    loop {
        if Requester::connect(name, config).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("server for {name} did not come up");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait should work") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn serve_and_request_round_trip() {
    let name = unique("upper");
    let mut server = ipcslot()
        .args(["serve", &name, "--size", "1024", "--mode", "upper", "--count", "1"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve should start");
    wait_for_server(&name, 1024, Duration::from_secs(3));

    let output = run(&[
        "--format", "json", "request", &name, "--size", "1024", "--data", "ping",
    ]);
    assert!(
        output.status.success(),
        "request failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"payload\":\"PING\""), "{stdout}");
    assert!(stdout.contains("\"direction\":\"reply\""), "{stdout}");

    let status = wait_for_exit(&mut server, Duration::from_secs(3));
    assert!(status.success(), "serve should exit cleanly after --count");

    // The server removed its objects on exit; the name is free again.
    Channel::create_server(&name, ChannelConfig::default().with_size(1024))
        .expect("name should be reusable");
}

#[test]
fn raw_format_prints_reply_bytes_only() {
    let name = unique("raw");
    let mut server = ipcslot()
        .args(["serve", &name, "--size", "256", "--count", "1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_server(&name, 256, Duration::from_secs(3));

    let output = run(&[
        "--format", "raw", "request", &name, "--size", "256", "--data", "echo me",
    ]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"echo me");
    wait_for_exit(&mut server, Duration::from_secs(3));
}

#[test]
fn request_without_reply_returns_124() {
    let name = unique("timeout");
    let _server = Channel::create_server(&name, ChannelConfig::default().with_size(64))
        .expect("server channel should create");

    let started = Instant::now();
    let output = run(&[
        "request", &name, "--size", "64", "--data", "hello", "--timeout", "200ms",
    ]);
    assert_eq!(output.status.code(), Some(124));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no reply within"));
}

#[test]
fn request_to_missing_channel_returns_3() {
    let output = run(&["request", &unique("missing"), "--data", "hello"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn oversized_request_returns_60() {
    let name = unique("big");
    let _server = Channel::create_server(&name, ChannelConfig::default().with_size(8))
        .expect("server channel should create");

    let output = run(&["request", &name, "--size", "8", "--data", "123456789"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn serve_on_taken_name_returns_3() {
    let name = unique("taken");
    let _server = Channel::create_server(&name, ChannelConfig::default().with_size(64))
        .expect("server channel should create");

    let output = run(&["serve", &name, "--size", "64"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
}

#[test]
fn sigint_stops_server_cleanly() {
    let name = unique("sigint");
    let mut server = ipcslot()
        .args(["serve", &name, "--size", "64"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_server(&name, 64, Duration::from_secs(3));

    let status = Command::new("kill")
        .arg("-INT")
        .arg(server.id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());

    let status = wait_for_exit(&mut server, Duration::from_secs(3));
    assert!(status.success(), "serve should exit 0 on SIGINT");
    assert!(Requester::connect(&name, ChannelConfig::default().with_size(64)).is_err());
}

#[test]
fn single_signal_flag_is_rejected() {
    let name = unique("single");
    for sub in ["serve", "request"] {
        let output = run(&[sub, &name, "--single-signal"]);
        assert_eq!(output.status.code(), Some(2), "{sub} should reject the flag");
        assert!(String::from_utf8_lossy(&output.stderr).contains("--single-signal"));
    }
    assert!(Requester::connect(&name, ChannelConfig::default()).is_err());
}

#[test]
fn names_lists_derived_objects() {
    let output = run(&["--format", "json", "names", "chan1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"os_name\":\"/chan1\""), "{stdout}");
    assert!(stdout.contains("\"os_name\":\"/chan1_cs\""), "{stdout}");
    assert!(stdout.contains("\"os_name\":\"/chan1_ss\""), "{stdout}");

    let output = run(&["names", "bad/name"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn cleanup_removes_leaked_objects() {
    let name = unique("leak");
    let leaked_segment = SharedMemory::create(&name, 64).expect("segment should create");
    let leaked_signal =
        Semaphore::create(&format!("{name}_cs")).expect("signal should create");
    // Simulate a crashed server: the handles vanish without unlinking.
    std::mem::forget(leaked_segment);
    std::mem::forget(leaked_signal);

    assert!(Channel::create_server(&name, ChannelConfig::default().with_size(64)).is_err());

    let output = run(&["--format", "json", "cleanup", &name]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(&format!("\"name\":\"{name}\",\"removed\":true")),
        "{stdout}"
    );
    assert!(
        stdout.contains(&format!("\"name\":\"{name}_ss\",\"removed\":false")),
        "{stdout}"
    );

    Channel::create_server(&name, ChannelConfig::default().with_size(64))
        .expect("name should be free after cleanup");
}

#[test]
fn version_prints_package_version() {
    let output = run(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("ipcslot {}", env!("CARGO_PKG_VERSION")));
}
