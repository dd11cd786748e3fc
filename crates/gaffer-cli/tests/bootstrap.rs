//! End-to-end delivery against a daemon the client bootstraps itself.

use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

use gaffer_cli::{BootstrapOptions, Client, StopKind, stop_daemon};
use gaffer_config::{Config, SocketEndpoint};

#[expect(
    deprecated,
    reason = "assert_cmd::cargo::cargo_bin resolves workspace binaries for e2e tests"
)]
fn gafferd_binary() -> PathBuf {
    assert_cmd::cargo::cargo_bin("gafferd")
}

fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn submission_bootstraps_a_daemon_and_runs_the_payload() {
    // Keep the daemon attached so the test owns its whole process tree.
    unsafe {
        env::set_var("GAFFER_FOREGROUND", "1");
    }

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("gafferd.sock");
    let witness = dir.path().join("delivered.txt");
    let log = dir.path().join("gafferd.log");

    let config = Config {
        socket: SocketEndpoint::new(socket.to_str().unwrap()),
        ..Config::default()
    };
    let mut options = BootstrapOptions::new(format!("cat >> {}", witness.display()));
    options.binary = Some(gafferd_binary().into_os_string());
    options.log_path = Some(Utf8PathBuf::from_path_buf(log).unwrap());

    let client = Client::new(config.socket.clone());
    client
        .deliver(b"bootstrapped payload\n", &config, &options)
        .expect("delivery should spawn a daemon and then succeed");

    assert!(
        wait_for(|| witness.exists()),
        "a worker should have run the payload"
    );
    assert_eq!(
        std::fs::read(&witness).unwrap(),
        b"bootstrapped payload\n"
    );

    stop_daemon(&config, StopKind::Drain).expect("daemon should accept the drain signal");
    assert!(
        wait_for(|| !socket.exists()),
        "drained daemon should remove its socket artefact"
    );
}
