use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_file(contents: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("control_server_settings_{suffix}.toml"));
    fs::write(&path, contents).expect("write settings");
    path
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = load_settings_from(Path::new("/nonexistent/control_server.toml"), |_| None);
    assert_eq!(settings, Settings::default());
}

#[test]
fn file_values_are_overridden_by_env() {
    let path = temp_file(
        "bind_addr = \"0.0.0.0:9000\"\nfailing_processes = \"a, b,,\"\nresponse_latency_ms = \"25\"\n",
    );

    let from_file = load_settings_from(&path, |_| None);
    assert_eq!(from_file.bind_addr, "0.0.0.0:9000");
    assert_eq!(
        from_file.failing_processes,
        BTreeSet::from([ProcessId::from("a"), ProcessId::from("b")])
    );
    assert_eq!(from_file.response_latency, Duration::from_millis(25));

    let overridden = load_settings_from(&path, |key| match key {
        "APP__BIND_ADDR" => Some("127.0.0.1:1".into()),
        "APP__FAILING_PROCESSES" => Some("c".into()),
        "APP__RESPONSE_LATENCY_MS" => Some("oops".into()),
        _ => None,
    });
    assert_eq!(overridden.bind_addr, "127.0.0.1:1");
    assert_eq!(
        overridden.failing_processes,
        BTreeSet::from([ProcessId::from("c")])
    );
    assert_eq!(overridden.response_latency, Duration::from_millis(25));

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn app_bind_addr_wins_over_legacy_name() {
    let settings = load_settings_from(Path::new("/nonexistent"), |key| match key {
        "CONTROL_SERVER_BIND" => Some("127.0.0.1:2".into()),
        "APP__BIND_ADDR" => Some("127.0.0.1:3".into()),
        _ => None,
    });
    assert_eq!(settings.bind_addr, "127.0.0.1:3");
}
