use std::{env, fs, time::Duration};

use serial_test::serial;
use tempfile::TempDir;

use super::{BackoffSettings, Settings, load_config};
use crate::packet::MAX_LEN;
use crate::retry::Backoff;

fn in_temp_dir<R>(files: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");
    fs::create_dir_all("config").expect("create config dir");
    for (name, body) in files {
        fs::write(name, body).expect("write config file");
    }
    let out = f();
    env::set_current_dir(orig).expect("restore cwd");
    out
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.addr(), "127.0.0.1:8080");
    assert_eq!(settings.server.keepalive(), Duration::from_secs(60));
    assert_eq!(settings.server.ping_timeout(), Duration::from_secs(5));
    assert_eq!(settings.server.auth_timeout(), Duration::from_secs(10));
    assert_eq!(settings.server.max_packet_size, MAX_LEN);
    assert_eq!(settings.client.addr, "127.0.0.1:8080");
    assert_eq!(settings.client.retry_limit, 100);
    assert_eq!(
        settings.client.backoff,
        BackoffSettings::Constant { delay_ms: 2000 }
    );
    assert_eq!(settings.broker.peer_addr(), "127.0.0.1:8081");
    assert!(settings.broker.peers.is_empty());
    assert!(uuid::Uuid::parse_str(&settings.broker.node_id).is_ok());
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let cfg = in_temp_dir(&[], || load_config().expect("load_config failed"));
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.client.retry_limit, 100);
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [client]
        retry_limit = 3
        backoff = { strategy = "exponential", base_ms = 100, exponent = 2.0 }

        [broker]
        node_id = "node-a"
        peers = ["127.0.0.1:9101", "127.0.0.1:9102"]
    "#;
    let cfg = in_temp_dir(&[("config/default.toml", toml)], || {
        load_config().expect("load_config failed")
    });
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    // fields missing from a present section keep their defaults
    assert_eq!(cfg.server.auth_timeout_ms, 10_000);
    assert_eq!(cfg.client.retry_limit, 3);
    assert_eq!(
        Backoff::from(&cfg.client.backoff),
        Backoff::Exponential {
            base: Duration::from_millis(100),
            exponent: 2.0
        }
    );
    assert_eq!(cfg.broker.node_id, "node-a");
    assert_eq!(cfg.broker.peers.len(), 2);
    assert_eq!(cfg.log.level, "info");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let toml = r#"
        [server]
        port = 9000
    "#;
    let cfg = temp_env::with_vars(
        [
            ("TETHER_SERVER__PORT", Some("9500")),
            ("TETHER_LOG__LEVEL", Some("debug")),
            ("TETHER_BROKER__PEERS", Some("10.0.0.2:8081,10.0.0.3:8081")),
        ],
        || {
            in_temp_dir(&[("config/default.toml", toml)], || {
                load_config().expect("load_config failed")
            })
        },
    );
    assert_eq!(cfg.server.port, 9500);
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(
        cfg.broker.peers,
        vec!["10.0.0.2:8081".to_string(), "10.0.0.3:8081".to_string()]
    );
}
