//! Tests for loading and validating configuration files.

use std::io::Write;
use std::sync::Arc;

use sml_gateway::channel::Framing;
use sml_gateway::config::{Config, LayoutSettings, PublisherSettings};
use sml_gateway::GatewayError;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"{
    "loglevel": "debug",
    "tick_ms": 10,
    "channels": [
        { "name": "grid", "port": "/dev/ttyUSB0", "throttle_secs": 5 },
        { "name": "heat", "port": "/dev/ttyUSB2", "baudrate": 2400,
          "framing": { "line": { "terminator": 13 } }, "buffer_capacity": 256 },
        { "name": "spare", "port": "/dev/ttyUSB3", "enabled": false }
    ],
    "bus": { "port": "/dev/ttyUSB1", "baudrate": 19200, "parity": "even", "response_timeout_ms": 300 },
    "slaves": [
        { "name": "house", "address": 1, "interval_secs": 30 },
        { "name": "garage", "address": 2, "interval_secs": 60 },
        { "name": "pump", "address": 7, "interval_secs": 15, "discover_identity": false,
          "layout": { "custom": {
              "registers": [
                  { "address": 0, "name": "voltage", "precision": 1 },
                  { "address": 6, "name": "current", "precision": 2 }
              ],
              "blocks": [ { "start": 0 }, { "start": 6 } ]
          } } }
    ],
    "publisher": { "json_lines": { "path": "/var/lib/sml-gateway/out.jsonl" } }
}"#;

fn write_temp(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

/// Tests that a complete file loads from disk and converts into core records.
#[test]
fn test_load_full_config() {
    let file = write_temp(FULL_CONFIG);
    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.loglevel, "debug");
    assert_eq!(config.tick_ms, 10);
    assert_eq!(
        config.publisher,
        PublisherSettings::JsonLines {
            path: "/var/lib/sml-gateway/out.jsonl".to_string()
        }
    );

    let channels = config.channel_configs();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].0.throttle_ms, 5000);
    assert_eq!(channels[1].0.framing, Framing::Line { terminator: 13 });
    assert_eq!(channels[1].0.capacity, 256);
    assert_eq!(channels[1].1.baudrate, 2400);

    let poll = config.poll_config();
    assert_eq!(poll.response_timeout_ms, 300);
    assert_eq!(poll.transmit_delay_ms, 2);
    assert_eq!(poll.identity_retry_ms, 1000);

    let bus = config.bus_config().unwrap();
    assert_eq!(bus.baudrate, 19200);
    assert_eq!(bus.parity, tokio_serial::Parity::Even);
}

/// Tests that slaves on the built-in layout share one layout instance while a
/// custom layout gets its own.
#[test]
fn test_slave_layouts() {
    let config = Config::from_json(FULL_CONFIG).unwrap();
    let slaves = config.slave_configs();

    assert_eq!(slaves.len(), 3);
    assert!(Arc::ptr_eq(&slaves[0].layout, &slaves[1].layout));
    assert_eq!(slaves[0].interval_ms, 30_000);
    assert!(slaves[0].discover_identity);

    let pump = &slaves[2];
    assert!(!pump.discover_identity);
    assert_eq!(pump.layout.registers.len(), 2);
    assert_eq!(pump.layout.blocks[1].register_count(), 2);
    assert!(matches!(config.slaves[2].layout, LayoutSettings::Custom { .. }));
}

/// Tests that a missing file surfaces as an I/O error.
#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, GatewayError::Io(_)));
}

/// Tests that malformed JSON surfaces as a JSON error.
#[test]
fn test_malformed_json() {
    let err = Config::from_json("{ \"channels\": [ ").unwrap_err();
    assert!(matches!(err, GatewayError::Json(_)));
}

/// Tests the validation rules, one rejected file each.
#[test]
fn test_validation_rejects_bad_settings() {
    let cases = [
        (r#"{"tick_ms":0}"#, "tick_ms"),
        (
            r#"{"channels":[{"name":"a","port":"x"},{"name":"a","port":"y"}]}"#,
            "duplicate channel",
        ),
        (
            r#"{"channels":[{"name":"a","port":"x","buffer_capacity":15}]}"#,
            "minimum frame length",
        ),
        (
            r#"{"bus":{"port":"x"},"slaves":[{"name":"s","address":248,"interval_secs":1}]}"#,
            "outside 1..=247",
        ),
        (
            r#"{"bus":{"port":"x"},"slaves":[{"name":"s","address":0,"interval_secs":1}]}"#,
            "outside 1..=247",
        ),
        (r#"{"bus":{"port":"x","stop_bits":3}}"#, "stop_bits"),
        (
            r#"{"bus":{"port":"x"},"slaves":[{"name":"s","address":1,"interval_secs":1,
                "layout":{"custom":{"registers":[],"blocks":[]}}}]}"#,
            "empty register layout",
        ),
        (
            r#"{"bus":{"port":"x"},"slaves":[{"name":"s","address":1,"interval_secs":1,
                "layout":{"custom":{"registers":[{"address":0,"name":"v"}],
                "blocks":[{"start":0,"end":300}]}}}]}"#,
            "limit 125",
        ),
    ];

    for (text, expected) in cases {
        let err = Config::from_json(text).unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "{text}: expected '{expected}', got '{err}'"
        );
    }
}

/// Tests that a line channel only needs room for its terminator.
#[test]
fn test_line_channel_small_capacity_allowed() {
    let config = Config::from_json(
        r#"{"channels":[{"name":"a","port":"x","framing":{"line":{"terminator":10}},"buffer_capacity":1}]}"#,
    )
    .unwrap();
    assert_eq!(config.channel_configs()[0].0.capacity, 1);
}

/// Tests that a disabled slave needs no bus.
#[test]
fn test_disabled_slave_without_bus() {
    let config = Config::from_json(r#"{"slaves":[{"name":"s","address":1}]}"#).unwrap();
    assert_eq!(config.slave_configs()[0].interval_ms, 0);
    assert!(config.bus_config().is_none());
}

/// Tests that a block reaching the end of the register address space is
/// rejected as oversized rather than overflowing the count.
#[test]
fn test_block_at_address_space_end_rejected() {
    let err = Config::from_json(
        r#"{"bus":{"port":"x"},"slaves":[{"name":"s","address":1,"interval_secs":1,
            "layout":{"custom":{"registers":[{"address":1,"name":"v"}],
            "blocks":[{"start":1,"end":65535}]}}}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
    assert!(err.to_string().contains("reads 65535 registers, limit 125"), "{err}");
}

/// Tests that a block reading only unnamed registers is rejected.
#[test]
fn test_block_without_named_register_rejected() {
    let err = Config::from_json(
        r#"{"bus":{"port":"x"},"slaves":[{"name":"s","address":1,"interval_secs":1,
            "layout":{"custom":{"registers":[{"address":0,"name":"v"}],
            "blocks":[{"start":0},{"start":100,"end":102}]}}}]}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("block at 0x0064 reads no named register"), "{err}");
}
