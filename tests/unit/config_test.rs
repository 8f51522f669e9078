//! Tests for configuration validation

use std::net::IpAddr;
use std::time::Duration;

use rt_gatekeeper::config::GatewayConfig;
use rt_gatekeeper::core::{Gateway, GatewayError, ShutdownSignal};

#[test]
fn test_gateway_config_defaults() {
    let cfg = GatewayConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.bind_addr.port(), 8080);
    assert_eq!(cfg.authorized_identity, "admin");
    assert_eq!(cfg.max_identity_len, 50);
    assert_eq!(cfg.rt_priority, 50);
    assert_eq!(cfg.cycle_bound, 20);
    assert_eq!(cfg.period(), Duration::from_secs(1));
    assert_eq!(cfg.shutdown_grace(), 2 * cfg.period());
    assert!(cfg.allowed_origins.contains(&"127.0.0.1".parse::<IpAddr>().unwrap()));
    assert!(cfg.allowed_origins.contains(&"192.168.1.100".parse::<IpAddr>().unwrap()));
}

#[test]
fn test_gateway_config_invalid_empty_allow_list() {
    let invalid = GatewayConfig::default().with_allowed_origins(Vec::new());
    assert!(invalid.validate().is_err());
}

#[test]
fn test_gateway_config_invalid_identity() {
    assert!(GatewayConfig::default()
        .with_authorized_identity("")
        .validate()
        .is_err());
    assert!(GatewayConfig::default()
        .with_authorized_identity("ad\nmin")
        .validate()
        .is_err());
    assert!(GatewayConfig::default()
        .with_authorized_identity("x".repeat(51))
        .validate()
        .is_err());
    assert!(GatewayConfig::default()
        .with_authorized_identity("x".repeat(51))
        .with_max_identity_len(64)
        .validate()
        .is_ok());
}

#[test]
fn test_gateway_config_invalid_priority() {
    assert!(GatewayConfig::default().with_rt_priority(0).validate().is_err());
    assert!(GatewayConfig::default().with_rt_priority(100).validate().is_err());
    assert!(GatewayConfig::default().with_rt_priority(99).validate().is_ok());
    assert!(GatewayConfig::default().with_rt_priority(1).validate().is_ok());
}

#[test]
fn test_gateway_config_invalid_period_and_bound() {
    assert!(GatewayConfig::default().with_period_ms(0).validate().is_err());
    assert!(GatewayConfig::default().with_cycle_bound(0).validate().is_err());
}

#[test]
fn test_gateway_config_invalid_stack_size() {
    let mut cfg = GatewayConfig::default();
    cfg.thread_stack_size = 4096;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_gateway_config_from_json() {
    let json = r#"{
        "allowed_origins": ["10.0.0.2"],
        "authorized_identity": "operator",
        "period_ms": 250,
        "cycle_bound": 5
    }"#;
    let cfg = GatewayConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.allowed_origins, vec!["10.0.0.2".parse::<IpAddr>().unwrap()]);
    assert_eq!(cfg.authorized_identity, "operator");
    assert_eq!(cfg.period(), Duration::from_millis(250));
    assert_eq!(cfg.cycle_bound, 5);
    // Unspecified fields keep their defaults.
    assert_eq!(cfg.rt_priority, 50);
}

#[test]
fn test_gateway_config_from_json_rejects_invalid() {
    assert!(GatewayConfig::from_json_str("{ not json").is_err());
    assert!(GatewayConfig::from_json_str(r#"{"cycle_bound": 0}"#).is_err());
}

#[test]
fn test_gateway_refuses_invalid_config() {
    let result = Gateway::new(
        GatewayConfig::default().with_period_ms(0),
        ShutdownSignal::new(),
    );
    assert!(matches!(result, Err(GatewayError::InvalidConfig(_))));
}
