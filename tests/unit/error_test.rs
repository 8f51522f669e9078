//! Tests for error types

use std::error::Error as _;
use std::io;

use rt_gatekeeper::core::GatewayError;

#[test]
fn test_origin_rejected_error() {
    let err = GatewayError::OriginRejected("10.0.0.7".parse().unwrap());
    assert_eq!(format!("{}", err), "origin 10.0.0.7 is not authorized");
    assert!(err.is_authorization_failure());
    assert!(!err.is_soft());
}

#[test]
fn test_credential_rejected_error() {
    let err = GatewayError::CredentialRejected;
    assert_eq!(format!("{}", err), "credential rejected");
    assert!(err.is_authorization_failure());
}

#[test]
fn test_transport_errors_keep_source() {
    let err = GatewayError::TransportRead(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
    assert_eq!(format!("{}", err), "transport read error: reset");
    assert!(err.source().is_some());

    let err = GatewayError::TransportWrite(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
    assert_eq!(format!("{}", err), "transport write error: pipe");
    assert!(!err.is_authorization_failure());
}

#[test]
fn test_elevation_unavailable_is_soft() {
    let err = GatewayError::PrivilegeElevationUnavailable("EPERM".to_string());
    assert_eq!(format!("{}", err), "privilege elevation unavailable: EPERM");
    assert!(err.is_soft());
}

#[test]
fn test_timing_wait_error() {
    let err = GatewayError::TimingWait("EINVAL".to_string());
    assert_eq!(format!("{}", err), "timing wait failed: EINVAL");
    assert!(!err.is_soft());
}

#[test]
fn test_invalid_config_error() {
    let err = GatewayError::InvalidConfig("period_ms must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: period_ms must be greater than 0"
    );
}
