//! 配置文件加载测试
use super::common::{write_config, FULL_CONFIG};
use portrelay::config::Config;
use portrelay::error::AppError;
use portrelay::mapping::MappingType;
use portrelay::relay::RelaySettings;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_load_full_config() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "config.yaml", FULL_CONFIG);

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.admin.address, "0.0.0.0");
    assert_eq!(config.admin.port, 9090);
    assert_eq!(config.admin.auth_code, "s3cret");
    assert_eq!(config.admin.timeout, 15);
    assert_eq!(config.relay.grace_period, 0);
    assert_eq!(config.relay.udp_max_sessions, 256);
    assert_eq!(
        config.state_file,
        Some(PathBuf::from("/var/lib/portrelay/mappings.yaml"))
    );

    assert_eq!(config.mappings.len(), 3);
    assert_eq!(config.mappings[0].mapping_type, MappingType::Tcp);
    assert_eq!(config.mappings[1].mapping_type, MappingType::TcpUdp);
    // 未指定时默认为 tcpudp
    assert_eq!(config.mappings[2].mapping_type, MappingType::TcpUdp);

    assert_eq!(
        config.admin_addr().unwrap(),
        "0.0.0.0:9090".parse().unwrap()
    );
    config.check_auth_code().unwrap();

    let settings = RelaySettings::from(&config.relay);
    assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    assert_eq!(settings.udp_idle_timeout, Duration::from_secs(120));
    assert_eq!(settings.buffer_size, 32768);
}

#[test]
fn test_defaults_for_missing_sections() {
    let config = Config::from_yaml("admin:\n  auth_code: abc\n").unwrap();
    assert_eq!(config.admin.address, "127.0.0.1");
    assert_eq!(config.admin.port, 7655);
    assert_eq!(config.admin.timeout, 30);
    assert_eq!(config.relay.connect_timeout, 10);
    assert_eq!(config.relay.grace_period, 20);
    assert_eq!(config.relay.half_close_timeout, 30);
    assert_eq!(config.relay.udp_idle_timeout, 60);
    assert_eq!(config.relay.udp_max_sessions, 1024);
    assert_eq!(config.relay.udp_queue_depth, 64);
    assert_eq!(config.relay.buffer_size, 16384);
    assert_eq!(config.relay.backlog, 1024);
    assert_eq!(config.relay.reconcile_wait, 10);
    assert!(config.state_file.is_none());
    assert!(config.mappings.is_empty());
}

#[test]
fn test_empty_file_is_default_config() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "empty.yaml", "   \n");
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.admin.port, 7655);
}

#[test]
fn test_missing_file_falls_back_to_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    assert!(matches!(Config::from_file(&path), Err(AppError::Config(_))));

    let config = Config::from_file_or_default(&path).unwrap();
    assert_eq!(config.admin.port, 7655);
    // 缺省配置没有授权码，启动时必须通过命令行提供
    assert!(matches!(
        config.check_auth_code(),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "bad.yaml", "admin: [unclosed");
    assert!(matches!(Config::from_file(&path), Err(AppError::Config(_))));
}

#[test]
fn test_ipv6_admin_address() {
    let config = Config::from_yaml("admin:\n  address: \"::1\"\n  port: 7000\n").unwrap();
    assert_eq!(config.admin_addr().unwrap(), "[::1]:7000".parse().unwrap());
}
