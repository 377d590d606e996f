//! 映射状态文件测试
use super::common::write_config;
use portrelay::config::MappingConfig;
use portrelay::error::AppError;
use portrelay::mapping::{MappingType, NewMapping};
use portrelay::persist::{restore, MappingFile, MappingPersister};
use portrelay::registry::MappingRegistry;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::oneshot;

fn mapping(listen: &str, forward: &str, mapping_type: MappingType) -> MappingConfig {
    MappingConfig {
        listen_addr: listen.to_string(),
        forward_addr: forward.to_string(),
        mapping_type,
    }
}

#[test]
fn test_load_missing_or_empty_state_file() {
    let dir = tempdir().unwrap();
    let missing = MappingFile::load(dir.path().join("mappings.yaml")).unwrap();
    assert!(missing.mappings.is_empty());

    let empty = write_config(&dir, "empty.yaml", "\n");
    assert!(MappingFile::load(empty).unwrap().mappings.is_empty());
}

#[test]
fn test_load_invalid_state_file_is_error() {
    let dir = tempdir().unwrap();
    let broken = write_config(&dir, "broken.yaml", "mappings: {");
    assert!(matches!(MappingFile::load(broken), Err(AppError::Persist(_))));

    let invalid = write_config(
        &dir,
        "invalid.yaml",
        "mappings:\n  - listen_addr: \"nowhere\"\n    forward_addr: \"10.0.0.1:80\"\n",
    );
    assert!(matches!(MappingFile::load(invalid), Err(AppError::Persist(_))));
}

#[tokio::test]
async fn test_write_then_load() {
    let dir = tempdir().unwrap();
    // 父目录不存在时自动创建
    let path = dir.path().join("state").join("mappings.yaml");

    let file = MappingFile {
        mappings: vec![
            mapping(":80", "192.168.8.1:80", MappingType::Tcp),
            mapping("[::1]:5353", "dns.internal:53", MappingType::Udp),
        ],
    };
    file.write(&path).await.unwrap();

    assert_eq!(MappingFile::load(&path).unwrap(), file);
    // 不留下临时文件
    assert!(!dir.path().join("state").join("mappings.yaml.tmp").exists());
}

#[test]
fn test_restore_skips_invalid_entries() {
    let registry = MappingRegistry::new();
    let mappings = vec![
        mapping(":7001", "10.0.0.1:80", MappingType::Tcp),
        // 与上一条在 TCP 上冲突
        mapping(":7001", "10.0.0.2:80", MappingType::TcpUdp),
        // 指向自身
        mapping("127.0.0.1:7002", "127.0.0.1:7002", MappingType::Udp),
        mapping(":7003", "backend:53", MappingType::Udp),
    ];

    assert_eq!(restore(&registry, &mappings, "test"), 2);
    let views = registry.query();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].listen_addr, ":7001");
    assert_eq!(views[1].forward_addr, "backend:53");
}

#[tokio::test]
async fn test_persister_skips_temporary_rules_and_unchanged_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mappings.yaml");
    let registry = Arc::new(MappingRegistry::new());
    let mut persister = MappingPersister::new(registry.clone(), &path);
    assert_eq!(persister.path(), path.as_path());

    registry
        .add(NewMapping::new(":7101", "10.0.0.1:80", MappingType::Tcp))
        .unwrap();
    registry
        .add(NewMapping::new(":7102", "10.0.0.1:81", MappingType::Udp).temporary(true))
        .unwrap();

    assert!(persister.persist().await.unwrap());
    let saved = MappingFile::load(&path).unwrap();
    assert_eq!(
        saved.mappings,
        vec![mapping(":7101", "10.0.0.1:80", MappingType::Tcp)]
    );

    // 只有临时规则变化时文件内容不变
    registry.delete(":7102", MappingType::Udp).unwrap();
    assert!(!persister.persist().await.unwrap());

    registry.delete(":7101", MappingType::Tcp).unwrap();
    assert!(persister.persist().await.unwrap());
    assert!(MappingFile::load(&path).unwrap().mappings.is_empty());
}

#[tokio::test]
async fn test_persister_follows_registry_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mappings.yaml");
    let registry = Arc::new(MappingRegistry::new());
    let persister = MappingPersister::new(registry.clone(), &path);

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(persister.run_with_shutdown(async {
        let _ = rx.await;
    }));

    registry
        .add(NewMapping::new(":7201", "10.0.0.1:80", MappingType::TcpUdp))
        .unwrap();

    let mut saved = MappingFile::default();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        saved = MappingFile::load(&path).unwrap();
        if !saved.mappings.is_empty() {
            break;
        }
    }
    assert_eq!(saved.mappings.len(), 1);
    assert_eq!(saved.mappings[0].mapping_type, MappingType::TcpUdp);

    // 退出前再写一次
    registry
        .add(NewMapping::new(":7202", "10.0.0.1:81", MappingType::Tcp))
        .unwrap();
    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(MappingFile::load(&path).unwrap().mappings.len(), 2);
}
