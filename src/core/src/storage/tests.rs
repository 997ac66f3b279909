//! Behaviour every backend has to share, run against each of them.

use std::sync::Arc;

use tempfile::TempDir;

use crate::configuration::types::StorageConfig;
use crate::error_handling::types::StorageError;
use crate::storage::lifecycle::{self, Shutdown};
use crate::storage::loader::{load, Backend};
use crate::storage::storage_trait::Storer;
use crate::storage::types::{now_minute, Data, View};

/// Opens one fresh store per backend kind inside `dir`.
async fn backends(dir: &TempDir, shutdown: Shutdown) -> Vec<Backend> {
    let embedded = dir.path().join("kv").to_string_lossy().into_owned();
    let relational = dir.path().join("store.db").to_string_lossy().into_owned();
    let configs = [
        StorageConfig::new("embedded", embedded),
        StorageConfig::new("relational", relational),
        StorageConfig::new("memory", ""),
    ];

    let mut opened = Vec::new();
    for config in &configs {
        opened.push(load(config, shutdown.clone()).await.unwrap());
    }
    opened
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_writes_create_namespace_once() {
    const WRITERS: usize = 16;
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        let backend = Arc::new(backend);
        let mut handles = Vec::new();
        for i in 0..WRITERS {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let dt = format!("2022-01-02 03:{:02}", i);
                backend.write(Data::new("fresh", dt, "t", i.to_string())).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let kind = backend.kind();
        assert_eq!(backend.read("fresh").await.unwrap().len(), WRITERS, "{}", kind);
        assert_eq!(backend.modules().await.unwrap(), vec!["fresh".to_string()], "{}", kind);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_to_other_modules_do_not_interfere() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        let backend = Arc::new(backend);
        let mut handles = Vec::new();
        for module in ["alpha", "beta", "gamma"] {
            for i in 0..5 {
                let backend = backend.clone();
                handles.push(tokio::spawn(async move {
                    let dt = format!("2022-01-02 03:{:02}", i);
                    backend.write(Data::new(module, dt, "t", "v")).await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        for module in ["alpha", "beta", "gamma"] {
            assert_eq!(backend.read(module).await.unwrap().len(), 5, "{}", backend.kind());
        }
    }
}

#[tokio::test]
async fn test_overwrite_keeps_last_value() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        backend.write(Data::new("m", "2022-01-02 03:04", "t", "a")).await.unwrap();
        backend.write(Data::new("m", "2022-01-02 03:04", "t", "b")).await.unwrap();

        let records = backend.read("m").await.unwrap();
        assert_eq!(records.len(), 1, "{}", backend.kind());
        assert_eq!(records[0].value, "b", "{}", backend.kind());
    }
}

#[tokio::test]
async fn test_default_timestamp_is_current_minute() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        let before = now_minute();
        backend.write(Data::new("m", "", "t", "x")).await.unwrap();
        let after = now_minute();

        let records = backend.read("m").await.unwrap();
        assert_eq!(records.len(), 1);
        let stamped = &records[0].date_time;
        assert!(stamped == &before || stamped == &after, "{}: {}", backend.kind(), stamped);
    }
}

#[tokio::test]
async fn test_empty_topic_or_module_is_rejected() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        let result = backend.write(Data::new("m", "", "", "x")).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        let result = backend.write(Data::new("", "", "t", "x")).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        assert!(matches!(backend.read("m").await, Err(StorageError::NotFound(_))));
    }
}

#[tokio::test]
async fn test_view_shape() {
    let dir = TempDir::new().unwrap();

    let mut expected = View::new();
    expected.entry("t1".into()).or_default().insert("00:00".into(), "10".into());
    expected.entry("t1".into()).or_default().insert("00:01".into(), "11".into());
    expected.entry("t2".into()).or_default().insert("00:00".into(), "100".into());

    for backend in backends(&dir, Shutdown::never()).await {
        for (topic, dt, value) in [("t1", "00:00", "10"), ("t1", "00:01", "11"), ("t2", "00:00", "100")] {
            backend.write(Data::new("view", dt, topic, value)).await.unwrap();
        }
        assert_eq!(backend.view("view").await.unwrap(), expected, "{}", backend.kind());
    }
}

#[tokio::test]
async fn test_unknown_module_then_write() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        assert!(matches!(
            backend.read("no-such-module").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.view("no-such-module").await,
            Err(StorageError::NotFound(_))
        ));

        backend
            .write(Data::new("no-such-module", "2022-01-02 03:04", "t", "1"))
            .await
            .unwrap();
        assert_eq!(backend.read("no-such-module").await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_round_trip_preserves_every_field() {
    let dir = TempDir::new().unwrap();
    let samples = [
        Data::new("cave", "2022-01-02 03:04", "temp", "21.5"),
        Data::new("probes", "2022-01-02 03:05", "ds18b20/28-0000", "off"),
        Data::new("x_y-z", "1999-12-31 23:59", "with space", ""),
    ];

    for backend in backends(&dir, Shutdown::never()).await {
        for sample in &samples {
            backend.write(sample.clone()).await.unwrap();
            let records = backend.read(&sample.module).await.unwrap();
            assert_eq!(records, vec![sample.clone()], "{}", backend.kind());
        }
    }
}

#[tokio::test]
async fn test_invalid_module_names_are_rejected() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        for name in ["a\"; DROP TABLE x; --", "sqlite_master", "has space", "default/.."] {
            let result = backend.write(Data::new(name, "", "t", "v")).await;
            assert!(matches!(result, Err(StorageError::InvalidArgument(_))), "{}", name);
            assert!(matches!(backend.read(name).await, Err(StorageError::InvalidArgument(_))));
        }
    }
}

#[tokio::test]
async fn test_calls_after_shutdown_fail_fast() {
    let dir = TempDir::new().unwrap();
    let (trigger, shutdown) = lifecycle::channel();
    let opened = backends(&dir, shutdown).await;

    for backend in &opened {
        backend.write(Data::new("m", "2022-01-02 03:04", "t", "v")).await.unwrap();
    }
    trigger.trigger();
    tokio::task::yield_now().await;

    for backend in &opened {
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            backend.read("m"),
        )
        .await
        .expect("call after shutdown must not hang");
        assert!(
            matches!(result, Err(StorageError::BackendUnavailable(_))),
            "{}: {:?}",
            backend.kind(),
            result
        );
    }
}

#[tokio::test]
async fn test_modules_differing_in_case_stay_apart() {
    let dir = TempDir::new().unwrap();

    for backend in backends(&dir, Shutdown::never()).await {
        backend
            .write(Data::new("cave", "2022-01-02 03:04", "t", "lower"))
            .await
            .unwrap();
        let upper = backend
            .write(Data::new("Cave", "2022-01-02 03:04", "t", "upper"))
            .await;
        assert!(
            matches!(upper, Err(StorageError::InvalidArgument(_))),
            "{}: {:?}",
            backend.kind(),
            upper
        );

        let records = backend.read("cave").await.unwrap();
        assert_eq!(
            records,
            vec![Data::new("cave", "2022-01-02 03:04", "t", "lower")],
            "{}",
            backend.kind()
        );
        assert!(matches!(
            backend.read("Cave").await,
            Err(StorageError::InvalidArgument(_))
        ));
    }
}

/// Fires shutdown while writes are in flight, then reopens the same files
/// and checks that only whole records made it to disk.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_during_writes_leaves_whole_records() {
    const WRITERS: usize = 64;
    let dir = TempDir::new().unwrap();
    let embedded = dir.path().join("kv").to_string_lossy().into_owned();
    let relational = dir.path().join("store.db").to_string_lossy().into_owned();

    for config in [
        StorageConfig::new("embedded", embedded),
        StorageConfig::new("relational", relational),
    ] {
        let (trigger, shutdown) = lifecycle::channel();
        let backend = Arc::new(load(&config, shutdown).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..WRITERS {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let dt = format!("2022-01-02 {:02}:{:02}", i / 60, i % 60);
                let value = format!("value-{}", i);
                (i, backend.write(Data::new("burst", dt, "t", value)).await)
            }));
        }
        tokio::task::yield_now().await;
        trigger.trigger();

        let mut written = Vec::new();
        for handle in handles {
            let (i, result) = handle.await.unwrap();
            match result {
                Ok(()) => written.push(i),
                Err(StorageError::Cancelled) | Err(StorageError::BackendUnavailable(_)) => {}
                Err(e) => panic!("{}: unexpected error {:?}", config.kind, e),
            }
        }
        backend.close().await;
        drop(backend);

        // blocking engine calls abandoned by the cancelled futures may still
        // hold the embedded lock for a moment
        let mut reopened = None;
        for _ in 0..50 {
            match load(&config, Shutdown::never()).await {
                Ok(b) => {
                    reopened = Some(b);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(100)).await,
            }
        }
        let reopened = reopened.expect("store reopens after shutdown");

        let records = match reopened.read("burst").await {
            Ok(records) => records,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => panic!("{}: reopened read failed {:?}", config.kind, e),
        };
        for record in &records {
            assert_eq!(record.module, "burst");
            assert_eq!(record.topic, "t");
            assert!(record.value.starts_with("value-"), "{:?}", record);
        }
        for i in written {
            let value = format!("value-{}", i);
            assert!(
                records.iter().any(|r| r.value == value),
                "{}: acknowledged write {} is missing",
                config.kind,
                i
            );
        }
        reopened.close().await;
    }
}
