//! File injection round trips against the fake runtime

use std::sync::Arc;

use headscale_e2e::{CommandRunner, FileInjector, InjectError};
use headscale_tests::{Call, Fault, FakeRuntime};

fn setup() -> (Arc<FakeRuntime>, CommandRunner, String) {
    let runtime = Arc::new(FakeRuntime::new());
    let id = runtime.seed_container("hs-inject");
    let runner = CommandRunner::new(runtime.clone(), id.clone(), "hs-inject");
    (runtime, runner, id)
}

#[tokio::test]
async fn test_write_then_read_back() {
    let (_runtime, runner, _) = setup();
    let injector = FileInjector::new(&runner);

    injector
        .write_file("/etc/headscale/config.yaml", b"log:\n  level: trace\n")
        .await
        .unwrap();
    let data = injector.read_file("/etc/headscale/config.yaml").await.unwrap();
    assert_eq!(data, b"log:\n  level: trace\n");
}

#[tokio::test]
async fn test_empty_and_binary_payloads_round_trip() {
    let (_runtime, runner, _) = setup();
    let injector = FileInjector::new(&runner);

    injector.write_file("/tmp/empty", b"").await.unwrap();
    assert!(injector.read_file("/tmp/empty").await.unwrap().is_empty());

    let binary: Vec<u8> = (0..=255u8).cycle().take(3 * 1024 * 1024 + 7).collect();
    injector.write_file("/var/lib/blob.bin", &binary).await.unwrap();
    assert_eq!(injector.read_file("/var/lib/blob.bin").await.unwrap(), binary);
}

#[tokio::test]
async fn test_long_file_names_round_trip() {
    let (runtime, runner, id) = setup();
    let injector = FileInjector::new(&runner);

    for len in [150, 255] {
        let path = format!("/tmp/{}", "n".repeat(len));
        injector.write_file(&path, b"payload").await.unwrap();
        assert_eq!(injector.read_file(&path).await.unwrap(), b"payload");
        assert_eq!(runtime.file(&id, &path).unwrap(), b"payload");
    }
}

#[tokio::test]
async fn test_parent_directories_are_created_first() {
    let (runtime, runner, id) = setup();

    FileInjector::new(&runner)
        .write_file("/a/b/c/file.txt", b"deep")
        .await
        .unwrap();

    assert!(runtime.has_dir(&id, "/a/b/c"));
    let calls = runtime.calls();
    let mkdir = calls
        .iter()
        .position(|c| matches!(c, Call::Exec(_, argv) if argv[0] == "mkdir"))
        .unwrap();
    let upload = calls
        .iter()
        .position(|c| *c == Call::Upload(id.clone(), "/a/b/c".to_string()))
        .unwrap();
    assert!(mkdir < upload);
}

#[tokio::test]
async fn test_overwrite_existing_file() {
    let (_runtime, runner, _) = setup();
    let injector = FileInjector::new(&runner);

    injector.write_file("/tmp/x", b"first").await.unwrap();
    injector.write_file("/tmp/x", b"second").await.unwrap();
    assert_eq!(injector.read_file("/tmp/x").await.unwrap(), b"second");
}

#[tokio::test]
async fn test_directory_is_not_replaced_by_file() {
    let (_runtime, runner, _) = setup();
    let injector = FileInjector::new(&runner);

    let err = injector.write_file("/etc", b"nope").await.unwrap_err();
    assert!(matches!(err, InjectError::Upload { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_failed_upload_leaves_directory_behind() {
    let (runtime, runner, id) = setup();
    runtime.inject_fault(Fault::Upload);

    let err = FileInjector::new(&runner)
        .write_file("/srv/new/file", b"data")
        .await
        .unwrap_err();

    assert!(matches!(err, InjectError::Upload { .. }));
    assert!(runtime.has_dir(&id, "/srv/new"));
    assert!(runtime.file(&id, "/srv/new/file").is_none());
}

#[tokio::test]
async fn test_mkdir_failure_is_reported_as_ensure_directory() {
    let (_runtime, runner, _) = setup();
    let injector = FileInjector::new(&runner);
    injector.write_file("/tmp/occupied", b"file").await.unwrap();

    let err = injector
        .write_file("/tmp/occupied/child", b"x")
        .await
        .unwrap_err();
    match err {
        InjectError::EnsureDirectory { dir, source } => {
            assert_eq!(dir, "/tmp/occupied");
            assert!(source.stderr().unwrap_or_default().contains("File exists"));
        }
        other => panic!("expected EnsureDirectory, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_paths_touch_nothing() {
    let (runtime, runner, _) = setup();
    let injector = FileInjector::new(&runner);
    let calls_before = runtime.calls().len();

    for path in ["relative/file", "/tmp/dir/", "", "/tmp/.."] {
        let err = injector.write_file(path, b"x").await.unwrap_err();
        assert!(matches!(err, InjectError::InvalidPath(_)), "{}: {:?}", path, err);
    }
    assert_eq!(runtime.calls().len(), calls_before);
}

#[tokio::test]
async fn test_reading_missing_file_fails() {
    let (_runtime, runner, _) = setup();

    let err = FileInjector::new(&runner)
        .read_file("/tmp/absent")
        .await
        .unwrap_err();
    assert!(matches!(err, InjectError::Read { .. }));
}
