use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tonewell_kernel_contracts::artifact::GeneratedArtifact;
use tonewell_kernel_contracts::UnixTimeMs;
use tonewell_storage::artifact_store::{
    ExpiringArtifactStore, ExpiryOutcome, DOWNLOADED_ARTIFACT_TTL, ISSUED_ARTIFACT_TTL,
};
use tonewell_storage::StoreError;

struct Scratch {
    dir: PathBuf,
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn scratch(name: &str) -> Scratch {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let dir = std::env::temp_dir().join(format!("tonewell-expiry-{name}-{suffix}"));
    fs::create_dir_all(&dir).unwrap();
    Scratch { dir }
}

fn artifact(s: &Scratch, name: &str) -> GeneratedArtifact {
    let path = s.dir.join(name);
    fs::write(&path, b"RIFF-artifact").unwrap();
    GeneratedArtifact::new(path, UnixTimeMs(1))
}

#[tokio::test(start_paused = true)]
async fn at_expiry_01_file_survives_until_delay_elapses() {
    let s = scratch("delay");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.clone()).unwrap();
    let a = artifact(&s, "beat_1.wav");

    let handle = store
        .schedule_artifact_expiry(&a, DOWNLOADED_ARTIFACT_TTL)
        .unwrap();
    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
    assert!(a.file_path.exists());
    assert!(!handle.is_finished());

    assert_eq!(handle.wait().await, Some(ExpiryOutcome::Deleted));
    assert!(!a.file_path.exists());
}

#[tokio::test(start_paused = true)]
async fn at_expiry_02_short_then_long_both_fire_without_error() {
    let s = scratch("short-long");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.clone()).unwrap();
    let a = artifact(&s, "beat_2.wav");

    let short = store
        .schedule_expiry(&a.file_path, DOWNLOADED_ARTIFACT_TTL)
        .unwrap();
    let long = store
        .schedule_expiry(&a.file_path, ISSUED_ARTIFACT_TTL)
        .unwrap();

    assert_eq!(short.wait().await, Some(ExpiryOutcome::Deleted));
    assert_eq!(long.wait().await, Some(ExpiryOutcome::AlreadyGone));
    assert!(!a.file_path.exists());
}

#[tokio::test(start_paused = true)]
async fn at_expiry_03_scheduling_order_does_not_matter() {
    let s = scratch("long-short");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.clone()).unwrap();
    let a = artifact(&s, "beat_3.wav");

    let long = store
        .schedule_expiry(&a.file_path, ISSUED_ARTIFACT_TTL)
        .unwrap();
    tokio::time::advance(Duration::from_secs(600)).await;
    let short = store
        .schedule_expiry(&a.file_path, DOWNLOADED_ARTIFACT_TTL)
        .unwrap();

    assert_eq!(long.wait().await, Some(ExpiryOutcome::AlreadyGone));
    assert_eq!(short.wait().await, Some(ExpiryOutcome::Deleted));
    assert!(!a.file_path.exists());
}

#[tokio::test(start_paused = true)]
async fn at_expiry_04_cancelled_timer_leaves_file_in_place() {
    let s = scratch("cancel");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.clone()).unwrap();
    let a = artifact(&s, "beat_4.wav");

    let handle = store
        .schedule_expiry(&a.file_path, DOWNLOADED_ARTIFACT_TTL)
        .unwrap();
    handle.cancel();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(a.file_path.exists());
    assert_eq!(handle.wait().await, None);
}

#[tokio::test(start_paused = true)]
async fn at_expiry_05_already_deleted_file_is_a_quiet_noop() {
    let s = scratch("gone");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.clone()).unwrap();
    let a = artifact(&s, "beat_5.wav");
    fs::remove_file(&a.file_path).unwrap();

    let handle = store
        .schedule_expiry(&a.file_path, DOWNLOADED_ARTIFACT_TTL)
        .unwrap();
    assert_eq!(handle.wait().await, Some(ExpiryOutcome::AlreadyGone));
}

#[tokio::test(start_paused = true)]
async fn at_expiry_06_paths_outside_scratch_are_refused() {
    let s = scratch("outside");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.join("inner")).unwrap();
    let a = artifact(&s, "beat_6.wav");

    let err = store
        .schedule_expiry(&a.file_path, DOWNLOADED_ARTIFACT_TTL)
        .expect_err("outside scratch must be refused");
    assert!(matches!(err, StoreError::OutsideScratch(_)));
    assert!(!store.artifact_exists(&a.file_path));
    assert!(a.file_path.exists());
}

#[test]
fn at_expiry_07_store_needs_a_runtime() {
    assert!(matches!(
        ExpiringArtifactStore::for_current_runtime(PathBuf::from("/tmp")),
        Err(StoreError::NoRuntime)
    ));
}

#[tokio::test(start_paused = true)]
async fn at_expiry_08_dropping_the_handle_keeps_the_timer() {
    let s = scratch("dropped");
    let store = ExpiringArtifactStore::for_current_runtime(s.dir.clone()).unwrap();
    let a = artifact(&s, "beat_8.wav");

    drop(
        store
            .schedule_expiry(&a.file_path, DOWNLOADED_ARTIFACT_TTL)
            .unwrap(),
    );
    tokio::time::sleep(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    assert!(!a.file_path.exists());
}
