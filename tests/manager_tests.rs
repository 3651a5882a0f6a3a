//! Integration tests for the redirect manager.
//!
//! Tests verify:
//! - Lookup semantics and deterministic tie-break order
//! - Create/delete durability against file storage
//! - Fail-safe reload on malformed payloads
//! - Snapshot consistency under concurrent reads and writes
//! - Scheduled reload lifecycle

use redirect::storage::{decode_stored_view, encode_stored_view, StorageIO};
use redirect::{
    FileStorage, ManagerState, MatchMode, MemoryStorage, RedirectError, RedirectManager,
    SchedulerConfig,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const RESOURCE: &str = "/schema/analysis/redirect";

fn memory_manager() -> (Arc<MemoryStorage>, RedirectManager) {
    let storage = Arc::new(MemoryStorage::new());
    let manager = RedirectManager::open(RESOURCE, storage.clone()).unwrap();
    (storage, manager)
}

/// Storage whose writes always fail.
#[derive(Debug)]
struct ReadOnlyStorage;

impl StorageIO for ReadOnlyStorage {
    fn load(&self) -> redirect::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn save(&self, _data: &[u8]) -> redirect::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    }

    fn location(&self) -> String {
        "read-only".to_string()
    }
}

/// In-memory storage whose saves can be switched off.
#[derive(Debug, Default)]
struct SwitchableStorage {
    inner: MemoryStorage,
    reject_saves: AtomicBool,
}

impl StorageIO for SwitchableStorage {
    fn load(&self) -> redirect::Result<Option<Vec<u8>>> {
        self.inner.load()
    }

    fn save(&self, data: &[u8]) -> redirect::Result<()> {
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into(),
            );
        }
        self.inner.save(data)
    }

    fn location(&self) -> String {
        "switchable".to_string()
    }
}

/// Storage whose loads are slow and record how many run at once.
#[derive(Debug)]
struct SlowStorage {
    inner: MemoryStorage,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowStorage {
    fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStorage::new(),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

impl StorageIO for SlowStorage {
    fn load(&self) -> redirect::Result<Option<Vec<u8>>> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.load()
    }

    fn save(&self, data: &[u8]) -> redirect::Result<()> {
        self.inner.save(data)
    }

    fn location(&self) -> String {
        "slow".to_string()
    }
}

// ============================================================================
// LOOKUP
// ============================================================================

#[test]
fn test_create_then_lookup() {
    let (_, manager) = memory_manager();
    manager
        .create("staples chair", MatchMode::Exact, "/chairs")
        .unwrap();

    let rule = manager.lookup("staples chair").unwrap();
    assert_eq!(rule.redirect_target(), Some("/chairs"));
    assert!(manager.lookup("staples chairs").is_none());
}

#[test]
fn test_first_match_in_key_order_wins() {
    let (_, manager) = memory_manager();
    manager.create("red chair", MatchMode::All, "/red").unwrap();
    manager.create("chair", MatchMode::Phrase, "/chair").unwrap();
    manager.create("office", MatchMode::All, "/office").unwrap();

    // All three match; "chair" sorts first.
    let rule = manager.lookup("red office chair").unwrap();
    assert_eq!(rule.redirect_target(), Some("/chair"));

    manager.delete("chair").unwrap();
    let rule = manager.lookup("red office chair").unwrap();
    assert_eq!(rule.redirect_target(), Some("/office"));
}

#[test]
fn test_create_replaces_existing_rule() {
    let (_, manager) = memory_manager();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();
    manager.create("desk", MatchMode::Phrase, "/new-desks").unwrap();

    assert_eq!(manager.rule_count(), 1);
    let rule = manager.lookup("standing desk").unwrap();
    assert_eq!(rule.redirect_target(), Some("/new-desks"));
}

#[test]
fn test_delete_then_lookup() {
    let (_, manager) = memory_manager();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();
    manager.delete("desk").unwrap();

    assert!(manager.lookup("desk").is_none());
    assert!(matches!(
        manager.get("desk"),
        Err(RedirectError::NotFound { .. })
    ));
}

#[test]
fn test_delete_missing_key_leaves_set_unchanged() {
    let (_, manager) = memory_manager();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();
    let version = manager.snapshot().version();

    let result = manager.delete("chair");
    assert!(matches!(result, Err(RedirectError::NotFound { .. })));
    assert_eq!(manager.snapshot().version(), version);
    assert_eq!(manager.list().len(), 1);
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[test]
fn test_writes_survive_restart() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("redirect.json");

    {
        let manager = RedirectManager::open(RESOURCE, Arc::new(FileStorage::open(&path).unwrap())).unwrap();
        manager.create("desk", MatchMode::Exact, "/desks").unwrap();
        manager.create("red chair", MatchMode::All, "/red").unwrap();
        manager.delete("desk").unwrap();
    }

    let manager = RedirectManager::open(RESOURCE, Arc::new(FileStorage::open(&path).unwrap())).unwrap();
    assert_eq!(manager.rule_count(), 1);
    assert_eq!(manager.get("red chair").unwrap().url, "/red");
}

#[test]
fn test_failed_save_does_not_publish() {
    let manager = RedirectManager::open(RESOURCE, Arc::new(ReadOnlyStorage)).unwrap();

    let result = manager.create("desk", MatchMode::Exact, "/desks");
    assert!(matches!(result, Err(RedirectError::Io(_))));
    assert!(manager.lookup("desk").is_none());
    assert_eq!(manager.snapshot().version(), 0);
}

#[test]
fn test_failed_save_on_delete_keeps_rule() {
    let storage = Arc::new(SwitchableStorage::default());
    let manager = RedirectManager::open(RESOURCE, storage.clone()).unwrap();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();
    let version = manager.snapshot().version();

    storage.reject_saves.store(true, Ordering::SeqCst);
    let result = manager.delete("desk");

    assert!(matches!(result, Err(RedirectError::Io(_))));
    assert_eq!(manager.lookup("desk").unwrap().redirect_target(), Some("/desks"));
    assert_eq!(manager.snapshot().version(), version);

    // Storage still holds the rule as well.
    let decoded = decode_stored_view(&storage.load().unwrap().unwrap()).unwrap();
    assert!(decoded.rules.contains_key("desk"));
}

#[test]
fn test_stored_view_round_trip() {
    let (storage, manager) = memory_manager();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();
    manager.create("best chair", MatchMode::Phrase, "/best").unwrap();
    manager.create("red chair", MatchMode::All, "/red").unwrap();

    let view = manager.list();
    storage.save(&encode_stored_view(&view).unwrap()).unwrap();
    let data = storage.load().unwrap().unwrap();
    let decoded = decode_stored_view(&data).unwrap();

    assert_eq!(decoded.rules, view);
    manager.reload_from_storage().unwrap();
    assert_eq!(manager.list(), view);
}

// ============================================================================
// RELOAD
// ============================================================================

#[test]
fn test_reload_replaces_whole_set() {
    let (storage, manager) = memory_manager();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();

    storage.replace(r#"{"lamp": {"url": "/lamps", "matchMode": "phrase"}}"#);
    let stats = manager.reload_from_storage().unwrap();

    assert_eq!(stats.rules_refreshed, 1);
    assert!(manager.lookup("desk").is_none());
    assert!(manager.lookup("desk lamp").is_some());
}

#[test]
fn test_reload_with_wrong_root_keeps_last_good_set() {
    let (storage, manager) = memory_manager();
    manager.create("desk", MatchMode::Exact, "/desks").unwrap();
    manager.create("red chair", MatchMode::All, "/red").unwrap();
    let before = manager.list();
    let version = manager.snapshot().version();

    storage.replace(r#"[{"url": "/x", "matchMode": "exact"}]"#);
    let result = manager.reload_from_storage();

    assert!(matches!(result, Err(RedirectError::MalformedData(_))));
    assert_eq!(manager.list(), before);
    assert_eq!(manager.snapshot().version(), version);
    assert_eq!(manager.stats().failed_reloads, 1);
}

#[test]
fn test_reload_skips_only_bad_entries() {
    let (storage, manager) = memory_manager();

    storage.replace(
        r#"{
            "desk": {"url": "/desks", "matchMode": "exact"},
            "lamp": {"url": "/lamps", "matchMode": "sideways"},
            "red chair": {"url": "/red", "matchMode": "all"}
        }"#,
    );
    let stats = manager.reload_from_storage().unwrap();

    assert_eq!(stats.rules_refreshed, 2);
    assert_eq!(stats.rules_skipped, 1);
    assert!(manager.get("lamp").is_err());
    assert!(manager.lookup("desk").is_some());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_readers_never_see_partial_mutation() {
    let (_, manager) = memory_manager();
    let manager = Arc::new(manager);
    manager.create("office chair", MatchMode::Exact, "/v0/exact").unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();

    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let mut observed = 0u64;
            while !stop.load(Ordering::Relaxed) {
                // Every mode matches this query, so a hit is the rule as last written.
                if let Some(rule) = manager.lookup("office chair") {
                    // Target always encodes the mode it was written with.
                    let target = rule.redirect_target().unwrap();
                    assert!(
                        target.ends_with(rule.match_mode().as_str()),
                        "target {} paired with mode {}",
                        target,
                        rule.match_mode()
                    );
                    observed += 1;
                }
                if let Some(rule) = manager.snapshot().get("office chair") {
                    assert!(rule
                        .redirect_target()
                        .unwrap()
                        .ends_with(rule.match_mode().as_str()));
                }
            }
            observed
        }));
    }

    let modes = [MatchMode::Exact, MatchMode::Phrase, MatchMode::All];
    for i in 0..300 {
        let mode = modes[i % modes.len()];
        let target = format!("/v{}/{}", i, mode);
        manager.create("office chair", mode, &target).unwrap();
        if i % 10 == 0 {
            manager.delete("office chair").unwrap();
        }
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_concurrent_writers_are_linearized() {
    let (storage, manager) = memory_manager();
    let manager = Arc::new(manager);

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("rule {} {}", w, i);
                    manager.create(&key, MatchMode::Exact, "/target").unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(manager.rule_count(), 100);
    assert_eq!(manager.snapshot().version(), 100);

    // The last persisted payload holds every write.
    let decoded = decode_stored_view(&storage.load().unwrap().unwrap()).unwrap();
    assert_eq!(decoded.rules.len(), 100);
}

// ============================================================================
// SCHEDULED RELOAD
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduled_reload_picks_up_external_changes() {
    let (storage, manager) = memory_manager();
    let manager = Arc::new(manager);

    let config = SchedulerConfig {
        refresh_interval: Duration::from_millis(50),
        enabled: true,
    };
    assert!(manager.start_scheduler(config.clone()));
    assert!(!manager.start_scheduler(config));

    storage.replace(r#"{"lamp": {"url": "/lamps", "matchMode": "exact"}}"#);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(manager.lookup("lamp").is_some());

    // A malformed payload is reported but does not stop later ticks.
    storage.replace("42");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(manager.lookup("lamp").is_some());
    assert!(manager.stats().failed_reloads >= 1);

    storage.replace(r#"{"desk": {"url": "/desks", "matchMode": "exact"}}"#);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(manager.lookup("desk").is_some());
    assert!(manager.scheduler_running());

    manager.shutdown().await;
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert!(!manager.scheduler_running());
}

#[tokio::test]
async fn test_no_reload_after_shutdown() {
    let (storage, manager) = memory_manager();
    let manager = Arc::new(manager);

    let config = SchedulerConfig {
        refresh_interval: Duration::from_millis(30),
        enabled: true,
    };
    assert!(manager.start_scheduler(config.clone()));
    manager.shutdown().await;

    storage.replace(r#"{"lamp": {"url": "/lamps", "matchMode": "exact"}}"#);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(manager.lookup("lamp").is_none());

    // Cannot be restarted once stopped.
    assert!(!manager.start_scheduler(config));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scheduled_reloads_never_overlap() {
    let storage = Arc::new(SlowStorage::new(Duration::from_millis(80)));
    let manager = Arc::new(RedirectManager::open(RESOURCE, storage.clone()).unwrap());
    storage.calls.store(0, Ordering::SeqCst);

    let config = SchedulerConfig {
        refresh_interval: Duration::from_millis(10),
        enabled: true,
    };
    assert!(manager.start_scheduler(config));
    tokio::time::sleep(Duration::from_millis(600)).await;
    manager.shutdown().await;

    let calls = storage.calls.load(Ordering::SeqCst);
    assert!(calls >= 2, "only {} scheduled loads ran", calls);
    assert_eq!(storage.max_active.load(Ordering::SeqCst), 1);

    // The in-flight load finished inside shutdown; nothing starts afterwards.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(storage.calls.load(Ordering::SeqCst), calls);
    assert_eq!(storage.active.load(Ordering::SeqCst), 0);
}

#[test]
fn test_start_racing_shutdown_never_leaves_a_running_scheduler() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let config = SchedulerConfig {
        refresh_interval: Duration::from_secs(60),
        enabled: true,
    };

    for _ in 0..200 {
        let (_, manager) = memory_manager();
        let manager = Arc::new(manager);
        let barrier = Arc::new(Barrier::new(2));

        let starter = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let handle = runtime.handle().clone();
            let config = config.clone();
            thread::spawn(move || {
                let _guard = handle.enter();
                barrier.wait();
                manager.start_scheduler(config)
            })
        };
        let stopper = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let handle = runtime.handle().clone();
            thread::spawn(move || {
                barrier.wait();
                handle.block_on(manager.shutdown());
            })
        };

        let started = starter.join().unwrap();
        stopper.join().unwrap();

        assert_eq!(manager.state(), ManagerState::Stopped);
        assert!(
            !manager.scheduler_running(),
            "scheduler left running after shutdown (started = {})",
            started
        );
    }
}

#[test]
fn test_disabled_scheduler() {
    let (_, manager) = memory_manager();
    let manager = Arc::new(manager);
    let config = SchedulerConfig {
        refresh_interval: Duration::from_secs(60),
        enabled: false,
    };
    assert!(!manager.start_scheduler(config));
}
