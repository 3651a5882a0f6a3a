//! Redirect manager - the live rule set behind query-time lookups.
//!
//! # Architecture
//! - The live rule set is an immutable [`RuleSnapshot`] behind an `Arc`
//! - Readers clone the `Arc` and scan without holding any lock
//! - Writers (create, delete, batch update, reload) take a single writer
//!   lock, build a fresh snapshot, persist it and then swap the pointer
//! - Storage I/O never happens while the snapshot pointer is locked, so a
//!   slow save cannot stall queries
//!
//! Lookup order is ascending by rule key, so when several rules match the
//! same query the smallest key wins.

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{RedirectError, Result};
use crate::matching::normalize_query;
use crate::refresh::{RefreshScheduler, RefreshStats, SchedulerConfig, SchedulerHandle};
use crate::rule::{MatchMode, Rule};
use crate::storage::types::json_kind;
use crate::storage::{decode_stored_view, encode_stored_view, StorageIO, StoredRule, StoredView};
use crate::types::{elapsed_ms, now_ms};

/// Resource id used when the embedder does not supply one.
pub const DEFAULT_RESOURCE_ID: &str = "/schema/analysis/redirect";

// ================================================================================================
// SNAPSHOT
// ================================================================================================

/// One published version of the rule set. Never mutated after publication.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    version: u64,
    rules: BTreeMap<String, Arc<Rule>>,
}

impl RuleSnapshot {
    fn new(version: u64, rules: BTreeMap<String, Arc<Rule>>) -> Self {
        Self { version, rules }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Rule>> {
        self.rules.get(key)
    }

    /// Rules in lookup order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Rule>)> {
        self.rules.iter()
    }

    /// First rule, in key order, that matches the normalized query.
    pub fn find_match(&self, query: &str) -> Option<&Arc<Rule>> {
        self.rules.values().find(|rule| rule.matches(query))
    }

    /// Persisted/listed shape of this snapshot.
    pub fn stored_view(&self) -> StoredView {
        self.rules
            .iter()
            .map(|(key, rule)| (key.clone(), StoredRule::from(rule.as_ref())))
            .collect()
    }
}

// ================================================================================================
// LIFECYCLE
// ================================================================================================

/// Lifecycle of a manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// Initial load from storage in progress
    Loading,
    /// Serving reads and writes
    Ready,
    /// A reload is building the next snapshot; reads and writes still served
    Reloading,
    /// Shutdown requested; no new scheduled reload will start
    ShuttingDown,
    /// Scheduler stopped
    Stopped,
}

/// Manager-level statistics.
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub resource_id: String,
    pub state: ManagerState,
    /// Version of the live snapshot (increments on every publication)
    pub version: u64,
    pub rule_count: usize,
    pub created_at: u64,
    /// Last successful load or reload (Unix ms)
    pub last_reload_at: u64,
    pub failed_reloads: u64,
}

// ================================================================================================
// MANAGER
// ================================================================================================

/// Owner of the live redirect rules.
pub struct RedirectManager {
    resource_id: String,
    /// Live snapshot; the lock is held only to clone or swap the pointer
    live: RwLock<Arc<RuleSnapshot>>,
    /// Single-writer discipline for every mutation and for storage writes
    writer: Mutex<()>,
    storage: Arc<dyn StorageIO>,
    state: RwLock<ManagerState>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    created_at: u64,
    last_reload_at: RwLock<u64>,
    failed_reloads: RwLock<u64>,
}

impl fmt::Debug for RedirectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("RedirectManager")
            .field("resource_id", &self.resource_id)
            .field("storage", &self.storage.location())
            .field("version", &snapshot.version())
            .field("rules", &snapshot.len())
            .field("state", &self.state())
            .finish()
    }
}

impl RedirectManager {
    /// Creates a manager and synchronously loads whatever the backend holds.
    ///
    /// No stored data is not an error: the manager starts empty. A payload
    /// that cannot be used at all (I/O failure, invalid JSON, non-object
    /// root) is returned to the caller. Individual bad entries are skipped.
    pub fn open(resource_id: impl Into<String>, storage: Arc<dyn StorageIO>) -> Result<Self> {
        let manager = Self {
            resource_id: resource_id.into(),
            live: RwLock::new(Arc::new(RuleSnapshot::default())),
            writer: Mutex::new(()),
            storage,
            state: RwLock::new(ManagerState::Loading),
            scheduler: Mutex::new(None),
            created_at: now_ms(),
            last_reload_at: RwLock::new(0),
            failed_reloads: RwLock::new(0),
        };

        let stats = {
            let _writer = manager.writer.lock();
            manager.load_locked()?
        };
        *manager.last_reload_at.write() = now_ms();
        *manager.state.write() = ManagerState::Ready;

        info!(
            "Loaded {} redirect mappings for {} from {}",
            stats.rules_refreshed,
            manager.resource_id,
            manager.storage.location()
        );
        Ok(manager)
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    /// The current live snapshot.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.live.read())
    }

    pub fn rule_count(&self) -> usize {
        self.snapshot().len()
    }

    // ============================================================================================
    // QUERY PATH
    // ============================================================================================

    /// Returns the first rule matching an already-normalized query.
    ///
    /// Never blocks behind a writer's storage I/O and never fails; a miss is
    /// `None`.
    pub fn lookup(&self, normalized_query: &str) -> Option<Arc<Rule>> {
        let snapshot = self.snapshot();
        snapshot.find_match(normalized_query).map(Arc::clone)
    }

    // ============================================================================================
    // ADMINISTRATIVE PATH
    // ============================================================================================

    /// Inserts or replaces the rule at `key` and persists the full set.
    ///
    /// The new rule is visible to lookups only once storage accepted it.
    pub fn create(&self, key: &str, match_mode: MatchMode, target: &str) -> Result<()> {
        validate_key(key)?;
        let rule = Arc::new(Rule::redirect(key, match_mode, target));
        warn_if_unnormalized(key);

        let snapshot = self.commit(|rules| {
            rules.insert(key.to_string(), rule);
            Ok(())
        })?;

        info!(
            "Stored redirect mapping for: {} ({}, version {})",
            key,
            match_mode,
            snapshot.version()
        );
        Ok(())
    }

    /// Removes the rule at `key` and persists the remaining set.
    pub fn delete(&self, key: &str) -> Result<()> {
        let snapshot = self.commit(|rules| {
            rules
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| self.not_found(key))
        })?;

        info!(
            "Removed redirect mapping for: {} (version {})",
            key,
            snapshot.version()
        );
        Ok(())
    }

    /// Applies an administrative update body `{key: {url, matchMode}, ...}`.
    ///
    /// Every entry is validated before anything is written; one invalid entry
    /// rejects the whole body. Returns the number of rules written.
    pub fn apply_updates(&self, updates: &Value) -> Result<usize> {
        let entries = updates.as_object().ok_or_else(|| {
            RedirectError::InvalidArgument(format!(
                "Unsupported data format ({}); expected a JSON object of rules",
                json_kind(updates)
            ))
        })?;

        let mut parsed = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            validate_key(key)?;
            let stored: StoredRule = serde_json::from_value(value.clone()).map_err(|e| {
                RedirectError::InvalidArgument(format!("Invalid rule '{}': {}", key, e))
            })?;
            let rule = Rule::redirect(key.as_str(), stored.match_mode, stored.url);
            warn_if_unnormalized(key);
            parsed.push((key.clone(), Arc::new(rule)));
        }

        if parsed.is_empty() {
            return Ok(0);
        }

        let count = parsed.len();
        let snapshot = self.commit(move |rules| {
            rules.extend(parsed);
            Ok(())
        })?;

        info!(
            "Applied {} redirect mapping updates to {} (version {})",
            count,
            self.resource_id,
            snapshot.version()
        );
        Ok(count)
    }

    /// Stored record for one key.
    pub fn get(&self, key: &str) -> Result<StoredRule> {
        self.snapshot()
            .get(key)
            .map(|rule| StoredRule::from(rule.as_ref()))
            .ok_or_else(|| self.not_found(key))
    }

    /// Stored view of the whole live set.
    pub fn list(&self) -> StoredView {
        self.snapshot().stored_view()
    }

    // ============================================================================================
    // RELOAD
    // ============================================================================================

    /// Replaces the live set with a fresh decode of storage.
    ///
    /// Serialized with admin writes. On `MalformedData` or I/O failure the
    /// live snapshot is left untouched. If storage holds no data the live
    /// snapshot is kept as well.
    pub fn reload_from_storage(&self) -> Result<RefreshStats> {
        let _writer = self.writer.lock();
        self.transition(ManagerState::Ready, ManagerState::Reloading);

        let result = self.load_locked();

        self.transition(ManagerState::Reloading, ManagerState::Ready);
        match &result {
            Ok(_) => *self.last_reload_at.write() = now_ms(),
            Err(_) => *self.failed_reloads.write() += 1,
        }
        result
    }

    /// Spawns the periodic reload task on the current tokio runtime.
    ///
    /// Returns `false` if the scheduler is disabled, already running, the
    /// manager is shutting down, or no runtime is available.
    pub fn start_scheduler(self: &Arc<Self>, config: SchedulerConfig) -> bool {
        // State is checked under the slot lock; `shutdown` flips it under the same lock.
        let mut slot = self.scheduler.lock();
        if matches!(
            self.state(),
            ManagerState::ShuttingDown | ManagerState::Stopped
        ) {
            warn!("Not starting scheduled reload for {}: shutting down", self.resource_id);
            return false;
        }
        if slot.is_some() {
            warn!("Scheduled reload already running for {}", self.resource_id);
            return false;
        }

        match RefreshScheduler::new(Arc::downgrade(self), config).spawn() {
            Some(handle) => {
                *slot = Some(handle);
                true
            }
            None => false,
        }
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the reload task. An in-flight reload completes first; no new
    /// tick starts after this is called.
    pub async fn shutdown(&self) {
        let handle = {
            let mut slot = self.scheduler.lock();
            *self.state.write() = ManagerState::ShuttingDown;
            slot.take()
        };
        if let Some(handle) = handle {
            handle.shutdown().await;
        }

        *self.state.write() = ManagerState::Stopped;
        info!("Redirect manager for {} stopped", self.resource_id);
    }

    // ============================================================================================
    // STATISTICS
    // ============================================================================================

    pub fn stats(&self) -> ManagerStats {
        let snapshot = self.snapshot();
        ManagerStats {
            resource_id: self.resource_id.clone(),
            state: self.state(),
            version: snapshot.version(),
            rule_count: snapshot.len(),
            created_at: self.created_at,
            last_reload_at: *self.last_reload_at.read(),
            failed_reloads: *self.failed_reloads.read(),
        }
    }

    // ============================================================================================
    // INTERNALS
    // ============================================================================================

    /// Builds, persists and publishes the next snapshot. Holds the writer
    /// lock for the whole operation; nothing is published if `mutate` or
    /// the save fails.
    fn commit<F>(&self, mutate: F) -> Result<Arc<RuleSnapshot>>
    where
        F: FnOnce(&mut BTreeMap<String, Arc<Rule>>) -> Result<()>,
    {
        let _writer = self.writer.lock();
        let current = self.snapshot();

        let mut rules = current.rules.clone();
        mutate(&mut rules)?;

        let next = RuleSnapshot::new(current.version() + 1, rules);
        let payload = encode_stored_view(&next.stored_view())?;
        if let Err(e) = self.storage.save(&payload) {
            error!(
                "Failed to persist redirect mappings to {}: {}",
                self.storage.location(),
                e
            );
            return Err(e);
        }

        Ok(self.publish(next))
    }

    /// Reads storage and publishes the decoded set. Caller holds the writer lock.
    fn load_locked(&self) -> Result<RefreshStats> {
        let start = now_ms();

        let data = match self.storage.load()? {
            Some(data) => data,
            None => {
                debug!(
                    "No stored redirect mappings at {}, keeping current set",
                    self.storage.location()
                );
                return Ok(RefreshStats {
                    rules_refreshed: self.snapshot().len(),
                    rules_skipped: 0,
                    duration_ms: elapsed_ms(start),
                    timestamp: now_ms(),
                });
            }
        };

        let decoded = decode_stored_view(&data)?;
        let skipped = decoded.skipped.len();
        for entry in &decoded.skipped {
            warn!(
                "Skipping stored redirect mapping '{}' in {}: {}",
                entry.key, self.resource_id, entry.reason
            );
        }

        let rules: BTreeMap<String, Arc<Rule>> = decoded
            .rules
            .into_iter()
            .map(|(key, stored)| {
                let rule = Rule::redirect(key.as_str(), stored.match_mode, stored.url);
                (key, Arc::new(rule))
            })
            .collect();

        let count = rules.len();
        let version = self.snapshot().version() + 1;
        self.publish(RuleSnapshot::new(version, rules));

        Ok(RefreshStats {
            rules_refreshed: count,
            rules_skipped: skipped,
            duration_ms: elapsed_ms(start),
            timestamp: now_ms(),
        })
    }

    fn publish(&self, next: RuleSnapshot) -> Arc<RuleSnapshot> {
        let next = Arc::new(next);
        *self.live.write() = Arc::clone(&next);
        next
    }

    fn transition(&self, from: ManagerState, to: ManagerState) {
        let mut state = self.state.write();
        if *state == from {
            *state = to;
        }
    }

    fn not_found(&self, key: &str) -> RedirectError {
        RedirectError::NotFound {
            key: key.to_string(),
            resource: self.resource_id.clone(),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(RedirectError::InvalidArgument(
            "Rule phrase must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn warn_if_unnormalized(key: &str) {
    let normalized = normalize_query(key);
    if normalized != key {
        warn!(
            "Redirect phrase '{}' is not normalized (queries are matched as '{}')",
            key, normalized
        );
    }
}

// ================================================================================================
// TESTS
// ================================================================================================
