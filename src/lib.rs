//! # Query Redirect
//!
//! Query-time redirect rules for a search pipeline. A rule binds a phrase
//! and a match mode (`exact`, `phrase`, `all`) to a redirect target. When an
//! incoming query matches, the target is attached to the response and the
//! remaining pipeline stages are skipped.
//!
//! - [`rule`]: rule data model and per-mode matching
//! - [`manager`]: live rule set with lock-free reads, single-writer updates
//!   and persistence
//! - [`refresh`]: periodic reload from storage
//! - [`filter`]: pipeline component that applies the rules
//! - [`admin`]: create/delete/list surface for an administrative transport

pub mod admin;
pub mod config;
pub mod error;
pub mod filter;
pub mod manager;
pub mod matching;
pub mod refresh;
pub mod rule;
pub mod storage;
pub mod types;

pub use admin::{AdminRequest, AdminResponse};
pub use config::RedirectConfig;
pub use error::{RedirectError, Result};
pub use filter::{FilterOutcome, QueryContext, QueryPipeline, RedirectQueryFilter, SearchComponent};
pub use manager::{ManagerState, ManagerStats, RedirectManager, RuleSnapshot};
pub use matching::normalize_query;
pub use refresh::{RefreshScheduler, RefreshStats, SchedulerConfig};
pub use rule::{MatchMode, RedirectRule, Rule, RuleAction, Term};
pub use storage::{FileStorage, MemoryStorage, StorageIO, StoredRule, StoredView};
