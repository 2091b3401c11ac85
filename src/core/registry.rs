// src/core/registry.rs

//! The in-memory registry of connected minions.
//!
//! One reader-writer lock covers the whole map and every record's host info.
//! Channel endpoints are cloned out under the lock and used outside it, so
//! no lock is ever held across an await point. Records and their command
//! channels survive stream reconnects of the same minion; nothing evicts
//! them.

use crate::core::commands::CommandSpec;
use crate::core::host::HostInfo;
use crate::core::store::CommandStore;
use crate::core::{HiveLinkError, ids, metrics};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// A single predicate over a minion's tag map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TagPredicate {
    /// Tag `key` exists and equals `value`.
    Equals { key: String, value: String },
    /// Tag `key` is present, any value.
    Exists { key: String },
    /// Tag `key` is absent.
    NotExists { key: String },
}

impl TagPredicate {
    fn matches(&self, tags: &IndexMap<String, String>) -> bool {
        match self {
            TagPredicate::Equals { key, value } => tags.get(key) == Some(value),
            TagPredicate::Exists { key } => tags.contains_key(key),
            TagPredicate::NotExists { key } => !tags.contains_key(key),
        }
    }
}

/// A conjunction of tag predicates. The empty selector matches every minion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSelector {
    pub predicates: Vec<TagPredicate>,
}

impl TagSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn equals(mut self, key: &str, value: &str) -> Self {
        self.predicates.push(TagPredicate::Equals {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn exists(mut self, key: &str) -> Self {
        self.predicates.push(TagPredicate::Exists {
            key: key.to_string(),
        });
        self
    }

    pub fn not_exists(mut self, key: &str) -> Self {
        self.predicates.push(TagPredicate::NotExists {
            key: key.to_string(),
        });
        self
    }

    pub fn matches(&self, tags: &IndexMap<String, String>) -> bool {
        self.predicates.iter().all(|p| p.matches(tags))
    }
}

/// The live record for one registered minion.
#[derive(Debug, Clone)]
pub struct MinionConnection {
    pub info: HostInfo,
    /// Wall-clock instant of the last contact.
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

struct MinionEntry {
    conn: MinionConnection,
    command_tx: mpsc::Sender<CommandSpec>,
    command_rx: Arc<Mutex<mpsc::Receiver<CommandSpec>>>,
}

/// The outcome of a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    /// The id the minion must use from now on. Differs from the announced id
    /// only when the announcement was empty.
    pub assigned_id: String,
}

/// Registry of connected minions, keyed by minion id.
pub struct MinionRegistry {
    minions: RwLock<HashMap<String, MinionEntry>>,
    store: Arc<CommandStore>,
    channel_capacity: usize,
}

impl MinionRegistry {
    pub fn new(store: Arc<CommandStore>, channel_capacity: usize) -> Self {
        Self {
            minions: RwLock::new(HashMap::new()),
            store,
            channel_capacity,
        }
    }

    /// Registers a minion or refreshes an existing record.
    ///
    /// An empty id gets a freshly generated one. Re-registration updates the
    /// host info in place and keeps the existing command channel, so queued
    /// commands survive the round-trip. The host row is persisted through
    /// the store; persistence failures propagate to the caller.
    pub async fn register(&self, mut info: HostInfo) -> Result<RegisterOutcome, HiveLinkError> {
        if info.id.is_empty() {
            info.id = ids::generate()?;
            debug!("Assigned fresh minion id {}", info.id);
        }
        info.last_seen = chrono::Utc::now().timestamp();

        let assigned_id = info.id.clone();
        let persisted = {
            let mut minions = self.minions.write();
            match minions.get_mut(&assigned_id) {
                Some(entry) => {
                    entry.conn.info = info.clone();
                    entry.conn.last_seen = chrono::Utc::now();
                }
                None => {
                    let (command_tx, command_rx) = mpsc::channel(self.channel_capacity);
                    minions.insert(
                        assigned_id.clone(),
                        MinionEntry {
                            conn: MinionConnection {
                                info: info.clone(),
                                last_seen: chrono::Utc::now(),
                            },
                            command_tx,
                            command_rx: Arc::new(Mutex::new(command_rx)),
                        },
                    );
                    info!(
                        "Registered new minion {} ({}@{})",
                        assigned_id, info.hostname, info.ip
                    );
                }
            }
            info
        };

        self.store.upsert_host(&persisted).await?;
        metrics::REGISTRATIONS_TOTAL.inc();
        Ok(RegisterOutcome { assigned_id })
    }

    /// Returns a copy of the live record for one minion.
    pub fn get(&self, id: &str) -> Option<MinionConnection> {
        self.minions.read().get(id).map(|e| e.conn.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.minions.read().contains_key(id)
    }

    /// Defensive copies of every registered minion's host info, so callers
    /// can traverse without holding the registry lock.
    pub fn list(&self) -> Vec<HostInfo> {
        self.minions
            .read()
            .values()
            .map(|e| e.conn.info.clone())
            .collect()
    }

    pub fn update_last_seen(&self, id: &str) {
        if let Some(entry) = self.minions.write().get_mut(id) {
            entry.conn.last_seen = chrono::Utc::now();
            entry.conn.info.last_seen = chrono::Utc::now().timestamp();
        }
    }

    /// The producer endpoint of one minion's bounded command queue.
    pub fn command_sender(&self, id: &str) -> Option<mpsc::Sender<CommandSpec>> {
        self.minions.read().get(id).map(|e| e.command_tx.clone())
    }

    /// The consumer endpoint of one minion's command queue. The stream
    /// handler locks it for the lifetime of the stream, which is what keeps
    /// the queue single-consumer across reconnects.
    pub fn command_channel(&self, id: &str) -> Option<Arc<Mutex<mpsc::Receiver<CommandSpec>>>> {
        self.minions.read().get(id).map(|e| e.command_rx.clone())
    }

    /// Resolves a dispatch request to concrete minion ids.
    ///
    /// Explicit ids win: the result is their intersection with the registry,
    /// in input order with duplicates dropped. Without explicit ids, every
    /// minion matching the tag selector is returned.
    pub fn find_targets(&self, minion_ids: &[String], selector: &TagSelector) -> Vec<String> {
        let minions = self.minions.read();
        if !minion_ids.is_empty() {
            let mut seen = BTreeSet::new();
            return minion_ids
                .iter()
                .filter(|id| minions.contains_key(*id) && seen.insert(id.as_str()))
                .cloned()
                .collect();
        }
        minions
            .iter()
            .filter(|(_, e)| selector.matches(&e.conn.info.tags))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Overrides the provided tag keys on a minion, preserving keys that are
    /// not mentioned. Returns `NotFound` for an unknown minion. The updated
    /// host row is persisted.
    pub async fn set_tags(
        &self,
        id: &str,
        tags: IndexMap<String, String>,
    ) -> Result<HostInfo, HiveLinkError> {
        let updated = {
            let mut minions = self.minions.write();
            let entry = minions
                .get_mut(id)
                .ok_or_else(|| HiveLinkError::NotFound(format!("minion '{id}'")))?;
            for (key, value) in tags {
                entry.conn.info.tags.insert(key, value);
            }
            entry.conn.info.clone()
        };
        self.store.upsert_host(&updated).await?;
        Ok(updated)
    }

    /// Adds or overwrites each key in `add` and deletes each key in
    /// `remove_keys`; removing a missing key is a no-op. Returns `NotFound`
    /// for an unknown minion. The updated host row is persisted.
    pub async fn update_tags(
        &self,
        id: &str,
        add: IndexMap<String, String>,
        remove_keys: &[String],
    ) -> Result<HostInfo, HiveLinkError> {
        let updated = {
            let mut minions = self.minions.write();
            let entry = minions
                .get_mut(id)
                .ok_or_else(|| HiveLinkError::NotFound(format!("minion '{id}'")))?;
            for (key, value) in add {
                entry.conn.info.tags.insert(key, value);
            }
            for key in remove_keys {
                entry.conn.info.tags.shift_remove(key);
            }
            entry.conn.info.clone()
        };
        self.store.upsert_host(&updated).await?;
        Ok(updated)
    }

    /// Flattens all `key:value` pairs across minions into a sorted set.
    pub fn list_tags(&self) -> Vec<String> {
        let minions = self.minions.read();
        let mut tags = BTreeSet::new();
        for entry in minions.values() {
            for (key, value) in &entry.conn.info.tags {
                tags.insert(format!("{key}:{value}"));
            }
        }
        tags.into_iter().collect()
    }
}
