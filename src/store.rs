use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const MIN_UPDATE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_EMBED_COLOR: u32 = 5_814_783;
pub const DEFAULT_STATUS_TITLE: &str = "Service Status";

/// Tenant id assigned to a legacy single-tenant document on upgrade.
pub const LEGACY_TENANT_ID: &str = "default";

const PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("update interval {0}s is below the {MIN_UPDATE_INTERVAL_SECS}s floor")]
    IntervalTooShort(u64),
}

/// Named, user-defined partition of tracked monitors for display grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub monitor_ids: Vec<i64>,
}

/// Per-tenant configuration. Created lazily on first write, never on a pure
/// read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Target channel; unset until configured via set-channel.
    pub channel_id: Option<String>,
    /// Ordered posted-artifact identifiers; empty means "not yet posted".
    pub message_ids: Vec<String>,
    /// Tracked monitor ids; empty means "track all".
    pub monitor_ids: Vec<i64>,
    pub groups: Vec<Group>,
    pub update_interval_secs: u64,
    pub embed_color: u32,
    pub status_title: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            message_ids: Vec::new(),
            monitor_ids: Vec::new(),
            groups: Vec::new(),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            embed_color: DEFAULT_EMBED_COLOR,
            status_title: DEFAULT_STATUS_TITLE.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    tenants: HashMap<String, TenantConfig>,
}

/// The pre-multi-tenant on-disk shape: a single camelCase config object with
/// no tenant-keyed wrapper and a millisecond interval.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyDocument {
    channel_id: Option<String>,
    message_ids: Vec<String>,
    monitor_ids: Vec<i64>,
    groups: Vec<LegacyGroup>,
    update_interval: u64,
    embed_color: u32,
    status_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyGroup {
    name: String,
    #[serde(default)]
    monitor_ids: Vec<i64>,
}

impl Default for LegacyDocument {
    fn default() -> Self {
        Self {
            channel_id: None,
            message_ids: Vec::new(),
            monitor_ids: Vec::new(),
            groups: Vec::new(),
            update_interval: DEFAULT_UPDATE_INTERVAL_SECS * 1000,
            embed_color: DEFAULT_EMBED_COLOR,
            status_message: DEFAULT_STATUS_TITLE.to_string(),
        }
    }
}

impl From<LegacyDocument> for TenantConfig {
    fn from(legacy: LegacyDocument) -> Self {
        Self {
            channel_id: legacy.channel_id,
            message_ids: legacy.message_ids,
            monitor_ids: legacy.monitor_ids,
            groups: legacy
                .groups
                .into_iter()
                .map(|g| Group {
                    name: g.name,
                    monitor_ids: g.monitor_ids,
                })
                .collect(),
            update_interval_secs: (legacy.update_interval / 1000).max(MIN_UPDATE_INTERVAL_SECS),
            embed_color: legacy.embed_color,
            status_title: legacy.status_message,
        }
    }
}

struct StoreState {
    tenants: HashMap<String, TenantConfig>,
    dirty: bool,
}

/// Durable tenant-id → configuration mapping backed by one JSON document.
/// All mutations funnel through a single debounced persist; `flush` forces a
/// write at shutdown.
pub struct TenantStore {
    path: PathBuf,
    inner: Mutex<StoreState>,
    persist: Notify,
    /// Template applied when a tenant is first materialized (and for
    /// transient views), seeded from process configuration.
    defaults: TenantConfig,
}

impl TenantStore {
    /// Loads the store with stock defaults for new tenants.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        Self::load_with_defaults(path, TenantConfig::default())
    }

    /// Loads the store from disk. A missing file starts empty; an unreadable
    /// or corrupt file is logged and treated as empty. A legacy single-tenant
    /// document is upgraded in place under [`LEGACY_TENANT_ID`].
    pub fn load_with_defaults(path: impl Into<PathBuf>, defaults: TenantConfig) -> Self {
        let path = path.into();
        let tenants = match std::fs::read_to_string(&path) {
            Ok(raw) => match Self::parse_document(&raw) {
                Ok(tenants) => {
                    info!(path = %path.display(), tenants = tenants.len(), "Loaded tenant store");
                    tenants
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Corrupt tenant store, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read tenant store, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            inner: Mutex::new(StoreState {
                tenants,
                dirty: false,
            }),
            persist: Notify::new(),
            defaults,
        }
    }

    fn parse_document(raw: &str) -> Result<HashMap<String, TenantConfig>, StoreError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.get("tenants").is_some() {
            let doc: StoreDocument = serde_json::from_value(value)?;
            Ok(doc.tenants)
        } else {
            // One-time structural upcast of the single-tenant shape.
            let legacy: LegacyDocument = serde_json::from_value(value)?;
            info!("Upgrading legacy single-tenant document to multi-tenant shape");
            let mut tenants = HashMap::new();
            tenants.insert(LEGACY_TENANT_ID.to_string(), TenantConfig::from(legacy));
            Ok(tenants)
        }
    }

    /// Spawns the background flusher collapsing bursts of writes into one
    /// disk write per debounce window.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                store.persist.notified().await;
                tokio::time::sleep(PERSIST_DEBOUNCE).await;
                if let Err(e) = store.flush() {
                    error!(error = %e, "Failed to persist tenant store");
                }
            }
        })
    }

    /// Writes the document to disk if there are unpersisted changes.
    pub fn flush(&self) -> Result<(), StoreError> {
        let snapshot = {
            let mut state = self.inner.lock().unwrap();
            if !state.dirty {
                return Ok(());
            }
            state.dirty = false;
            StoreDocument {
                tenants: state.tenants.clone(),
            }
        };
        if let Err(e) = self.write_document(&snapshot) {
            self.inner.lock().unwrap().dirty = true;
            return Err(e);
        }
        debug!(path = %self.path.display(), "Persisted tenant store");
        Ok(())
    }

    fn write_document(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().tenants.keys().cloned().collect()
    }

    /// Read without fabricating: `None` when the tenant has never been
    /// written.
    pub fn get(&self, tenant_id: &str) -> Option<TenantConfig> {
        self.inner.lock().unwrap().tenants.get(tenant_id).cloned()
    }

    /// Read for display paths: returns a transient default for unknown
    /// tenants without materializing or persisting anything.
    pub fn view(&self, tenant_id: &str) -> TenantConfig {
        self.get(tenant_id)
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// All mutators funnel through here: auto-creates the tenant from the
    /// defaults template, marks the store dirty, and wakes the debounced
    /// flusher.
    fn update<R>(&self, tenant_id: &str, f: impl FnOnce(&mut TenantConfig) -> R) -> R {
        let result = {
            let mut state = self.inner.lock().unwrap();
            let tenant = state
                .tenants
                .entry(tenant_id.to_string())
                .or_insert_with(|| self.defaults.clone());
            let result = f(tenant);
            state.dirty = true;
            result
        };
        self.persist.notify_one();
        result
    }

    /// Adds a monitor to the tracked set. Returns false if already tracked.
    pub fn track_monitor(&self, tenant_id: &str, monitor_id: i64) -> bool {
        self.update(tenant_id, |t| {
            if t.monitor_ids.contains(&monitor_id) {
                false
            } else {
                t.monitor_ids.push(monitor_id);
                true
            }
        })
    }

    /// Removes a monitor from the tracked set. Returns false if it was not
    /// tracked.
    pub fn untrack_monitor(&self, tenant_id: &str, monitor_id: i64) -> bool {
        self.update(tenant_id, |t| {
            let before = t.monitor_ids.len();
            t.monitor_ids.retain(|id| *id != monitor_id);
            t.monitor_ids.len() != before
        })
    }

    /// Clears the tracked set, meaning "track all".
    pub fn track_all(&self, tenant_id: &str) {
        self.update(tenant_id, |t| t.monitor_ids.clear());
    }

    /// Sets the target channel and resets the artifact set so the next cycle
    /// recreates in the new channel.
    pub fn set_channel(&self, tenant_id: &str, channel_id: &str) {
        self.update(tenant_id, |t| {
            t.channel_id = Some(channel_id.to_string());
            t.message_ids.clear();
        });
    }

    pub fn set_message_ids(&self, tenant_id: &str, message_ids: Vec<String>) {
        self.update(tenant_id, |t| t.message_ids = message_ids);
    }

    pub fn clear_message_ids(&self, tenant_id: &str) {
        self.update(tenant_id, |t| t.message_ids.clear());
    }

    pub fn set_status_title(&self, tenant_id: &str, title: &str) {
        self.update(tenant_id, |t| t.status_title = title.to_string());
    }

    /// Sets the update cadence, rejecting values below the floor. A rejected
    /// value leaves the stored interval unchanged and does not materialize
    /// the tenant.
    pub fn set_update_interval(&self, tenant_id: &str, secs: u64) -> Result<(), StoreError> {
        if secs < MIN_UPDATE_INTERVAL_SECS {
            return Err(StoreError::IntervalTooShort(secs));
        }
        self.update(tenant_id, |t| t.update_interval_secs = secs);
        Ok(())
    }

    /// Creates a group. Names are case-insensitively unique within a tenant;
    /// returns false on a duplicate.
    pub fn create_group(&self, tenant_id: &str, name: &str) -> bool {
        self.update(tenant_id, |t| {
            if t.groups
                .iter()
                .any(|g| g.name.eq_ignore_ascii_case(name))
            {
                false
            } else {
                t.groups.push(Group {
                    name: name.to_string(),
                    monitor_ids: Vec::new(),
                });
                true
            }
        })
    }

    /// Deletes a group by name (case-insensitive). Member monitors keep their
    /// tracked status and become ungrouped.
    pub fn delete_group(&self, tenant_id: &str, name: &str) -> bool {
        self.update(tenant_id, |t| {
            let before = t.groups.len();
            t.groups.retain(|g| !g.name.eq_ignore_ascii_case(name));
            t.groups.len() != before
        })
    }

    /// Assigns a monitor to a group, removing it from any other group first
    /// so it appears in at most one. Returns false when the group does not
    /// exist or the monitor is already a member.
    pub fn assign_to_group(&self, tenant_id: &str, group_name: &str, monitor_id: i64) -> bool {
        self.update(tenant_id, |t| {
            let Some(index) = t
                .groups
                .iter()
                .position(|g| g.name.eq_ignore_ascii_case(group_name))
            else {
                return false;
            };
            if t.groups[index].monitor_ids.contains(&monitor_id) {
                return false;
            }
            for group in &mut t.groups {
                group.monitor_ids.retain(|id| *id != monitor_id);
            }
            t.groups[index].monitor_ids.push(monitor_id);
            true
        })
    }

    /// Removes a monitor from whichever group holds it. Returns false when it
    /// was not grouped.
    pub fn unassign_monitor(&self, tenant_id: &str, monitor_id: i64) -> bool {
        self.update(tenant_id, |t| {
            let mut found = false;
            for group in &mut t.groups {
                let before = group.monitor_ids.len();
                group.monitor_ids.retain(|id| *id != monitor_id);
                found |= group.monitor_ids.len() != before;
            }
            found
        })
    }
}
