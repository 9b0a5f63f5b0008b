use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::monitor::{Heartbeat, Monitor, MonitorHealth, MonitorStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted by the cache as upstream events are applied.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// Something about the known monitors changed; downstream reconciliation
    /// should run. Emitted on every full snapshot and every known heartbeat.
    MonitorsUpdated,
    /// A monitor crossed between statuses on an important heartbeat.
    StatusChanged {
        monitor_id: i64,
        name: String,
        from: MonitorStatus,
        to: MonitorStatus,
    },
}

/// In-memory map from monitor id to its current health, updated incrementally
/// from the event stream. Tenant-independent: per-tenant filtering happens at
/// reconciliation, never here.
pub struct MonitorCache {
    inner: Mutex<HashMap<i64, MonitorHealth>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for MonitorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Applies a full monitor-list snapshot: replaces identity/metadata for
    /// every record, preserving live health fields of monitors already known.
    /// Entries absent from the input are left untouched; nothing is pruned
    /// here. Always emits `MonitorsUpdated`.
    pub fn apply_monitor_list(&self, monitors: Vec<Monitor>) {
        let count = monitors.len();
        {
            let mut map = self.inner.lock().unwrap();
            for monitor in monitors {
                match map.get_mut(&monitor.id) {
                    Some(existing) => existing.monitor = monitor,
                    None => {
                        map.insert(monitor.id, MonitorHealth::new(monitor));
                    }
                }
            }
        }
        debug!(monitors = count, "Applied monitor list snapshot");
        self.emit(CacheEvent::MonitorsUpdated);
    }

    /// Applies a heartbeat. Unknown monitor ids are a no-op. A status
    /// transition on an important heartbeat additionally emits
    /// `StatusChanged`; `MonitorsUpdated` is emitted for every known monitor
    /// even when the status is unchanged.
    pub fn apply_heartbeat(&self, heartbeat: Heartbeat) {
        let transition = {
            let mut map = self.inner.lock().unwrap();
            let Some(health) = map.get_mut(&heartbeat.monitor_id) else {
                debug!(
                    monitor_id = heartbeat.monitor_id,
                    "Heartbeat for unknown monitor, ignoring"
                );
                return;
            };
            let previous = health.status;
            health.status = heartbeat.status;
            let transition = (previous != heartbeat.status && heartbeat.important).then(|| {
                CacheEvent::StatusChanged {
                    monitor_id: heartbeat.monitor_id,
                    name: health.monitor.name.clone(),
                    from: previous,
                    to: heartbeat.status,
                }
            });
            health.last_heartbeat = Some(heartbeat);
            transition
        };
        if let Some(event) = transition {
            if let CacheEvent::StatusChanged { name, from, to, .. } = &event {
                info!(monitor = %name, from = from.label(), to = to.label(), "Monitor status changed");
            }
            self.emit(event);
        }
        self.emit(CacheEvent::MonitorsUpdated);
    }

    /// Updates the rolling average latency for a known monitor. `None` clears
    /// the field. Carried passively; no notification is emitted.
    pub fn apply_avg_ping(&self, monitor_id: i64, value: Option<f64>) {
        let mut map = self.inner.lock().unwrap();
        if let Some(health) = map.get_mut(&monitor_id) {
            health.avg_ping_ms = value;
        }
    }

    /// Updates the rolling 24h uptime percentage for a known monitor. `None`
    /// clears the field. Carried passively; no notification is emitted.
    pub fn apply_uptime_24h(&self, monitor_id: i64, value: Option<f64>) {
        let mut map = self.inner.lock().unwrap();
        if let Some(health) = map.get_mut(&monitor_id) {
            health.uptime_24h = value;
        }
    }

    /// Returns known (monitor, health) pairs sorted by monitor display name
    /// ascending. An empty filter means all monitors; otherwise only those
    /// whose id appears in the filter. The name ordering is a display
    /// contract relied on by rendering.
    pub fn snapshot(&self, filter_ids: &[i64]) -> Vec<MonitorHealth> {
        let map = self.inner.lock().unwrap();
        let mut result: Vec<MonitorHealth> = map
            .values()
            .filter(|h| filter_ids.is_empty() || filter_ids.contains(&h.monitor.id))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.monitor.name.cmp(&b.monitor.name));
        result
    }

    /// Identity+metadata view for display-name lookups and autocomplete,
    /// sorted by name.
    pub fn all_monitors(&self) -> Vec<Monitor> {
        let map = self.inner.lock().unwrap();
        let mut result: Vec<Monitor> = map.values().map(|h| h.monitor.clone()).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    pub fn monitor_name(&self, monitor_id: i64) -> Option<String> {
        let map = self.inner.lock().unwrap();
        map.get(&monitor_id).map(|h| h.monitor.name.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, event: CacheEvent) {
        // Send fails only when no subscriber is listening, which is fine.
        let _ = self.events.send(event);
    }
}
