use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health states reported by the monitoring backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorStatus {
    Up,
    Down,
    Pending,
    Maintenance,
}

impl MonitorStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "UP",
            MonitorStatus::Down => "DOWN",
            MonitorStatus::Pending => "PENDING",
            MonitorStatus::Maintenance => "MAINTENANCE",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "🟢",
            MonitorStatus::Down => "🔴",
            MonitorStatus::Pending => "🟡",
            MonitorStatus::Maintenance => "🔵",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTag {
    pub name: String,
    pub value: Option<String>,
}

/// Monitor identity and metadata as assigned by the monitoring backend.
/// Identity is the id; name/kind/active may change on a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub url: Option<String>,
    pub active: bool,
    pub interval_seconds: u64,
    #[serde(default)]
    pub tags: Vec<MonitorTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub monitor_id: i64,
    pub status: MonitorStatus,
    pub time: DateTime<Utc>,
    pub message: String,
    pub ping_ms: Option<f64>,
    /// Set by the backend on a status transition worth surfacing.
    pub important: bool,
}

/// Live health snapshot for one monitor, mutated in place as events arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorHealth {
    pub monitor: Monitor,
    pub status: MonitorStatus,
    pub last_heartbeat: Option<Heartbeat>,
    pub avg_ping_ms: Option<f64>,
    pub uptime_24h: Option<f64>,
}

impl MonitorHealth {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            status: MonitorStatus::Pending,
            last_heartbeat: None,
            avg_ping_ms: None,
            uptime_24h: None,
        }
    }
}
