use chrono::Utc;

use crate::gateway::{Page, PageField};
use crate::monitor::{MonitorHealth, MonitorStatus};
use crate::store::TenantConfig;

/// Split boundary: rows per page before a new artifact is started.
pub const DEFAULT_MAX_ROWS_PER_PAGE: usize = 20;

/// Bucket for monitors not claimed by any group, shown after all groups.
const UNGROUPED_SECTION: &str = "Other Services";
/// Single section used when the tenant has defined no groups at all.
const DEFAULT_SECTION: &str = "Monitored Services";
const SECTION_RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

/// Renders the tenant's filtered monitor view into one or more pages. The
/// summary block is repeated on every page; sections follow group-definition
/// order with the ungrouped bucket last, rows keeping the cache's name-sorted
/// order. `total_available` is the count of all monitors known to the cache,
/// used for the tracking note.
pub fn render_pages(
    tenant: &TenantConfig,
    monitors: &[MonitorHealth],
    total_available: usize,
    max_rows_per_page: usize,
) -> Vec<Page> {
    let summary = summary_block(monitors, total_available);
    let rows = section_rows(tenant, monitors);

    let max_rows = max_rows_per_page.max(1);
    let mut pages = Vec::new();
    for chunk in rows.chunks(max_rows) {
        pages.push(Page {
            title: tenant.status_title.clone(),
            description: summary.clone(),
            color: tenant.embed_color,
            fields: collect_fields(chunk),
            footer: Some("Last updated".to_string()),
            timestamp: Some(Utc::now()),
        });
    }
    if pages.is_empty() {
        // Defensive only for direct calls; reconciliation skips empty sets.
        pages.push(Page {
            title: tenant.status_title.clone(),
            description: summary,
            color: tenant.embed_color,
            fields: Vec::new(),
            footer: Some("Last updated".to_string()),
            timestamp: Some(Utc::now()),
        });
    }
    pages
}

/// Flattens the grouped view into (section name, row) pairs preserving
/// section order, so pagination can split anywhere without losing labels.
fn section_rows(tenant: &TenantConfig, monitors: &[MonitorHealth]) -> Vec<(String, String)> {
    let mut rows = Vec::with_capacity(monitors.len());

    if tenant.groups.is_empty() {
        for health in monitors {
            rows.push((DEFAULT_SECTION.to_string(), status_line(health)));
        }
        return rows;
    }

    let mut claimed: Vec<i64> = Vec::new();
    for group in &tenant.groups {
        for health in monitors {
            if group.monitor_ids.contains(&health.monitor.id) {
                claimed.push(health.monitor.id);
                rows.push((group.name.clone(), status_line(health)));
            }
        }
    }
    for health in monitors {
        if !claimed.contains(&health.monitor.id) {
            rows.push((UNGROUPED_SECTION.to_string(), status_line(health)));
        }
    }
    rows
}

/// Rebuilds labeled fields from a page's rows, merging consecutive rows of
/// the same section.
fn collect_fields(rows: &[(String, String)]) -> Vec<PageField> {
    let mut fields: Vec<PageField> = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for (section, line) in rows {
        match &mut current {
            Some((name, lines)) if name == section => lines.push(line.clone()),
            _ => {
                if let Some((name, lines)) = current.take() {
                    fields.push(section_field(&name, &lines));
                }
                current = Some((section.clone(), vec![line.clone()]));
            }
        }
    }
    if let Some((name, lines)) = current {
        fields.push(section_field(&name, &lines));
    }
    fields
}

fn section_field(name: &str, lines: &[String]) -> PageField {
    PageField {
        name: format!("{SECTION_RULE}\n{name}"),
        value: lines.join("\n"),
    }
}

fn status_line(health: &MonitorHealth) -> String {
    let mut parts = vec![health.status.label().to_string()];
    if let Some(uptime) = health.uptime_24h {
        parts.push(format!("{uptime:.1}% uptime"));
    }
    if let Some(ping) = health.avg_ping_ms {
        parts.push(format!("{ping:.0}ms"));
    }
    format!(
        "{} **{}** - {}",
        health.status.emoji(),
        health.monitor.name,
        parts.join(" • ")
    )
}

fn summary_block(monitors: &[MonitorHealth], total_available: usize) -> String {
    if monitors.is_empty() {
        return String::new();
    }

    let count = |status: MonitorStatus| monitors.iter().filter(|m| m.status == status).count();
    let up = count(MonitorStatus::Up);
    let down = count(MonitorStatus::Down);
    let pending = count(MonitorStatus::Pending);
    let maintenance = count(MonitorStatus::Maintenance);

    let total = monitors.len();
    let operational = (up as f64 / total as f64) * 100.0;

    let tracking_note = if total < total_available {
        format!("**Tracking {total} of {total_available} monitors**\n\n")
    } else {
        String::new()
    };

    format!(
        "{tracking_note}**Overall Status:** {operational:.1}% Operational\n\n\
         🟢 **Online:** {up}\n\
         🔴 **Offline:** {down}\n\
         🟡 **Pending:** {pending}\n\
         🔵 **Maintenance:** {maintenance}"
    )
}
