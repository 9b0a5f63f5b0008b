use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::MonitorCache;
use crate::gateway::{GatewayError, MessagingGateway, Page};
use crate::render;
use crate::store::TenantStore;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// What scheduled this cycle. Timer cycles honor each tenant's update
/// cadence; cache-event cycles always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Timer,
    CacheEvent,
}

/// Derives each tenant's filtered/grouped view of monitor state and applies
/// it to the tenant's posted artifacts idempotently: create when none exist,
/// edit in place, prune surplus, and repair drift by invalidating the set
/// when an edit is rejected.
pub struct Reconciler {
    store: Arc<TenantStore>,
    cache: Arc<MonitorCache>,
    gateway: Arc<dyn MessagingGateway>,
    max_rows_per_page: usize,
    /// Per-tenant cycle locks; a tick finding a lock held skips that tenant
    /// rather than interleaving artifact-set mutations.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    last_run: Mutex<HashMap<String, Instant>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<TenantStore>,
        cache: Arc<MonitorCache>,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Self {
        Self::with_page_size(store, cache, gateway, render::DEFAULT_MAX_ROWS_PER_PAGE)
    }

    pub fn with_page_size(
        store: Arc<TenantStore>,
        cache: Arc<MonitorCache>,
        gateway: Arc<dyn MessagingGateway>,
        max_rows_per_page: usize,
    ) -> Self {
        Self {
            store,
            cache,
            gateway,
            max_rows_per_page,
            locks: Mutex::new(HashMap::new()),
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one reconciliation pass over every known tenant. Failures are
    /// isolated per tenant and never abort the remaining cycles.
    pub async fn run_cycle(&self, trigger: CycleTrigger) {
        for tenant_id in self.store.tenant_ids() {
            if trigger == CycleTrigger::Timer && !self.cadence_elapsed(&tenant_id) {
                continue;
            }
            if let Err(e) = self.reconcile_tenant(&tenant_id).await {
                error!(tenant = %tenant_id, error = %e, "Tenant reconciliation failed");
            }
        }
    }

    fn cadence_elapsed(&self, tenant_id: &str) -> bool {
        let interval = Duration::from_secs(self.store.view(tenant_id).update_interval_secs);
        let last_run = self.last_run.lock().unwrap();
        match last_run.get(tenant_id) {
            Some(at) => at.elapsed() >= interval,
            None => true,
        }
    }

    fn tenant_lock(&self, tenant_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Reconciles one tenant against the current global monitor snapshot.
    /// Skips entirely when the tenant has no target channel or the filtered
    /// set is empty (existing artifacts stay untouched).
    pub async fn reconcile_tenant(&self, tenant_id: &str) -> Result<(), ReconcileError> {
        let lock = self.tenant_lock(tenant_id);
        let Ok(_guard) = lock.try_lock() else {
            debug!(tenant = %tenant_id, "Cycle already running for tenant, skipping");
            return Ok(());
        };

        let Some(tenant) = self.store.get(tenant_id) else {
            return Ok(());
        };
        let Some(channel_id) = tenant.channel_id.clone() else {
            debug!(tenant = %tenant_id, "No target channel configured, skipping");
            return Ok(());
        };

        self.last_run
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), Instant::now());

        let monitors = self.cache.snapshot(&tenant.monitor_ids);
        if monitors.is_empty() {
            debug!(tenant = %tenant_id, "No monitors after filtering, skipping");
            return Ok(());
        }

        let pages = render::render_pages(
            &tenant,
            &monitors,
            self.cache.len(),
            self.max_rows_per_page,
        );

        if tenant.message_ids.is_empty() {
            self.create_artifacts(tenant_id, &channel_id, &pages).await
        } else {
            self.edit_artifacts(tenant_id, &channel_id, tenant.message_ids, &pages)
                .await
        }
    }

    async fn create_artifacts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        pages: &[Page],
    ) -> Result<(), ReconcileError> {
        let mut message_ids = Vec::with_capacity(pages.len());
        for page in pages {
            match self.gateway.send_page(channel_id, page).await {
                Ok(id) => message_ids.push(id),
                Err(e) => {
                    // Keep what was posted so the next cycle edits instead of
                    // double-posting.
                    self.store.set_message_ids(tenant_id, message_ids);
                    return Err(e.into());
                }
            }
        }
        info!(tenant = %tenant_id, pages = message_ids.len(), "Created status messages");
        self.store.set_message_ids(tenant_id, message_ids);
        Ok(())
    }

    async fn edit_artifacts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        existing: Vec<String>,
        pages: &[Page],
    ) -> Result<(), ReconcileError> {
        let mut message_ids = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            if let Some(message_id) = existing.get(index) {
                if let Err(e) = self.gateway.edit_page(channel_id, message_id, page).await {
                    // Drift repair: the whole set is treated as invalid and
                    // recreated on the next cycle, never this one.
                    warn!(
                        tenant = %tenant_id,
                        message = %message_id,
                        error = %e,
                        "Edit rejected, invalidating artifact set"
                    );
                    self.store.clear_message_ids(tenant_id);
                    return Ok(());
                }
                message_ids.push(message_id.clone());
            } else {
                match self.gateway.send_page(channel_id, page).await {
                    Ok(id) => message_ids.push(id),
                    Err(e) => {
                        self.store.set_message_ids(tenant_id, message_ids);
                        return Err(e.into());
                    }
                }
            }
        }

        for surplus in existing.iter().skip(pages.len()) {
            if let Err(e) = self.gateway.delete_page(channel_id, surplus).await {
                warn!(tenant = %tenant_id, message = %surplus, error = %e, "Failed to delete surplus message");
            }
        }

        self.store.set_message_ids(tenant_id, message_ids);
        Ok(())
    }
}
