//! Rental Query Cache demo
//!
//! Drives a paginated tenant listing and a tenant mutation against an
//! in-memory stand-in for the remote data store, logging each step.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rental_query_cache::{
    CacheStore, Config, MutationController, MutationOptions, PageData, PaginationController,
    PaginationOptions,
};

#[derive(Debug, Clone, Serialize)]
struct Tenant {
    id: u64,
    name: String,
    unit: String,
}

/// Stand-in for the remote tenants table.
#[derive(Clone, Default)]
struct TenantTable {
    rows: Arc<Mutex<Vec<Tenant>>>,
}

impl TenantTable {
    fn seeded(count: u64) -> Self {
        let rows = (1..=count)
            .map(|id| {
                let wing = ['A', 'B', 'C', 'D'][((id - 1) % 4) as usize];
                Tenant {
                    id,
                    name: format!("Tenant {}", id),
                    unit: format!("Unit {}{}", (id - 1) / 4 + 1, wing),
                }
            })
            .collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    async fn page(&self, page: u32, page_size: u32) -> anyhow::Result<PageData<Tenant>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let rows = self.rows.lock();
        let start = (page as usize - 1) * page_size as usize;
        let data = rows
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(PageData::from_range(data, rows.len() as u64, page, page_size))
    }

    async fn insert(&self, name: String) -> anyhow::Result<Tenant> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut rows = self.rows.lock();
        let id = rows.len() as u64 + 1;
        let tenant = Tenant {
            id,
            name,
            unit: "Unassigned".to_string(),
        };
        rows.push(tenant.clone());
        Ok(tenant)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rental_query_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    config.validate()?;
    info!(
        "Configuration loaded: cache_time={}ms, stale_time={}ms, page_size={}",
        config.cache_time_ms, config.stale_time_ms, config.page_size
    );

    let store = CacheStore::from_config(&config);
    let table = TenantTable::seeded(25);

    let listing_table = table.clone();
    let listing = PaginationController::new(
        store.clone(),
        "tenants",
        move |page, page_size| {
            let table = listing_table.clone();
            async move { table.page(page, page_size).await }
        },
        PaginationOptions::from_config(&config),
    );
    listing.activate();

    let state = listing.settled().await;
    info!(
        "Page {}/{} loaded, {} tenants in total",
        state.current_page, state.total_pages, state.total
    );
    listing.go_to_page(state.total_pages);
    let state = listing.settled().await;
    info!(
        "Last page: {}",
        serde_json::to_string(&state.data.unwrap_or_default())?
    );

    let insert_table = table.clone();
    let add_tenant = MutationController::new(
        store.clone(),
        move |name: String| {
            let table = insert_table.clone();
            async move { table.insert(name).await }
        },
        MutationOptions::new()
            .invalidate_resource("tenants")
            .on_success(|tenant: &Tenant, _: &String| info!("Tenant {} created", tenant.id)),
    );
    add_tenant.mutate("Awa Traoré".to_string()).await?;

    listing.refetch().await;
    let state = listing.settled().await;
    info!(
        "After insert: page {}/{}, {} tenants, next page: {}",
        state.current_page, state.total_pages, state.total, state.has_next_page
    );

    info!("Cache stats: {}", serde_json::to_string(&store.stats())?);
    listing.deactivate();
    store.clear();
    info!("Session ended");
    Ok(())
}
