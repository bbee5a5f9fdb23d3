use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use restock_infra::{
    CatalogStore, CfdiExtractor, InMemoryCatalogStore, PostgresCatalogStore,
    ReconciliationService, TextLineExtractor,
};
use restock_reconcile::{LineItemExtractor, ReconcileConfig, ReconcileResult};

use crate::app::dto::DocumentFormat;
use crate::config::AppConfig;

pub type Reconciliation = ReconciliationService<Arc<dyn CatalogStore>>;

/// Everything the handlers share.
pub struct AppServices {
    pub reconciliation: Reconciliation,
    pub max_document_bytes: usize,
    cfdi: CfdiExtractor,
    text: TextLineExtractor,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        config: ReconcileConfig,
        max_document_bytes: usize,
    ) -> ReconcileResult<Self> {
        Ok(Self {
            reconciliation: ReconciliationService::new(store, config)?,
            max_document_bytes,
            cfdi: CfdiExtractor::new(),
            text: TextLineExtractor::new(),
        })
    }

    /// Services over a fresh in-memory catalog.
    pub fn in_memory(config: ReconcileConfig) -> ReconcileResult<Self> {
        Self::new(
            Arc::new(InMemoryCatalogStore::new()),
            config,
            AppConfig::default().max_document_bytes,
        )
    }

    pub fn extractor(&self, format: DocumentFormat) -> &dyn LineItemExtractor {
        match format {
            DocumentFormat::Cfdi => &self.cfdi,
            DocumentFormat::Text => &self.text,
        }
    }
}

/// Pick the store from configuration: Postgres when `DATABASE_URL` is set,
/// otherwise a process-local in-memory catalog.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn CatalogStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresCatalogStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to prepare catalog schema")?;
            info!("using postgres catalog store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; catalog lives in memory and is lost on restart");
            Arc::new(InMemoryCatalogStore::new())
        }
    };

    AppServices::new(store, config.reconcile.clone(), config.max_document_bytes)
        .context("invalid reconciliation config")
}
