// Service assembly: config in, shared state out

use crate::http::ApiState;
use crate::websocket_manager::WebSocketManager;
use anyhow::Context;
use std::sync::Arc;
use tessera_core::ServiceConfig;
use tessera_engine::{Orchestrator, OrchestratorSettings};
use tessera_storage::{FsImageStore, ImageStore, ResultCache};
use tessera_vision::AlgorithmRegistry;
use tracing::info;

/// Build every long-lived component once. The orchestrator, and with it the
/// concurrency semaphore, is created here and nowhere else.
pub async fn build_state(config: ServiceConfig) -> anyhow::Result<ApiState> {
    config.validate().context("invalid service configuration")?;

    let registry = Arc::new(AlgorithmRegistry::with_builtins());
    info!(algorithms = ?registry.names(), "Algorithm registry ready");

    let images = Arc::new(
        FsImageStore::new(
            &config.upload_path,
            &config.uploads_url_prefix,
            config.max_image_dimension,
        )
        .await
        .with_context(|| format!("failed to open upload directory {}", config.upload_path))?,
    );
    info!(path = %config.upload_path, "Image store ready");

    let cache = ResultCache::in_memory(config.cache_max_entries, config.cache_ttl());
    let settings = OrchestratorSettings::from(&config);
    info!(
        max_concurrent = settings.max_concurrent_segmentations,
        cache_ttl_secs = config.cache_ttl_secs,
        "Segmentation orchestrator ready"
    );

    let store: Arc<dyn ImageStore> = images.clone();
    let orchestrator = Arc::new(Orchestrator::new(registry, store, cache, settings));

    Ok(ApiState {
        config: Arc::new(config),
        orchestrator,
        images,
        ws_manager: Arc::new(WebSocketManager::default()),
    })
}
