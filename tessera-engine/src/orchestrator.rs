// Segmentation orchestrator: validation, cache lookup, bounded execution,
// result aggregation

use crate::batch::{BatchItemError, BatchResponse};
use crate::events::{EventSink, NoopSink, SegmentationEvent};
use crate::stats::{OrchestratorStats, StatsCounters};
use chrono::Utc;
use futures::future::join_all;
use image::{imageops::FilterType, RgbImage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{
    AlgorithmConfig, Error, PerformanceMetrics, Result, SegmentationRequest, SegmentationResponse,
    SegmentationResult, ServiceConfig,
};
use tessera_storage::{segmentation_key_with_image_hash, short_hash, ImageStore, ResultCache};
use tessera_vision::{render_label_map, AlgorithmRegistry, VisionError};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Limits applied by the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Process-wide cap on simultaneous algorithm runs.
    pub max_concurrent_segmentations: usize,
    pub max_algorithms_per_request: usize,
    pub max_batch_size: usize,
    pub cache_ttl: Duration,
    /// Largest side a resize hint may ask for.
    pub max_image_dimension: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_segmentations: 4,
            max_algorithms_per_request: 4,
            max_batch_size: 10,
            cache_ttl: Duration::from_secs(3600),
            max_image_dimension: 2048,
        }
    }
}

impl From<&ServiceConfig> for OrchestratorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_concurrent_segmentations: config.max_concurrent_segmentations,
            max_algorithms_per_request: config.max_algorithms_per_request,
            max_batch_size: config.max_batch_size,
            cache_ttl: config.cache_ttl(),
            max_image_dimension: config.max_image_dimension,
        }
    }
}

/// State shared by every unit of one request.
struct RequestContext {
    request_id: String,
    image: Arc<RgbImage>,
    image_hash: String,
}

/// Runs segmentation requests against the registry, the image store and
/// the result cache.
///
/// The concurrency semaphore is created here, once, and shared by every
/// request handled by this orchestrator. Units waiting for a slot queue
/// without bound.
pub struct Orchestrator {
    registry: Arc<AlgorithmRegistry>,
    store: Arc<dyn ImageStore>,
    cache: ResultCache,
    semaphore: Arc<Semaphore>,
    settings: OrchestratorSettings,
    stats: StatsCounters,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AlgorithmRegistry>,
        store: Arc<dyn ImageStore>,
        cache: ResultCache,
        settings: OrchestratorSettings,
    ) -> Self {
        let slots = settings.max_concurrent_segmentations.max(1);
        Self {
            registry,
            store,
            cache,
            semaphore: Arc::new(Semaphore::new(slots)),
            settings,
            stats: StatsCounters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats.snapshot()
    }

    /// Free execution slots right now.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Checks that need no I/O: algorithm count and names, resize hint.
    pub fn validate(&self, request: &SegmentationRequest) -> Result<()> {
        let count = request.algorithms.len();
        let max = self.settings.max_algorithms_per_request;
        if count == 0 || count > max {
            return Err(Error::Validation(format!(
                "a request must name between 1 and {} algorithms, got {}",
                max, count
            )));
        }
        if let Some(unknown) = request
            .algorithms
            .iter()
            .find(|config| !self.registry.contains(&config.name))
        {
            return Err(Error::UnknownAlgorithm(unknown.name.clone()));
        }
        if let Some((width, height)) = request.resize_dimensions {
            if width == 0 || height == 0 {
                return Err(Error::Validation(
                    "resize_dimensions must both be positive".to_string(),
                ));
            }
            let limit = self.settings.max_image_dimension;
            if width.max(height) > limit {
                return Err(Error::Validation(format!(
                    "resize_dimensions may not exceed {} pixels per side, got {}x{}",
                    limit, width, height
                )));
            }
        }
        Ok(())
    }

    /// Run every algorithm of `request` and collect the successes in
    /// submission order.
    ///
    /// Fails as a whole only when validation fails or the source image
    /// cannot be loaded. A unit that errors is logged, counted and left out
    /// of the results.
    pub async fn process(
        &self,
        request: SegmentationRequest,
        sink: Option<&dyn EventSink>,
    ) -> Result<SegmentationResponse> {
        let started = Instant::now();
        self.validate(&request)?;
        self.stats.record_request();

        let sink: &dyn EventSink = sink.unwrap_or(&NoopSink);
        let request_id = uuid::Uuid::new_v4().to_string();
        let algorithm_names: Vec<&str> = request.algorithms.iter().map(|a| a.name.as_str()).collect();
        info!(
            request_id = %request_id,
            image_id = %request.image_id,
            algorithms = ?algorithm_names,
            "Starting segmentation request"
        );

        let image = self.load_source(&request).await?;
        let hash_source = Arc::clone(&image);
        let image_hash = tokio::task::spawn_blocking(move || short_hash(hash_source.as_raw()))
            .await
            .map_err(|e| Error::Execution(format!("image hashing task failed: {}", e)))?;

        let ctx = RequestContext {
            request_id,
            image,
            image_hash,
        };

        let outcomes = join_all(
            request
                .algorithms
                .iter()
                .map(|config| self.run_unit(&ctx, config, sink)),
        )
        .await;
        let results: Vec<SegmentationResult> = outcomes.into_iter().flatten().collect();

        let original_image_url = self.store.url_for(&request.image_id).await?;
        let total_processing_time = started.elapsed().as_secs_f64();

        info!(
            request_id = %ctx.request_id,
            total_time = total_processing_time,
            results_count = results.len(),
            requested = request.algorithms.len(),
            "Segmentation request completed"
        );

        Ok(SegmentationResponse {
            request_id: ctx.request_id,
            original_image_url,
            results,
            view_mode: request.view_mode,
            total_processing_time,
            created_at: Utc::now(),
        })
    }

    /// Run independent requests concurrently. A request that fails is
    /// reported by its index and does not affect the others.
    pub async fn process_batch(&self, requests: Vec<SegmentationRequest>) -> Result<BatchResponse> {
        let max = self.settings.max_batch_size;
        if requests.len() > max {
            return Err(Error::Validation(format!(
                "Maximum {} images allowed in batch processing",
                max
            )));
        }

        let total_requested = requests.len();
        let outcomes = join_all(requests.into_iter().map(|request| self.process(request, None))).await;

        let mut successful_results = Vec::new();
        let mut errors = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(response) => successful_results.push(response),
                Err(err) => {
                    warn!(index, error = %err, "Batch entry failed");
                    errors.push(BatchItemError {
                        index,
                        error: err.public_message(),
                    });
                }
            }
        }

        Ok(BatchResponse {
            successful_count: successful_results.len(),
            error_count: errors.len(),
            total_requested,
            successful_results,
            errors,
        })
    }

    async fn load_source(&self, request: &SegmentationRequest) -> Result<Arc<RgbImage>> {
        let image = self.store.load(&request.image_id).await.map_err(|e| {
            warn!(image_id = %request.image_id, error = %e, "Source image unavailable");
            Error::from(e)
        })?;

        let image = match request.resize_dimensions {
            Some((width, height)) if (width, height) != image.dimensions() => {
                debug!(image_id = %request.image_id, width, height, "Applying resize hint");
                tokio::task::spawn_blocking(move || {
                    image::imageops::resize(&image, width, height, FilterType::Lanczos3)
                })
                .await
                .map_err(|e| Error::Execution(format!("resize task failed: {}", e)))?
            }
            _ => image,
        };
        Ok(Arc::new(image))
    }

    async fn run_unit(
        &self,
        ctx: &RequestContext,
        config: &AlgorithmConfig,
        sink: &dyn EventSink,
    ) -> Option<SegmentationResult> {
        self.stats.record_unit();
        let key = segmentation_key_with_image_hash(&config.name, &ctx.image_hash, &config.parameters);

        if let Some(cached) = self.cache.get::<SegmentationResult>(&key).await {
            self.stats.record_cache_hit();
            info!(
                request_id = %ctx.request_id,
                algorithm = %config.name,
                "Using cached result"
            );
            return Some(cached);
        }
        self.stats.record_cache_miss();

        let outcome = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(_permit) => {
                sink.emit(SegmentationEvent::Start {
                    request_id: ctx.request_id.clone(),
                    algorithm: config.name.clone(),
                })
                .await;

                match self.execute(ctx, config).await {
                    Ok(result) => {
                        self.cache.set(&key, &result, Some(self.settings.cache_ttl)).await;
                        Ok(result)
                    }
                    Err(err) => Err(err),
                }
            }
            Err(_) => Err(Error::Execution("execution slots are closed".to_string())),
        };

        match outcome {
            Ok(result) => {
                info!(
                    request_id = %ctx.request_id,
                    algorithm = %config.name,
                    processing_time = result.processing_time,
                    segments_count = result.segments_count,
                    "Algorithm completed"
                );
                sink.emit(SegmentationEvent::Complete {
                    request_id: ctx.request_id.clone(),
                    result: result.clone(),
                })
                .await;
                Some(result)
            }
            Err(err) => {
                self.stats.record_failure();
                error!(
                    request_id = %ctx.request_id,
                    algorithm = %config.name,
                    error = %err,
                    "Algorithm failed"
                );
                sink.emit(SegmentationEvent::Error {
                    request_id: ctx.request_id.clone(),
                    algorithm: config.name.clone(),
                    error: err.public_message(),
                })
                .await;
                None
            }
        }
    }

    /// Segment, render and persist one unit. Caller holds a slot.
    async fn execute(&self, ctx: &RequestContext, config: &AlgorithmConfig) -> Result<SegmentationResult> {
        let algorithm = self.registry.get(&config.name)?;
        let image = Arc::clone(&ctx.image);
        let params = config.parameters.clone();

        let (metrics, rendered) = tokio::task::spawn_blocking(move || {
            let (labels, metrics) = algorithm.segment(&image, &params)?;
            Ok::<_, VisionError>((metrics, render_label_map(&labels)))
        })
        .await
        .map_err(|e| Error::Execution(format!("algorithm task failed: {}", e)))??;

        let derived_id = format!("{}_{}", ctx.request_id, config.name);
        let result_image_url = self.store.save_derived(&rendered, &derived_id).await?;

        Ok(SegmentationResult {
            algorithm_name: config.name.clone(),
            result_image_url,
            segments_count: metrics.segments_count,
            processing_time: metrics.processing_time,
            parameters_used: metrics.parameters_used.clone(),
            metrics: Some(PerformanceMetrics {
                processing_time: metrics.processing_time,
                memory_usage: metrics.memory_usage,
                segments_count: metrics.segments_count,
                algorithm_name: config.name.clone(),
                image_dimensions: (ctx.image.height(), ctx.image.width()),
            }),
            created_at: Utc::now(),
        })
    }
}
