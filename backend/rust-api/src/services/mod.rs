use std::sync::Arc;

use crate::config::Config;
use crate::ingest::ReportSink;
use crate::tracker::ProgressStore;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use exercise_catalog::{ExerciseCatalog, MongoExerciseCatalog};
use import_limiter::ImportRateLimiter;
use ingestion_service::IngestionService;
use object_storage::ObjectStorageClient;
use progress_service::ProgressService;
use progress_store::MongoProgressStore;
use report_sink::MongoReportSink;

pub struct AppState {
    pub config: Config,
    /// `None` when the state was assembled from in-process backends
    pub mongo: Option<Database>,
    pub redis: Option<ConnectionManager>,
    pub progress: ProgressService,
    pub ingestion: IngestionService,
    pub import_limiter: ImportRateLimiter,
}

/// Storage implementations behind the services.
pub struct Backends {
    pub progress: Arc<dyn ProgressStore>,
    pub exercises: Arc<dyn ExerciseCatalog>,
    pub reports: Arc<dyn ReportSink>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let progress_store = MongoProgressStore::new(mongo.clone());
        let report_sink = MongoReportSink::new(mongo.clone());

        // The API still serves reads if index creation fails; writes then
        // rely on the duplicate-key retry in the progress store.
        if let Err(err) = progress_store.ensure_indexes().await {
            tracing::warn!(error = %err, "Failed to ensure video progress indexes");
        }
        if let Err(err) = report_sink.ensure_indexes().await {
            tracing::warn!(error = %err, "Failed to ensure report indexes");
        }

        let backends = Backends {
            progress: Arc::new(progress_store),
            exercises: Arc::new(MongoExerciseCatalog::new(mongo.clone())),
            reports: Arc::new(report_sink),
        };

        let mut state = Self::from_backends(config, backends, Some(redis))?;
        state.mongo = Some(mongo);
        Ok(state)
    }

    /// Assembles the state around the given backends. Used by tests and
    /// local runs without MongoDB.
    pub fn from_backends(
        config: Config,
        backends: Backends,
        redis: Option<ConnectionManager>,
    ) -> anyhow::Result<Self> {
        let object_storage = config
            .object_storage
            .clone()
            .map(ObjectStorageClient::new)
            .transpose()?;
        if object_storage.is_none() {
            tracing::info!("Object storage not configured, uploads will not be archived");
        }

        let import_limiter = ImportRateLimiter::new(
            redis.clone(),
            config.ingestion.rate_limit,
            config.ingestion.rate_window_seconds,
        );

        Ok(Self {
            progress: ProgressService::new(backends.progress, backends.exercises),
            ingestion: IngestionService::new(
                backends.reports,
                object_storage,
                config.ingestion.max_upload_bytes,
            ),
            import_limiter,
            mongo: None,
            redis,
            config,
        })
    }
}

pub mod exercise_catalog;
pub mod import_limiter;
pub mod ingestion_service;
pub mod object_storage;
pub mod progress_service;
pub mod progress_store;
pub mod report_sink;
