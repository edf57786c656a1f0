//! Shared application state.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::install::BinaryInstaller;
use crate::pool::ModelPool;
use crate::telemetry::TelemetryAggregator;
use crate::weights::WeightStore;

/// Shared application state passed to every handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub pool: Arc<ModelPool>,
    pub telemetry: Arc<TelemetryAggregator>,
    pub installer: Arc<BinaryInstaller>,
    pub weights: Arc<WeightStore>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let cache_dir = config.cache.cache_dir();
        let catalog = Arc::new(Catalog::new(cache_dir.clone()));
        let installer = Arc::new(BinaryInstaller::new(cache_dir.clone()));
        let weights = Arc::new(WeightStore::new(config.cache.hf_cache_dir()));
        let telemetry = Arc::new(TelemetryAggregator::new());
        let pool = ModelPool::new(
            catalog.clone(),
            installer.clone(),
            weights.clone(),
            telemetry.clone(),
            config.clone(),
        );
        Arc::new(Self {
            config,
            catalog,
            pool,
            telemetry,
            installer,
            weights,
            http: reqwest::Client::new(),
        })
    }
}
