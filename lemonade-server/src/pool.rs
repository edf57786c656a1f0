//! ModelPool (§4.6): co-resident model management with LRU eviction.
//!
//! Grounded in `inference-runner/src/engine/llama_cpp.rs`'s
//! `ensure_server`/`ensure_capacity`/`find_lru_server` trio, generalized
//! from one hardcoded family to the tagged `Family` enum and from a
//! count-only cap to the per-family capacity table in §3.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lemonade_common::Family;
use tokio::sync::{Mutex, RwLock};

use crate::adapter::{self, BackendProcess};
use crate::catalog::{Catalog, ModelEntry};
use crate::config::Config;
use crate::install::{BinaryInstaller, InstallSpec};
use crate::error::{Error, Result};
use crate::port::{acquire_port_with_retry, PortAllocator};
use crate::telemetry::TelemetryAggregator;
use crate::weights::{WeightRef, WeightStore};

const BACKEND_VERSION: &str = "latest";

/// A loaded model and its backend process (§3, LoadedModel).
///
/// Invariant upheld by `ModelPool`: while `refcount > 0` this entry is
/// never selected for eviction.
pub struct LoadedModel {
    pub entry: ModelEntry,
    pub process: BackendProcess,
    refcount: AtomicUsize,
    last_used: Mutex<Instant>,
    /// Set when a mid-request backend crash is detected; such a model is
    /// removed once its refcount reaches zero (§7 recovery policy).
    stale: AtomicBool,
}

impl LoadedModel {
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}

/// Reference-counted handle to a loaded model (§ Glossary, Acquire/Release).
/// Decrements the refcount and bumps `last_used` when dropped.
pub struct ModelHandle {
    pool: Arc<ModelPool>,
    pub name: String,
    pub model: Arc<LoadedModel>,
}

impl ModelHandle {
    pub fn base_url(&self) -> String {
        adapter::base_url(self.model.process.port)
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        let model = self.model.clone();
        let pool = self.pool.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            *model.last_used.lock().await = Instant::now();
            let remaining = model.refcount.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 && model.is_stale() {
                let _ = pool.unload(&name).await;
            }
        });
    }
}

pub struct LoadedModelInfo {
    pub name: String,
    pub family: Family,
    pub port: u16,
    pub uptime: Duration,
    pub refcount: usize,
}

pub struct ModelPool {
    catalog: Arc<Catalog>,
    installer: Arc<BinaryInstaller>,
    weights: Arc<WeightStore>,
    telemetry: Arc<TelemetryAggregator>,
    config: Arc<Config>,
    http: reqwest::Client,
    ports: PortAllocator,
    loaded: RwLock<HashMap<String, Arc<LoadedModel>>>,
    family_locks: HashMap<Family, Mutex<()>>,
}

impl ModelPool {
    pub fn new(
        catalog: Arc<Catalog>,
        installer: Arc<BinaryInstaller>,
        weights: Arc<WeightStore>,
        telemetry: Arc<TelemetryAggregator>,
        config: Arc<Config>,
    ) -> Arc<Self> {
        let family_locks = Family::ALL.iter().map(|f| (*f, Mutex::new(()))).collect();
        Arc::new(Self {
            catalog,
            installer,
            weights,
            telemetry,
            config,
            http: reqwest::Client::new(),
            ports: PortAllocator::new(),
            loaded: RwLock::new(HashMap::new()),
            family_locks,
        })
    }

    /// Resolves `name` via the catalog and returns a pinned handle,
    /// loading (and, if the family is at capacity, evicting its LRU
    /// sibling) as needed. Concurrent Acquires of an already-loaded
    /// model never block on a load of a *different* model in the same
    /// family (§4.6 scheduling discipline): the fast path only takes a
    /// read lock on the loaded-model map.
    pub async fn acquire(self: &Arc<Self>, name: &str) -> Result<ModelHandle> {
        let entry = self.catalog.lookup(name).await?;

        if let Some(handle) = self.try_fast_acquire(name).await {
            return Ok(handle);
        }

        let family = entry.family;
        let _family_guard = self
            .family_locks
            .get(&family)
            .expect("every family has a lock")
            .lock()
            .await;

        // Coalesce: a concurrent Acquire for the same model may have
        // finished loading while we waited for the family lock.
        if let Some(handle) = self.try_fast_acquire(name).await {
            return Ok(handle);
        }

        self.ensure_capacity_locked(family, name).await?;
        let model = self.load(entry).await?;
        model.refcount.fetch_add(1, Ordering::SeqCst);
        self.loaded.write().await.insert(name.to_string(), model.clone());
        Ok(ModelHandle {
            pool: self.clone(),
            name: name.to_string(),
            model,
        })
    }

    async fn try_fast_acquire(self: &Arc<Self>, name: &str) -> Option<ModelHandle> {
        let loaded = self.loaded.read().await;
        let model = loaded.get(name)?;
        if model.is_stale() {
            return None;
        }
        model.refcount.fetch_add(1, Ordering::SeqCst);
        *model.last_used.lock().await = Instant::now();
        Some(ModelHandle {
            pool: self.clone(),
            name: name.to_string(),
            model: model.clone(),
        })
    }

    /// Evicts LRU entries of `family` (excluding `loading_name`) until
    /// the family is under capacity. `AllModelsBusy` if every entry of
    /// the family is pinned (§4.6).
    async fn ensure_capacity_locked(&self, family: Family, loading_name: &str) -> Result<()> {
        let capacity = family.default_capacity();
        loop {
            let candidate = {
                let loaded = self.loaded.read().await;
                let siblings: Vec<&Arc<LoadedModel>> = loaded
                    .values()
                    .filter(|m| m.entry.family == family && m.entry.id != loading_name)
                    .collect();
                if siblings.len() < capacity {
                    return Ok(());
                }
                let mut candidate: Option<(String, Instant)> = None;
                for model in siblings {
                    if model.refcount() != 0 {
                        continue;
                    }
                    let last_used = *model.last_used.lock().await;
                    match &candidate {
                        None => candidate = Some((model.entry.id.clone(), last_used)),
                        Some((_, t)) if last_used < *t => {
                            candidate = Some((model.entry.id.clone(), last_used))
                        }
                        _ => {}
                    }
                }
                candidate
            };

            match candidate {
                Some((id, _)) => self.unload_internal(&id).await,
                None => {
                    return Err(Error::AllModelsBusy(format!(
                        "{family} is at capacity ({capacity}) and every loaded model is in use"
                    )))
                }
            }
        }
    }

    async fn load(&self, entry: ModelEntry) -> Result<Arc<LoadedModel>> {
        let weight_ref = WeightRef::parse(&entry.checkpoint);
        let weights_path = self.weights.resolve(&weight_ref)?;

        let variant = self.installer.select_preferred_variant(
            entry.family,
            self.variant_override(entry.family).as_deref(),
            self.config.llamacpp.prefer_system,
        );
        let spec = InstallSpec {
            family: entry.family,
            variant,
            version: BACKEND_VERSION.to_string(),
        };
        let binary_path = self.installer.ensure(&spec).await?;

        let process = self.launch_with_fallback(&entry, &binary_path, &weights_path).await?;

        Ok(Arc::new(LoadedModel {
            entry,
            process,
            refcount: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
            stale: AtomicBool::new(false),
        }))
    }

    fn variant_override(&self, family: Family) -> Option<String> {
        match family {
            Family::LlamaCpp => self.config.llamacpp.variant.clone(),
            Family::StableDiffusion => self.config.sdcpp.variant.clone(),
            _ => None,
        }
    }

    /// LLAMACPP tries GPU first, falling back to CPU once if the launch
    /// *or* the subsequent readiness check fails (§F, §4.5). Every other
    /// family launches straight through. Readiness is checked inside the
    /// per-attempt closure passed to `acquire_port_with_retry` so a bind
    /// race or health-check failure on one port is retried on a fresh one,
    /// and so a GPU process that spawns but never becomes healthy still
    /// triggers the CPU retry rather than surfacing the error directly.
    async fn launch_with_fallback(
        &self,
        entry: &ModelEntry,
        binary_path: &std::path::Path,
        weights_path: &std::path::Path,
    ) -> Result<BackendProcess> {
        if entry.family != Family::LlamaCpp {
            return acquire_port_with_retry(&self.ports, |port| {
                self.launch_and_wait_ready(entry, port, binary_path, weights_path, true)
            })
            .await;
        }

        let gpu_result = acquire_port_with_retry(&self.ports, |port| {
            self.launch_and_wait_ready(entry, port, binary_path, weights_path, true)
        })
        .await;

        match gpu_result {
            Ok(process) => Ok(process),
            Err(gpu_err) if self.config.llamacpp.no_fallback => Err(gpu_err),
            Err(gpu_err) => {
                tracing::warn!(model = %entry.id, %gpu_err, "GPU launch failed, retrying on CPU");
                acquire_port_with_retry(&self.ports, |port| {
                    self.launch_and_wait_ready(entry, port, binary_path, weights_path, false)
                })
                .await
            }
        }
    }

    /// Launches one attempt and blocks until it reports healthy, tearing
    /// the process back down on a health-check failure so the caller sees
    /// a plain `Err` to retry or fall back on.
    async fn launch_and_wait_ready(
        &self,
        entry: &ModelEntry,
        port: u16,
        binary_path: &std::path::Path,
        weights_path: &std::path::Path,
        gpu: bool,
    ) -> Result<BackendProcess> {
        let process = self.launch_one(entry, port, binary_path, weights_path, gpu).await?;

        let timeout = Duration::from_secs(self.config.llamacpp.startup_timeout_secs);
        if let Err(err) = adapter::wait_ready(&process, &self.http, timeout).await {
            process.shutdown(Duration::from_secs(self.config.llamacpp.shutdown_timeout_secs)).await;
            self.ports.release_port(process.port);
            return Err(err);
        }

        Ok(process)
    }

    async fn launch_one(
        &self,
        entry: &ModelEntry,
        port: u16,
        binary_path: &std::path::Path,
        weights_path: &std::path::Path,
        gpu: bool,
    ) -> Result<BackendProcess> {
        match entry.family {
            Family::LlamaCpp => {
                crate::adapter::llamacpp::launch(
                    entry,
                    port,
                    binary_path,
                    weights_path,
                    &self.config,
                    gpu,
                    self.telemetry.clone(),
                )
                .await
            }
            Family::Flm => {
                crate::adapter::flm::launch(entry, port, binary_path, weights_path, self.telemetry.clone()).await
            }
            Family::StableDiffusion => {
                crate::adapter::stable_diffusion::launch(
                    entry,
                    port,
                    binary_path,
                    weights_path,
                    &self.config,
                    self.telemetry.clone(),
                )
                .await
            }
            Family::Whisper => {
                crate::adapter::whisper::launch(entry, port, binary_path, weights_path, self.telemetry.clone()).await
            }
            Family::Tts => {
                crate::adapter::tts::launch(entry, port, binary_path, weights_path, self.telemetry.clone()).await
            }
        }
    }

    async fn unload_internal(&self, name: &str) {
        let model = self.loaded.write().await.remove(name);
        if let Some(model) = model {
            model
                .process
                .shutdown(Duration::from_secs(self.config.llamacpp.shutdown_timeout_secs))
                .await;
            self.ports.release_port(model.process.port);
            self.telemetry.clear(name);
        }
    }

    /// Explicit unload; refuses if the model is still pinned (§4.6).
    pub async fn unload(&self, name: &str) -> Result<()> {
        let family = {
            let loaded = self.loaded.read().await;
            loaded.get(name).map(|m| m.entry.family)
        };
        let Some(family) = family else { return Ok(()) };

        let _guard = self.family_locks.get(&family).expect("every family has a lock").lock().await;
        {
            let loaded = self.loaded.read().await;
            if let Some(model) = loaded.get(name) {
                if model.refcount() != 0 {
                    return Err(Error::AllModelsBusy(format!("{name} is still in use")));
                }
            } else {
                return Ok(());
            }
        }
        self.unload_internal(name).await;
        Ok(())
    }

    pub async fn list(&self) -> Vec<LoadedModelInfo> {
        let loaded = self.loaded.read().await;
        loaded
            .values()
            .map(|m| LoadedModelInfo {
                name: m.entry.id.clone(),
                family: m.entry.family,
                port: m.process.port,
                uptime: m.process.started_at.elapsed(),
                refcount: m.refcount(),
            })
            .collect()
    }

    pub fn capacities(&self) -> HashMap<Family, usize> {
        Family::ALL.iter().map(|f| (*f, f.default_capacity())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn test_pool() -> Arc<ModelPool> {
        let dir = std::env::temp_dir().join(format!("lemonade-pool-test-{}", uuid::Uuid::new_v4()));
        ModelPool::new(
            Arc::new(Catalog::new(dir.clone())),
            Arc::new(BinaryInstaller::new(dir.clone())),
            Arc::new(WeightStore::new(dir.join("weights"))),
            Arc::new(TelemetryAggregator::new()),
            Arc::new(Config::default()),
        )
    }

    #[tokio::test]
    async fn acquire_unknown_model_is_model_not_found() {
        let pool = test_pool();
        let result = pool.acquire("does-not-exist").await;
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn acquire_with_missing_weights_is_weights_missing_or_ambiguous() {
        let pool = test_pool();
        // Qwen3-4B-GGUF is a built-in catalog entry but its weights
        // aren't present in this test's empty cache dir.
        let result = pool.acquire("Qwen3-4B-GGUF").await;
        assert!(matches!(
            result,
            Err(Error::WeightsMissing(_)) | Err(Error::AmbiguousWeights(_))
        ));
    }

    #[tokio::test]
    async fn list_is_empty_for_a_fresh_pool() {
        let pool = test_pool();
        assert!(pool.list().await.is_empty());
    }

    #[tokio::test]
    async fn unload_of_unloaded_model_is_a_no_op() {
        let pool = test_pool();
        assert!(pool.unload("never-loaded").await.is_ok());
    }

    #[test]
    fn capacities_cover_every_family() {
        let pool = test_pool();
        let capacities = pool.capacities();
        assert_eq!(capacities.len(), Family::ALL.len());
        assert_eq!(capacities[&Family::LlamaCpp], 2);
    }
}
