//! Catalog (§4.4): name → ModelEntry resolution and registration.

use std::collections::HashMap;
use std::path::PathBuf;

use lemonade_common::{Family, Label};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::weights::{WeightRef, WeightStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDefaults {
    pub steps: u32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub family: Family,
    pub checkpoint: String,
    #[serde(default)]
    pub secondary_artifact: Option<String>,
    #[serde(default)]
    pub recipe: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub image_defaults: Option<ImageDefaults>,
    #[serde(default)]
    pub quantization: Option<String>,
}

impl ModelEntry {
    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    pub family: Option<Family>,
    pub label: Option<Label>,
    pub only_installed: bool,
}

pub struct Catalog {
    built_ins: HashMap<String, ModelEntry>,
    user_entries: RwLock<HashMap<String, ModelEntry>>,
    user_catalog_path: PathBuf,
}

impl Catalog {
    pub fn new(cache_dir: PathBuf) -> Self {
        let built_ins = built_in_entries()
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        let user_catalog_path = cache_dir.join("user_models.json");
        let user_entries = Self::load_user_entries(&user_catalog_path);
        Self {
            built_ins,
            user_entries: RwLock::new(user_entries),
            user_catalog_path,
        }
    }

    fn load_user_entries(path: &PathBuf) -> HashMap<String, ModelEntry> {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Vec<ModelEntry>>(&bytes).ok())
            .map(|entries| entries.into_iter().map(|e| (e.id.clone(), e)).collect())
            .unwrap_or_default()
    }

    pub async fn lookup(&self, name: &str) -> Result<ModelEntry> {
        if let Some(entry) = self.built_ins.get(name) {
            return Ok(entry.clone());
        }
        let user_entries = self.user_entries.read().await;
        user_entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    pub async fn list(&self, filter: &ListFilter, weights: Option<&WeightStore>) -> Vec<ModelEntry> {
        let user_entries = self.user_entries.read().await;
        let mut entries: Vec<ModelEntry> = self
            .built_ins
            .values()
            .chain(user_entries.values())
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        entries.retain(|entry| {
            if let Some(family) = filter.family {
                if entry.family != family {
                    return false;
                }
            }
            if let Some(label) = filter.label {
                if !entry.has_label(label) {
                    return false;
                }
            }
            if filter.only_installed {
                let Some(weights) = weights else { return true };
                let weight_ref = WeightRef::parse(&entry.checkpoint);
                if weights.resolve(&weight_ref).is_err() {
                    return false;
                }
            }
            true
        });
        entries
    }

    /// Persists a new user-registered entry atomically (write-temp +
    /// rename). Built-in identifiers are reserved and cannot be shadowed.
    pub async fn register(&self, entry: ModelEntry) -> Result<()> {
        if self.built_ins.contains_key(&entry.id) {
            return Err(Error::BadRequest(format!(
                "{} is a built-in model id and cannot be overridden",
                entry.id
            )));
        }
        let mut user_entries = self.user_entries.write().await;
        if user_entries.contains_key(&entry.id) {
            return Err(Error::BadRequest(format!("{} already registered", entry.id)));
        }
        user_entries.insert(entry.id.clone(), entry);
        self.persist(&user_entries).await
    }

    async fn persist(&self, user_entries: &HashMap<String, ModelEntry>) -> Result<()> {
        if let Some(parent) = self.user_catalog_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut entries: Vec<&ModelEntry> = user_entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        let bytes = serde_json::to_vec_pretty(&entries)
            .map_err(|e| Error::Internal(format!("serializing catalog: {e}")))?;
        let tmp = self.user_catalog_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.user_catalog_path).await?;
        Ok(())
    }
}

fn built_in_entries() -> Vec<ModelEntry> {
    vec![
        ModelEntry {
            id: "Qwen3-4B-GGUF".to_string(),
            family: Family::LlamaCpp,
            checkpoint: "Qwen/Qwen3-4B-GGUF".to_string(),
            secondary_artifact: None,
            recipe: Some("llamacpp-gguf".to_string()),
            labels: vec![],
            context_length: Some(4096),
            image_defaults: None,
            quantization: Some("Q4_K_M".to_string()),
        },
        ModelEntry {
            id: "Qwen3-Embedding-0.6B-GGUF".to_string(),
            family: Family::LlamaCpp,
            checkpoint: "Qwen/Qwen3-Embedding-0.6B-GGUF".to_string(),
            secondary_artifact: None,
            recipe: Some("llamacpp-gguf".to_string()),
            labels: vec![Label::Embeddings],
            context_length: Some(8192),
            image_defaults: None,
            quantization: Some("Q8_0".to_string()),
        },
        ModelEntry {
            id: "Qwen3-Reranker-0.6B-GGUF".to_string(),
            family: Family::LlamaCpp,
            checkpoint: "Qwen/Qwen3-Reranker-0.6B-GGUF".to_string(),
            secondary_artifact: None,
            recipe: Some("llamacpp-gguf".to_string()),
            labels: vec![Label::Reranking],
            context_length: Some(4096),
            image_defaults: None,
            quantization: Some("Q8_0".to_string()),
        },
        ModelEntry {
            id: "SD-Turbo".to_string(),
            family: Family::StableDiffusion,
            checkpoint: "stabilityai/sd-turbo".to_string(),
            secondary_artifact: None,
            recipe: Some("sdcpp".to_string()),
            labels: vec![],
            context_length: None,
            image_defaults: Some(ImageDefaults {
                steps: 4,
                guidance_scale: 0.0,
                width: 512,
                height: 512,
            }),
            quantization: None,
        },
        ModelEntry {
            id: "Whisper-Tiny".to_string(),
            family: Family::Whisper,
            checkpoint: "ggerganov/whisper.cpp".to_string(),
            secondary_artifact: None,
            recipe: Some("whisper-gguf".to_string()),
            labels: vec![],
            context_length: None,
            image_defaults: None,
            quantization: None,
        },
        ModelEntry {
            id: "Kokoro".to_string(),
            family: Family::Tts,
            checkpoint: "hexgrad/Kokoro-82M".to_string(),
            secondary_artifact: None,
            recipe: Some("tts".to_string()),
            labels: vec![],
            context_length: None,
            image_defaults: None,
            quantization: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(std::env::temp_dir().join(format!("lemonade-catalog-test-{}", uuid::Uuid::new_v4())))
    }

    #[tokio::test]
    async fn lookup_finds_builtin() {
        let catalog = catalog();
        let entry = catalog.lookup("Qwen3-4B-GGUF").await.unwrap();
        assert_eq!(entry.family, Family::LlamaCpp);
    }

    #[tokio::test]
    async fn lookup_missing_is_model_not_found() {
        let catalog = catalog();
        let result = catalog.lookup("does-not-exist").await;
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn embeddings_filter_excludes_non_embedding_models() {
        let catalog = catalog();
        let filter = ListFilter {
            family: None,
            label: Some(Label::Embeddings),
            only_installed: false,
        };
        let entries = catalog.list(&filter, None).await;
        assert!(entries.iter().all(|e| e.has_label(Label::Embeddings)));
        assert!(!entries.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_builtin_id_shadowing() {
        let catalog = catalog();
        let entry = ModelEntry {
            id: "Qwen3-4B-GGUF".to_string(),
            family: Family::LlamaCpp,
            checkpoint: "someone/else".to_string(),
            secondary_artifact: None,
            recipe: None,
            labels: vec![],
            context_length: None,
            image_defaults: None,
            quantization: None,
        };
        let result = catalog.register(entry).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn register_then_lookup_roundtrips() {
        let catalog = catalog();
        let entry = ModelEntry {
            id: "custom-model".to_string(),
            family: Family::LlamaCpp,
            checkpoint: "someone/custom".to_string(),
            secondary_artifact: None,
            recipe: None,
            labels: vec![],
            context_length: None,
            image_defaults: None,
            quantization: None,
        };
        catalog.register(entry).await.unwrap();
        let looked_up = catalog.lookup("custom-model").await.unwrap();
        assert_eq!(looked_up.checkpoint, "someone/custom");
    }
}
