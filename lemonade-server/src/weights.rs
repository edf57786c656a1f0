//! WeightStore (§4.3): resolves checkpoint references to local files.
//!
//! Layout mirrors the Hugging Face hub cache convention: a repo id
//! `org/name` becomes directory `models--org--name/snapshots/<hash>/…`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct WeightStore {
    cache_dir: PathBuf,
    http: reqwest::Client,
}

/// A resolved checkpoint reference: either a bare repo id or a
/// `repo:filename` pair naming one file within it.
#[derive(Debug, Clone)]
pub enum WeightRef {
    Path(PathBuf),
    Repo(String),
    RepoFile(String, String),
}

impl WeightRef {
    pub fn parse(raw: &str) -> Self {
        if Path::new(raw).exists() {
            return WeightRef::Path(PathBuf::from(raw));
        }
        match raw.split_once(':') {
            Some((repo, file)) => WeightRef::RepoFile(repo.to_string(), file.to_string()),
            None => WeightRef::Repo(raw.to_string()),
        }
    }
}

/// The Hugging Face hub URL for a specific file within a repo's main
/// revision, used by `pull` to resolve `WeightRef::RepoFile` downloads.
pub fn hf_resolve_url(repo: &str, filename: &str) -> String {
    format!("https://huggingface.co/{repo}/resolve/main/{filename}")
}

impl WeightStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            http: reqwest::Client::new(),
        }
    }

    pub fn repo_dir_name(repo_id: &str) -> String {
        format!("models--{}", repo_id.replace('/', "--"))
    }

    fn repo_snapshot_dirs(&self, repo_id: &str) -> Vec<PathBuf> {
        let repo_dir = self.cache_dir.join(Self::repo_dir_name(repo_id)).join("snapshots");
        let Ok(entries) = std::fs::read_dir(&repo_dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        dirs.sort_by_key(|d| {
            std::fs::metadata(d)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        dirs.reverse(); // most-recently-modified first
        dirs
    }

    fn weight_files_in(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_weight_file(p))
            .filter(|p| !is_non_primary_shard(p))
            .collect();
        files.sort();
        files
    }

    /// Resolves a reference to a concrete local path, per §4.3.
    pub fn resolve(&self, weight_ref: &WeightRef) -> Result<PathBuf> {
        match weight_ref {
            WeightRef::Path(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(Error::WeightsMissing(format!("{}", path.display())))
                }
            }
            WeightRef::RepoFile(repo, filename) => {
                for snapshot in self.repo_snapshot_dirs(repo) {
                    let candidate = snapshot.join(filename);
                    if candidate.exists() {
                        return Ok(candidate);
                    }
                }
                Err(Error::WeightsMissing(format!("{repo}:{filename}")))
            }
            WeightRef::Repo(repo) => {
                for snapshot in self.repo_snapshot_dirs(repo) {
                    let files = Self::weight_files_in(&snapshot);
                    match files.len() {
                        0 => continue,
                        1 => return Ok(files.into_iter().next().unwrap()),
                        _ => {
                            return Err(Error::AmbiguousWeights(format!(
                                "{repo} has {} candidate files, specify repo:filename",
                                files.len()
                            )))
                        }
                    }
                }
                Err(Error::WeightsMissing(repo.clone()))
            }
        }
    }

    /// Downloads weights for `repo`, retrying transient failures with
    /// exponential backoff, writing to a temp file and renaming into
    /// place only on success so a crash mid-download never leaves a
    /// file that `resolve` would mistake for a complete snapshot.
    pub async fn download(&self, repo: &str, filename: &str, url: &str) -> Result<PathBuf> {
        const MAX_ATTEMPTS: u32 = 5;
        let snapshot_dir = self
            .cache_dir
            .join(Self::repo_dir_name(repo))
            .join("snapshots")
            .join("main");
        tokio::fs::create_dir_all(&snapshot_dir).await?;
        let dest = snapshot_dir.join(filename);
        let tmp = dest.with_extension("download");

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_download(url, &tmp).await {
                Ok(()) => {
                    tokio::fs::rename(&tmp, &dest).await?;
                    return Ok(dest);
                }
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_secs(2u64.pow(attempt.min(6)));
                    tracing::warn!(attempt, %err, "weight download failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_download(&self, url: &str, tmp: &Path) -> Result<()> {
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "download {url}: server returned {}",
                response.status()
            )));
        }
        let mut file = tokio::fs::File::create(tmp).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Lists every (repo_id, filename) pair present in the local cache.
    pub fn list_local(&self) -> Vec<(String, String)> {
        let Ok(entries) = std::fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stripped) = name.strip_prefix("models--") else {
                continue;
            };
            let repo_id = stripped.replacen("--", "/", 1);
            for snapshot in self.repo_snapshot_dirs(&repo_id) {
                for file in Self::weight_files_in(&snapshot) {
                    if let Some(file_name) = file.file_name().and_then(|n| n.to_str()) {
                        result.push((repo_id.clone(), file_name.to_string()));
                    }
                }
            }
        }
        result
    }
}

fn is_weight_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("gguf") | Some("bin") | Some("safetensors")
    )
}

/// Multi-part GGUF checkpoints look like `name-00002-of-00004.gguf`; only
/// the first shard is treated as the resolvable model file.
fn is_non_primary_shard(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let Some(captures) = shard_suffix(stem) else {
        return false;
    };
    captures != "00001"
}

fn shard_suffix(stem: &str) -> Option<&str> {
    // looks for "-NNNNN-of-NNNNN" at the end of the stem
    let idx = stem.rfind("-of-")?;
    let tail = &stem[idx + 4..];
    if tail.len() != 5 || !tail.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let before = &stem[..idx];
    let dash = before.rfind('-')?;
    let shard = &before[dash + 1..];
    if shard.len() != 5 || !shard.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(shard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hf_resolve_url_points_at_main_revision() {
        assert_eq!(
            hf_resolve_url("Qwen/Qwen3-4B-GGUF", "qwen3-4b-q4_k_m.gguf"),
            "https://huggingface.co/Qwen/Qwen3-4B-GGUF/resolve/main/qwen3-4b-q4_k_m.gguf"
        );
    }

    #[test]
    fn repo_dir_name_replaces_slash() {
        assert_eq!(
            WeightStore::repo_dir_name("Qwen/Qwen3-4B-GGUF"),
            "models--Qwen--Qwen3-4B-GGUF"
        );
    }

    #[test]
    fn weight_ref_parses_repo_file_pair() {
        match WeightRef::parse("org/name:file.gguf") {
            WeightRef::RepoFile(repo, file) => {
                assert_eq!(repo, "org/name");
                assert_eq!(file, "file.gguf");
            }
            other => panic!("expected RepoFile, got {other:?}"),
        }
    }

    #[test]
    fn weight_ref_parses_bare_repo() {
        match WeightRef::parse("org/name") {
            WeightRef::Repo(repo) => assert_eq!(repo, "org/name"),
            other => panic!("expected Repo, got {other:?}"),
        }
    }

    #[test]
    fn shard_suffix_detects_non_primary_shard() {
        assert!(is_non_primary_shard(Path::new("model-00002-of-00004.gguf")));
        assert!(!is_non_primary_shard(Path::new("model-00001-of-00004.gguf")));
        assert!(!is_non_primary_shard(Path::new("model.gguf")));
    }

    #[test]
    fn resolve_missing_repo_is_weights_missing() {
        let store = WeightStore::new(std::env::temp_dir().join("lemonade-weights-test-missing"));
        let result = store.resolve(&WeightRef::Repo("nobody/nothing".to_string()));
        assert!(matches!(result, Err(Error::WeightsMissing(_))));
    }

    #[test]
    fn resolve_ambiguous_repo_when_multiple_candidates() {
        let dir = std::env::temp_dir().join("lemonade-weights-test-ambiguous");
        let snapshot = dir.join("models--org--name").join("snapshots").join("abc123");
        std::fs::create_dir_all(&snapshot).unwrap();
        std::fs::write(snapshot.join("a.gguf"), b"x").unwrap();
        std::fs::write(snapshot.join("b.gguf"), b"y").unwrap();

        let store = WeightStore::new(dir.clone());
        let result = store.resolve(&WeightRef::Repo("org/name".to_string()));
        assert!(matches!(result, Err(Error::AmbiguousWeights(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
