//! BinaryInstaller (§4.2): ensures a backend executable exists on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lemonade_common::Family;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// The accelerator variants a backend family may ship.
pub const LLAMACPP_PREFERENCE: &[&str] = &["vulkan", "rocm", "metal", "cpu", "system"];
pub const SD_PREFERENCE: &[&str] = &["vulkan", "rocm", "cpu"];

/// (OS, family, variant) combinations this installer knows how to fetch.
/// Unsupported combinations fail fast with `UnsupportedPlatform` rather than
/// attempting a download that can only 404.
fn supported(family: Family, variant: &str) -> bool {
    let os = std::env::consts::OS;
    match (family, variant) {
        (_, "system") => true,
        (Family::LlamaCpp, "metal") => os == "macos",
        (Family::LlamaCpp, "vulkan" | "rocm" | "cpu") => os == "linux" || os == "windows",
        (Family::StableDiffusion, "vulkan" | "rocm" | "cpu") => os == "linux" || os == "windows",
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct InstallSpec {
    pub family: Family,
    pub variant: String,
    pub version: String,
}

impl InstallSpec {
    fn key(&self) -> (String, String, String) {
        (self.family.to_string(), self.variant.clone(), self.version.clone())
    }

    fn executable_name(&self) -> &'static str {
        match self.family {
            Family::LlamaCpp => "llama-server",
            Family::Flm => "flm-server",
            Family::StableDiffusion => "sdcpp-server",
            Family::Whisper => "whisper-server",
            Family::Tts => "tts-server",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InstallState {
    // keyed by (family, variant, version) joined with '/'
    paths: HashMap<String, PathBuf>,
}

impl InstallState {
    fn get(&self, key: &(String, String, String)) -> Option<&PathBuf> {
        self.paths.get(&Self::flatten(key))
    }

    fn set(&mut self, key: &(String, String, String), path: PathBuf) {
        self.paths.insert(Self::flatten(key), path);
    }

    fn flatten(key: &(String, String, String)) -> String {
        format!("{}/{}/{}", key.0, key.1, key.2)
    }
}

pub struct BinaryInstaller {
    cache_dir: PathBuf,
    http: reqwest::Client,
    state: RwLock<InstallState>,
    state_path: PathBuf,
}

impl BinaryInstaller {
    pub fn new(cache_dir: PathBuf) -> Self {
        let state_path = cache_dir.join("backends").join("install_state.json");
        let state = std::fs::read(&state_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            cache_dir,
            http: reqwest::Client::new(),
            state: RwLock::new(state),
            state_path,
        }
    }

    /// Probe which accelerators look available on this host, applying the
    /// family's preference order. `prefer_system` moves "system" to the
    /// front when set (mirrors `LEMONADE_LLAMACPP_PREFER_SYSTEM`).
    pub fn select_preferred_variant(
        &self,
        family: Family,
        user_override: Option<&str>,
        prefer_system: bool,
    ) -> String {
        if let Some(variant) = user_override {
            return variant.to_string();
        }
        let preference: Vec<&str> = match family {
            Family::LlamaCpp => {
                if prefer_system {
                    std::iter::once("system")
                        .chain(LLAMACPP_PREFERENCE.iter().copied().filter(|v| *v != "system"))
                        .collect()
                } else {
                    LLAMACPP_PREFERENCE.to_vec()
                }
            }
            Family::StableDiffusion => SD_PREFERENCE.to_vec(),
            _ => vec!["cpu"],
        };

        preference
            .into_iter()
            .find(|variant| accelerator_available(variant))
            .unwrap_or("cpu")
            .to_string()
    }

    /// Ensures `spec`'s executable exists on disk, returning its path.
    pub async fn ensure(&self, spec: &InstallSpec) -> Result<PathBuf> {
        if spec.variant == "system" {
            return which(spec.executable_name()).ok_or_else(|| {
                Error::InstallFailed(format!(
                    "{} not found on PATH (system variant requested)",
                    spec.executable_name()
                ))
            });
        }

        if !supported(spec.family, &spec.variant) {
            return Err(Error::UnsupportedPlatform(format!(
                "{} has no {} build for {}",
                spec.family,
                spec.variant,
                std::env::consts::OS
            )));
        }

        let key = spec.key();
        {
            let state = self.state.read().await;
            if let Some(path) = state.get(&key) {
                if path.exists() {
                    return Ok(path.clone());
                }
            }
        }

        let install_dir = self
            .cache_dir
            .join("backends")
            .join(spec.family.as_str())
            .join(format!("{}-{}", spec.variant, spec.version));

        match self.download_and_extract(spec, &install_dir).await {
            Ok(path) => {
                let mut state = self.state.write().await;
                state.set(&key, path.clone());
                self.persist(&state).await;
                Ok(path)
            }
            Err(err) => {
                let _ = tokio::fs::remove_dir_all(&install_dir).await;
                Err(err)
            }
        }
    }

    async fn download_and_extract(&self, spec: &InstallSpec, install_dir: &Path) -> Result<PathBuf> {
        let url = release_url(spec);
        tokio::fs::create_dir_all(install_dir).await?;
        let archive_path = install_dir.join("download.archive");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::InstallFailed(format!("download {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::InstallFailed(format!(
                "download {url}: server returned {}",
                response.status()
            )));
        }

        let total = response.content_length();
        let mut downloaded: u64 = 0;
        let mut file = tokio::fs::File::create(&archive_path).await?;
        let mut stream = response.bytes_stream();
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::InstallFailed(format!("download {url}: {e}")))?;
            downloaded += chunk.len() as u64;
            file.write_all(&chunk).await?;
            if let Some(total) = total {
                tracing::debug!(downloaded, total, "downloading backend archive");
            }
        }
        drop(file);

        extract_archive(&archive_path, install_dir)?;
        let _ = tokio::fs::remove_file(&archive_path).await;

        let exe_path = install_dir.join(spec.executable_name());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if exe_path.exists() {
                let mut perms = std::fs::metadata(&exe_path)?.permissions();
                perms.set_mode(0o755);
                std::fs::set_permissions(&exe_path, perms)?;
            }
        }

        if !exe_path.exists() {
            return Err(Error::InstallFailed(format!(
                "extracted archive did not contain {}",
                spec.executable_name()
            )));
        }

        Ok(exe_path)
    }

    async fn persist(&self, state: &InstallState) {
        if let Some(parent) = self.state_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Ok(bytes) = serde_json::to_vec_pretty(state) {
            let tmp = self.state_path.with_extension("json.tmp");
            if tokio::fs::write(&tmp, bytes).await.is_ok() {
                let _ = tokio::fs::rename(&tmp, &self.state_path).await;
            }
        }
    }
}

fn release_url(spec: &InstallSpec) -> String {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!(
        "https://github.com/lemonade-sdk/backends/releases/download/{}/{}-{}-{}-{}.zip",
        spec.version, spec.family, spec.variant, os, arch
    )
}

fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::InstallFailed(format!("corrupt archive: {e}")))?;
    archive
        .extract(dest)
        .map_err(|e| Error::InstallFailed(format!("extraction failed: {e}")))?;
    Ok(())
}

fn which(executable: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(executable);
        candidate.is_file().then_some(candidate)
    })
}

fn accelerator_available(variant: &str) -> bool {
    match variant {
        "cpu" => true,
        "system" => which("llama-server").is_some(),
        "vulkan" => Path::new("/usr/lib/x86_64-linux-gnu/libvulkan.so.1").exists()
            || Path::new("/usr/lib/libvulkan.so.1").exists(),
        "rocm" => Path::new("/opt/rocm").exists(),
        "metal" => std::env::consts::OS == "macos",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_variant_is_always_supported_for_llamacpp() {
        assert!(supported(Family::LlamaCpp, "cpu"));
    }

    #[test]
    fn metal_only_supported_on_macos() {
        let expect = std::env::consts::OS == "macos";
        assert_eq!(supported(Family::LlamaCpp, "metal"), expect);
    }

    #[test]
    fn system_variant_always_supported() {
        assert!(supported(Family::Whisper, "system"));
    }

    #[test]
    fn select_preferred_variant_falls_back_to_cpu() {
        let installer = BinaryInstaller::new(std::env::temp_dir().join("lemonade-test-cache"));
        let variant = installer.select_preferred_variant(Family::LlamaCpp, None, false);
        assert!(LLAMACPP_PREFERENCE.contains(&variant.as_str()));
    }

    #[test]
    fn user_override_wins_regardless_of_probing() {
        let installer = BinaryInstaller::new(std::env::temp_dir().join("lemonade-test-cache"));
        let variant = installer.select_preferred_variant(Family::LlamaCpp, Some("rocm"), false);
        assert_eq!(variant, "rocm");
    }

    #[test]
    fn prefer_system_moves_system_to_front_when_available() {
        // Only meaningful when a `llama-server` binary happens to be on
        // PATH in the test environment; otherwise cpu wins either way,
        // so this just asserts the call doesn't panic and returns a
        // known variant.
        let installer = BinaryInstaller::new(std::env::temp_dir().join("lemonade-test-cache"));
        let variant = installer.select_preferred_variant(Family::LlamaCpp, None, true);
        assert!(LLAMACPP_PREFERENCE.contains(&variant.as_str()));
    }

    #[tokio::test]
    async fn ensure_system_variant_fails_when_binary_absent() {
        let installer = BinaryInstaller::new(std::env::temp_dir().join("lemonade-test-cache-2"));
        let spec = InstallSpec {
            family: Family::LlamaCpp,
            variant: "system".to_string(),
            version: "0".to_string(),
        };
        // Exceedingly unlikely this exact name exists on PATH.
        let mut spec = spec;
        spec.variant = "system".to_string();
        let result = installer.ensure(&spec).await;
        // Either missing (expected in CI) or found if a dev box happens
        // to have llama-server installed; both are acceptable outcomes
        // for this smoke test, so only assert the error variant shape
        // when it does fail.
        if let Err(err) = result {
            match err {
                Error::InstallFailed(_) => {}
                other => panic!("unexpected error variant: {other:?}"),
            }
        }
    }
}
