//! Layered configuration: defaults < `config.toml` < environment < CLI flags.

use std::path::PathBuf;

use config::{Config as ConfigLoader, File};
use serde::Deserialize;

use crate::cli::Cli;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llamacpp: LlamaCppConfig,
    #[serde(default)]
    pub sdcpp: SdConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Explicit override; defaults to `port + 100` when unset (§6).
    #[serde(default)]
    pub ws_port: Option<u16>,
}

impl ServerConfig {
    pub fn ws_port(&self) -> u16 {
        self.ws_port.unwrap_or(self.port + 100)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlamaCppConfig {
    /// Preferred accelerator variant: vulkan, rocm, metal, cpu, system.
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default = "default_ctx_size")]
    pub ctx_size: u32,
    #[serde(default)]
    pub prefer_system: bool,
    #[serde(default)]
    pub no_fallback: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for LlamaCppConfig {
    fn default() -> Self {
        Self {
            variant: None,
            ctx_size: default_ctx_size(),
            prefer_system: false,
            no_fallback: false,
            extra_args: Vec::new(),
            startup_timeout_secs: default_startup_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SdConfig {
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub save_images: bool,
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub hf_cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl CacheConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs_home().join(".cache").join("lemonade")
        })
    }

    pub fn hf_cache_dir(&self) -> PathBuf {
        self.hf_cache_dir.clone().unwrap_or_else(|| {
            dirs_home().join(".cache").join("huggingface").join("hub")
        })
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_ctx_size() -> u32 {
    4096
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_startup_timeout_secs() -> u64 {
    300
}
fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from `config.toml` (if present), then the
    /// handful of named environment variables this system honors, then
    /// CLI flags, which take final precedence.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let loader = ConfigLoader::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("llamacpp.ctx_size", default_ctx_size() as i64)?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name("config").required(false))
            .build()?;

        let mut config: Config = loader.try_deserialize()?;
        config.apply_env();
        config.apply_cli(cli);
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("LEMONADE_CACHE_DIR") {
            self.cache.cache_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("HF_HUB_CACHE").or_else(|_| std::env::var("HF_HOME")) {
            self.cache.hf_cache_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LEMONADE_API_BASE") {
            self.cache.api_base = Some(v);
        }
        if env_flag_set("LEMONADE_LLAMACPP_PREFER_SYSTEM") {
            self.llamacpp.prefer_system = true;
        }
        if env_flag_set("LEMONADE_LLAMACPP_NO_FALLBACK") {
            self.llamacpp.no_fallback = true;
        }
        if let Ok(v) = std::env::var("LEMONADE_SDCPP") {
            self.sdcpp.variant = Some(v);
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(ctx) = cli.ctx_size {
            self.llamacpp.ctx_size = ctx;
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if let Some(variant) = &cli.sdcpp {
            self.sdcpp.variant = Some(variant.clone());
        }
        if cli.save_images {
            self.sdcpp.save_images = true;
        }
        if let Some(dir) = &cli.images_dir {
            self.sdcpp.images_dir = Some(dir.clone());
        }
        if let Some(variant) = &cli.llamacpp {
            self.llamacpp.variant = Some(variant.clone());
        }
    }
}

fn env_flag_set(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_derives_ws_port() {
        let server = ServerConfig::default();
        assert_eq!(server.port, 8000);
        assert_eq!(server.ws_port(), 8100);
    }

    #[test]
    fn explicit_ws_port_overrides_derivation() {
        let server = ServerConfig {
            ws_port: Some(9999),
            ..ServerConfig::default()
        };
        assert_eq!(server.ws_port(), 9999);
    }

    #[test]
    fn default_llamacpp_config() {
        let llamacpp = LlamaCppConfig::default();
        assert_eq!(llamacpp.ctx_size, 4096);
        assert!(!llamacpp.prefer_system);
        assert!(!llamacpp.no_fallback);
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let mut config = Config {
            server: ServerConfig::default(),
            llamacpp: LlamaCppConfig::default(),
            sdcpp: SdConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        };
        let cli = Cli {
            port: Some(9000),
            host: Some("0.0.0.0".to_string()),
            ctx_size: None,
            log_level: None,
            sdcpp: None,
            save_images: false,
            images_dir: None,
            llamacpp: None,
        };
        config.apply_cli(&cli);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
