//! Command-line flags (§6 of the external interfaces).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "lemonade-server", about = "Local OpenAI-compatible inference gateway")]
pub struct Cli {
    /// HTTP listen port (default 8000).
    #[arg(long)]
    pub port: Option<u16>,

    /// Bind address (default localhost).
    #[arg(long)]
    pub host: Option<String>,

    /// Default context size passed to the llama.cpp adapter.
    #[arg(long = "ctx-size")]
    pub ctx_size: Option<u32>,

    /// Verbosity.
    #[arg(long = "log-level", value_parser = ["debug", "info", "warning", "error"])]
    pub log_level: Option<String>,

    /// Preferred stable-diffusion accelerator variant.
    #[arg(long, value_parser = ["cpu", "vulkan", "rocm"])]
    pub sdcpp: Option<String>,

    /// Persist generated images to disk.
    #[arg(long = "save-images")]
    pub save_images: bool,

    /// Where to persist generated images.
    #[arg(long = "images-dir")]
    pub images_dir: Option<PathBuf>,

    /// Preferred llama.cpp accelerator variant.
    #[arg(long, value_parser = ["vulkan", "rocm", "metal", "cpu", "system"])]
    pub llamacpp: Option<String>,
}
