pub mod adapter;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod logging;
pub mod pool;
pub mod port;
pub mod router;
pub mod state;
pub mod telemetry;
pub mod weights;

pub use cli::Cli;
pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
