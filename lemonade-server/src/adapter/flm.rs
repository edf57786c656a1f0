//! FLM (FastFlowLM) family adapter (§4.5).
//!
//! The FLM runtime does not yet support programmatic port selection, so
//! it always binds its own fixed host port regardless of what the pool
//! allocated; `launch` ignores the port it's handed and reports the
//! fixed one back in the returned `BackendProcess` so the rest of the
//! pool (port release, health URL, forwarding) still work uniformly.
//! Readiness is reached once `/api/tags` answers 200.

use std::path::Path;
use std::sync::Arc;

use lemonade_common::Family;
use tokio::process::Command;

use crate::catalog::ModelEntry;
use crate::error::Result;
use crate::telemetry::TelemetryAggregator;

use super::{spawn_process, BackendProcess};

/// FLM's fixed listen port; the runtime has no `--port` flag yet.
pub const FIXED_PORT: u16 = 11434;

pub async fn launch(
    entry: &ModelEntry,
    _allocated_port: u16,
    binary: &Path,
    weights: &Path,
    telemetry: Arc<TelemetryAggregator>,
) -> Result<BackendProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("serve").arg("--model").arg(weights);
    spawn_process(cmd, Family::Flm, FIXED_PORT, entry.id.clone(), telemetry).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_port_is_stable() {
        assert_eq!(FIXED_PORT, 11434);
    }
}
