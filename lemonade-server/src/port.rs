//! Ephemeral loopback port allocation (§4.1).

use tokio::net::TcpListener;

use crate::error::{Error, Result};

/// Hands out currently-unused TCP ports on the loopback interface.
///
/// Keeps no book-keeping of its own: a port handed out here can race
/// against another process binding it before the caller does. Callers
/// that launch a subprocess against an allocated port are expected to
/// retry (allocate + relaunch) up to 3 times if the subprocess fails to
/// bind, per §4.1.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortAllocator;

impl PortAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Opens a socket bound to port 0, reads back the OS-assigned port,
    /// and releases the socket immediately so the caller's subprocess can
    /// bind it.
    pub async fn acquire_port(&self) -> Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Internal(format!("no free port: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Internal(format!("no free port: {e}")))?
            .port();
        drop(listener);
        Ok(port)
    }

    /// A port is only returned to general circulation once its owning
    /// process has fully exited (§3, BackendProcess invariant). Since
    /// this allocator keeps no reservation table, release is a no-op;
    /// it exists so callers have a single place documenting the
    /// invariant and a hook if book-keeping is ever added.
    pub fn release_port(&self, _port: u16) {}
}

/// Runs `attempt` up to 3 times, allocating a fresh port each time,
/// retrying only when `attempt` reports the failure was a bind race.
pub async fn acquire_port_with_retry<F, Fut, T>(allocator: &PortAllocator, mut attempt: F) -> Result<T>
where
    F: FnMut(u16) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_err = None;
    for _ in 0..MAX_ATTEMPTS {
        let port = allocator.acquire_port().await?;
        match attempt(port).await {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Internal("no free port".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_port_returns_a_usable_port() {
        let allocator = PortAllocator::new();
        let port = allocator.acquire_port().await.unwrap();
        assert!(port > 0);
        // The port should be bindable again now that the probe listener dropped.
        let listener = TcpListener::bind(("127.0.0.1", port)).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn acquire_port_with_retry_retries_on_failure() {
        let allocator = PortAllocator::new();
        let mut attempts = 0;
        let result: Result<()> = acquire_port_with_retry(&allocator, |_port| {
            attempts += 1;
            async move {
                if attempts < 2 {
                    Err(Error::Internal("simulated bind race".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn acquire_port_with_retry_gives_up_after_three_tries() {
        let allocator = PortAllocator::new();
        let mut attempts = 0;
        let result: Result<()> = acquire_port_with_retry(&allocator, |_port| {
            attempts += 1;
            async move { Err(Error::Internal("still racing".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }
}
