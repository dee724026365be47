//! Transport-level reachability checks.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

/// Default bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        matches!(self, Reachability::Reachable)
    }
}

impl From<bool> for Reachability {
    fn from(reachable: bool) -> Self {
        if reachable {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        }
    }
}

/// Something that can tell whether an address accepts connections.
pub trait Probe: Send + Sync {
    fn probe(&self, addr: &str) -> impl Future<Output = Reachability> + Send;
}

/// Opens a TCP connection and closes it again.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Probe for TcpProbe {
    async fn probe(&self, addr: &str) -> Reachability {
        probe(addr, self.timeout).await
    }
}

/// Try to connect to `addr` (`host:port`) within `timeout`.
///
/// Never fails: refusals, timeouts, resolution errors and any other I/O
/// fault all come back as [`Reachability::Unreachable`]. Name resolution
/// counts against the timeout.
pub async fn probe(addr: &str, timeout: Duration) -> Reachability {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(mut stream)) => {
            if let Err(e) = stream.shutdown().await {
                debug!(addr, error = %e, "probe connection shutdown failed");
            }
            drop(stream);
            debug!(addr, "endpoint reachable");
            Reachability::Reachable
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            warn!(addr, "endpoint refused connection");
            Reachability::Unreachable
        }
        Ok(Err(e)) => {
            warn!(addr, error = %e, "endpoint probe failed");
            Reachability::Unreachable
        }
        Err(_) => {
            warn!(addr, timeout_ms = timeout.as_millis() as u64, "endpoint probe timed out");
            Reachability::Unreachable
        }
    }
}
