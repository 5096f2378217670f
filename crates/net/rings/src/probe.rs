//! Latency probing capability.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::NetPeerId;

/// Why a latency measurement failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("latency probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("latency probe failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Measures the round-trip latency to a peer.
///
/// Implementations must be safe to call concurrently and enforce their own
/// timeout; the routing table calls them without holding any lock and does
/// not bound them.
#[async_trait]
pub trait LatencyProbe<Id: NetPeerId>: Send + Sync + 'static {
    async fn probe(&self, peer: &Id) -> Result<Duration, ProbeError>;
}

#[async_trait]
impl<Id: NetPeerId, P: LatencyProbe<Id> + ?Sized> LatencyProbe<Id> for Arc<P> {
    async fn probe(&self, peer: &Id) -> Result<Duration, ProbeError> {
        (**self).probe(peer).await
    }
}
