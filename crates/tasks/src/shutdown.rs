//! One-shot shutdown latch.
//!
//! A [`Shutdown`] is fired at most once; every [`ShutdownSignal`] derived from
//! it resolves once the latch has been fired. Firing again is a no-op, so
//! callers never need to coordinate who stops a component.

use tokio::sync::watch;

/// Owning side of a shutdown latch.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create an unfired latch.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the latch.
    ///
    /// Returns `true` only for the call that actually fired it. Never blocks.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Whether the latch has been fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a signal that resolves once the latch is fired.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observing side of a shutdown latch.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until the latch is fired.
    ///
    /// Also resolves when the owning [`Shutdown`] is dropped, since nothing can
    /// fire it any more and waiting forever would leak the waiter.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }

    /// Whether the latch has been fired.
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }
}
