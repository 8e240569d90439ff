//! One-shot "ready" latch shared by every gateway entry point

use std::sync::Arc;
use tokio::sync::watch;

/// Opens exactly once; every waiter, past or future, is released by that one opening.
#[derive(Debug, Clone)]
pub struct ReadyLatch {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadyLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyLatch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Release all current and future waiters. Opening twice is harmless.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_waiters_released_on_open() {
        let latch = ReadyLatch::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                tokio::spawn(async move { latch.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(!latch.is_open());
        latch.open();

        for waiter in waiters {
            timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_wait_after_open_returns_immediately() {
        let latch = ReadyLatch::new();
        latch.open();
        latch.open();
        timeout(Duration::from_millis(10), latch.wait()).await.unwrap();
        assert!(latch.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_latch_blocks() {
        let latch = ReadyLatch::new();
        assert!(timeout(Duration::from_secs(60), latch.wait()).await.is_err());
    }
}
