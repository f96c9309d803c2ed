//! One-shot cancellation shared by every worker of an operation
//!
//! Built on a `watch` channel the same way the service shutdown signal is:
//! the scope owns the sender, every worker holds a receiver.

use tokio::sync::watch;

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancelScope {
    tx: watch::Sender<bool>,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelScope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a token observing this scope
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Worker side of a cancellation signal
///
/// A token whose scope has been dropped counts as cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the scope is cancelled or dropped
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_all_tokens() {
        let scope = CancelScope::new();
        let tokens: Vec<_> = (0..4).map(|_| scope.token()).collect();

        let handles: Vec<_> = tokens
            .into_iter()
            .map(|t| tokio::spawn(async move { t.cancelled().await }))
            .collect();

        scope.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_after_cancel_resolves_immediately() {
        let scope = CancelScope::new();
        scope.cancel();
        let token = scope.token();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_scope_counts_as_cancelled() {
        let scope = CancelScope::new();
        let token = scope.token();
        drop(scope);
        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncancelled_token_stays_pending() {
        let scope = CancelScope::new();
        let token = scope.token();
        let result = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(result.is_err());
        assert!(!scope.is_cancelled());
    }
}
