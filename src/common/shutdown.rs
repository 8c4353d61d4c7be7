use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// One-shot shutdown signal shared between a component and its background tasks.
#[derive(Default)]
pub struct Shutdown {
    done: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every current and future waiter.
    pub fn shutdown(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once [`Shutdown::shutdown`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let done = self.done.clone();
        let notify = self.notify.clone();
        async move {
            loop {
                let notified = notify.notified();
                if done.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Shutdown;

    #[tokio::test]
    async fn test_wait_after_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait()).await.unwrap();
        // fired signals stay fired
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_wakes_pending() {
        let shutdown = std::sync::Arc::new(Shutdown::new());
        let wait = shutdown.wait();
        let handle = tokio::spawn(wait);
        tokio::task::yield_now().await;
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
