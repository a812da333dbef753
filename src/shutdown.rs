use tokio::sync::watch;

/// Cooperative cancellation flag checked between batches
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

/// Trigger side of a [`ShutdownSignal`]
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl ShutdownSignal {
    pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
        let (sender, receiver) = watch::channel(false);
        (ShutdownTrigger { sender }, ShutdownSignal { receiver })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        // A dropped sender keeps the last value, which stays `false`
        drop(sender);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal fires; pends forever for [`ShutdownSignal::never`]
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_seen_by_every_clone() {
        let (trigger, signal) = ShutdownSignal::channel();
        let mut waiter = signal.clone();
        assert!(!signal.is_cancelled());

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn never_stays_pending() {
        let mut signal = ShutdownSignal::never();
        assert!(!signal.is_cancelled());

        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
