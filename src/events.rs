//! Messages-changed notification channel.
//!
//! Built on `tokio::sync::watch`: at most one pending signal, a slow
//! subscriber never blocks the publisher, and a publish with no subscribers
//! is simply dropped. Owned by whoever builds the pipeline — there is no
//! process-wide singleton.

use tokio::sync::watch;

/// Publish side of the "messages changed" signal.
#[derive(Debug, Clone)]
pub struct MessageEvents {
    tx: watch::Sender<u64>,
}

/// Subscribe side — wraps a watch receiver so callers only see "changed".
#[derive(Debug, Clone)]
pub struct MessageEventsSubscription {
    rx: watch::Receiver<u64>,
}

impl MessageEvents {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Signal that the message set changed. Fire-and-forget.
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn subscribe(&self) -> MessageEventsSubscription {
        MessageEventsSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for MessageEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageEventsSubscription {
    /// Wait until the message set changes.
    ///
    /// Intermediate signals coalesce: if several notifications arrived since
    /// the last call, this resolves once.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_wakes_subscriber() {
        let events = MessageEvents::new();
        let mut sub = events.subscribe();

        events.notify();
        assert!(sub.changed().await);
    }

    #[tokio::test]
    async fn notifications_coalesce() {
        let events = MessageEvents::new();
        let mut sub = events.subscribe();

        events.notify();
        events.notify();
        events.notify();

        assert!(sub.changed().await);
        // All three collapsed into one pending signal.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            sub.changed(),
        )
        .await;
        assert!(pending.is_err());
    }

    #[test]
    fn notify_without_subscribers_is_dropped() {
        let events = MessageEvents::new();
        // Must not panic or block.
        events.notify();
    }

    #[tokio::test]
    async fn subscriber_sees_close() {
        let events = MessageEvents::new();
        let mut sub = events.subscribe();
        drop(events);
        assert!(!sub.changed().await);
    }
}
