//! Refresh notifications
//!
//! A payload-less "the file list changed" signal passed from the upload widget
//! to every gallery that is currently listening. Fire-and-forget: publishing
//! with no subscribers is a no-op and late subscribers see nothing that was
//! published before they subscribed.

use tokio::sync::broadcast;
use tracing::debug;

/// The signal itself. Carries no data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Refresh;

/// Hub shared by the application shell, the upload widget and the galleries.
#[derive(Clone)]
pub struct RefreshHub {
    tx: broadcast::Sender<Refresh>,
}

impl RefreshHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Notify every current subscriber. Returns how many were reached.
    pub fn publish(&self) -> usize {
        // No receivers just means no gallery is open.
        let reached = self.tx.send(Refresh).unwrap_or(0);
        debug!(subscribers = reached, "Published refresh notification");
        reached
    }

    pub fn subscribe(&self) -> RefreshSubscription {
        RefreshSubscription {
            rx: self.tx.subscribe(),
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RefreshHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One listener. Dropping it unsubscribes.
pub struct RefreshSubscription {
    rx: broadcast::Receiver<Refresh>,
    /// Notifications the channel dropped before this subscriber saw them.
    missed: u64,
}

impl RefreshSubscription {
    /// Wait for the next notification. `None` once the hub is gone.
    ///
    /// A subscriber that fell behind the channel capacity still gets one
    /// notification per publish; the dropped ones are handed out first.
    pub async fn recv(&mut self) -> Option<Refresh> {
        if let Some(refresh) = self.take_missed() {
            return Some(refresh);
        }
        match self.rx.recv().await {
            Ok(refresh) => Some(refresh),
            Err(broadcast::error::RecvError::Lagged(missed)) => self.lagged(missed),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking check, `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<Refresh> {
        if let Some(refresh) = self.take_missed() {
            return Some(refresh);
        }
        match self.rx.try_recv() {
            Ok(refresh) => Some(refresh),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => self.lagged(missed),
            Err(_) => None,
        }
    }

    fn take_missed(&mut self) -> Option<Refresh> {
        if self.missed == 0 {
            return None;
        }
        self.missed -= 1;
        Some(Refresh)
    }

    fn lagged(&mut self, missed: u64) -> Option<Refresh> {
        debug!(missed, "Refresh subscriber lagged");
        self.missed = missed.saturating_sub(1);
        Some(Refresh)
    }
}
