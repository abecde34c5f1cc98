//! Run counters for an orchestrator.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A point-in-time snapshot of an orchestrator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrchestratorStats {
    /// Payloads accepted by `send`
    pub sent: usize,
    /// Payloads handed out by `receive`
    pub received: usize,
    /// Producers whose function was invoked
    pub producers_launched: usize,
    /// Producers never invoked because sending was stopped
    pub producers_skipped: usize,
    /// Consumers whose function was invoked
    pub consumers_launched: usize,
    /// Consumers never invoked because receiving was stopped
    pub consumers_skipped: usize,
    /// Producers or consumers that panicked
    pub panicked: usize,
    /// Payloads still buffered when the run ended, dropped unread
    pub discarded: usize,
}

impl OrchestratorStats {
    /// Payloads sent but never received, whether discarded or still buffered
    pub fn undelivered(&self) -> usize {
        self.sent.saturating_sub(self.received)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    sent: AtomicUsize,
    received: AtomicUsize,
    producers_launched: AtomicUsize,
    producers_skipped: AtomicUsize,
    consumers_launched: AtomicUsize,
    consumers_skipped: AtomicUsize,
    panicked: AtomicUsize,
    discarded: AtomicUsize,
}

impl Counters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_sent();
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_received();
    }

    pub(crate) fn record_producer_launched(&self) {
        self.producers_launched.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_producer_launched();
    }

    pub(crate) fn record_producers_skipped(&self, count: usize) {
        self.producers_skipped.fetch_add(count, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_producers_skipped(count);
    }

    pub(crate) fn record_consumer_launched(&self) {
        self.consumers_launched.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_consumer_launched();
    }

    pub(crate) fn record_consumer_skipped(&self) {
        self.consumers_skipped.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_consumer_skipped();
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_panicked();
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::metrics::record_discarded(count);
    }

    pub(crate) fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            producers_launched: self.producers_launched.load(Ordering::Relaxed),
            producers_skipped: self.producers_skipped.load(Ordering::Relaxed),
            consumers_launched: self.consumers_launched.load(Ordering::Relaxed),
            consumers_skipped: self.consumers_skipped.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
