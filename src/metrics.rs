//! Counter export through the `metrics` facade.
//!
//! Installed recorders see one monotonically increasing counter per
//! orchestrator event. Nothing is recorded when no recorder is installed.

use ::metrics::counter;

pub(crate) fn record_sent() {
    counter!("chanweld_sent_total").increment(1);
}

pub(crate) fn record_received() {
    counter!("chanweld_received_total").increment(1);
}

pub(crate) fn record_producer_launched() {
    counter!("chanweld_producers_launched_total").increment(1);
}

pub(crate) fn record_producers_skipped(count: usize) {
    counter!("chanweld_producers_skipped_total").increment(count as u64);
}

pub(crate) fn record_consumer_launched() {
    counter!("chanweld_consumers_launched_total").increment(1);
}

pub(crate) fn record_consumer_skipped() {
    counter!("chanweld_consumers_skipped_total").increment(1);
}

pub(crate) fn record_panicked() {
    counter!("chanweld_tasks_panicked_total").increment(1);
}

pub(crate) fn record_discarded(count: usize) {
    counter!("chanweld_discarded_total").increment(count as u64);
}
