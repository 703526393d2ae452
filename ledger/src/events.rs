//! # Domain Events
//!
//! The ledger reports every state change through an [`EventSink`].
//! Events are fire-and-forget: a sink never returns anything, never
//! affects control flow, and is only invoked after the operation's state
//! changes and transfer have succeeded.
//!
//! Two sinks ship with the crate: [`TracingSink`] emits structured
//! `tracing` records, [`MemorySink`] accumulates events in memory so
//! tests and embedders can assert on them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A state change the ledger wants observers to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A new lock was funded and recorded.
    LockCreated {
        /// The beneficiary the lock pays out to.
        beneficiary: String,
        /// The amount actually received into custody (post-fee).
        amount: u64,
        /// Schedule origin.
        start_time: DateTime<Utc>,
        /// Schedule span in seconds.
        duration_secs: u64,
        /// Cliff sub-interval in seconds.
        cliff_secs: u64,
        /// Whether the administrator can revoke the unvested remainder.
        revocable: bool,
    },

    /// Vested funds were paid out to the beneficiary.
    Released {
        /// The beneficiary that was paid.
        beneficiary: String,
        /// The amount transferred out of custody.
        amount: u64,
    },

    /// The unvested remainder was clawed back to the administrator.
    Revoked {
        /// The beneficiary whose schedule was terminated.
        beneficiary: String,
        /// The amount refunded to the administrator.
        refund: u64,
    },
}

/// Observer boundary for ledger events.
///
/// Takes `&self` so sinks can be shared (an `Arc<MemorySink>` handle kept
/// by the test while the ledger owns another clone).
pub trait EventSink {
    /// Records one event. Must not fail and must not call back into the
    /// ledger.
    fn record(&self, event: &LedgerEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn record(&self, event: &LedgerEvent) {
        (**self).record(event);
    }
}

/// Sink that logs each event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::LockCreated {
                beneficiary,
                amount,
                duration_secs,
                cliff_secs,
                revocable,
                ..
            } => info!(
                beneficiary = %beneficiary,
                amount,
                duration_secs,
                cliff_secs,
                revocable,
                "vesting lock created"
            ),
            LedgerEvent::Released { beneficiary, amount } => {
                info!(beneficiary = %beneficiary, amount, "vested funds released")
            }
            LedgerEvent::Revoked { beneficiary, refund } => {
                info!(beneficiary = %beneficiary, refund, "lock revoked")
            }
        }
    }
}

/// Sink that keeps every event in order, for assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl MemorySink {
    /// Creates an empty shared sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &LedgerEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.record(&LedgerEvent::Released {
            beneficiary: "alice".into(),
            amount: 10,
        });
        sink.record(&LedgerEvent::Revoked {
            beneficiary: "alice".into(),
            refund: 90,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LedgerEvent::Released { amount: 10, .. }));
        assert!(matches!(events[1], LedgerEvent::Revoked { refund: 90, .. }));
    }

    #[test]
    fn shared_handle_sees_ledger_side_records() {
        let sink = MemorySink::new();
        let handle = Arc::clone(&sink);
        // The clone the ledger would own.
        handle.record(&LedgerEvent::Released {
            beneficiary: "bob".into(),
            amount: 1,
        });
        assert_eq!(sink.events().len(), 1);
    }
}
