//! # Ledger Events
//!
//! Structured notifications for everything the ledger does, accepted or
//! not. Components never print; they hand a [`LedgerEvent`] to whatever
//! [`EventSink`] they were built with.
//!
//! The node wires a broadcast sink so WebSocket clients can watch the
//! ledger live. Tests wire a [`MemorySink`] and assert on what landed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::compliance::KycTier;
use crate::units::{Bps, Micros};

/// Something that happened in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    WalletRegistered {
        wallet: String,
        at: DateTime<Utc>,
    },
    WalletVerified {
        wallet: String,
        tier: KycTier,
        provider: String,
        at: DateTime<Utc>,
    },
    CollateralUpdated {
        wallet: String,
        ratio_bps: Bps,
        at: DateTime<Utc>,
    },
    Minted {
        wallet: String,
        tx_id: String,
        amount: Micros,
        new_balance: Micros,
        collateral_token: String,
        at: DateTime<Utc>,
    },
    Redeemed {
        wallet: String,
        tx_id: String,
        amount: Micros,
        new_balance: Micros,
        collateral_returned: Micros,
        at: DateTime<Utc>,
    },
    PositionOpened {
        wallet: String,
        position_id: String,
        protocol: String,
        amount: Micros,
        apy_bps: Bps,
        at: DateTime<Utc>,
    },
    YieldAccrued {
        position_id: String,
        accrued: Micros,
        earned_total: Micros,
        at: DateTime<Utc>,
    },
    PositionClosed {
        wallet: String,
        position_id: String,
        earned_yield: Micros,
        at: DateTime<Utc>,
    },
    /// An operation was refused. `reason` is the error label.
    Rejected {
        wallet: String,
        operation: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// The event's discriminant as a string, matching the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::WalletRegistered { .. } => "wallet_registered",
            LedgerEvent::WalletVerified { .. } => "wallet_verified",
            LedgerEvent::CollateralUpdated { .. } => "collateral_updated",
            LedgerEvent::Minted { .. } => "minted",
            LedgerEvent::Redeemed { .. } => "redeemed",
            LedgerEvent::PositionOpened { .. } => "position_opened",
            LedgerEvent::YieldAccrued { .. } => "yield_accrued",
            LedgerEvent::PositionClosed { .. } => "position_closed",
            LedgerEvent::Rejected { .. } => "rejected",
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives ledger events. Must not block; the ledger may be holding a
/// wallet lock when it calls `emit`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LedgerEvent);
}

/// Shared handle to an event sink.
pub type SharedSink = Arc<dyn EventSink>;

/// Writes every event to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LedgerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::debug!(kind = event.kind(), payload = %json, "ledger event"),
            Err(e) => tracing::warn!(kind = event.kind(), error = %e, "unserializable ledger event"),
        }
    }
}

/// Buffers events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().clone()
    }

    /// Number of events with the given kind.
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LedgerEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Forwards each event to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(wallet: &str) -> LedgerEvent {
        LedgerEvent::WalletRegistered {
            wallet: wallet.into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(&registered("a"));
        sink.emit(&registered("b"));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], LedgerEvent::WalletRegistered { wallet, .. } if wallet == "b"));
        assert_eq!(sink.count("wallet_registered"), 2);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(TracingSink));
        assert_eq!(fanout.len(), 3);

        fanout.emit(&registered("x"));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }

    #[test]
    fn serde_tag_matches_kind() {
        let event = registered("0xabc");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
