//! Identifier generation.
//!
//! Transaction ids and position id suffixes come from an injected
//! [`IdGenerator`] so tests can make them predictable (or make them collide
//! on purpose).

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::config::{POSITION_ID_PREFIX_LEN, POSITION_ID_SUFFIX_LEN};

pub trait IdGenerator: Send + Sync {
    /// Fresh transaction id for a mint or redeem receipt.
    fn transaction_id(&self) -> String;

    /// Random-looking suffix for a position id.
    fn position_suffix(&self) -> String;
}

/// UUIDv4-backed ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn transaction_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn position_suffix(&self) -> String {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(POSITION_ID_SUFFIX_LEN);
        hex
    }
}

/// Counter-backed ids: `tx-000001`, suffix `00000001`, and so on.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn transaction_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("tx-{n:06}")
    }

    fn position_suffix(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n:08x}")
    }
}

/// `<first 8 chars of wallet>-<suffix>`. Counts characters, not bytes, so
/// a non-ASCII address cannot split a code point.
pub fn position_id(wallet: &str, suffix: &str) -> String {
    let prefix: String = wallet.chars().take(POSITION_ID_PREFIX_LEN).collect();
    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn position_id_uses_wallet_prefix() {
        assert_eq!(
            position_id("0x1234567890abcdef", "deadbeef"),
            "0x123456-deadbeef"
        );
        assert_eq!(position_id("0xab", "00000001"), "0xab-00000001");
        assert_eq!(position_id("wälletaddr", "x"), "wälletad-x");
    }

    #[test]
    fn uuid_suffixes_are_short_hex_and_distinct() {
        let ids = UuidGenerator;
        let suffixes: HashSet<_> = (0..100).map(|_| ids.position_suffix()).collect();
        assert_eq!(suffixes.len(), 100);
        for s in &suffixes {
            assert_eq!(s.len(), POSITION_ID_SUFFIX_LEN);
            assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn uuid_transaction_ids_parse() {
        let id = UuidGenerator.transaction_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn sequential_ids_are_predictable() {
        let ids = SequentialIds::new();
        assert_eq!(ids.transaction_id(), "tx-000001");
        assert_eq!(ids.position_suffix(), "00000002");
        assert_eq!(ids.transaction_id(), "tx-000003");
    }
}
