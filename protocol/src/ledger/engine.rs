//! # Ledger Engine
//!
//! Authoritative state transitions for wallets and yield positions.
//!
//! ## Mint Pipeline
//!
//! ```text
//!   amount > 0 ──▶ wallet exists ──▶ KYC verified ──▶ ratio ≥ 1.5
//!        │               │                 │               │
//!   Validation       NotFound       ComplianceRequired  InsufficientCollateral
//!
//!   ──▶ amount ≤ tier ceiling ──▶ credit ──▶ compare-and-swap commit
//!              │
//!        LimitExceeded
//! ```
//!
//! Everything from "wallet exists" onward runs inside the wallet's critical
//! section, so two concurrent mints on one wallet cannot both read the same
//! balance. Redeem follows the same shape minus the compliance steps.
//!
//! ## Events
//!
//! Every accepted transition emits a [`LedgerEvent`]. Every rejection emits
//! [`LedgerEvent::Rejected`] and is logged at `warn` (or `error` for storage
//! and invariant failures). Nothing is retried internally.

use std::sync::Arc;

use chrono::Utc;

use crate::compliance::{ComplianceDecision, ComplianceGate, KycTier, LimitCheck};
use crate::config::LedgerConfig;
use crate::error::{
    CoreError, CoreResult, ErrorKind, LedgerError, NotFoundError, ValidationError,
};
use crate::events::{LedgerEvent, SharedSink, TracingSink};
use crate::market::ProtocolRegistry;
use crate::storage::LedgerStore;
use crate::units::{apply_bps, Amount, Bps, Micros};

use super::ids::{position_id, IdGenerator, UuidGenerator};
use super::locks::WalletLocks;
use super::position::YieldPosition;
use super::receipt::{MintReceipt, RedeemReceipt};
use super::wallet::Wallet;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Ledger`]. Only the store is mandatory.
pub struct LedgerBuilder {
    store: Arc<dyn LedgerStore>,
    registry: Option<Arc<ProtocolRegistry>>,
    gate: Option<ComplianceGate>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<SharedSink>,
    config: LedgerConfig,
}

impl LedgerBuilder {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            registry: None,
            gate: None,
            ids: None,
            events: None,
            config: LedgerConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<ProtocolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn gate(mut self, gate: ComplianceGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn events(mut self, events: SharedSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Ledger {
        Ledger {
            store: self.store,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ProtocolRegistry::with_default_catalog())),
            gate: self.gate.unwrap_or_default(),
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidGenerator)),
            events: self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            locks: WalletLocks::new(),
            config: self.config,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    registry: Arc<ProtocolRegistry>,
    gate: ComplianceGate,
    ids: Arc<dyn IdGenerator>,
    events: SharedSink,
    locks: WalletLocks,
    config: LedgerConfig,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .field("locked_wallets", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    pub fn builder(store: Arc<dyn LedgerStore>) -> LedgerBuilder {
        LedgerBuilder::new(store)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn gate(&self) -> &ComplianceGate {
        &self.gate
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // -- Wallets ------------------------------------------------------------

    /// Returns the wallet, creating it with default unverified state if this
    /// is the first time the address has been seen.
    pub fn register_wallet(&self, address: &str) -> CoreResult<Wallet> {
        self.observe("register", address, || {
            validate_address(address)?;
            self.locks.with_wallet(address, || -> CoreResult<_> {
                self.load_or_create(address)
            })
        })
    }

    pub fn wallet(&self, address: &str) -> CoreResult<Wallet> {
        self.require_wallet(address)
    }

    /// Sets the wallet's collateral ratio. Valuing the collateral is the
    /// caller's job; the ledger only records the result.
    pub fn update_collateral_ratio(&self, address: &str, ratio_bps: Bps) -> CoreResult<Wallet> {
        self.observe("update_collateral", address, || {
            self.with_existing_wallet(address, || {
                let current = self.require_wallet(address)?;
                let mut next = current.clone();
                next.set_collateral_ratio(ratio_bps);
                self.commit_wallet(Some(&current), &next)?;

                tracing::info!(wallet = address, ratio_bps, "collateral ratio updated");
                self.events.emit(&LedgerEvent::CollateralUpdated {
                    wallet: address.to_string(),
                    ratio_bps,
                    at: Utc::now(),
                });
                Ok(next)
            })
        })
    }

    // -- Compliance ---------------------------------------------------------

    /// Verifies a wallet at `requested_tier`, registering it first if needed.
    ///
    /// The tier is validated before anything is written, so an invalid
    /// request leaves no trace in the store.
    pub fn verify(&self, address: &str, requested_tier: &str) -> CoreResult<ComplianceDecision> {
        self.observe("verify", address, || {
            validate_address(address)?;
            self.gate.requested_tier(requested_tier)?;
            self.locks.with_wallet(address, || -> CoreResult<_> {
                let existing = self.store.load_wallet(address)?;
                let current_tier = existing
                    .as_ref()
                    .map(Wallet::kyc_tier)
                    .unwrap_or(KycTier::None);

                let decision = self.gate.decide(address, requested_tier, current_tier)?;

                let mut next = existing.clone().unwrap_or_else(|| Wallet::new(address));
                next.apply_verification(&decision);
                self.commit_wallet(existing.as_ref(), &next)?;

                if existing.is_none() {
                    self.emit_registered(address);
                }
                tracing::info!(
                    wallet = address,
                    tier = %decision.tier,
                    provider = %decision.provider,
                    "wallet verified"
                );
                self.events.emit(&LedgerEvent::WalletVerified {
                    wallet: address.to_string(),
                    tier: decision.tier,
                    provider: decision.provider.clone(),
                    at: decision.timestamp,
                });
                Ok(decision)
            })
        })
    }

    /// Limit check against the wallet's current tier. Unknown wallets are
    /// treated as unverified rather than rejected.
    pub fn check_limit(&self, address: &str, amount: Micros) -> CoreResult<LimitCheck> {
        let tier = self
            .store
            .load_wallet(address)?
            .map(|w| w.kyc_tier())
            .unwrap_or(KycTier::None);
        Ok(self.gate.check_limit(address, tier, amount))
    }

    // -- Mint / Redeem ------------------------------------------------------

    pub fn mint(
        &self,
        address: &str,
        amount: Micros,
        collateral_token: &str,
    ) -> CoreResult<MintReceipt> {
        self.observe("mint", address, || {
            require_positive(amount)?;
            self.with_existing_wallet(address, || {
                let current = self.require_wallet(address)?;

                self.gate
                    .require_verified(address, current.kyc_verified())?;

                let required = self.config.min_collateral_ratio_bps;
                if current.collateral_ratio_bps() < required {
                    return Err(LedgerError::InsufficientCollateral {
                        wallet: address.to_string(),
                        ratio_bps: current.collateral_ratio_bps(),
                        required_bps: required,
                    }
                    .into());
                }

                self.gate
                    .enforce_limit(address, current.kyc_tier(), amount)?;

                let mut next = current.clone();
                let new_balance = next.credit(amount)?;
                self.commit_wallet(Some(&current), &next)?;

                let receipt = MintReceipt {
                    tx_id: self.ids.transaction_id(),
                    wallet: address.to_string(),
                    amount,
                    collateral_token: collateral_token.to_string(),
                    new_balance,
                    timestamp: Utc::now(),
                };

                tracing::info!(
                    wallet = address,
                    amount = %Amount(amount),
                    balance = %Amount(new_balance),
                    tx_id = %receipt.tx_id,
                    "minted"
                );
                self.events.emit(&LedgerEvent::Minted {
                    wallet: address.to_string(),
                    tx_id: receipt.tx_id.clone(),
                    amount,
                    new_balance,
                    collateral_token: receipt.collateral_token.clone(),
                    at: receipt.timestamp,
                });
                Ok(receipt)
            })
        })
    }

    pub fn redeem(&self, address: &str, amount: Micros) -> CoreResult<RedeemReceipt> {
        self.observe("redeem", address, || {
            require_positive(amount)?;
            self.with_existing_wallet(address, || {
                let current = self.require_wallet(address)?;

                let mut next = current.clone();
                let new_balance = next.debit(amount)?;
                self.commit_wallet(Some(&current), &next)?;

                let receipt = RedeemReceipt {
                    tx_id: self.ids.transaction_id(),
                    wallet: address.to_string(),
                    amount,
                    collateral_returned: apply_bps(amount, self.config.redeem_collateral_bps),
                    new_balance,
                    timestamp: Utc::now(),
                };

                tracing::info!(
                    wallet = address,
                    amount = %Amount(amount),
                    balance = %Amount(new_balance),
                    tx_id = %receipt.tx_id,
                    "redeemed"
                );
                self.events.emit(&LedgerEvent::Redeemed {
                    wallet: address.to_string(),
                    tx_id: receipt.tx_id.clone(),
                    amount,
                    new_balance,
                    collateral_returned: receipt.collateral_returned,
                    at: receipt.timestamp,
                });
                Ok(receipt)
            })
        })
    }

    // -- Positions ----------------------------------------------------------

    /// Opens a position at the registry's current APY for `protocol`. An
    /// unknown protocol is accepted and earns zero.
    pub fn open_position(
        &self,
        address: &str,
        protocol: &str,
        amount: Micros,
    ) -> CoreResult<YieldPosition> {
        self.observe("open_position", address, || {
            require_positive(amount)?;
            self.with_existing_wallet(address, || {
                let apy_bps = self.registry.apy_of(protocol);

                let attempts = self.config.position_id_attempts;
                for attempt in 1..=attempts {
                    let id = position_id(address, &self.ids.position_suffix());
                    let position = YieldPosition::open(id, address, protocol, amount, apy_bps);

                    if !self.store.swap_position(None, &position)? {
                        tracing::debug!(
                            wallet = address,
                            position_id = position.position_id(),
                            attempt,
                            "position id collision; regenerating"
                        );
                        continue;
                    }

                    tracing::info!(
                        wallet = address,
                        position_id = position.position_id(),
                        protocol,
                        amount = %Amount(amount),
                        apy_bps,
                        "position opened"
                    );
                    self.events.emit(&LedgerEvent::PositionOpened {
                        wallet: address.to_string(),
                        position_id: position.position_id().to_string(),
                        protocol: protocol.to_string(),
                        amount,
                        apy_bps,
                        at: position.opened_at(),
                    });
                    return Ok(position);
                }

                Err(LedgerError::IdSpaceExhausted { attempts }.into())
            })
        })
    }

    /// Every position the wallet has ever opened, oldest first.
    pub fn positions(&self, address: &str) -> CoreResult<Vec<YieldPosition>> {
        self.require_wallet(address)?;
        Ok(self.store.positions_for_wallet(address)?)
    }

    pub fn position(&self, position_id: &str) -> CoreResult<YieldPosition> {
        self.store
            .load_position(position_id)?
            .ok_or_else(|| NotFoundError::Position(position_id.to_string()).into())
    }

    /// Adds `days` of yield at the position's snapshot APY.
    pub fn accrue_yield(
        &self,
        position_id: &str,
        days: u32,
        days_per_year: u32,
    ) -> CoreResult<YieldPosition> {
        self.mutate_position(position_id, "accrue_yield", |position| {
            let accrued = position.accrue(days, days_per_year)?;
            Ok(LedgerEvent::YieldAccrued {
                position_id: position.position_id().to_string(),
                accrued,
                earned_total: position.earned_yield(),
                at: Utc::now(),
            })
        })
    }

    pub fn close_position(&self, position_id: &str) -> CoreResult<YieldPosition> {
        self.mutate_position(position_id, "close_position", |position| {
            position.close()?;
            Ok(LedgerEvent::PositionClosed {
                wallet: position.wallet().to_string(),
                position_id: position.position_id().to_string(),
                earned_yield: position.earned_yield(),
                at: position.closed_at().unwrap_or_else(Utc::now),
            })
        })
    }

    // -- Counts -------------------------------------------------------------

    pub fn wallet_count(&self) -> CoreResult<usize> {
        Ok(self.store.wallet_count()?)
    }

    pub fn position_count(&self) -> CoreResult<usize> {
        Ok(self.store.position_count()?)
    }

    // -- Internals ----------------------------------------------------------

    fn require_wallet(&self, address: &str) -> CoreResult<Wallet> {
        self.store
            .load_wallet(address)?
            .ok_or_else(|| NotFoundError::Wallet(address.to_string()).into())
    }

    /// Takes the wallet lock only once the wallet is known to exist, so
    /// requests naming unknown addresses never add to the lock table. `f`
    /// must reload the wallet itself; the check here is not under the lock.
    fn with_existing_wallet<T>(
        &self,
        address: &str,
        f: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.require_wallet(address)?;
        self.locks.with_wallet(address, f)
    }

    /// Caller must hold the wallet lock.
    fn load_or_create(&self, address: &str) -> CoreResult<Wallet> {
        if let Some(existing) = self.store.load_wallet(address)? {
            return Ok(existing);
        }
        let wallet = Wallet::new(address);
        self.commit_wallet(None, &wallet)?;
        self.emit_registered(address);
        Ok(wallet)
    }

    fn emit_registered(&self, address: &str) {
        tracing::info!(wallet = address, "wallet registered");
        self.events.emit(&LedgerEvent::WalletRegistered {
            wallet: address.to_string(),
            at: Utc::now(),
        });
    }

    /// Compare-and-swap commit. Caller must hold the wallet lock, so a
    /// mismatch means something wrote around it.
    fn commit_wallet(&self, expected: Option<&Wallet>, next: &Wallet) -> CoreResult<()> {
        if self.store.swap_wallet(expected, next)? {
            Ok(())
        } else {
            Err(CoreError::InvariantViolation(format!(
                "wallet {} changed while its lock was held",
                next.address()
            )))
        }
    }

    /// Load, mutate, swap a position under its owner's lock.
    fn mutate_position(
        &self,
        position_id: &str,
        operation: &str,
        apply: impl FnOnce(&mut YieldPosition) -> CoreResult<LedgerEvent>,
    ) -> CoreResult<YieldPosition> {
        self.observe(operation, position_id, || {
            let owner = self.position(position_id)?.wallet().to_string();
            self.locks.with_wallet(&owner, || -> CoreResult<_> {
                let current = self.position(position_id)?;
                let mut next = current.clone();
                let event = apply(&mut next)?;

                if !self.store.swap_position(Some(&current), &next)? {
                    return Err(CoreError::InvariantViolation(format!(
                        "position {position_id} changed while its owner's lock was held"
                    )));
                }

                tracing::info!(
                    wallet = %owner,
                    position_id,
                    operation,
                    earned = %Amount(next.earned_yield()),
                    "position updated"
                );
                self.events.emit(&event);
                Ok(next)
            })
        })
    }

    /// Runs an operation, turning any failure into a log line and a
    /// `Rejected` event before handing it back.
    fn observe<T>(
        &self,
        operation: &str,
        address: &str,
        op: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        let result = op();
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Storage | ErrorKind::Invariant => {
                    tracing::error!(wallet = address, operation, error = %err, "ledger operation failed")
                }
                _ => {
                    tracing::warn!(wallet = address, operation, reason = err.label(), error = %err, "ledger operation rejected")
                }
            }
            self.events.emit(&LedgerEvent::Rejected {
                wallet: address.to_string(),
                operation: operation.to_string(),
                reason: err.label().to_string(),
                at: Utc::now(),
            });
        }
        result
    }
}

fn require_positive(amount: Micros) -> Result<(), ValidationError> {
    if amount == 0 {
        Err(ValidationError::NonPositiveAmount)
    } else {
        Ok(())
    }
}

fn validate_address(address: &str) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        Err(ValidationError::EmptyAddress)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
