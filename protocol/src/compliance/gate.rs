//! # Compliance Gate
//!
//! Decides, but never stores. The gate turns a verification request into a
//! [`ComplianceDecision`] and answers limit questions; the ledger is the one
//! that writes the outcome onto the wallet, under the wallet's lock.
//!
//! ## Tier Ceilings
//!
//! | Tier    | Max per transaction |
//! |---------|---------------------|
//! | `none`  | 0                   |
//! | `basic` | 10,000              |
//! | `full`  | 1,000,000           |
//!
//! Which KYC provider gets credited with a verification is a strategy
//! ([`ProviderSelector`]) so tests can pin it and production can spread it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::tier::KycTier;
use crate::config::ComplianceConfig;
use crate::error::{ComplianceError, ValidationError};
use crate::units::{to_signed, Micros, SignedMicros};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of a successful verification. Transient; the ledger persists the
/// parts it cares about on the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDecision {
    pub wallet: String,
    pub verified: bool,
    pub tier: KycTier,
    pub max_transaction: Micros,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

/// Answer to "may this wallet move this much?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub wallet: String,
    pub tier: KycTier,
    pub amount: Micros,
    pub limit: Micros,
    pub allowed: bool,
    /// `limit − amount`. Negative when over the limit.
    pub remaining: SignedMicros,
}

// ---------------------------------------------------------------------------
// Provider Selection
// ---------------------------------------------------------------------------

/// Picks which KYC provider a verification is attributed to.
pub trait ProviderSelector: Send + Sync {
    /// `providers` is never empty; config validation guarantees it.
    fn select(&self, providers: &[String]) -> String;
}

/// Uniformly random choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomProvider;

impl ProviderSelector for RandomProvider {
    fn select(&self, providers: &[String]) -> String {
        providers
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}

/// Cycles through the pool in order.
#[derive(Debug, Default)]
pub struct RoundRobinProvider {
    next: AtomicUsize,
}

impl RoundRobinProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProviderSelector for RoundRobinProvider {
    fn select(&self, providers: &[String]) -> String {
        if providers.is_empty() {
            return String::new();
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % providers.len();
        providers[i].clone()
    }
}

/// Always the same provider, whether or not it is in the pool.
#[derive(Debug, Clone)]
pub struct FixedProvider(pub String);

impl ProviderSelector for FixedProvider {
    fn select(&self, _providers: &[String]) -> String {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ComplianceGate {
    config: ComplianceConfig,
    selector: Arc<dyn ProviderSelector>,
}

impl std::fmt::Debug for ComplianceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ComplianceGate {
    pub fn new(config: ComplianceConfig, selector: Arc<dyn ProviderSelector>) -> Self {
        Self { config, selector }
    }

    /// Gate with a random provider strategy.
    pub fn with_config(config: ComplianceConfig) -> Self {
        Self::new(config, Arc::new(RandomProvider))
    }

    /// Per-transaction ceiling for a tier.
    pub fn limit_for(&self, tier: KycTier) -> Micros {
        match tier {
            KycTier::None => 0,
            KycTier::Basic => self.config.basic_limit,
            KycTier::Full => self.config.full_limit,
        }
    }

    /// Parses a requested tier. Only `basic` and `full` can be requested.
    pub fn requested_tier(&self, requested: &str) -> Result<KycTier, ValidationError> {
        let tier: KycTier = requested.parse()?;
        if tier.is_verifiable() {
            Ok(tier)
        } else {
            Err(ValidationError::InvalidTier(requested.to_string()))
        }
    }

    /// Validates a verification request against the wallet's current tier.
    ///
    /// Only `basic` and `full` can be requested. Re-verifying at the same
    /// tier is allowed; stepping down is not.
    pub fn decide(
        &self,
        wallet: &str,
        requested: &str,
        current: KycTier,
    ) -> Result<ComplianceDecision, ValidationError> {
        let tier = self.requested_tier(requested)?;
        if tier.rank() < current.rank() {
            return Err(ValidationError::TierDowngrade {
                current,
                requested: tier,
            });
        }

        let provider = self.selector.select(&self.config.providers);
        tracing::debug!(wallet, tier = %tier, provider = %provider, "verification approved");

        Ok(ComplianceDecision {
            wallet: wallet.to_string(),
            verified: true,
            tier,
            max_transaction: self.limit_for(tier),
            provider,
            timestamp: Utc::now(),
        })
    }

    /// Pure limit predicate. Never fails.
    pub fn check_limit(&self, wallet: &str, tier: KycTier, amount: Micros) -> LimitCheck {
        let limit = self.limit_for(tier);
        LimitCheck {
            wallet: wallet.to_string(),
            tier,
            amount,
            limit,
            allowed: amount <= limit,
            remaining: to_signed(limit).saturating_sub(to_signed(amount)),
        }
    }

    /// Rejects wallets that have not completed KYC.
    pub fn require_verified(&self, wallet: &str, verified: bool) -> Result<(), ComplianceError> {
        if verified {
            Ok(())
        } else {
            Err(ComplianceError::ComplianceRequired {
                wallet: wallet.to_string(),
            })
        }
    }

    /// Rejects amounts above the tier ceiling.
    pub fn enforce_limit(
        &self,
        wallet: &str,
        tier: KycTier,
        amount: Micros,
    ) -> Result<(), ComplianceError> {
        let check = self.check_limit(wallet, tier, amount);
        if check.allowed {
            Ok(())
        } else {
            Err(ComplianceError::LimitExceeded {
                wallet: wallet.to_string(),
                tier,
                limit: check.limit,
                requested: amount,
            })
        }
    }
}

impl Default for ComplianceGate {
    fn default() -> Self {
        Self::with_config(ComplianceConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
