//! # Error Taxonomy
//!
//! Four families of recoverable rejection, plus two ways things go wrong
//! that are not the caller's fault:
//!
//! | Family            | Meaning                                          |
//! |-------------------|--------------------------------------------------|
//! | `ValidationError` | The request itself is malformed                  |
//! | `ComplianceError` | The wallet is not allowed to do this (yet)       |
//! | `LedgerError`     | The wallet's state cannot support the operation  |
//! | `NotFoundError`   | The referenced wallet or position does not exist |
//! | `Storage`         | The backing store failed                         |
//! | `InvariantViolation` | Something that cannot happen, happened        |
//!
//! Every family converts into [`CoreError`] with `?`, and
//! [`CoreError::kind`] gives outer surfaces a closed set to map onto
//! status codes without string matching.

use crate::compliance::KycTier;
use crate::storage::StoreError;
use crate::units::{AmountParseError, Bps, Micros};

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// The request is malformed before any state is consulted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Requested KYC tier is not one of the verifiable tiers.
    #[error("invalid KYC tier '{0}': expected 'basic' or 'full'")]
    InvalidTier(String),

    /// Amount must be strictly positive for this operation.
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// Amount string could not be parsed.
    #[error("malformed amount: {0}")]
    MalformedAmount(#[from] AmountParseError),

    /// Verification would lower an already-granted tier.
    #[error("cannot downgrade KYC tier from {current} to {requested}")]
    TierDowngrade { current: KycTier, requested: KycTier },

    /// Wallet address is empty or whitespace.
    #[error("wallet address must not be empty")]
    EmptyAddress,

    /// A price used as a deviation reference was zero.
    #[error("reference price for {token} must be greater than zero")]
    ZeroReferencePrice { token: String },
}

/// The wallet is not permitted to perform the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComplianceError {
    /// The wallet has not completed KYC.
    #[error("wallet {wallet} must complete KYC first")]
    ComplianceRequired { wallet: String },

    /// The amount is above the wallet's per-transaction ceiling.
    #[error("amount {requested} exceeds {tier} tier limit of {limit} for wallet {wallet}")]
    LimitExceeded {
        wallet: String,
        tier: KycTier,
        limit: Micros,
        requested: Micros,
    },
}

/// The wallet's ledger state cannot support the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Redeeming more than the wallet holds.
    #[error("insufficient balance in {wallet}: available {available}, requested {requested}")]
    InsufficientBalance {
        wallet: String,
        available: Micros,
        requested: Micros,
    },

    /// Collateral ratio is below the minimum required to mint.
    #[error("insufficient collateral in {wallet}: ratio {ratio_bps} bps, required {required_bps} bps")]
    InsufficientCollateral {
        wallet: String,
        ratio_bps: Bps,
        required_bps: Bps,
    },

    /// Crediting would overflow the balance counter.
    #[error("balance overflow in {wallet}")]
    BalanceOverflow { wallet: String },

    /// The position was already closed.
    #[error("position {position_id} is closed")]
    PositionClosed { position_id: String },

    /// Could not generate an unused position id.
    #[error("could not allocate a unique position id after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },
}

/// The referenced record does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("wallet not found: {0}")]
    Wallet(String),

    #[error("position not found: {0}")]
    Position(String),
}

// ---------------------------------------------------------------------------
// CoreError
// ---------------------------------------------------------------------------

/// Closed classification of [`CoreError`] for outer surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Compliance,
    Ledger,
    NotFound,
    Storage,
    Invariant,
}

/// Every error the core can return.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// An internal invariant broke mid-operation. The operation was aborted
    /// and nothing was committed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl CoreError {
    /// Which family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Compliance(_) => ErrorKind::Compliance,
            CoreError::Ledger(_) => ErrorKind::Ledger,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Storage(_) => ErrorKind::Storage,
            CoreError::InvariantViolation(_) => ErrorKind::Invariant,
        }
    }

    /// Short machine-readable label, used in metrics and event payloads.
    pub fn label(&self) -> &'static str {
        match self {
            CoreError::Validation(ValidationError::InvalidTier(_)) => "invalid_tier",
            CoreError::Validation(ValidationError::NonPositiveAmount) => "non_positive_amount",
            CoreError::Validation(ValidationError::MalformedAmount(_)) => "malformed_amount",
            CoreError::Validation(ValidationError::TierDowngrade { .. }) => "tier_downgrade",
            CoreError::Validation(ValidationError::EmptyAddress) => "empty_address",
            CoreError::Validation(ValidationError::ZeroReferencePrice { .. }) => {
                "zero_reference_price"
            }
            CoreError::Compliance(ComplianceError::ComplianceRequired { .. }) => {
                "compliance_required"
            }
            CoreError::Compliance(ComplianceError::LimitExceeded { .. }) => "limit_exceeded",
            CoreError::Ledger(LedgerError::InsufficientBalance { .. }) => "insufficient_balance",
            CoreError::Ledger(LedgerError::InsufficientCollateral { .. }) => {
                "insufficient_collateral"
            }
            CoreError::Ledger(LedgerError::BalanceOverflow { .. }) => "balance_overflow",
            CoreError::Ledger(LedgerError::PositionClosed { .. }) => "position_closed",
            CoreError::Ledger(LedgerError::IdSpaceExhausted { .. }) => "id_space_exhausted",
            CoreError::NotFound(NotFoundError::Wallet(_)) => "wallet_not_found",
            CoreError::NotFound(NotFoundError::Position(_)) => "position_not_found",
            CoreError::Storage(_) => "storage",
            CoreError::InvariantViolation(_) => "invariant_violation",
        }
    }
}

impl From<AmountParseError> for CoreError {
    fn from(err: AmountParseError) -> Self {
        CoreError::Validation(ValidationError::MalformedAmount(err))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_map_to_kinds() {
        let err: CoreError = ValidationError::NonPositiveAmount.into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: CoreError = ComplianceError::ComplianceRequired {
            wallet: "0xabc".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Compliance);
        assert_eq!(err.label(), "compliance_required");

        let err: CoreError = NotFoundError::Position("p-1".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = CoreError::InvariantViolation("boom".into());
        assert_eq!(err.kind(), ErrorKind::Invariant);
    }

    #[test]
    fn amount_parse_errors_become_validation() {
        let err: CoreError = crate::units::parse_amount("-1").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.label(), "malformed_amount");
    }

    #[test]
    fn display_includes_context() {
        let err = LedgerError::InsufficientBalance {
            wallet: "0xdead".into(),
            available: 50,
            requested: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("0xdead"));
        assert!(msg.contains("50"));
        assert!(msg.contains("100"));
    }
}
