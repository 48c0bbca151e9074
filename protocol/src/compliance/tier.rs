//! KYC tier ladder: `none < basic < full`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How thoroughly a wallet's owner has been identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycTier {
    /// Never verified. Cannot mint.
    #[default]
    None,
    Basic,
    Full,
}

impl KycTier {
    /// Position on the ladder. Higher is more trusted.
    pub fn rank(self) -> u8 {
        match self {
            KycTier::None => 0,
            KycTier::Basic => 1,
            KycTier::Full => 2,
        }
    }

    /// Whether this tier can be granted by verification.
    pub fn is_verifiable(self) -> bool {
        !matches!(self, KycTier::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KycTier::None => "none",
            KycTier::Basic => "basic",
            KycTier::Full => "full",
        }
    }
}

impl fmt::Display for KycTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KycTier {
    type Err = ValidationError;

    /// Accepts `none`, `basic`, `full`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(KycTier::None),
            "basic" => Ok(KycTier::Basic),
            "full" => Ok(KycTier::Full),
            _ => Err(ValidationError::InvalidTier(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_ordered() {
        assert!(KycTier::None.rank() < KycTier::Basic.rank());
        assert!(KycTier::Basic.rank() < KycTier::Full.rank());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("basic".parse::<KycTier>().unwrap(), KycTier::Basic);
        assert_eq!(" FULL ".parse::<KycTier>().unwrap(), KycTier::Full);
        assert!(matches!(
            "platinum".parse::<KycTier>(),
            Err(ValidationError::InvalidTier(t)) if t == "platinum"
        ));
    }

    #[test]
    fn only_basic_and_full_are_verifiable() {
        assert!(!KycTier::None.is_verifiable());
        assert!(KycTier::Basic.is_verifiable());
        assert!(KycTier::Full.is_verifiable());
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&KycTier::Full).unwrap(), "\"full\"");
        assert_eq!(KycTier::default(), KycTier::None);
    }
}
