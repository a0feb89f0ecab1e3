//! Business targets modeled by the pipeline

use crate::error::{ModelingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label column for claim occurrence
pub const HAS_CLAIM: &str = "HasClaim";
/// Label column for claim severity
pub const CLAIM_SEVERITY: &str = "ClaimSeverity";
/// Label column for underwriting margin
pub const MARGIN: &str = "Margin";

/// All precomputed label columns; never used as features
pub const LABEL_COLUMNS: [&str; 3] = [HAS_CLAIM, CLAIM_SEVERITY, MARGIN];

/// Outcome being modeled. Drives split strategy, boosted objective and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Binary claim occurrence
    Risk,
    /// Claim amount, conditional on a claim
    Severity,
    /// Premium minus claims
    Margin,
}

impl TargetType {
    pub const ALL: [TargetType; 3] = [TargetType::Risk, TargetType::Severity, TargetType::Margin];

    /// Name of the precomputed label column for this target
    pub fn label_column(&self) -> &'static str {
        match self {
            TargetType::Risk => HAS_CLAIM,
            TargetType::Severity => CLAIM_SEVERITY,
            TargetType::Margin => MARGIN,
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, TargetType::Risk)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Risk => "risk",
            TargetType::Severity => "severity",
            TargetType::Margin => "margin",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = ModelingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "risk" => Ok(TargetType::Risk),
            "severity" => Ok(TargetType::Severity),
            "margin" => Ok(TargetType::Margin),
            other => Err(ModelingError::Configuration(format!(
                "unknown target type '{other}', expected one of risk, severity, margin"
            ))),
        }
    }
}
