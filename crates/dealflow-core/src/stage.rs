use crate::error::DealflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sales pipeline stage a deal occupies.
///
/// Every stage is reachable from every other stage; deals get reopened and
/// reclassified, so there is no transition matrix to enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DealStage {
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    pub const ALL: [DealStage; 6] = [
        Self::Prospecting,
        Self::Qualification,
        Self::Proposal,
        Self::Negotiation,
        Self::ClosedWon,
        Self::ClosedLost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Prospecting => "prospecting",
            Self::Qualification => "qualification",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed-won",
            Self::ClosedLost => "closed-lost",
        }
    }

    /// Win probability (percent) a deal takes on when it enters this stage.
    ///
    /// `None` means the stage carries no default and the current probability
    /// must be kept as is.
    pub fn default_probability(self) -> Option<u8> {
        match self {
            Self::Prospecting => Some(10),
            Self::Qualification => Some(25),
            Self::Proposal => Some(50),
            Self::Negotiation => Some(75),
            Self::ClosedWon => Some(100),
            Self::ClosedLost => Some(0),
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }

    /// Parse a caller-supplied stage, rejecting blank and unknown values.
    pub fn parse(value: &str) -> Result<Self, DealflowError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DealflowError::invalid("stage is required"));
        }
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == trimmed)
            .ok_or_else(|| {
                DealflowError::InvalidInput(format!(
                    "invalid stage '{}'; expected one of: {}",
                    trimmed,
                    Self::ALL.map(Self::name).join(", ")
                ))
            })
    }
}

impl Default for DealStage {
    fn default() -> Self {
        Self::Prospecting
    }
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DealStage {
    type Err = DealflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_table_matches_pipeline_defaults() {
        let expected = [10, 25, 50, 75, 100, 0];
        for (stage, probability) in DealStage::ALL.into_iter().zip(expected) {
            assert_eq!(stage.default_probability(), Some(probability));
        }
    }

    #[test]
    fn parses_kebab_case_names() {
        assert_eq!(DealStage::parse("closed-won").unwrap(), DealStage::ClosedWon);
        assert_eq!(DealStage::parse(" negotiation ").unwrap(), DealStage::Negotiation);
    }

    #[test]
    fn names_are_case_sensitive() {
        for raw in ["Negotiation", "CLOSED-WON", "Prospecting"] {
            let err = DealStage::parse(raw).unwrap_err();
            assert!(err.to_string().contains(&format!("invalid stage '{raw}'")));
        }
    }

    #[test]
    fn rejects_blank_and_unknown_stages() {
        assert!(matches!(
            DealStage::parse("  "),
            Err(DealflowError::InvalidInput(_))
        ));
        let err = DealStage::parse("won").unwrap_err();
        assert!(err.to_string().contains("invalid stage 'won'"));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&DealStage::ClosedLost).unwrap();
        assert_eq!(json, "\"closed-lost\"");
    }
}
