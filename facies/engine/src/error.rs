//! Error taxonomy shared by every truncation rule.

/// Errors raised while configuring a rule or evaluating a cell.
///
/// Configuration-time variants indicate a malformed model and must stop
/// processing before any grid cell is touched.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TruncError {
    /// Missing, empty or inconsistent required input.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Facies name not present in the zone context.
    #[error("facies '{0}' is not modelled in this zone")]
    UnknownFacies(String),
    /// The facies registered in the rule differ from the facies of the zone.
    #[error("facies in truncation rule {rule:?} differ from facies in zone {zone:?}")]
    FaciesMismatch {
        /// Facies names registered in the rule.
        rule: Vec<String>,
        /// Facies names modelled in the zone.
        zone: Vec<String>,
    },
    /// Invalid overlay group definition.
    #[error("overlay group {group}: {reason}")]
    OverlayConfiguration {
        /// Zero-based index of the offending group.
        group: usize,
        /// What was violated, naming the facies or field involved.
        reason: String,
    },
    /// Probability fractions or partition areas do not sum as required.
    #[error("normalization error: {0}")]
    Normalization(String),
    /// A split could not be resolved for the given probabilities.
    #[error("geometric degeneracy: {reason} (probabilities {probabilities:?})")]
    GeometricDegeneracy {
        /// Description of the failed construction or classification.
        reason: String,
        /// Probability vector that was being processed.
        probabilities: Vec<f64>,
    },
}

impl TruncError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn overlay(group: usize, reason: impl Into<String>) -> Self {
        Self::OverlayConfiguration { group, reason: reason.into() }
    }

    pub(crate) fn degenerate(reason: impl Into<String>, probabilities: &[f64]) -> Self {
        Self::GeometricDegeneracy { reason: reason.into(), probabilities: probabilities.to_vec() }
    }
}
