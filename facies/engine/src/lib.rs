//! Facies truncation engine.
//!
//! Maps points of alpha space (transformed Gaussian field values in `[0,1]`)
//! to facies through a partition whose region measures equal the facies
//! probabilities. Three partition topologies are provided: [`cubic`],
//! [`angle`] and [`bayfill`]. Overlay facies ([`overlay`]) may override parts
//! of background facies through extra alpha coordinates.
//!
//! A rule is evaluated per grid cell in two steps: [`Truncation::set_trunc_rule`]
//! with the cell's probabilities, then [`Truncation::define_facies`] with its
//! alpha coordinates. Rule instances are not shared between threads; give
//! each worker its own.
#![warn(missing_docs)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::dbg_macro)]

pub mod angle;
pub mod base;
pub mod bayfill;
pub mod catalog;
pub mod config;
pub mod cubic;
pub mod error;
pub mod overlay;
pub mod params;
pub mod probability;
pub mod rule;

pub use angle::{AnglePolygonSpec, AngleRule, AngleSpec};
pub use base::{Classified, FaciesRegistration, TruncRuleBase};
pub use bayfill::{BayfillBreakpoints, BayfillFacies, BayfillRule, BayfillSpec};
pub use catalog::{Facies, FaciesCatalog, ZoneFaciesContext};
pub use config::TruncConfig;
pub use cubic::{CubicLeafSpec, CubicRule, CubicSpec, Direction};
pub use error::TruncError;
pub use overlay::{Interval, OverlayFaciesSpec, OverlayGroupSpec};
pub use params::ParamValue;
pub use rule::{PartitionPolygons, RuleSpec, Truncation, TruncationRule};

/// Returns the engine version string from Cargo metadata.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver_like() {
        assert!(version().split('.').count() >= 3);
    }
}
