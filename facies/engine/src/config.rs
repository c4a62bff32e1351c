//! Tunables and tolerances for rule construction and classification.
//!
//! Defaults reproduce the reference behaviour. `TruncConfig::from_env` lets a
//! batch run override them without touching the model description:
//! - `FACIES_TRUNC_RESOLUTION`: memoization resolution (0 disables the cache)
//! - `FACIES_TRUNC_MAX_BISECTION`: iteration cap of the angle-rule bisection
//! - `FACIES_TRUNC_NUDGE`: coordinate nudge used when a point hits a boundary

use serde::{Deserialize, Serialize};

/// A facies is considered certain when its probability exceeds `1 - EPS_PROB`.
pub const EPS_PROB: f64 = 1.0e-4;
/// Allowed deviation of summed probability fractions (and node totals) from 1.
pub const FRACTION_SUM_TOLERANCE: f64 = 1.0e-3;
/// Allowed deviation of post-split partition areas from their targets.
pub const AREA_SUM_TOLERANCE: f64 = 2.5e-3;
/// Bisection result accepted silently within this area error.
pub const SPLIT_AREA_TOLERANCE: f64 = 0.0025;
/// Bisection result accepted with a warning within this area error.
pub const SPLIT_RELAXED_TOLERANCE: f64 = 0.005;
/// Probabilities below this are treated as absent when laying out regions.
pub const EPS_AREA: f64 = 1.0e-9;

/// Default rounding resolution for memoization keys.
pub const DEFAULT_RESOLUTION: u32 = 100;
/// Default iteration cap of the angle-rule bisection.
pub const DEFAULT_MAX_BISECTION: usize = 20;
/// Default nudge toward the square interior for unresolved points.
pub const DEFAULT_NUDGE: f64 = 0.01;

/// Runtime settings shared by all rule types.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncConfig {
    /// Rounding resolution of the memoization key; 0 disables memoization.
    pub memo_resolution: u32,
    /// Upper bound on bisection iterations per polygon split.
    pub max_bisection_iter: usize,
    /// Distance each coordinate moves toward 0.5 on the single retry.
    pub nudge: f64,
}

impl Default for TruncConfig {
    fn default() -> Self {
        Self {
            memo_resolution: DEFAULT_RESOLUTION,
            max_bisection_iter: DEFAULT_MAX_BISECTION,
            nudge: DEFAULT_NUDGE,
        }
    }
}

impl TruncConfig {
    /// Defaults overlaid with any `FACIES_TRUNC_*` environment variables.
    ///
    /// Unparsable values are ignored with a warning and the default is kept.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TruncConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "FACIES_TRUNC_RESOLUTION") {
            cfg.memo_resolution = v;
        }
        if let Some(v) = parse_var(&lookup, "FACIES_TRUNC_MAX_BISECTION") {
            cfg.max_bisection_iter = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "FACIES_TRUNC_NUDGE") {
            if v > 0.0 && v < 0.5 {
                cfg.nudge = v;
            } else {
                tracing::warn!(value = v, "FACIES_TRUNC_NUDGE outside (0, 0.5), keeping default");
            }
        }
        cfg
    }

    /// Memoization is active for this configuration.
    pub fn memoization_enabled(&self) -> bool {
        self.memo_resolution > 0
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, raw = raw.as_str(), "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = TruncConfig::default();
        assert_eq!(cfg.memo_resolution, 100);
        assert_eq!(cfg.max_bisection_iter, 20);
        assert_eq!(cfg.nudge, 0.01);
        assert!(cfg.memoization_enabled());
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let cfg = TruncConfig::from_lookup(|k| match k {
            "FACIES_TRUNC_RESOLUTION" => Some("0".to_string()),
            "FACIES_TRUNC_MAX_BISECTION" => Some("not-a-number".to_string()),
            "FACIES_TRUNC_NUDGE" => Some("0.9".to_string()),
            _ => None,
        });
        assert_eq!(cfg.memo_resolution, 0);
        assert!(!cfg.memoization_enabled());
        assert_eq!(cfg.max_bisection_iter, DEFAULT_MAX_BISECTION);
        assert_eq!(cfg.nudge, DEFAULT_NUDGE);
    }
}
