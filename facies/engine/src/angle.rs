//! Angle truncation rule: the unit square is sliced, one facies polygon at a
//! time, by straight lines of configurable orientation.
//!
//! Polygon `k` is cut from whatever polygon `0..k` left behind. The line runs
//! along `(cos α, sin α)` and sweeps from the square corner minimising its
//! normal; a bisection on the sweep offset matches the target area.

use std::sync::Arc;

use facies_geo::{line_normal, sweep_origin, Polygon, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::base::{locate_with_nudge, Classified, PartitionState, TruncRuleBase};
use crate::catalog::ZoneFaciesContext;
use crate::config::{
    TruncConfig, AREA_SUM_TOLERANCE, EPS_AREA, FRACTION_SUM_TOLERANCE, SPLIT_AREA_TOLERANCE,
    SPLIT_RELAXED_TOLERANCE,
};
use crate::error::TruncError;
use crate::overlay::{AdjustedAreas, Interval, OverlayGroupSpec, OverlayIntervals};
use crate::params::{ParamValue, ParameterFields};
use crate::probability::{round_probability_vector, CacheStats, PartitionCache};
use crate::rule::{PartitionPolygons, Truncation};

/// One facies polygon as registered by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnglePolygonSpec {
    /// Facies name.
    pub facies: String,
    /// Orientation in degrees anticlockwise from the first axis, or a field name.
    pub angle: ParamValue,
    /// Share of the facies probability given to this polygon.
    pub fraction: f64,
}

/// Parsed configuration of an angle rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngleSpec {
    /// Polygons in slicing order.
    pub polygons: Vec<AnglePolygonSpec>,
    /// The two Gaussian fields spanning the background square.
    pub background_fields: Vec<String>,
    /// Optional overlay groups.
    #[serde(default)]
    pub overlay: Vec<OverlayGroupSpec>,
}

#[derive(Clone, Debug, PartialEq)]
struct AngleEntry {
    facies: usize,
    angle: ParamValue,
    fraction: f64,
}

/// Sliced polygons for one probability vector.
#[derive(Clone, Debug, PartialEq)]
pub struct AnglePartition {
    polygons: Vec<Polygon>,
    facies: Vec<usize>,
    intervals: OverlayIntervals,
    probabilities: Vec<f64>,
}

impl AnglePartition {
    /// Polygons in slicing order.
    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Zone facies index per polygon.
    pub fn facies(&self) -> &[usize] {
        &self.facies
    }

    /// Summed polygon area of zone facies `facies`.
    pub fn facies_area(&self, facies: usize) -> f64 {
        self.polygons
            .iter()
            .zip(&self.facies)
            .filter(|(_, f)| **f == facies)
            .map(|(p, _)| p.area())
            .sum()
    }
}

/// Angle-sliced polygon truncation rule.
#[derive(Clone, Debug)]
pub struct AngleRule {
    base: TruncRuleBase,
    entries: Vec<AngleEntry>,
    fields: ParameterFields,
    // Resolved once when no polygon reads its angle from a field.
    const_angles: Option<Vec<f64>>,
    cache: PartitionCache<AnglePartition>,
    state: PartitionState<AnglePartition>,
}

impl AngleRule {
    /// Register the polygons of `spec` and validate fractions and overlays.
    pub fn new(
        context: &ZoneFaciesContext,
        spec: &AngleSpec,
        config: TruncConfig,
    ) -> Result<Self, TruncError> {
        if spec.background_fields.len() != 2 {
            return Err(TruncError::config(format!(
                "angle rule needs 2 background gauss fields, got {}",
                spec.background_fields.len()
            )));
        }
        if spec.polygons.is_empty() {
            return Err(TruncError::config("angle rule has no polygons"));
        }
        let mut base = TruncRuleBase::new(context, &spec.background_fields, config)?;
        let mut entries = Vec::with_capacity(spec.polygons.len());
        for p in &spec.polygons {
            let reg = base.add_background_facies(&p.facies)?;
            if let ParamValue::Constant(a) = p.angle {
                if !a.is_finite() {
                    return Err(TruncError::config(format!("angle of '{}' is not finite", p.facies)));
                }
            }
            entries.push(AngleEntry { facies: reg.index_in_zone, angle: p.angle.clone(), fraction: p.fraction });
        }
        check_fractions(&base, &entries)?;
        base.register_overlay_groups(&spec.overlay)?;
        base.check_facies_for_zone()?;
        let const_angles = entries
            .iter()
            .map(|e| match e.angle {
                ParamValue::Constant(a) => Some(a),
                ParamValue::Field(_) => None,
            })
            .collect::<Option<Vec<f64>>>();
        tracing::debug!(
            polygons = entries.len(),
            memo_resolution = config.memo_resolution,
            "angle rule constructed"
        );
        Ok(Self {
            base,
            entries,
            fields: ParameterFields::default(),
            const_angles,
            cache: PartitionCache::new(config.memo_resolution),
            state: PartitionState::Unset,
        })
    }

    /// Supply per-cell angles for polygons whose angle names `name`.
    ///
    /// Fails if no polygon reads its angle from `name`.
    pub fn set_parameter_field(&mut self, name: &str, values: Vec<f64>) -> Result<(), TruncError> {
        let referenced =
            self.entries.iter().any(|e| matches!(&e.angle, ParamValue::Field(f) if f == name));
        if !referenced {
            return Err(TruncError::config(format!(
                "no angle polygon reads parameter field '{name}'"
            )));
        }
        self.fields.insert(name, values);
        Ok(())
    }

    /// Memoization counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Current partition, if one has been built.
    pub fn partition(&self) -> Option<&AnglePartition> {
        self.state.partition()
    }

    /// Slice the unit square for the given areas and per-polygon angles.
    pub fn build_partition(
        &self,
        adjusted: &AdjustedAreas,
        angles: &[f64],
        probabilities: &[f64],
    ) -> Result<AnglePartition, TruncError> {
        let max_iter = self.base.config().max_bisection_iter;
        let mut remaining = Polygon::unit_square();
        let mut polygons = Vec::with_capacity(self.entries.len());
        let last = self.entries.len() - 1;
        for (k, entry) in self.entries.iter().enumerate() {
            let target = adjusted.areas[entry.facies] * entry.fraction;
            if k == last {
                let area = remaining.area();
                if (area - target).abs() > AREA_SUM_TOLERANCE {
                    return Err(TruncError::Normalization(format!(
                        "last angle polygon has area {area:.6}, target {target:.6}"
                    )));
                }
                polygons.push(std::mem::take(&mut remaining));
                break;
            }
            if target <= EPS_AREA {
                polygons.push(Polygon::empty());
                continue;
            }
            if target >= remaining.area() - EPS_AREA {
                polygons.push(std::mem::take(&mut remaining));
                continue;
            }
            let (piece, rest) = split_to_area(&remaining, angles[k], target, max_iter, probabilities)?;
            polygons.push(piece);
            remaining = rest;
        }
        Ok(AnglePartition {
            polygons,
            facies: self.entries.iter().map(|e| e.facies).collect(),
            intervals: adjusted.intervals.clone(),
            probabilities: probabilities.to_vec(),
        })
    }

    fn resolve_angles(&self, cell: Option<usize>) -> Result<Vec<f64>, TruncError> {
        self.entries.iter().map(|e| self.fields.resolve(&e.angle, cell)).collect()
    }
}

/// Cut from `poly` the part of area `target` behind a line of orientation
/// `angle_deg`, returning `(piece, rest)`.
pub fn split_to_area(
    poly: &Polygon,
    angle_deg: f64,
    target: f64,
    max_iter: usize,
    probabilities: &[f64],
) -> Result<(Polygon, Polygon), TruncError> {
    let n = line_normal(angle_deg);
    let base = n.dot(sweep_origin(n));
    let scale = n.x.abs() + n.y.abs();
    let offset = |s: f64| base + s * scale;
    let area_at = |s: f64| poly.clip(n, offset(s)).area();

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut best = (0.5, f64::INFINITY);
    for _ in 0..max_iter.max(1) {
        let mid = 0.5 * (lo + hi);
        let err = area_at(mid) - target;
        if err.abs() < best.1 {
            best = (mid, err.abs());
        }
        if err.abs() <= f64::EPSILON {
            break;
        }
        if err < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let (s, err) = best;
    if err > SPLIT_RELAXED_TOLERANCE {
        return Err(TruncError::degenerate(
            format!(
                "angle {angle_deg}: bisection left area error {err:.5} for target {target:.5}"
            ),
            probabilities,
        ));
    }
    if err > SPLIT_AREA_TOLERANCE {
        tracing::warn!(
            angle = angle_deg,
            target,
            error = err,
            "angle split not converged, accepted under relaxed tolerance"
        );
    }
    Ok(poly.split(n, offset(s)))
}

fn check_fractions(base: &TruncRuleBase, entries: &[AngleEntry]) -> Result<(), TruncError> {
    let mut sums = vec![0.0; base.facies_in_zone().len()];
    for e in entries {
        if !(e.fraction >= 0.0) {
            return Err(TruncError::Normalization(format!(
                "invalid probability fraction {} for '{}'",
                e.fraction,
                base.facies_in_zone()[e.facies]
            )));
        }
        sums[e.facies] += e.fraction;
    }
    for &f in base.background_facies() {
        if (sums[f] - 1.0).abs() > FRACTION_SUM_TOLERANCE {
            return Err(TruncError::Normalization(format!(
                "probability fractions of '{}' sum to {:.6}",
                base.facies_in_zone()[f],
                sums[f]
            )));
        }
    }
    Ok(())
}

impl Truncation for AngleRule {
    fn base(&self) -> &TruncRuleBase {
        &self.base
    }

    fn set_trunc_rule(&mut self, prob: &[f64], cell: Option<usize>) -> Result<(), TruncError> {
        self.base.check_probabilities(prob)?;
        if let Some(f) = self.base.is_facies_probability_degenerate(prob) {
            self.state = PartitionState::Determined(f);
            return Ok(());
        }
        let resolved;
        let angles: &[f64] = match &self.const_angles {
            Some(a) => a.as_slice(),
            None => {
                resolved = self.resolve_angles(cell)?;
                resolved.as_slice()
            }
        };
        if self.cache.is_enabled() && self.const_angles.is_some() {
            let key = self.cache.key(prob);
            if let Some(hit) = self.cache.get(&key) {
                self.state = PartitionState::Built(hit);
                return Ok(());
            }
            let rounded = round_probability_vector(prob, self.cache.resolution());
            let partition = self.build_partition(&self.base.adjust_areas(&rounded), angles, &rounded)?;
            tracing::debug!(entries = self.cache.stats().entries + 1, "angle partition cached");
            self.state = PartitionState::Built(self.cache.insert(key, partition));
            return Ok(());
        }
        let partition = self.build_partition(&self.base.adjust_areas(prob), angles, prob)?;
        self.state = PartitionState::Built(Arc::new(partition));
        Ok(())
    }

    fn define_facies(&self, alpha: &[f64]) -> Result<Classified, TruncError> {
        self.base.check_alpha(alpha)?;
        match &self.state {
            PartitionState::Unset => Err(TruncError::config("angle rule used before set_trunc_rule")),
            PartitionState::Determined(f) => Ok(self.base.classified(*f)),
            PartitionState::Built(partition) => {
                let p = Vec2::new(alpha[0], alpha[1]);
                let hit = locate_with_nudge(p, self.base.config().nudge, |q| {
                    partition.polygons.iter().position(|poly| poly.contains(q))
                });
                let Some(k) = hit else {
                    return Err(TruncError::degenerate(
                        format!("point ({}, {}) outside every angle polygon", p.x, p.y),
                        &partition.probabilities,
                    ));
                };
                let f = self.base.truncate_overlay_facies(partition.facies[k], alpha, &partition.intervals);
                Ok(self.base.classified(f))
            }
        }
    }

    fn polygons(&self) -> PartitionPolygons {
        let mut out = PartitionPolygons::default();
        if let Some(partition) = self.state.partition() {
            for (poly, &f) in partition.polygons.iter().zip(&partition.facies) {
                out.push(poly, f);
            }
        }
        out
    }

    fn use_const_trunc_model_param(&self) -> bool {
        self.const_angles.is_some()
    }

    fn overlay_intervals(&self) -> &[SmallVec<[Interval; 4]>] {
        self.state.partition().map_or(&[], |p| p.intervals.as_slice())
    }

    fn determined_facies(&self) -> Option<usize> {
        match self.state {
            PartitionState::Determined(f) => Some(f),
            _ => None,
        }
    }
}
