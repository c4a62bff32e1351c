//! Overlay facies: extra facies that replace part of a background facies
//! inside a truncation interval of an additional alpha coordinate.
//!
//! A group owns a set of background facies and an ordered list of overlay
//! occurrences, each on its own alpha field. Widths are peeled in registration
//! order: occurrence k sees only the probability left after occurrences `0..k`.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::{EPS_AREA, EPS_PROB};
use crate::error::TruncError;

/// One overlay facies on one alpha field, as given by the model description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayFaciesSpec {
    /// Gaussian field providing the overlay alpha coordinate.
    pub alpha_field: String,
    /// Overlay facies name.
    pub facies: String,
    /// Share of the facies probability assigned to this occurrence.
    pub probability_fraction: f64,
    /// Centre of the truncation interval in `[0, 1]`.
    pub center: f64,
}

/// Overlay group definition as given by the model description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayGroupSpec {
    /// Background facies this group may override.
    pub background_facies: Vec<String>,
    /// Overlay occurrences in priority order.
    pub overlay: Vec<OverlayFaciesSpec>,
}

/// Resolved overlay occurrence.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayOccurrence {
    /// Position of the overlay field in the rule's alpha vector.
    pub alpha_index: usize,
    /// Overlay facies, zone index.
    pub facies: usize,
    /// Share of the facies probability.
    pub fraction: f64,
    /// Interval centre.
    pub center: f64,
}

/// Resolved overlay group.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayGroup {
    /// Background facies, zone indices.
    pub background: Vec<usize>,
    /// Occurrences in registration order.
    pub occurrences: Vec<OverlayOccurrence>,
}

/// Half-open truncation interval `(low, high]` on an overlay alpha coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Exclusive lower bound.
    pub low: f64,
    /// Inclusive upper bound.
    pub high: f64,
}

impl Interval {
    /// Interval of width `width` around `center`, slid back inside `[0, 1]`.
    pub fn centered(center: f64, width: f64) -> Self {
        let width = width.clamp(0.0, 1.0);
        let mut low = center - 0.5 * width;
        let mut high = center + 0.5 * width;
        if low < 0.0 {
            low = 0.0;
            high = width;
        } else if high > 1.0 {
            high = 1.0;
            low = 1.0 - width;
        }
        Self { low, high }
    }

    /// `high - low`.
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// `low < v <= high`.
    pub fn contains(&self, v: f64) -> bool {
        v > self.low && v <= self.high
    }
}

/// Intervals per group, per occurrence, for the current probabilities.
pub type OverlayIntervals = Vec<SmallVec<[Interval; 4]>>;

/// Output of the area adjustment step, input of every partition builder.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustedAreas {
    /// Target area per zone facies in the background partition. Overlay-only
    /// facies get 0.
    pub areas: Vec<f64>,
    /// Overlay truncation intervals.
    pub intervals: OverlayIntervals,
}

impl AdjustedAreas {
    /// Areas equal to the probabilities, no overlay.
    pub fn plain(prob: &[f64]) -> Self {
        Self { areas: prob.to_vec(), intervals: Vec::new() }
    }
}

/// Validated overlay groups of one rule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlaySet {
    groups: Vec<OverlayGroup>,
    group_of: Vec<Option<usize>>,
}

impl OverlaySet {
    /// Validate resolved groups against the rule's background facies.
    ///
    /// `names` are the zone facies names (for messages), `background` the zone
    /// indices of facies placed in the background partition.
    pub fn new(
        groups: Vec<OverlayGroup>,
        names: &[String],
        background: &[usize],
    ) -> Result<Self, TruncError> {
        let n_facies = names.len();
        let mut group_of: Vec<Option<usize>> = vec![None; n_facies];
        let mut fraction_sum: Vec<f64> = vec![0.0; n_facies];
        let mut first_group: Vec<Option<usize>> = vec![None; n_facies];

        for (gi, group) in groups.iter().enumerate() {
            if group.background.is_empty() {
                return Err(TruncError::overlay(gi, "no background facies"));
            }
            if group.occurrences.is_empty() {
                return Err(TruncError::overlay(gi, "no overlay facies"));
            }
            for &bg in &group.background {
                if !background.contains(&bg) {
                    return Err(TruncError::overlay(
                        gi,
                        format!("'{}' is not a background facies of the rule", label(names, bg)),
                    ));
                }
                if let Some(other) = group_of[bg] {
                    let name = label(names, bg);
                    return Err(TruncError::overlay(
                        gi,
                        format!("background facies '{name}' already belongs to group {other}"),
                    ));
                }
                group_of[bg] = Some(gi);
            }
            for (k, occ) in group.occurrences.iter().enumerate() {
                let name = label(names, occ.facies);
                if group.occurrences[..k].iter().any(|o| o.alpha_index == occ.alpha_index) {
                    return Err(TruncError::overlay(
                        gi,
                        format!("alpha field used twice (overlay facies '{name}')"),
                    ));
                }
                if background.contains(&occ.facies) {
                    return Err(TruncError::overlay(
                        gi,
                        format!("'{name}' is both background and overlay facies"),
                    ));
                }
                if !(0.0..=1.0).contains(&occ.center) {
                    return Err(TruncError::overlay(
                        gi,
                        format!("interval centre {} of '{name}' outside [0,1]", occ.center),
                    ));
                }
                if !(occ.fraction > 0.0 && occ.fraction <= 1.0 + EPS_PROB) {
                    return Err(TruncError::overlay(
                        gi,
                        format!("probability fraction {} of '{name}' outside (0,1]", occ.fraction),
                    ));
                }
                fraction_sum[occ.facies] += occ.fraction;
                first_group[occ.facies].get_or_insert(gi);
            }
        }

        let mut n_overlay = 0usize;
        for (f, &sum) in fraction_sum.iter().enumerate() {
            if let Some(gi) = first_group[f] {
                n_overlay += 1;
                if (sum - 1.0).abs() > EPS_PROB {
                    return Err(TruncError::overlay(
                        gi,
                        format!("probability fractions of overlay facies '{}' sum to {sum}", label(names, f)),
                    ));
                }
            }
        }
        let mut distinct_background: Vec<usize> = background.to_vec();
        distinct_background.sort_unstable();
        distinct_background.dedup();
        if distinct_background.len() + n_overlay != n_facies {
            return Err(TruncError::overlay(
                groups.len().saturating_sub(1),
                format!(
                    "{} background + {n_overlay} overlay facies do not cover the {n_facies} zone facies",
                    distinct_background.len()
                ),
            ));
        }
        Ok(Self { groups, group_of })
    }

    /// Registered groups.
    pub fn groups(&self) -> &[OverlayGroup] {
        &self.groups
    }

    /// True if no group is registered.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Per-background-facies target areas and per-occurrence intervals.
    pub fn adjust(&self, prob: &[f64]) -> AdjustedAreas {
        let mut areas = prob.to_vec();
        let mut intervals: OverlayIntervals = Vec::with_capacity(self.groups.len());
        for occ in self.groups.iter().flat_map(|g| g.occurrences.iter()) {
            areas[occ.facies] = 0.0;
        }
        for group in &self.groups {
            let p_bg: f64 = group.background.iter().map(|&f| prob[f]).sum();
            let p_ov: f64 = group.occurrences.iter().map(|o| prob[o.facies] * o.fraction).sum();
            let total = p_bg + p_ov;
            if total <= EPS_AREA {
                for &f in &group.background {
                    areas[f] = 0.0;
                }
                intervals.push(
                    group.occurrences.iter().map(|o| Interval { low: o.center, high: o.center }).collect(),
                );
                continue;
            }
            if p_bg > EPS_AREA {
                for &f in &group.background {
                    areas[f] = prob[f] * total / p_bg;
                }
            } else {
                #[allow(clippy::cast_precision_loss)]
                let share = total / group.background.len() as f64;
                for &f in &group.background {
                    areas[f] = share;
                }
            }
            let mut remaining = total;
            let mut group_intervals = SmallVec::new();
            for occ in &group.occurrences {
                let p = prob[occ.facies] * occ.fraction;
                let width = if remaining > EPS_AREA { p / remaining } else { 0.0 };
                remaining -= p;
                group_intervals.push(Interval::centered(occ.center, width));
            }
            intervals.push(group_intervals);
        }
        AdjustedAreas { areas, intervals }
    }

    /// Replace background facies `bg` by the first overlay facies whose
    /// interval contains its alpha coordinate.
    pub fn truncate(&self, bg: usize, alpha: &[f64], intervals: &OverlayIntervals) -> usize {
        let Some(gi) = self.group_of.get(bg).copied().flatten() else {
            return bg;
        };
        let (Some(group), Some(group_intervals)) = (self.groups.get(gi), intervals.get(gi)) else {
            return bg;
        };
        for (occ, iv) in group.occurrences.iter().zip(group_intervals.iter()) {
            if alpha.get(occ.alpha_index).is_some_and(|&a| iv.contains(a)) {
                return occ.facies;
            }
        }
        bg
    }
}

fn label(names: &[String], i: usize) -> &str {
    names.get(i).map_or("?", String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["F1", "F2", "A", "B"].iter().map(|s| s.to_string()).collect()
    }

    fn occ(alpha_index: usize, facies: usize, fraction: f64, center: f64) -> OverlayOccurrence {
        OverlayOccurrence { alpha_index, facies, fraction, center }
    }

    #[test]
    fn interval_slides_inside_unit_range() {
        let iv = Interval::centered(0.9, 0.4);
        assert!((iv.low - 0.6).abs() < 1e-15 && (iv.high - 1.0).abs() < 1e-15);
        let iv = Interval::centered(0.05, 0.2);
        assert!((iv.low - 0.0).abs() < 1e-15 && (iv.high - 0.2).abs() < 1e-15);
        let iv = Interval::centered(0.5, 0.2);
        assert!(iv.contains(0.6) && !iv.contains(0.4) && iv.contains(0.5));
    }

    #[test]
    fn peeling_order_sets_widths() {
        let set = OverlaySet::new(
            vec![OverlayGroup { background: vec![0], occurrences: vec![occ(2, 2, 1.0, 0.5), occ(3, 3, 1.0, 0.5)] }],
            &names(),
            &[0, 1],
        )
        .unwrap();
        let prob = [0.3, 0.4, 0.2, 0.1];
        let adj = set.adjust(&prob);
        // Group total 0.6, all of it becomes F1's background area.
        assert!((adj.areas[0] - 0.6).abs() < 1e-12);
        assert!((adj.areas[1] - 0.4).abs() < 1e-12);
        assert_eq!(adj.areas[2], 0.0);
        let wa = adj.intervals[0][0].width();
        let wb = adj.intervals[0][1].width();
        assert!((wa - 0.2 / 0.6).abs() < 1e-12);
        assert!((wb - 0.1 / 0.4).abs() < 1e-12);
        assert!(wa + wb <= 1.0);
        // Volumes inside F1's region reproduce the probabilities.
        let area = adj.areas[0];
        assert!((area * wa - 0.2).abs() < 1e-12);
        assert!((area * (1.0 - wa) * wb - 0.1).abs() < 1e-12);
        assert!((area * (1.0 - wa) * (1.0 - wb) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn truncate_walks_occurrences_in_order() {
        let set = OverlaySet::new(
            vec![OverlayGroup { background: vec![0], occurrences: vec![occ(2, 2, 1.0, 0.5), occ(3, 3, 1.0, 0.5)] }],
            &names(),
            &[0, 1],
        )
        .unwrap();
        let adj = set.adjust(&[0.3, 0.4, 0.2, 0.1]);
        assert_eq!(set.truncate(0, &[0.1, 0.1, 0.5, 0.5], &adj.intervals), 2);
        assert_eq!(set.truncate(0, &[0.1, 0.1, 0.99, 0.5], &adj.intervals), 3);
        assert_eq!(set.truncate(0, &[0.1, 0.1, 0.99, 0.99], &adj.intervals), 0);
        // F2 owns no group.
        assert_eq!(set.truncate(1, &[0.1, 0.1, 0.5, 0.5], &adj.intervals), 1);
    }

    #[test]
    fn empty_group_gets_zero_width() {
        let set = OverlaySet::new(
            vec![OverlayGroup { background: vec![0], occurrences: vec![occ(2, 2, 1.0, 0.5), occ(3, 3, 1.0, 0.5)] }],
            &names(),
            &[0, 1],
        )
        .unwrap();
        let adj = set.adjust(&[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(adj.areas[0], 0.0);
        assert_eq!(adj.intervals[0][0].width(), 0.0);
    }

    #[test]
    fn validation_failures() {
        let n = names();
        // Background facies in two groups.
        let two = vec![
            OverlayGroup { background: vec![0], occurrences: vec![occ(2, 2, 1.0, 0.5)] },
            OverlayGroup { background: vec![0], occurrences: vec![occ(3, 3, 1.0, 0.5)] },
        ];
        assert!(matches!(
            OverlaySet::new(two, &n, &[0, 1]),
            Err(TruncError::OverlayConfiguration { group: 1, .. })
        ));
        // Same alpha field twice in one group.
        let dup = vec![OverlayGroup {
            background: vec![0],
            occurrences: vec![occ(2, 2, 1.0, 0.5), occ(2, 3, 1.0, 0.5)],
        }];
        assert!(OverlaySet::new(dup, &n, &[0, 1]).is_err());
        // Fractions of A sum to 0.5.
        let short = vec![OverlayGroup {
            background: vec![0],
            occurrences: vec![occ(2, 2, 0.5, 0.5), occ(3, 3, 1.0, 0.5)],
        }];
        assert!(OverlaySet::new(short, &n, &[0, 1]).is_err());
        // B never used: facies count mismatch.
        let missing = vec![OverlayGroup { background: vec![0], occurrences: vec![occ(2, 2, 1.0, 0.5)] }];
        assert!(OverlaySet::new(missing, &n, &[0, 1]).is_err());
    }

    #[test]
    fn fractions_may_span_groups() {
        let n = names();
        let groups = vec![
            OverlayGroup { background: vec![0], occurrences: vec![occ(2, 2, 0.5, 0.5), occ(3, 3, 1.0, 0.2)] },
            OverlayGroup { background: vec![1], occurrences: vec![occ(2, 2, 0.5, 0.5)] },
        ];
        let set = OverlaySet::new(groups, &n, &[0, 1]).unwrap();
        let adj = set.adjust(&[0.3, 0.3, 0.2, 0.2]);
        let total: f64 = adj.areas.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}
