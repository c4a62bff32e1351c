//! Bayfill truncation rule: a fixed five-facies model of a bay filling up
//! behind a slanted shoreline.
//!
//! Two parallel lines `y = c - sf·x` cut the unit square. Above the upper
//! line lies Floodplain, between the lines Subbay, below the lower line the
//! bay. Inside the bay a Lagoon rectangle sits against the far edge; the rest
//! of the bay is the delta zone shared by Bay-head delta (a column against
//! `x = 0`) and Wave-influenced bayfill. When the column cannot hold the
//! Bay-head delta the third alpha coordinate decides between the two.
//!
//! Every breakpoint is solved in closed form; nothing here iterates.

use std::sync::Arc;

use facies_geo::{Polygon, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::base::{locate_with_nudge, Classified, PartitionState, TruncRuleBase};
use crate::catalog::ZoneFaciesContext;
use crate::config::{TruncConfig, AREA_SUM_TOLERANCE, EPS_AREA, EPS_PROB};
use crate::error::TruncError;
use crate::overlay::Interval;
use crate::params::{ParamValue, ParameterFields};
use crate::probability::{degenerate_facies, round_probability_vector, CacheStats, PartitionCache};
use crate::rule::{PartitionPolygons, Truncation};

/// Lower clamp of the slant factor.
pub const MIN_SLANT_FACTOR: f64 = 1.0e-4;
/// Clamp range of the Bay-head delta column factor.
pub const SBHD_RANGE: (f64, f64) = (0.001, 0.999);
/// Pieces smaller than this are dropped from the partition.
const MIN_PIECE_AREA: f64 = 1.0e-12;

/// The five facies of the model, in rule order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BayfillFacies {
    /// Above the upper shoreline.
    Floodplain,
    /// Between the two shorelines.
    Subbay,
    /// Delta zone outside the Bay-head delta.
    WaveInfluencedBayfill,
    /// Column of the delta zone against `x = 0`.
    BayHeadDelta,
    /// Rectangle at the far end of the bay.
    Lagoon,
}

impl BayfillFacies {
    /// All facies in rule order.
    pub const ALL: [Self; 5] = [
        Self::Floodplain,
        Self::Subbay,
        Self::WaveInfluencedBayfill,
        Self::BayHeadDelta,
        Self::Lagoon,
    ];

    /// Position in rule order.
    pub fn index(self) -> usize {
        match self {
            Self::Floodplain => 0,
            Self::Subbay => 1,
            Self::WaveInfluencedBayfill => 2,
            Self::BayHeadDelta => 3,
            Self::Lagoon => 4,
        }
    }
}

/// Parsed configuration of a bayfill rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BayfillSpec {
    /// Floodplain facies name.
    pub floodplain: String,
    /// Subbay facies name.
    pub subbay: String,
    /// Wave-influenced bayfill facies name.
    pub wave_influenced_bayfill: String,
    /// Bay-head delta facies name.
    pub bay_head_delta: String,
    /// Lagoon facies name.
    pub lagoon: String,
    /// Slant factor, constant or field name.
    pub sf: ParamValue,
    /// Lagoon height as a share of the bay height.
    pub ysf: f64,
    /// Bay-head delta column width as a share of the lagoon offset.
    pub sbhd: f64,
    /// The three Gaussian fields `(x, y, z)`.
    pub background_fields: Vec<String>,
}

/// Where a shoreline crosses the unit square.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LineRegime {
    /// Cuts the bottom-left corner: area below at most `sf/2`.
    BottomCorner,
    /// Crosses both vertical edges.
    Band,
    /// Cuts the top-right corner: area below above `1 - sf/2`.
    TopCorner,
}

/// Regimes of the lower and upper shoreline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum FloodplainSituation {
    BothBottomCorner,
    BottomCornerThenBand,
    BottomCornerThenTopCorner,
    BothBand,
    BandThenTopCorner,
    BothTopCorner,
}

impl FloodplainSituation {
    /// Situation for a lower line in regime `lower` and upper line in `upper`.
    pub fn from_regimes(lower: LineRegime, upper: LineRegime) -> Self {
        use LineRegime::{Band, BottomCorner, TopCorner};
        let (lo, hi) = if lower <= upper { (lower, upper) } else { (upper, lower) };
        match (lo, hi) {
            (BottomCorner, BottomCorner) => Self::BothBottomCorner,
            (BottomCorner, Band) => Self::BottomCornerThenBand,
            (BottomCorner, TopCorner) => Self::BottomCornerThenTopCorner,
            (Band, BottomCorner | Band) => Self::BothBand,
            (Band, TopCorner) => Self::BandThenTopCorner,
            (TopCorner, _) => Self::BothTopCorner,
        }
    }
}

/// How the delta zone is shared between Bay-head delta and Wave-influenced bayfill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaSituation {
    /// Neither facies present; the sliver left over is Wave-influenced bayfill.
    NoDelta,
    /// Whole delta zone is Wave-influenced bayfill.
    NoBayHeadDelta,
    /// Whole delta zone is Bay-head delta.
    NoWaveInfluenced,
    /// Column too small: `z <= zm` selects Bay-head delta anywhere in the zone.
    ZThreshold,
    /// Bay-head delta is the column above `y = ym`.
    Split,
}

/// Closed-form solution for one probability vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BayfillBreakpoints {
    /// Slant factor after clamping.
    pub sf: f64,
    /// Offset of the lower shoreline.
    pub c1: f64,
    /// Offset of the upper shoreline.
    pub c2: f64,
    /// Regime pair of the shorelines.
    pub situation: FloodplainSituation,
    /// Delta zone layout.
    pub delta: DeltaSituation,
    /// Upper shoreline at `y = 1`.
    pub x1: f64,
    /// Upper shoreline at `y = 0`.
    pub x2: f64,
    /// Lower shoreline at `y = 1`.
    pub x3: f64,
    /// Lower shoreline at `y = 0`.
    pub x4: f64,
    /// Left edge of the lagoon.
    pub xl: f64,
    /// Upper shoreline at `x = 0`.
    pub yf: f64,
    /// Upper shoreline at `x = 1`.
    pub yf2: f64,
    /// Top of the lagoon.
    pub yl: f64,
    /// Lower shoreline at `x = 0`.
    pub ys: f64,
    /// Lower shoreline at `x = 1`.
    pub ys2: f64,
    /// Right edge of the Bay-head delta column.
    pub xm: f64,
    /// Bottom of the Bay-head delta inside the column.
    pub ym: f64,
    /// Threshold on `z` under [`DeltaSituation::ZThreshold`].
    pub zm: f64,
    /// True under [`DeltaSituation::ZThreshold`].
    pub use_z: bool,
}

/// Shoreline `y = c - sf·x`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlantLine {
    /// Slope magnitude.
    pub sf: f64,
    /// Intercept at `x = 0`.
    pub c: f64,
}

impl SlantLine {
    /// Line whose area below, inside the unit square, is `area`.
    pub fn with_area_below(sf: f64, area: f64) -> (Self, LineRegime) {
        let area = area.clamp(0.0, 1.0);
        let (c, regime) = if area <= 0.5 * sf {
            ((2.0 * sf * area).sqrt(), LineRegime::BottomCorner)
        } else if area <= 1.0 - 0.5 * sf {
            (area + 0.5 * sf, LineRegime::Band)
        } else {
            (1.0 + sf - (2.0 * sf * (1.0 - area)).max(0.0).sqrt(), LineRegime::TopCorner)
        };
        (Self { sf, c }, regime)
    }

    /// `∫_a^b clamp(c - sf·x, 0, cap) dx`.
    pub fn integral(&self, a: f64, b: f64, cap: f64) -> f64 {
        if b <= a || cap <= 0.0 {
            return 0.0;
        }
        let xa = (self.c - cap) / self.sf;
        let xb = self.c / self.sf;
        let flat = cap * (b.min(xa) - a).max(0.0);
        flat + self.linear(a.max(xa), b.min(xb))
    }

    /// `∫_u^v (c - sf·x) dx`, zero for an empty range.
    fn linear(&self, u: f64, v: f64) -> f64 {
        if v <= u {
            return 0.0;
        }
        self.c * (v - u) - 0.5 * self.sf * (v * v - u * u)
    }

    /// Cap `y` with `∫_0^w clamp(c - sf·x, 0, y) dx = t`.
    pub fn cap_for_integral(&self, w: f64, t: f64) -> f64 {
        let (c, sf) = (self.c, self.sf);
        if w <= 0.0 || t <= 0.0 {
            return 0.0;
        }
        if t >= self.integral(0.0, w, c.max(0.0)) {
            return c.clamp(0.0, 1.0);
        }
        let y = if t / w <= c - sf * w {
            t / w
        } else if c <= sf * w {
            let disc = (c * c - 2.0 * sf * t).max(0.0);
            2.0 * sf * t / (c + disc.sqrt())
        } else {
            let u = (2.0 * (c * w - 0.5 * sf * w * w - t) / sf).max(0.0).sqrt();
            c - sf * u
        };
        y.clamp(0.0, 1.0)
    }

    /// Left bound `a` with `∫_a^1 clamp(c - sf·x, 0, cap) dx = t`.
    pub fn start_for_integral(&self, cap: f64, t: f64) -> f64 {
        let (c, sf) = (self.c, self.sf);
        let xa = clamp01((c - cap) / sf);
        let xb = clamp01(c / sf);
        let sloped = self.linear(xa, xb);
        let a = if t <= sloped {
            let k = c * xb - 0.5 * sf * xb * xb - t;
            let denom = c + (c * c - 2.0 * sf * k).max(0.0).sqrt();
            if denom > 0.0 {
                2.0 * k / denom
            } else {
                xb
            }
        } else if cap > 0.0 {
            xa - (t - sloped) / cap
        } else {
            0.0
        };
        clamp01(a)
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Solve every breakpoint for probabilities `p` in rule order (summing to 1).
pub fn solve_breakpoints(p: &[f64; 5], sf: f64, ysf: f64, sbhd: f64) -> BayfillBreakpoints {
    let [pf, _ps, pw, pb, pl] = *p;
    let a1 = clamp01(pw + pb + pl);
    let a2 = (1.0 - pf).clamp(a1, 1.0);
    let (lower, r1) = SlantLine::with_area_below(sf, a1);
    let (upper, r2) = SlantLine::with_area_below(sf, a2);
    let (c1, c2) = (lower.c, upper.c);

    let yl0 = ysf * c1.min(1.0);
    let (xl, yl) = if pl <= EPS_AREA {
        (1.0, yl0)
    } else if lower.integral(0.0, 1.0, yl0) >= pl {
        (lower.start_for_integral(yl0, pl), yl0)
    } else {
        (0.0, lower.cap_for_integral(1.0, pl))
    };

    let xm = sbhd * xl;
    let (mut ym, mut zm, mut use_z) = (0.0, 0.0, false);
    let delta = if pw + pb < EPS_PROB {
        DeltaSituation::NoDelta
    } else if pb < EPS_PROB {
        DeltaSituation::NoBayHeadDelta
    } else if pw < EPS_PROB {
        DeltaSituation::NoWaveInfluenced
    } else {
        let column = lower.integral(0.0, xm, 1.0);
        if column < pb {
            zm = pb / (pw + pb);
            use_z = true;
            DeltaSituation::ZThreshold
        } else {
            ym = lower.cap_for_integral(xm, column - pb);
            DeltaSituation::Split
        }
    };

    BayfillBreakpoints {
        sf,
        c1,
        c2,
        situation: FloodplainSituation::from_regimes(r1, r2),
        delta,
        x1: clamp01((c2 - 1.0) / sf),
        x2: clamp01(c2 / sf),
        x3: clamp01((c1 - 1.0) / sf),
        x4: clamp01(c1 / sf),
        xl,
        yf: clamp01(c2),
        yf2: clamp01(c2 - sf),
        yl,
        ys: clamp01(c1),
        ys2: clamp01(c1 - sf),
        xm,
        ym,
        zm,
        use_z,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Owner {
    Facies(BayfillFacies),
    DeltaByZ,
}

/// Convex pieces of the five facies for one probability vector.
#[derive(Clone, Debug, PartialEq)]
pub struct BayfillPartition {
    breakpoints: BayfillBreakpoints,
    pieces: Vec<(Polygon, Owner)>,
    probabilities: [f64; 5],
}

impl BayfillPartition {
    /// Build the pieces for `p` in rule order.
    pub fn new(p: &[f64; 5], sf: f64, ysf: f64, sbhd: f64) -> Self {
        let bp = solve_breakpoints(p, sf, ysf, sbhd);
        let normal = Vec2::new(bp.sf, 1.0);
        let square = Polygon::unit_square();
        let bay = square.clip(normal, bp.c1);
        let left_of = |poly: &Polygon, x: f64| poly.clip(Vec2::new(1.0, 0.0), x);
        let right_of = |poly: &Polygon, x: f64| poly.clip(Vec2::new(-1.0, 0.0), -x);
        let below = |poly: &Polygon, y: f64| poly.clip(Vec2::new(0.0, 1.0), y);
        let above = |poly: &Polygon, y: f64| poly.clip(Vec2::new(0.0, -1.0), -y);

        let mut pieces = vec![
            (square.clip(normal.mul(-1.0), -bp.c2), Owner::Facies(BayfillFacies::Floodplain)),
            (square.clip(normal.mul(-1.0), -bp.c1).clip(normal, bp.c2), Owner::Facies(BayfillFacies::Subbay)),
            (below(&right_of(&bay, bp.xl), bp.yl), Owner::Facies(BayfillFacies::Lagoon)),
        ];
        let delta_left = left_of(&bay, bp.xl);
        let delta_top = above(&right_of(&bay, bp.xl), bp.yl);
        let whole = |owner: Owner| [(delta_left.clone(), owner), (delta_top.clone(), owner)];
        match bp.delta {
            DeltaSituation::NoDelta | DeltaSituation::NoBayHeadDelta => {
                pieces.extend(whole(Owner::Facies(BayfillFacies::WaveInfluencedBayfill)));
            }
            DeltaSituation::NoWaveInfluenced => {
                pieces.extend(whole(Owner::Facies(BayfillFacies::BayHeadDelta)));
            }
            DeltaSituation::ZThreshold => pieces.extend(whole(Owner::DeltaByZ)),
            DeltaSituation::Split => {
                let column = left_of(&delta_left, bp.xm);
                let wbf = Owner::Facies(BayfillFacies::WaveInfluencedBayfill);
                pieces.push((above(&column, bp.ym), Owner::Facies(BayfillFacies::BayHeadDelta)));
                pieces.push((below(&column, bp.ym), wbf));
                pieces.push((right_of(&delta_left, bp.xm), wbf));
                pieces.push((delta_top, wbf));
            }
        }
        pieces.retain(|(poly, _)| poly.area() >= MIN_PIECE_AREA);
        Self { breakpoints: bp, pieces, probabilities: *p }
    }

    /// Solved breakpoints.
    pub fn breakpoints(&self) -> &BayfillBreakpoints {
        &self.breakpoints
    }

    /// Probabilities the pieces were built for, rule order.
    pub fn probabilities(&self) -> &[f64; 5] {
        &self.probabilities
    }

    /// Number of non-empty pieces.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Measure of `facies`: piece area, weighted by the `z` threshold for
    /// pieces shared through it.
    pub fn facies_area(&self, facies: BayfillFacies) -> f64 {
        let zm = self.breakpoints.zm;
        self.pieces
            .iter()
            .map(|(poly, owner)| match (owner, facies) {
                (Owner::Facies(f), _) if *f == facies => poly.area(),
                (Owner::DeltaByZ, BayfillFacies::BayHeadDelta) => poly.area() * zm,
                (Owner::DeltaByZ, BayfillFacies::WaveInfluencedBayfill) => poly.area() * (1.0 - zm),
                _ => 0.0,
            })
            .sum()
    }

    /// Facies at `(x, y, z)`, or `None` if `(x, y)` lies in no piece.
    pub fn facies_at(&self, x: f64, y: f64, z: f64) -> Option<BayfillFacies> {
        let (_, owner) = self.pieces.iter().find(|(poly, _)| poly.contains(Vec2::new(x, y)))?;
        Some(match owner {
            Owner::Facies(f) => *f,
            Owner::DeltaByZ if z <= self.breakpoints.zm => BayfillFacies::BayHeadDelta,
            Owner::DeltaByZ => BayfillFacies::WaveInfluencedBayfill,
        })
    }
}

/// Five-facies bay-fill truncation rule.
#[derive(Clone, Debug)]
pub struct BayfillRule {
    base: TruncRuleBase,
    rule_facies: [usize; 5],
    sf: ParamValue,
    ysf: f64,
    sbhd: f64,
    fields: ParameterFields,
    cache: PartitionCache<BayfillPartition>,
    state: PartitionState<BayfillPartition>,
}

impl BayfillRule {
    /// Bind the five facies and three fields of `spec`.
    pub fn new(context: &ZoneFaciesContext, spec: &BayfillSpec, config: TruncConfig) -> Result<Self, TruncError> {
        if spec.background_fields.len() != 3 {
            return Err(TruncError::config(format!(
                "bayfill rule needs 3 gauss fields, got {}",
                spec.background_fields.len()
            )));
        }
        let mut base = TruncRuleBase::new(context, &spec.background_fields, config)?;
        let names = [
            &spec.floodplain,
            &spec.subbay,
            &spec.wave_influenced_bayfill,
            &spec.bay_head_delta,
            &spec.lagoon,
        ];
        let mut rule_facies = [0usize; 5];
        for (slot, name) in rule_facies.iter_mut().zip(names) {
            let reg = base.add_background_facies(name)?;
            if !reg.is_new {
                return Err(TruncError::config(format!("bayfill facies '{name}' assigned twice")));
            }
            *slot = reg.index_in_zone;
        }
        base.check_facies_for_zone()?;
        if let ParamValue::Constant(sf) = spec.sf {
            if !(sf > 0.0 && sf <= 1.0) {
                return Err(TruncError::config(format!("slant factor {sf} outside (0, 1]")));
            }
        }
        if !spec.ysf.is_finite() || !spec.sbhd.is_finite() {
            return Err(TruncError::config("bayfill ysf and sbhd must be finite"));
        }
        let ysf = clamp01(spec.ysf);
        let sbhd = spec.sbhd.clamp(SBHD_RANGE.0, SBHD_RANGE.1);
        tracing::debug!(sf = ?spec.sf, ysf, sbhd, "bayfill rule constructed");
        Ok(Self {
            base,
            rule_facies,
            sf: spec.sf.clone(),
            ysf,
            sbhd,
            fields: ParameterFields::default(),
            cache: PartitionCache::new(config.memo_resolution),
            state: PartitionState::Unset,
        })
    }

    /// Supply per-cell slant factors when `sf` names a field.
    ///
    /// Fails unless `sf` is read from the field `name`.
    pub fn set_parameter_field(&mut self, name: &str, values: Vec<f64>) -> Result<(), TruncError> {
        if !matches!(&self.sf, ParamValue::Field(f) if f == name) {
            return Err(TruncError::config(format!(
                "bayfill slant factor does not read parameter field '{name}'"
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
    pub fn partition(&self) -> Option<&BayfillPartition> {
        self.state.partition()
    }

    /// Breakpoints of the current partition.
    pub fn breakpoints(&self) -> Option<&BayfillBreakpoints> {
        self.partition().map(BayfillPartition::breakpoints)
    }

    /// Zone facies index of `facies`.
    pub fn zone_index(&self, facies: BayfillFacies) -> usize {
        self.rule_facies[facies.index()]
    }

    /// Build and check the partition for `p` (rule order, floored).
    pub fn build_partition(&self, p: &[f64; 5], sf: f64) -> Result<BayfillPartition, TruncError> {
        let partition = BayfillPartition::new(p, sf, self.ysf, self.sbhd);
        for f in BayfillFacies::ALL {
            let area = partition.facies_area(f);
            if (area - p[f.index()]).abs() > AREA_SUM_TOLERANCE {
                return Err(TruncError::Normalization(format!(
                    "bayfill {f:?} covers {area:.6}, target {:.6}",
                    p[f.index()]
                )));
            }
        }
        Ok(partition)
    }
}

/// Raise every probability to at least `EPS_PROB / 10`, then rescale to sum 1.
fn floor_probabilities(raw: [f64; 5]) -> [f64; 5] {
    let mut p = raw.map(|v| v.max(0.1 * EPS_PROB));
    let sum: f64 = p.iter().sum();
    for v in &mut p {
        *v /= sum;
    }
    p
}

impl Truncation for BayfillRule {
    fn base(&self) -> &TruncRuleBase {
        &self.base
    }

    fn set_trunc_rule(&mut self, prob: &[f64], cell: Option<usize>) -> Result<(), TruncError> {
        self.base.check_probabilities(prob)?;
        let p = floor_probabilities(self.rule_facies.map(|f| prob[f]));
        if let Some(k) = degenerate_facies(&p) {
            self.state = PartitionState::Determined(self.rule_facies[k]);
            return Ok(());
        }
        let sf = self.fields.resolve(&self.sf, cell)?.clamp(MIN_SLANT_FACTOR, 1.0);
        if self.cache.is_enabled() && self.use_const_trunc_model_param() {
            let key = self.cache.key(&p);
            if let Some(hit) = self.cache.get(&key) {
                self.state = PartitionState::Built(hit);
                return Ok(());
            }
            let rounded = round_probability_vector(&p, self.cache.resolution());
            let mut q = [0.0; 5];
            q.copy_from_slice(&rounded);
            let partition = self.build_partition(&floor_probabilities(q), sf)?;
            self.state = PartitionState::Built(self.cache.insert(key, partition));
            return Ok(());
        }
        let partition = self.build_partition(&p, sf)?;
        self.state = PartitionState::Built(Arc::new(partition));
        Ok(())
    }

    fn define_facies(&self, alpha: &[f64]) -> Result<Classified, TruncError> {
        self.base.check_alpha(alpha)?;
        match &self.state {
            PartitionState::Unset => Err(TruncError::config("bayfill rule used before set_trunc_rule")),
            PartitionState::Determined(f) => Ok(self.base.classified(*f)),
            PartitionState::Built(partition) => {
                let p = Vec2::new(alpha[0], alpha[1]);
                let hit = locate_with_nudge(p, self.base.config().nudge, |q| partition.facies_at(q.x, q.y, alpha[2]));
                let Some(facies) = hit else {
                    return Err(TruncError::degenerate(
                        format!("point ({}, {}) outside every bayfill piece", p.x, p.y),
                        partition.probabilities(),
                    ));
                };
                Ok(self.base.classified(self.zone_index(facies)))
            }
        }
    }

    fn polygons(&self) -> PartitionPolygons {
        let mut out = PartitionPolygons::default();
        let Some(partition) = self.state.partition() else {
            return out;
        };
        for (poly, owner) in &partition.pieces {
            match owner {
                Owner::Facies(f) => out.push(poly, self.zone_index(*f)),
                // Shared pieces are listed once per facies.
                Owner::DeltaByZ => {
                    out.push(poly, self.zone_index(BayfillFacies::BayHeadDelta));
                    out.push(poly, self.zone_index(BayfillFacies::WaveInfluencedBayfill));
                }
            }
        }
        out
    }

    fn use_const_trunc_model_param(&self) -> bool {
        self.sf.is_constant()
    }

    fn overlay_intervals(&self) -> &[SmallVec<[Interval; 4]>] {
        &[]
    }

    fn determined_facies(&self) -> Option<usize> {
        match self.state {
            PartitionState::Determined(f) => Some(f),
            _ => None,
        }
    }
}
