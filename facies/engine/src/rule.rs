//! Shared rule interface, the closed set of rule topologies, and the cell loop.

use facies_geo::{Polygon, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::angle::{AngleRule, AngleSpec};
use crate::base::{Classified, TruncRuleBase};
use crate::bayfill::{BayfillRule, BayfillSpec};
use crate::catalog::ZoneFaciesContext;
use crate::config::TruncConfig;
use crate::cubic::{CubicRule, CubicSpec};
use crate::error::TruncError;
use crate::overlay::Interval;

/// Closed polygons of the current background partition with their facies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionPolygons {
    /// Vertex lists, first vertex repeated at the end. Empty for zero-area regions.
    pub polygons: Vec<Vec<Vec2>>,
    /// Zone facies index of each polygon.
    pub facies: Vec<usize>,
}

impl PartitionPolygons {
    pub(crate) fn push(&mut self, polygon: &Polygon, facies: usize) {
        self.polygons.push(polygon.closed_points());
        self.facies.push(facies);
    }

    /// Number of polygons.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// True if no partition has been built.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Operations every truncation rule provides.
pub trait Truncation {
    /// Facies and alpha bookkeeping.
    fn base(&self) -> &TruncRuleBase;

    /// Prepare the partition for `prob` (zone facies order). `cell` indexes
    /// spatially varying parameters and may be `None` when all are constant.
    fn set_trunc_rule(&mut self, prob: &[f64], cell: Option<usize>) -> Result<(), TruncError>;

    /// Classify one point of alpha space, coordinates in binding order.
    fn define_facies(&self, alpha: &[f64]) -> Result<Classified, TruncError>;

    /// Background partition for display.
    fn polygons(&self) -> PartitionPolygons;

    /// False if some truncation parameter varies from cell to cell.
    fn use_const_trunc_model_param(&self) -> bool;

    /// Overlay intervals of the current partition, per group and occurrence.
    fn overlay_intervals(&self) -> &[SmallVec<[Interval; 4]>];

    /// Facies short-circuited by a degenerate probability vector, if any.
    fn determined_facies(&self) -> Option<usize>;

    /// Zone gauss field index for each alpha coordinate.
    fn alpha_binding(&self) -> &[usize] {
        self.base().alpha_binding()
    }

    /// Number of alpha coordinates `define_facies` expects.
    fn num_alpha(&self) -> usize {
        self.base().num_alpha()
    }
}

/// Rule configuration as handed over by the model description layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleSpec {
    /// Rectangular rule.
    Cubic(CubicSpec),
    /// Angle-sliced polygon rule.
    Angle(AngleSpec),
    /// Five-facies bay-fill rule.
    Bayfill(BayfillSpec),
}

/// Any truncation rule.
#[derive(Clone, Debug)]
pub enum TruncationRule {
    /// Rectangular rule.
    Cubic(CubicRule),
    /// Angle-sliced polygon rule.
    Angle(AngleRule),
    /// Five-facies bay-fill rule.
    Bayfill(BayfillRule),
}

macro_rules! each_rule {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            TruncationRule::Cubic($r) => $body,
            TruncationRule::Angle($r) => $body,
            TruncationRule::Bayfill($r) => $body,
        }
    };
}

impl TruncationRule {
    /// Construct and validate the rule described by `spec` for `context`.
    pub fn from_spec(
        context: &ZoneFaciesContext,
        spec: &RuleSpec,
        config: TruncConfig,
    ) -> Result<Self, TruncError> {
        Ok(match spec {
            RuleSpec::Cubic(s) => Self::Cubic(CubicRule::new(context, s, config)?),
            RuleSpec::Angle(s) => Self::Angle(AngleRule::new(context, s, config)?),
            RuleSpec::Bayfill(s) => Self::Bayfill(BayfillRule::new(context, s, config)?),
        })
    }

    /// Lower-case topology name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cubic(_) => "cubic",
            Self::Angle(_) => "angle",
            Self::Bayfill(_) => "bayfill",
        }
    }

    /// Supply the per-cell values of a field-valued parameter.
    ///
    /// Names no parameter of the rule reads are rejected; cubic rules have no
    /// field-valued parameters at all.
    pub fn set_parameter_field(&mut self, name: &str, values: Vec<f64>) -> Result<(), TruncError> {
        match self {
            Self::Cubic(_) => Err(TruncError::config(format!(
                "cubic rule has no parameter field '{name}'"
            ))),
            Self::Angle(r) => r.set_parameter_field(name, values),
            Self::Bayfill(r) => r.set_parameter_field(name, values),
        }
    }

    /// Classify every cell.
    ///
    /// `alpha` holds `num_alpha()` coordinates per cell. `prob` is either one
    /// zone-constant vector or one vector per cell, both in zone facies order.
    /// With constant probabilities and constant parameters the partition is
    /// built once for the whole zone.
    pub fn truncate_cells(&mut self, prob: &[f64], alpha: &[f64]) -> Result<Vec<Classified>, TruncError> {
        let n_facies = self.base().facies_in_zone().len();
        let n_alpha = self.num_alpha();
        if n_alpha == 0 || alpha.len() % n_alpha != 0 {
            return Err(TruncError::config(format!(
                "alpha array of {} values is not a multiple of {n_alpha}",
                alpha.len()
            )));
        }
        let n_cells = alpha.len() / n_alpha;
        let zone_constant = prob.len() == n_facies;
        if !zone_constant && prob.len() != n_facies * n_cells {
            return Err(TruncError::config(format!(
                "probability array of {} values fits neither 1 nor {n_cells} cells of {n_facies} facies",
                prob.len()
            )));
        }
        let build_once = zone_constant && self.use_const_trunc_model_param();
        if build_once {
            self.set_trunc_rule(prob, None)?;
        }
        let mut out = Vec::with_capacity(n_cells);
        for (cell, a) in alpha.chunks_exact(n_alpha).enumerate() {
            if !build_once {
                let p = if zone_constant { prob } else { &prob[cell * n_facies..(cell + 1) * n_facies] };
                self.set_trunc_rule(p, Some(cell))?;
            }
            out.push(self.define_facies(a)?);
        }
        tracing::debug!(rule = self.kind(), cells = n_cells, build_once, "cells truncated");
        Ok(out)
    }
}

impl Truncation for TruncationRule {
    fn base(&self) -> &TruncRuleBase {
        each_rule!(self, r => r.base())
    }

    fn set_trunc_rule(&mut self, prob: &[f64], cell: Option<usize>) -> Result<(), TruncError> {
        each_rule!(self, r => r.set_trunc_rule(prob, cell))
    }

    fn define_facies(&self, alpha: &[f64]) -> Result<Classified, TruncError> {
        each_rule!(self, r => r.define_facies(alpha))
    }

    fn polygons(&self) -> PartitionPolygons {
        each_rule!(self, r => r.polygons())
    }

    fn use_const_trunc_model_param(&self) -> bool {
        each_rule!(self, r => r.use_const_trunc_model_param())
    }

    fn overlay_intervals(&self) -> &[SmallVec<[Interval; 4]>] {
        each_rule!(self, r => r.overlay_intervals())
    }

    fn determined_facies(&self) -> Option<usize> {
        each_rule!(self, r => r.determined_facies())
    }
}
