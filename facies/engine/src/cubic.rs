//! Rectangular ("cubic") truncation rule.
//!
//! The unit square is cut into strips along one axis, each strip may be cut
//! along the other axis, and those strips once more along the first axis.
//! Every leaf is a `(facies, fraction)` pair; strip widths are proportional
//! to the probability held by the subtree.
//!
//! Nodes live in an arena. A parent is always pushed before its children, so
//! probabilities are summed in one reverse pass and bounds laid out in one
//! forward pass.

use std::sync::Arc;

use facies_geo::{Polygon, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::base::{Classified, PartitionState, TruncRuleBase};
use crate::catalog::ZoneFaciesContext;
use crate::config::{TruncConfig, FRACTION_SUM_TOLERANCE};
use crate::error::TruncError;
use crate::overlay::{AdjustedAreas, Interval, OverlayGroupSpec, OverlayIntervals};
use crate::rule::{PartitionPolygons, Truncation};

/// Axis of the first-level split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Horizontal strips: level 1 splits along the second alpha coordinate.
    H,
    /// Vertical strips: level 1 splits along the first alpha coordinate.
    V,
}

impl Direction {
    /// Alpha coordinate split at `level` (1, 2 or 3).
    pub fn axis(self, level: usize) -> usize {
        let first = match self {
            Self::H => 1,
            Self::V => 0,
        };
        if level % 2 == 1 {
            first
        } else {
            1 - first
        }
    }
}

/// One leaf as registered by the model: facies, fraction and its 1-based
/// position at each level. `l2 == 0` ends the path at level 1, `l3 == 0` at
/// level 2.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CubicLeafSpec {
    /// Facies name.
    pub facies: String,
    /// Share of the facies probability placed in this leaf.
    pub fraction: f64,
    /// Level-1 index, starting at 1.
    pub l1: usize,
    /// Level-2 index, 0 if the leaf sits at level 1.
    #[serde(default)]
    pub l2: usize,
    /// Level-3 index, 0 if the leaf sits at level 1 or 2.
    #[serde(default)]
    pub l3: usize,
}

/// Parsed configuration of a cubic rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CubicSpec {
    /// First-level split direction.
    pub direction: Direction,
    /// Leaves in registration order.
    pub leaves: Vec<CubicLeafSpec>,
    /// The two Gaussian fields spanning the background square.
    pub background_fields: Vec<String>,
    /// Optional overlay groups.
    #[serde(default)]
    pub overlay: Vec<OverlayGroupSpec>,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Leaf { facies: usize, fraction: f64 },
    Split { axis: usize, children: SmallVec<[usize; 4]> },
}

/// Probabilities and bounds of every arena node for one probability vector.
#[derive(Clone, Debug, PartialEq)]
pub struct CubicPartition {
    /// Node probability, arena order.
    prob: Vec<f64>,
    /// Node rectangle `[x0, y0, x1, y1]`, arena order.
    bounds: Vec<[f64; 4]>,
    intervals: OverlayIntervals,
}

impl CubicPartition {
    /// Rectangle `[x0, y0, x1, y1]` of arena node `node`.
    pub fn bounds(&self, node: usize) -> Option<[f64; 4]> {
        self.bounds.get(node).copied()
    }
}

/// Rectangular truncation rule.
#[derive(Clone, Debug)]
pub struct CubicRule {
    base: TruncRuleBase,
    direction: Direction,
    nodes: Vec<Node>,
    state: PartitionState<CubicPartition>,
}

impl CubicRule {
    /// Build the tree from `spec` and validate fractions and overlays.
    pub fn new(
        context: &ZoneFaciesContext,
        spec: &CubicSpec,
        config: TruncConfig,
    ) -> Result<Self, TruncError> {
        if spec.background_fields.len() != 2 {
            return Err(TruncError::config(format!(
                "cubic rule needs 2 background gauss fields, got {}",
                spec.background_fields.len()
            )));
        }
        if spec.leaves.is_empty() {
            return Err(TruncError::config("cubic rule has no leaves"));
        }
        let mut base = TruncRuleBase::new(context, &spec.background_fields, config)?;
        let root_axis = spec.direction.axis(1);
        let mut nodes = vec![Node::Split { axis: root_axis, children: SmallVec::new() }];
        for leaf in &spec.leaves {
            let reg = base.add_background_facies(&leaf.facies)?;
            insert_leaf(&mut nodes, spec.direction, leaf, reg.index_in_zone)?;
        }
        check_fractions(&base, &nodes)?;
        base.register_overlay_groups(&spec.overlay)?;
        base.check_facies_for_zone()?;
        tracing::debug!(
            zone_facies = base.facies_in_zone().len(),
            nodes = nodes.len(),
            direction = ?spec.direction,
            "cubic rule constructed"
        );
        Ok(Self { base, direction: spec.direction, nodes, state: PartitionState::Unset })
    }

    /// First-level split direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current partition, if one has been built.
    pub fn partition(&self) -> Option<&CubicPartition> {
        self.state.partition()
    }

    /// Lay out node probabilities and bounds from adjusted areas.
    pub fn build_partition(&self, adjusted: &AdjustedAreas) -> Result<CubicPartition, TruncError> {
        let n = self.nodes.len();
        let mut prob = vec![0.0; n];
        for i in (0..n).rev() {
            prob[i] = match &self.nodes[i] {
                Node::Leaf { facies, fraction } => adjusted.areas[*facies] * fraction,
                Node::Split { children, .. } => children.iter().map(|&c| prob[c]).sum(),
            };
        }
        if (prob[0] - 1.0).abs() > FRACTION_SUM_TOLERANCE {
            return Err(TruncError::Normalization(format!(
                "cubic rule leaves hold total probability {:.6}",
                prob[0]
            )));
        }
        let mut bounds = vec![[0.0, 0.0, 1.0, 1.0]; n];
        for i in 0..n {
            let Node::Split { axis, children } = &self.nodes[i] else {
                continue;
            };
            let rect = bounds[i];
            let lo = rect[*axis];
            let hi = rect[*axis + 2];
            let extent = hi - lo;
            let mut cursor = lo;
            for (k, &c) in children.iter().enumerate() {
                let span = if prob[i] > 0.0 { extent * prob[c] / prob[i] } else { 0.0 };
                let end = if k + 1 == children.len() { hi } else { (cursor + span).min(hi) };
                let mut child = rect;
                child[*axis] = cursor;
                child[*axis + 2] = end;
                bounds[c] = child;
                cursor = end;
            }
        }
        Ok(CubicPartition { prob, bounds, intervals: adjusted.intervals.clone() })
    }

    /// Centre of the rectangle holding the first leaf of zone facies `facies`.
    pub fn leaf_center(&self, facies: usize) -> Option<Vec2> {
        let partition = self.state.partition()?;
        self.nodes.iter().enumerate().find_map(|(i, node)| match node {
            Node::Leaf { facies: f, .. } if *f == facies => {
                let [x0, y0, x1, y1] = partition.bounds[i];
                Some(Vec2::new(0.5 * (x0 + x1), 0.5 * (y0 + y1)))
            }
            _ => None,
        })
    }

    fn locate_leaf(&self, partition: &CubicPartition, alpha: &[f64]) -> usize {
        let mut node = 0;
        while let Node::Split { axis, children } = &self.nodes[node] {
            let v = alpha[*axis];
            let Some(&last) = children.last() else {
                break;
            };
            node = children
                .iter()
                .copied()
                .find(|&c| partition.bounds[c][*axis + 2] >= v)
                .unwrap_or(last);
        }
        node
    }
}

fn insert_leaf(
    nodes: &mut Vec<Node>,
    direction: Direction,
    leaf: &CubicLeafSpec,
    facies: usize,
) -> Result<(), TruncError> {
    let path = [leaf.l1, leaf.l2, leaf.l3];
    if leaf.l1 == 0 || (leaf.l2 == 0 && leaf.l3 != 0) {
        return Err(TruncError::config(format!(
            "facies '{}': invalid cubic position {path:?}",
            leaf.facies
        )));
    }
    let depth = path.iter().take_while(|&&l| l > 0).count();
    let mut parent = 0usize;
    for (level, &index) in path.iter().enumerate().take(depth) {
        let is_leaf = level + 1 == depth;
        let Node::Split { children, .. } = &nodes[parent] else {
            return Err(TruncError::config(format!(
                "facies '{}': position {path:?} descends into a leaf",
                leaf.facies
            )));
        };
        let count = children.len();
        let last = children.last().copied();
        if index == count + 1 {
            let new_node = if is_leaf {
                Node::Leaf { facies, fraction: leaf.fraction }
            } else {
                Node::Split { axis: direction.axis(level + 2), children: SmallVec::new() }
            };
            let id = nodes.len();
            nodes.push(new_node);
            if let Node::Split { children, .. } = &mut nodes[parent] {
                children.push(id);
            }
            parent = id;
        } else if let (true, false, Some(last)) = (index == count, is_leaf, last) {
            parent = last;
        } else {
            return Err(TruncError::config(format!(
                "facies '{}': cubic position {path:?} is not contiguous with earlier leaves",
                leaf.facies
            )));
        }
    }
    Ok(())
}

fn check_fractions(base: &TruncRuleBase, nodes: &[Node]) -> Result<(), TruncError> {
    let mut sums = vec![0.0; base.facies_in_zone().len()];
    for node in nodes {
        if let Node::Leaf { facies, fraction } = node {
            if !(*fraction >= 0.0) {
                return Err(TruncError::Normalization(format!(
                    "negative probability fraction {fraction} for '{}'",
                    base.facies_in_zone()[*facies]
                )));
            }
            sums[*facies] += fraction;
        }
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

impl Truncation for CubicRule {
    fn base(&self) -> &TruncRuleBase {
        &self.base
    }

    fn set_trunc_rule(&mut self, prob: &[f64], _cell: Option<usize>) -> Result<(), TruncError> {
        self.base.check_probabilities(prob)?;
        if let Some(f) = self.base.is_facies_probability_degenerate(prob) {
            self.state = PartitionState::Determined(f);
            return Ok(());
        }
        let adjusted = self.base.adjust_areas(prob);
        let partition = self.build_partition(&adjusted)?;
        self.state = PartitionState::Built(Arc::new(partition));
        Ok(())
    }

    fn define_facies(&self, alpha: &[f64]) -> Result<Classified, TruncError> {
        self.base.check_alpha(alpha)?;
        match &self.state {
            PartitionState::Unset => Err(TruncError::config("cubic rule used before set_trunc_rule")),
            PartitionState::Determined(f) => Ok(self.base.classified(*f)),
            PartitionState::Built(partition) => {
                let leaf = self.locate_leaf(partition, alpha);
                let Node::Leaf { facies, .. } = self.nodes[leaf] else {
                    return Err(TruncError::degenerate("cubic descent ended on a split node", &partition.prob));
                };
                let f = self.base.truncate_overlay_facies(facies, alpha, &partition.intervals);
                Ok(self.base.classified(f))
            }
        }
    }

    fn polygons(&self) -> PartitionPolygons {
        let mut out = PartitionPolygons::default();
        let Some(partition) = self.state.partition() else {
            return out;
        };
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Leaf { facies, .. } = node {
                let [x0, y0, x1, y1] = partition.bounds[i];
                let rect = if x1 > x0 && y1 > y0 { Polygon::rectangle(x0, y0, x1, y1) } else { Polygon::empty() };
                out.push(&rect, *facies);
            }
        }
        out
    }

    fn use_const_trunc_model_param(&self) -> bool {
        true
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
