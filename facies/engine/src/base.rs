//! State and operations shared by every truncation rule: facies and alpha
//! bookkeeping, overlay groups, degenerate-probability handling.

use std::sync::Arc;

use facies_geo::{nudge_toward_center, Vec2};

use crate::catalog::ZoneFaciesContext;
use crate::config::TruncConfig;
use crate::error::TruncError;
use crate::overlay::{
    AdjustedAreas, OverlayGroup, OverlayGroupSpec, OverlayIntervals, OverlayOccurrence, OverlaySet,
};
use crate::probability::{degenerate_facies, validate_probabilities};

/// Result of classifying one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classified {
    /// Facies code from the catalog.
    pub code: i32,
    /// Facies index in zone order.
    pub zone_index: usize,
}

/// Outcome of [`TruncRuleBase::add_facies_to_trunc_rule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaciesRegistration {
    /// Number of facies in the rule after the call.
    pub count: usize,
    /// Position of the facies in rule order.
    pub index_in_trunc_rule: usize,
    /// Position of the facies in zone order.
    pub index_in_zone: usize,
    /// False if the facies had already been registered.
    pub is_new: bool,
}

/// What a rule currently holds for the last probability vector.
#[derive(Clone, Debug)]
pub enum PartitionState<P> {
    /// `set_trunc_rule` not called yet.
    Unset,
    /// One facies is certain; no partition was built.
    Determined(usize),
    /// Partition built for the current probabilities.
    Built(Arc<P>),
}

impl<P> PartitionState<P> {
    /// Built partition, if any.
    pub fn partition(&self) -> Option<&P> {
        match self {
            Self::Built(p) => Some(p),
            _ => None,
        }
    }
}

/// Facies/alpha bookkeeping and overlay machinery owned by each rule.
#[derive(Clone, Debug)]
pub struct TruncRuleBase {
    facies_in_zone: Vec<String>,
    facies_code: Vec<i32>,
    gauss_fields_in_zone: Vec<String>,
    facies_in_trunc_rule: Vec<usize>,
    n_background_facies: usize,
    alpha_binding: Vec<usize>,
    n_background_alpha: usize,
    overlay: OverlaySet,
    config: TruncConfig,
}

impl TruncRuleBase {
    /// Base for `context`, binding `background_fields` as the first alpha coordinates.
    pub fn new<S: AsRef<str>>(
        context: &ZoneFaciesContext,
        background_fields: &[S],
        config: TruncConfig,
    ) -> Result<Self, TruncError> {
        let mut base = Self {
            facies_in_zone: Vec::new(),
            facies_code: Vec::new(),
            gauss_fields_in_zone: Vec::new(),
            facies_in_trunc_rule: Vec::new(),
            n_background_facies: 0,
            alpha_binding: Vec::new(),
            n_background_alpha: 0,
            overlay: OverlaySet::default(),
            config,
        };
        base.set_modelled_facies(context)?;
        base.bind_background_fields(background_fields)?;
        Ok(base)
    }

    /// Take the facies and Gaussian fields of `context`.
    pub fn set_modelled_facies(&mut self, context: &ZoneFaciesContext) -> Result<(), TruncError> {
        if context.facies().is_empty() {
            return Err(TruncError::config("zone context has no facies"));
        }
        self.facies_in_zone = context.facies().iter().map(|f| f.name.clone()).collect();
        self.facies_code = context.facies().iter().map(|f| f.code).collect();
        self.gauss_fields_in_zone = context.gauss_fields().to_vec();
        self.facies_in_trunc_rule.clear();
        self.n_background_facies = 0;
        Ok(())
    }

    fn bind_background_fields<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), TruncError> {
        if names.is_empty() {
            return Err(TruncError::config("no background gauss fields given"));
        }
        for name in names {
            let name = name.as_ref();
            let idx = self.gauss_field_index(name)?;
            if self.alpha_binding.contains(&idx) {
                return Err(TruncError::config(format!(
                    "gauss field '{name}' used for two background alpha coordinates"
                )));
            }
            self.alpha_binding.push(idx);
        }
        self.n_background_alpha = self.alpha_binding.len();
        Ok(())
    }

    fn gauss_field_index(&self, name: &str) -> Result<usize, TruncError> {
        self.gauss_fields_in_zone.iter().position(|g| g == name).ok_or_else(|| {
            TruncError::config(format!("gauss field '{name}' is not available in this zone"))
        })
    }

    /// Register `name` in rule order (idempotent).
    pub fn add_facies_to_trunc_rule(&mut self, name: &str) -> Result<FaciesRegistration, TruncError> {
        let index_in_zone = self
            .facies_in_zone
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| TruncError::UnknownFacies(name.to_string()))?;
        if let Some(i) = self.facies_in_trunc_rule.iter().position(|&f| f == index_in_zone) {
            return Ok(FaciesRegistration {
                count: self.facies_in_trunc_rule.len(),
                index_in_trunc_rule: i,
                index_in_zone,
                is_new: false,
            });
        }
        self.facies_in_trunc_rule.push(index_in_zone);
        Ok(FaciesRegistration {
            count: self.facies_in_trunc_rule.len(),
            index_in_trunc_rule: self.facies_in_trunc_rule.len() - 1,
            index_in_zone,
            is_new: true,
        })
    }

    /// Register a facies placed in the background partition.
    ///
    /// Must precede [`TruncRuleBase::register_overlay_groups`].
    pub fn add_background_facies(&mut self, name: &str) -> Result<FaciesRegistration, TruncError> {
        if !self.overlay.is_empty() {
            return Err(TruncError::config(format!(
                "background facies '{name}' added after overlay groups"
            )));
        }
        let reg = self.add_facies_to_trunc_rule(name)?;
        self.n_background_facies = self.facies_in_trunc_rule.len();
        Ok(reg)
    }

    /// Fail unless the rule's facies and the zone's facies are the same set.
    pub fn check_facies_for_zone(&self) -> Result<(), TruncError> {
        let mut rule: Vec<usize> = self.facies_in_trunc_rule.clone();
        rule.sort_unstable();
        rule.dedup();
        let all: Vec<usize> = (0..self.facies_in_zone.len()).collect();
        if rule == all {
            return Ok(());
        }
        Err(TruncError::FaciesMismatch {
            rule: self.facies_in_trunc_rule_names(),
            zone: self.facies_in_zone.clone(),
        })
    }

    /// Resolve, validate and store the overlay groups; extends the alpha binding.
    pub fn register_overlay_groups(&mut self, specs: &[OverlayGroupSpec]) -> Result<(), TruncError> {
        if specs.is_empty() {
            return Ok(());
        }
        if !self.overlay.is_empty() {
            return Err(TruncError::config("overlay groups already registered"));
        }
        let mut binding = self.alpha_binding.clone();
        let mut rule_facies = self.facies_in_trunc_rule.clone();
        let mut groups: Vec<OverlayGroup> = Vec::with_capacity(specs.len());
        for (gi, spec) in specs.iter().enumerate() {
            let mut background = Vec::with_capacity(spec.background_facies.len());
            for name in &spec.background_facies {
                background.push(self.zone_index(name)?);
            }
            let mut occurrences = Vec::with_capacity(spec.overlay.len());
            for ov in &spec.overlay {
                let facies = self.zone_index(&ov.facies)?;
                let field = self
                    .gauss_field_index(&ov.alpha_field)
                    .map_err(|e| TruncError::overlay(gi, e.to_string()))?;
                if binding[..self.n_background_alpha].contains(&field) {
                    return Err(TruncError::overlay(
                        gi,
                        format!("background field '{}' used as overlay field", ov.alpha_field),
                    ));
                }
                let alpha_index = match binding.iter().position(|&b| b == field) {
                    Some(i) => i,
                    None => {
                        binding.push(field);
                        binding.len() - 1
                    }
                };
                if !rule_facies.contains(&facies) {
                    rule_facies.push(facies);
                }
                occurrences.push(OverlayOccurrence {
                    alpha_index,
                    facies,
                    fraction: ov.probability_fraction,
                    center: ov.center,
                });
            }
            groups.push(OverlayGroup { background, occurrences });
        }
        let background = &self.facies_in_trunc_rule[..self.n_background_facies];
        let overlay = OverlaySet::new(groups, &self.facies_in_zone, background)?;
        tracing::debug!(
            groups = overlay.groups().len(),
            alpha_dims = binding.len(),
            "overlay groups registered"
        );
        self.overlay = overlay;
        self.alpha_binding = binding;
        self.facies_in_trunc_rule = rule_facies;
        Ok(())
    }

    /// Validate `prob` against the zone facies count.
    pub fn check_probabilities(&self, prob: &[f64]) -> Result<(), TruncError> {
        validate_probabilities(prob, self.facies_in_zone.len())
    }

    /// Zone index of the facies that is certain under `prob`, if any.
    pub fn is_facies_probability_degenerate(&self, prob: &[f64]) -> Option<usize> {
        degenerate_facies(prob)
    }

    /// Background areas and overlay intervals for `prob`.
    pub fn adjust_areas(&self, prob: &[f64]) -> AdjustedAreas {
        if self.overlay.is_empty() {
            AdjustedAreas::plain(prob)
        } else {
            self.overlay.adjust(prob)
        }
    }

    /// Final facies for a point whose background facies is `background`.
    pub fn truncate_overlay_facies(
        &self,
        background: usize,
        alpha: &[f64],
        intervals: &OverlayIntervals,
    ) -> usize {
        if self.overlay.is_empty() {
            background
        } else {
            self.overlay.truncate(background, alpha, intervals)
        }
    }

    /// Fail unless `alpha` has one coordinate per bound field.
    pub fn check_alpha(&self, alpha: &[f64]) -> Result<(), TruncError> {
        if alpha.len() != self.alpha_binding.len() {
            return Err(TruncError::config(format!(
                "expected {} alpha coordinates, got {}",
                self.alpha_binding.len(),
                alpha.len()
            )));
        }
        Ok(())
    }

    /// Code and zone index for a zone facies index.
    pub fn classified(&self, zone_index: usize) -> Classified {
        Classified { code: self.facies_code[zone_index], zone_index }
    }

    /// Zone index of `name`.
    pub fn zone_index(&self, name: &str) -> Result<usize, TruncError> {
        self.facies_in_zone
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| TruncError::UnknownFacies(name.to_string()))
    }

    /// Facies names in zone order.
    pub fn facies_in_zone(&self) -> &[String] {
        &self.facies_in_zone
    }

    /// Facies codes in zone order.
    pub fn facies_codes(&self) -> &[i32] {
        &self.facies_code
    }

    /// Zone indices in rule order.
    pub fn facies_in_trunc_rule(&self) -> &[usize] {
        &self.facies_in_trunc_rule
    }

    /// Facies names in rule order.
    pub fn facies_in_trunc_rule_names(&self) -> Vec<String> {
        self.facies_in_trunc_rule.iter().map(|&i| self.facies_in_zone[i].clone()).collect()
    }

    /// Zone indices of background facies.
    pub fn background_facies(&self) -> &[usize] {
        &self.facies_in_trunc_rule[..self.n_background_facies]
    }

    /// Positions in the zone's gauss field list, in alpha coordinate order.
    pub fn alpha_binding(&self) -> &[usize] {
        &self.alpha_binding
    }

    /// Gauss field names in alpha coordinate order.
    pub fn alpha_field_names(&self) -> Vec<&str> {
        self.alpha_binding.iter().map(|&i| self.gauss_fields_in_zone[i].as_str()).collect()
    }

    /// Number of alpha coordinates a classification expects.
    pub fn num_alpha(&self) -> usize {
        self.alpha_binding.len()
    }

    /// Number of background alpha coordinates (2 or 3).
    pub fn num_background_alpha(&self) -> usize {
        self.n_background_alpha
    }

    /// Registered overlay groups.
    pub fn overlay(&self) -> &OverlaySet {
        &self.overlay
    }

    /// Runtime settings.
    pub fn config(&self) -> &TruncConfig {
        &self.config
    }
}

/// Run `find` at `p`, then once more with `p` nudged toward the centre.
pub(crate) fn locate_with_nudge<T>(p: Vec2, nudge: f64, find: impl Fn(Vec2) -> Option<T>) -> Option<T> {
    find(p).or_else(|| find(nudge_toward_center(p, nudge)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FaciesCatalog;
    use crate::overlay::OverlayFaciesSpec;

    fn context() -> ZoneFaciesContext {
        let cat = FaciesCatalog::from_pairs([("F1", 1), ("F2", 2), ("F3", 3)]).unwrap();
        ZoneFaciesContext::new(&cat, 1, &["F1", "F2", "F3"], ["G1", "G2", "G3", "G4"]).unwrap()
    }

    #[test]
    fn add_facies_reports_registration() {
        let mut base = TruncRuleBase::new(&context(), &["G1", "G2"], TruncConfig::default()).unwrap();
        let r = base.add_background_facies("F2").unwrap();
        assert_eq!(r, FaciesRegistration { count: 1, index_in_trunc_rule: 0, index_in_zone: 1, is_new: true });
        let again = base.add_background_facies("F2").unwrap();
        assert!(!again.is_new);
        assert_eq!(base.add_background_facies("F9"), Err(TruncError::UnknownFacies("F9".into())));
        assert!(matches!(base.check_facies_for_zone(), Err(TruncError::FaciesMismatch { .. })));
        base.add_background_facies("F1").unwrap();
        base.add_background_facies("F3").unwrap();
        assert!(base.check_facies_for_zone().is_ok());
    }

    #[test]
    fn background_fields_must_be_distinct_and_known() {
        assert!(TruncRuleBase::new(&context(), &["G1", "G1"], TruncConfig::default()).is_err());
        assert!(TruncRuleBase::new(&context(), &["G1", "GX"], TruncConfig::default()).is_err());
    }

    #[test]
    fn overlay_registration_grows_alpha_binding() {
        let mut base = TruncRuleBase::new(&context(), &["G1", "G2"], TruncConfig::default()).unwrap();
        base.add_background_facies("F1").unwrap();
        base.add_background_facies("F2").unwrap();
        let spec = OverlayGroupSpec {
            background_facies: vec!["F1".into()],
            overlay: vec![OverlayFaciesSpec {
                alpha_field: "G4".into(),
                facies: "F3".into(),
                probability_fraction: 1.0,
                center: 0.5,
            }],
        };
        base.register_overlay_groups(&[spec.clone()]).unwrap();
        assert_eq!(base.alpha_binding(), &[0, 1, 3]);
        assert_eq!(base.alpha_field_names(), vec!["G1", "G2", "G4"]);
        assert!(base.check_facies_for_zone().is_ok());
        assert!(base.register_overlay_groups(&[spec]).is_err());
        assert!(base.add_background_facies("F3").is_err());
    }

    #[test]
    fn overlay_on_background_field_is_rejected() {
        let mut base = TruncRuleBase::new(&context(), &["G1", "G2"], TruncConfig::default()).unwrap();
        base.add_background_facies("F1").unwrap();
        base.add_background_facies("F2").unwrap();
        let spec = OverlayGroupSpec {
            background_facies: vec!["F1".into()],
            overlay: vec![OverlayFaciesSpec {
                alpha_field: "G2".into(),
                facies: "F3".into(),
                probability_fraction: 1.0,
                center: 0.5,
            }],
        };
        let err = base.register_overlay_groups(&[spec]).unwrap_err();
        assert!(matches!(err, TruncError::OverlayConfiguration { group: 0, .. }));
        assert_eq!(base.num_alpha(), 2);
    }
}
