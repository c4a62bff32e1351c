//! Global facies catalog and the per-zone subset a rule works on.

use serde::{Deserialize, Serialize};

use crate::error::TruncError;

/// Named facies with its stable integer code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facies {
    /// Unique facies name.
    pub name: String,
    /// Unique integer code written to the output grid.
    pub code: i32,
}

/// Ordered mapping from facies name to code, built once per model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaciesCatalog {
    entries: Vec<Facies>,
}

impl FaciesCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, code)` pairs in order.
    pub fn from_pairs<S: Into<String>>(
        pairs: impl IntoIterator<Item = (S, i32)>,
    ) -> Result<Self, TruncError> {
        let mut catalog = Self::new();
        for (name, code) in pairs {
            catalog.add(name, code)?;
        }
        Ok(catalog)
    }

    /// Append a facies; names and codes must both stay unique.
    pub fn add(&mut self, name: impl Into<String>, code: i32) -> Result<(), TruncError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TruncError::config("facies name must not be empty"));
        }
        if self.entries.iter().any(|f| f.name == name) {
            return Err(TruncError::config(format!("facies '{name}' defined twice")));
        }
        if let Some(other) = self.entries.iter().find(|f| f.code == code) {
            return Err(TruncError::config(format!(
                "facies code {code} used by both '{}' and '{name}'",
                other.name
            )));
        }
        self.entries.push(Facies { name, code });
        Ok(())
    }

    /// Code of `name`, if present.
    pub fn code_of(&self, name: &str) -> Option<i32> {
        self.entries.iter().find(|f| f.name == name).map(|f| f.code)
    }

    /// Name carrying `code`, if present.
    pub fn name_of(&self, code: i32) -> Option<&str> {
        self.entries.iter().find(|f| f.code == code).map(|f| f.name.as_str())
    }

    /// Number of facies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no facies has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Facies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Facies> {
        self.entries.iter()
    }
}

/// Facies to model and Gaussian fields available in one zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFaciesContext {
    zone_number: u32,
    facies: Vec<Facies>,
    gauss_fields: Vec<String>,
}

impl ZoneFaciesContext {
    /// Resolve `facies_in_zone` against `catalog`.
    ///
    /// Fails on an empty facies list, unknown or repeated facies, and repeated
    /// Gaussian field names.
    pub fn new<S: AsRef<str>, G: Into<String>>(
        catalog: &FaciesCatalog,
        zone_number: u32,
        facies_in_zone: &[S],
        gauss_fields_in_zone: impl IntoIterator<Item = G>,
    ) -> Result<Self, TruncError> {
        if facies_in_zone.is_empty() {
            return Err(TruncError::config(format!("zone {zone_number}: no facies to model")));
        }
        let mut facies: Vec<Facies> = Vec::with_capacity(facies_in_zone.len());
        for name in facies_in_zone {
            let name = name.as_ref();
            let code =
                catalog.code_of(name).ok_or_else(|| TruncError::UnknownFacies(name.to_string()))?;
            if facies.iter().any(|f| f.name == name) {
                return Err(TruncError::config(format!(
                    "zone {zone_number}: facies '{name}' listed twice"
                )));
            }
            facies.push(Facies { name: name.to_string(), code });
        }
        let gauss_fields: Vec<String> = gauss_fields_in_zone.into_iter().map(Into::into).collect();
        for (i, g) in gauss_fields.iter().enumerate() {
            if gauss_fields[..i].contains(g) {
                return Err(TruncError::config(format!(
                    "zone {zone_number}: gauss field '{g}' listed twice"
                )));
            }
        }
        Ok(Self { zone_number, facies, gauss_fields })
    }

    /// Zone identifier as given by the caller.
    pub fn zone_number(&self) -> u32 {
        self.zone_number
    }

    /// Modelled facies in zone order.
    pub fn facies(&self) -> &[Facies] {
        &self.facies
    }

    /// Gaussian field names usable as alpha coordinates.
    pub fn gauss_fields(&self) -> &[String] {
        &self.gauss_fields
    }

    /// Index of `name` in zone order.
    pub fn facies_index(&self, name: &str) -> Option<usize> {
        self.facies.iter().position(|f| f.name == name)
    }

    /// Index of the Gaussian field `name`.
    pub fn gauss_field_index(&self, name: &str) -> Option<usize> {
        self.gauss_fields.iter().position(|g| g == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FaciesCatalog {
        FaciesCatalog::from_pairs([("F1", 1), ("F2", 2), ("F3", 5)]).unwrap()
    }

    #[test]
    fn codes_and_names_round_trip() {
        let c = catalog();
        assert_eq!(c.len(), 3);
        assert_eq!(c.code_of("F3"), Some(5));
        assert_eq!(c.name_of(2), Some("F2"));
        assert_eq!(c.code_of("nope"), None);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut c = catalog();
        assert!(matches!(c.add("F1", 9), Err(TruncError::Configuration(_))));
        assert!(matches!(c.add("F9", 1), Err(TruncError::Configuration(_))));
        assert!(c.add("F9", 9).is_ok());
    }

    #[test]
    fn zone_context_resolves_against_catalog() {
        let c = catalog();
        let z = ZoneFaciesContext::new(&c, 1, &["F3", "F1"], ["GRF1", "GRF2"]).unwrap();
        assert_eq!(z.facies()[0].code, 5);
        assert_eq!(z.facies_index("F1"), Some(1));
        assert_eq!(z.gauss_field_index("GRF2"), Some(1));

        let unknown = ZoneFaciesContext::new(&c, 1, &["F7"], ["GRF1"]);
        assert_eq!(unknown, Err(TruncError::UnknownFacies("F7".into())));
        let empty: [&str; 0] = [];
        assert!(matches!(
            ZoneFaciesContext::new(&c, 1, &empty, ["GRF1"]),
            Err(TruncError::Configuration(_))
        ));
        assert!(ZoneFaciesContext::new(&c, 1, &["F1"], ["G", "G"]).is_err());
    }
}
