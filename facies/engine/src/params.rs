//! Truncation parameters that are either constant or read per cell from a field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TruncError;

/// A rule parameter: a constant, or the name of a spatially varying field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Same value in every cell.
    Constant(f64),
    /// Name of a parameter field supplied with `set_parameter_field`.
    Field(String),
}

impl ParamValue {
    /// True for [`ParamValue::Constant`].
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Constant(v)
    }
}

impl From<&str> for ParamValue {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

/// Per-cell parameter arrays, indexed by the cell index of `set_trunc_rule`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterFields {
    fields: HashMap<String, Vec<f64>>,
}

impl ParameterFields {
    /// Store or replace the field `name`.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.fields.insert(name.into(), values);
    }

    /// Value of `param` for `cell`.
    pub fn resolve(&self, param: &ParamValue, cell: Option<usize>) -> Result<f64, TruncError> {
        match param {
            ParamValue::Constant(v) => Ok(*v),
            ParamValue::Field(name) => {
                let values = self.fields.get(name).ok_or_else(|| {
                    TruncError::config(format!("parameter field '{name}' has not been set"))
                })?;
                let cell = cell.ok_or_else(|| {
                    TruncError::config(format!("parameter field '{name}' needs a cell index"))
                })?;
                let v = values.get(cell).copied().ok_or_else(|| {
                    TruncError::config(format!(
                        "cell {cell} outside parameter field '{name}' ({} values)",
                        values.len()
                    ))
                })?;
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(TruncError::config(format!("non-finite value in '{name}' at cell {cell}")))
                }
            }
        }
    }
}
