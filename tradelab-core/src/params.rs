//! Strategy and risk parameters: values, specs, and the search ranges they imply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ConfigError;

/// A single parameter value.
///
/// Untagged so TOML/JSON read naturally: `sma_period = 20`, `z = 2.5`,
/// `interval = "1hour"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Int(v) => Some(v as f64),
            ParamValue::Float(v) => Some(v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(v) => Some(v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Named parameter assignment. `BTreeMap` keeps serialization canonical.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Typed accessors with `ConfigError`s that name the offending parameter.
pub trait ParamSetExt {
    fn get_f64(&self, name: &str) -> Result<f64, ConfigError>;
    fn get_usize(&self, name: &str) -> Result<usize, ConfigError>;
}

impl ParamSetExt for ParamSet {
    fn get_f64(&self, name: &str) -> Result<f64, ConfigError> {
        let value = self.get(name).ok_or_else(|| ConfigError::MissingParam(name.to_string()))?;
        value.as_f64().ok_or_else(|| ConfigError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected a number, got '{value}'"),
        })
    }

    fn get_usize(&self, name: &str) -> Result<usize, ConfigError> {
        let value = self.get(name).ok_or_else(|| ConfigError::MissingParam(name.to_string()))?;
        match value.as_i64() {
            Some(v) if v >= 1 => Ok(v as usize),
            _ => Err(ConfigError::InvalidParam {
                name: name.to_string(),
                reason: format!("expected a positive integer, got '{value}'"),
            }),
        }
    }
}

/// Type and search range of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Int { low: i64, high: i64, step: i64 },
    Float { low: f64, high: f64, step: f64 },
    Text,
}

/// Declared parameter of a strategy or risk manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamValue,
    /// Whether the optimizer may vary it. Others stay at their default.
    pub optimizable: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn int(name: &str, default: i64, low: i64, high: i64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Int { low, high, step: 1 },
            default: ParamValue::Int(default),
            optimizable: true,
            description: description.to_string(),
        }
    }

    pub fn float(name: &str, default: f64, low: f64, high: f64, step: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float { low, high, step },
            default: ParamValue::Float(default),
            optimizable: true,
            description: description.to_string(),
        }
    }

    pub fn text(name: &str, default: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Text,
            default: ParamValue::Text(default.to_string()),
            optimizable: false,
            description: description.to_string(),
        }
    }

    pub fn fixed(mut self) -> Self {
        self.optimizable = false;
        self
    }

    /// Check a supplied value against this spec's type.
    pub fn check(&self, value: &ParamValue) -> Result<(), ConfigError> {
        let ok = match (&self.kind, value) {
            (ParamKind::Int { .. }, v) => v.as_i64().is_some(),
            (ParamKind::Float { .. }, v) => v.as_f64().is_some_and(f64::is_finite),
            (ParamKind::Text, ParamValue::Text(_)) => true,
            (ParamKind::Text, _) => false,
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidParam {
                name: self.name.clone(),
                reason: format!("value '{value}' does not match {:?}", self.kind),
            })
        }
    }
}

/// Defaults from `specs`, overridden by `overrides`.
///
/// Overrides that no spec declares are rejected, as are values of the wrong type.
pub fn merge_with_defaults(specs: &[ParamSpec], overrides: &ParamSet) -> Result<ParamSet, ConfigError> {
    let mut merged: ParamSet = specs
        .iter()
        .map(|s| (s.name.clone(), s.default.clone()))
        .collect();
    for (name, value) in overrides {
        let spec = specs
            .iter()
            .find(|s| &s.name == name)
            .ok_or_else(|| ConfigError::UnknownParam(name.clone()))?;
        spec.check(value)?;
        merged.insert(name.clone(), value.clone());
    }
    Ok(merged)
}
