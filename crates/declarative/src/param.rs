//! Parameter bindings - named values supplied by the operator at provisioning time

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    String,
    Number,
}

impl ParamKind {
    fn expected(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "an integer",
        }
    }
}

/// A resolved parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(i64),
    String(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Declaration of an operator-supplied parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<ParamValue>,
    pub description: String,
    /// Inclusive lower bound for numbers
    pub min_value: Option<i64>,
    /// Anchored regex that string values must match
    pub allowed_pattern: Option<String>,
}

impl ParameterBinding {
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::String,
            default: None,
            description: description.into(),
            min_value: None,
            allowed_pattern: None,
        }
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ParamKind::Number,
            ..Self::string(name, description)
        }
    }

    pub fn with_default(mut self, default: ParamValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_min_value(mut self, min: i64) -> Self {
        self.min_value = Some(min);
        self
    }

    pub fn with_allowed_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_pattern = Some(pattern.into());
        self
    }

    /// Resolve the supplied text (or the default) into a checked value
    pub fn resolve(&self, supplied: Option<&str>) -> Result<ParamValue> {
        let value = match supplied {
            Some(raw) => self.parse(raw)?,
            None => self
                .default
                .clone()
                .ok_or_else(|| Error::MissingParameter(self.name.clone()))?,
        };
        self.check(&value)?;
        Ok(value)
    }

    fn parse(&self, raw: &str) -> Result<ParamValue> {
        match self.kind {
            ParamKind::String => Ok(ParamValue::String(raw.to_string())),
            ParamKind::Number => raw
                .trim()
                .parse::<i64>()
                .map(ParamValue::Number)
                .map_err(|_| Error::InvalidParameter {
                    name: self.name.clone(),
                    value: raw.to_string(),
                    expected: self.kind.expected(),
                }),
        }
    }

    fn check(&self, value: &ParamValue) -> Result<()> {
        match (self.kind, value) {
            (ParamKind::Number, ParamValue::Number(n)) => {
                if let Some(min) = self.min_value
                    && *n < min
                {
                    return Err(Error::ConstraintViolation {
                        name: self.name.clone(),
                        constraint: format!("value {n} is below the minimum of {min}"),
                    });
                }
                Ok(())
            }
            (ParamKind::String, ParamValue::String(s)) => {
                if let Some(pattern) = &self.allowed_pattern {
                    let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                        Error::ConstraintViolation {
                            name: self.name.clone(),
                            constraint: format!("invalid pattern '{pattern}': {e}"),
                        }
                    })?;
                    if !re.is_match(s) {
                        return Err(Error::ConstraintViolation {
                            name: self.name.clone(),
                            constraint: format!("'{s}' does not match {pattern}"),
                        });
                    }
                }
                Ok(())
            }
            (kind, other) => Err(Error::InvalidParameter {
                name: self.name.clone(),
                value: other.to_string(),
                expected: kind.expected(),
            }),
        }
    }
}

/// Resolved parameter values, by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValues(BTreeMap<String, ParamValue>);

impl ParameterValues {
    /// Resolve every binding against the supplied raw values
    ///
    /// Fails on the first missing, unparseable or out-of-bounds value, and on
    /// supplied names that no binding declares.
    pub fn resolve_all(
        bindings: &[ParameterBinding],
        supplied: &BTreeMap<String, String>,
    ) -> Result<Self> {
        if let Some(unknown) = supplied
            .keys()
            .find(|name| !bindings.iter().any(|b| &b.name == *name))
        {
            return Err(Error::UnknownParameter(unknown.clone()));
        }

        let mut values = Self::default();
        for binding in bindings {
            let value = binding.resolve(supplied.get(&binding.name).map(String::as_str))?;
            values.insert(&binding.name, value);
        }
        Ok(values)
    }

    pub fn insert(&mut self, name: &str, value: ParamValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_number(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ParamValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity() -> ParameterBinding {
        ParameterBinding::number("maxCapacity", "max size")
            .with_default(ParamValue::Number(5))
            .with_min_value(1)
    }

    #[test]
    fn test_default_used_when_not_supplied() {
        assert_eq!(capacity().resolve(None).unwrap(), ParamValue::Number(5));
    }

    #[test]
    fn test_number_below_minimum_is_rejected() {
        let err = capacity().resolve(Some("0")).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { ref name, .. } if name == "maxCapacity"));
    }

    #[test]
    fn test_unparseable_number_is_rejected() {
        let err = capacity().resolve(Some("many")).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_missing_required_parameter() {
        let binding = ParameterBinding::string("name", "no default");
        assert_eq!(
            binding.resolve(None).unwrap_err(),
            Error::MissingParameter("name".into())
        );
    }

    #[test]
    fn test_pattern_is_anchored() {
        let binding = ParameterBinding::string("prefix", "bucket prefix")
            .with_allowed_pattern("[a-z0-9-]+");
        assert!(binding.resolve(Some("demo-1")).is_ok());
        assert!(binding.resolve(Some("Demo")).is_err());
        assert!(binding.resolve(Some("demo!")).is_err());
    }

    #[test]
    fn test_resolve_all_rejects_unknown_names() {
        let mut supplied = BTreeMap::new();
        supplied.insert("nope".to_string(), "1".to_string());
        let err = ParameterValues::resolve_all(&[capacity()], &supplied).unwrap_err();
        assert_eq!(err, Error::UnknownParameter("nope".into()));
    }

    #[test]
    fn test_resolve_all_mixes_supplied_and_defaults() {
        let prefix = ParameterBinding::string("prefix", "p")
            .with_default(ParamValue::String("default".into()));
        let mut supplied = BTreeMap::new();
        supplied.insert("maxCapacity".to_string(), "3".to_string());

        let values = ParameterValues::resolve_all(&[prefix, capacity()], &supplied).unwrap();
        assert_eq!(values.get_number("maxCapacity"), Some(3));
        assert_eq!(values.get_str("prefix"), Some("default"));
    }
}
