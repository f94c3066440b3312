//! Attributes - Typed boundary between attribute maps and block structs
//!
//! The host hands the provider untyped attribute maps. Each block type
//! converts such a map into its own struct exactly once, through
//! [`FromAttributes`], after the map has been checked against the block
//! schema. Going the other way, [`ToAttributes`] flattens a struct back into
//! a map with zero values pruned.

use std::collections::HashMap;

use crate::resource::Value;
use crate::schema::{ResourceSchema, TypeError};

/// Errors raised while converting an attribute map into a struct
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttributeError {
    #[error("Attribute '{name}' is missing")]
    Missing { name: String },

    #[error("Attribute '{name}' has the wrong type: expected {expected}")]
    WrongType { name: String, expected: &'static str },

    #[error("{}", errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Invalid { errors: Vec<TypeError> },

    #[error("{0}")]
    Conflict(String),
}

/// Read-only view over an attribute map with typed getters
#[derive(Debug, Clone, Copy)]
pub struct Attributes<'a> {
    map: &'a HashMap<String, Value>,
}

impl<'a> Attributes<'a> {
    pub fn new(map: &'a HashMap<String, Value>) -> Self {
        Self { map }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name)
    }

    pub fn string(&self, name: &str) -> Result<String, AttributeError> {
        self.opt_string(name)?
            .ok_or_else(|| AttributeError::Missing { name: name.to_string() })
    }

    pub fn opt_string(&self, name: &str) -> Result<Option<String>, AttributeError> {
        match self.map.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(name, "String")),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, AttributeError> {
        self.opt_int(name)?
            .ok_or_else(|| AttributeError::Missing { name: name.to_string() })
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, AttributeError> {
        match self.map.get(name) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(_) => Err(wrong_type(name, "Int")),
        }
    }

    /// Boolean that defaults to false when unset
    pub fn bool(&self, name: &str) -> Result<bool, AttributeError> {
        Ok(self.opt_bool(name)?.unwrap_or(false))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>, AttributeError> {
        match self.map.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(wrong_type(name, "Bool")),
        }
    }

    pub fn string_list(&self, name: &str) -> Result<Vec<String>, AttributeError> {
        match self.map.get(name) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(wrong_type(name, "List<String>")),
                })
                .collect(),
            Some(_) => Err(wrong_type(name, "List<String>")),
        }
    }

    /// Entries of a repeated nested block
    pub fn blocks(&self, name: &str) -> Result<Vec<&'a HashMap<String, Value>>, AttributeError> {
        match self.map.get(name) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| match v {
                    Value::Map(m) => Ok(m),
                    _ => Err(wrong_type(name, "List<Block>")),
                })
                .collect(),
            Some(_) => Err(wrong_type(name, "List<Block>")),
        }
    }

    /// Require that exactly one of the given attributes is set
    ///
    /// Returns the name of the attribute that is set.
    pub fn exactly_one_of<'n>(&self, names: &[&'n str]) -> Result<&'n str, AttributeError> {
        let set: Vec<&'n str> = names
            .iter()
            .copied()
            .filter(|n| self.map.contains_key(*n))
            .collect();
        match set.as_slice() {
            [one] => Ok(*one),
            [] => Err(AttributeError::Conflict(format!(
                "one of {} must be set",
                names.join(", ")
            ))),
            _ => Err(AttributeError::Conflict(format!(
                "only one of {} may be set",
                set.join(", ")
            ))),
        }
    }
}

fn wrong_type(name: &str, expected: &'static str) -> AttributeError {
    AttributeError::WrongType {
        name: name.to_string(),
        expected,
    }
}

/// Conversion from an attribute map into a typed struct
pub trait FromAttributes: Sized {
    /// Schema the map must satisfy before conversion
    fn schema() -> ResourceSchema;

    /// Build the struct from an already validated map
    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError>;

    /// Validate the map against the schema, then convert
    fn from_attributes(map: &HashMap<String, Value>) -> Result<Self, AttributeError> {
        Self::schema()
            .validate(map)
            .map_err(|errors| AttributeError::Invalid { errors })?;
        Self::from_validated(Attributes::new(map))
    }
}

/// Conversion from a typed struct into a pruned attribute map
pub trait ToAttributes {
    fn to_attributes(&self) -> HashMap<String, Value>;
}

/// Drop entries holding the zero value of their type
pub fn prune_zero_values(map: HashMap<String, Value>) -> HashMap<String, Value> {
    map.into_iter().filter(|(_, v)| !v.is_zero()).collect()
}

/// Builder used by [`ToAttributes`] impls; skips unset and zero values
#[derive(Debug, Default)]
pub struct AttributeMap {
    map: HashMap<String, Value>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_zero() {
            self.map.insert(name.to_string(), value);
        }
        self
    }

    pub fn set_opt<V: Into<Value>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(name, v),
            None => self,
        }
    }

    pub fn build(self) -> HashMap<String, Value> {
        self.map
    }
}
