use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::values::{Value, ValueKind};

/// A named simulation variable and its default value
///
/// The variable's kind is fixed by the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub default: Value,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }
}

/// Validated, insertion-ordered set of variable declarations
#[derive(Debug, Clone, PartialEq)]
pub struct Declarations {
    defaults: IndexMap<String, Value>,
}

impl Declarations {
    /// Build a declaration set; names must be unique and non-empty
    pub fn new(variables: impl IntoIterator<Item = VariableDecl>) -> SimResult<Self> {
        let mut defaults = IndexMap::new();
        for decl in variables {
            if decl.name.is_empty() {
                return Err(SimError::InvalidArgument(
                    "variable name must not be empty".to_string(),
                ));
            }
            if defaults.contains_key(&decl.name) {
                return Err(SimError::InvalidArgument(format!(
                    "duplicate variable '{}'",
                    decl.name
                )));
            }
            defaults.insert(decl.name, decl.default);
        }
        Ok(Self { defaults })
    }

    /// Position of `name` in declaration order
    pub fn index_of(&self, name: &str) -> SimResult<usize> {
        self.defaults
            .get_index_of(name)
            .ok_or_else(|| SimError::UnknownVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> SimResult<ValueKind> {
        self.defaults
            .get(name)
            .map(Value::kind)
            .ok_or_else(|| SimError::UnknownVariable(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Default values in declaration order
    pub fn defaults(&self) -> Vec<Value> {
        self.defaults.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }
}
