use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

const BUILTIN_REGISTRY: &str = include_str!("../registry/parameters.json");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("read registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode registry: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("duplicate parameter id: {0}")]
    DuplicateId(String),
}

/// Type-specific constraints attached to a governance parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterKind {
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Text {
        #[serde(
            default,
            rename = "maxLength",
            skip_serializing_if = "Option::is_none"
        )]
        max_length: Option<usize>,
    },
    /// Any type tag the client does not know how to constrain.
    #[serde(other)]
    Other,
}

impl ParameterKind {
    pub fn is_number(&self) -> bool {
        matches!(self, ParameterKind::Number { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub parameters: Vec<Parameter>,
}

/// Static catalogue of the parameters a change proposal may touch, grouped by
/// category. Loaded once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRegistry {
    categories: Vec<Category>,
}

impl ParameterRegistry {
    pub fn new(categories: Vec<Category>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for param in categories.iter().flat_map(|c| c.parameters.iter()) {
            if !seen.insert(param.id.as_str()) {
                return Err(RegistryError::DuplicateId(param.id.clone()));
            }
        }
        Ok(Self { categories })
    }

    /// Catalogue shipped with the client.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_REGISTRY)
    }

    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let raw: ParameterRegistry = serde_json::from_str(text)?;
        Self::new(raw.categories)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: &str) -> Option<&Parameter> {
        self.parameters().find(|p| p.id == id)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.categories.iter().flat_map(|c| c.parameters.iter())
    }

    pub fn len(&self) -> usize {
        self.parameters().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_loads() {
        let registry = ParameterRegistry::builtin().unwrap();
        assert!(!registry.is_empty());
        assert!(registry.categories().len() > 1);
    }

    #[test]
    fn decodes_tagged_kinds() {
        let registry = ParameterRegistry::from_json(
            r#"{"categories":[{"name":"misc","parameters":[
                {"id":"a","name":"A","type":"number","min":1,"max":5,"step":1},
                {"id":"b","name":"B","type":"text","maxLength":3},
                {"id":"c","name":"C","type":"boolean"}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(
            registry.get("a").unwrap().kind,
            ParameterKind::Number {
                min: Some(1.0),
                max: Some(5.0),
                step: Some(1.0)
            }
        );
        assert_eq!(
            registry.get("b").unwrap().kind,
            ParameterKind::Text {
                max_length: Some(3)
            }
        );
        assert_eq!(registry.get("c").unwrap().kind, ParameterKind::Other);
        assert!(registry.get("d").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = ParameterRegistry::from_json(
            r#"{"categories":[
                {"name":"x","parameters":[{"id":"a","name":"A","type":"text"}]},
                {"name":"y","parameters":[{"id":"a","name":"A2","type":"number"}]}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(id) if id == "a"));
    }
}
