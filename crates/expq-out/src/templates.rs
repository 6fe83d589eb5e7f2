//! Template loading for response rendering.
//!
//! Supports the response-templates.yaml format:
//! - Multiple named templates
//! - Handlebars syntax
//! - Optional example data and expected output per template

use serde::Deserialize;
use std::collections::HashMap;

use crate::RenderError;

/// Templates embedded at compile time
pub const BUILTIN_TEMPLATES: &str = include_str!("../../../grammars/response-templates.yaml");

/// Top-level templates file structure
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesFile {
    pub version: String,
    pub templates: HashMap<String, Template>,
}

/// A single template definition
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub description: String,
    pub template: String,
    #[serde(default)]
    pub example: Option<serde_json::Value>,
    #[serde(default)]
    pub output: Option<String>,
}

impl TemplatesFile {
    /// Load templates from a YAML file
    pub fn load(path: &str) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Template(format!("failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    /// Parse templates from YAML content
    pub fn from_yaml(yaml: &str) -> Result<Self, RenderError> {
        serde_yaml::from_str(yaml).map_err(|e| RenderError::Template(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Template names, sorted
    pub fn list_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
