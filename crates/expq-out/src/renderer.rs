//! Template rendering.
//!
//! Uses Handlebars with custom helpers:
//! - number: exact decimal formatting (integers bare, otherwise two places)
//! - join: join an array with a separator
//! - default: fallback value for a missing parameter

use expq_core::json::format_decimal;
use expq_core::Decimal;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
};
use lazy_static::lazy_static;
use serde_json::Value;
use std::str::FromStr;

use crate::templates::{TemplatesFile, BUILTIN_TEMPLATES};
use crate::RenderError;

lazy_static! {
    static ref BUILTIN: TemplateRenderer = TemplateRenderer::new(
        TemplatesFile::from_yaml(BUILTIN_TEMPLATES).expect("embedded response templates are valid")
    )
    .expect("embedded response templates compile");
}

/// Compiled renderer with registered helpers
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
    templates: TemplatesFile,
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("templates", &self.templates.list_templates())
            .finish()
    }
}

impl TemplateRenderer {
    pub fn new(templates: TemplatesFile) -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_helper("number", Box::new(NumberHelper));
        handlebars.register_helper("join", Box::new(JoinHelper));
        handlebars.register_helper("default", Box::new(DefaultHelper));

        for (name, template) in &templates.templates {
            handlebars
                .register_template_string(name, &template.template)
                .map_err(|e| RenderError::Template(format!("{}: {}", name, e)))?;
        }

        Ok(TemplateRenderer {
            handlebars,
            templates,
        })
    }

    /// Renderer over the embedded templates
    pub fn builtin() -> &'static TemplateRenderer {
        &BUILTIN
    }

    pub fn load(path: &str) -> Result<Self, RenderError> {
        Self::new(TemplatesFile::load(path)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RenderError> {
        Self::new(TemplatesFile::from_yaml(yaml)?)
    }

    /// Render a named template with data
    pub fn render(&self, template_name: &str, data: &Value) -> Result<String, RenderError> {
        if self.templates.get(template_name).is_none() {
            return Err(RenderError::Unknown(template_name.to_string()));
        }
        self.handlebars
            .render(template_name, data)
            .map_err(|e| RenderError::Render(e.to_string()))
    }

    pub fn list_templates(&self) -> Vec<&str> {
        self.templates.list_templates()
    }
}

// ============================================================================
// Custom Helpers
// ============================================================================

/// JSON number → text without binary float noise
pub fn format_number(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(format_decimal)
                .unwrap_or(text)
        }
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

struct NumberHelper;

impl HelperDef for NumberHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        if let Some(param) = h.param(0) {
            out.write(&format_number(param.value()))?;
        }
        Ok(())
    }
}

struct JoinHelper;

impl HelperDef for JoinHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let separator = h
            .param(1)
            .and_then(|v| v.value().as_str())
            .unwrap_or(", ");

        if let Some(items) = h.param(0).and_then(|v| v.value().as_array()) {
            let strings: Vec<String> = items
                .iter()
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .collect();
            out.write(&strings.join(separator))?;
        }
        Ok(())
    }
}

struct DefaultHelper;

impl HelperDef for DefaultHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h.param(0).map(|v| v.value()).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        });
        match value {
            Some(Value::String(s)) => out.write(s)?,
            Some(other) => out.write(&other.to_string())?,
            None => {
                let fallback = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");
                out.write(fallback)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_examples_render() {
        let renderer = TemplateRenderer::builtin();
        let file = TemplatesFile::from_yaml(BUILTIN_TEMPLATES).unwrap();
        for name in file.list_templates() {
            let template = file.get(name).unwrap();
            if let (Some(example), Some(expected)) = (&template.example, &template.output) {
                assert_eq!(&renderer.render(name, example).unwrap(), expected, "template {}", name);
            }
        }
    }

    #[test]
    fn test_number_helper_is_exact() {
        assert_eq!(format_number(&json!(600.305)), "600.31");
        assert_eq!(format_number(&json!(1500)), "1500");
        assert_eq!(format_number(&json!(0.1)), "0.10");
    }

    #[test]
    fn test_no_html_escaping() {
        let renderer = TemplateRenderer::from_yaml(
            r#"
version: "1.0"
templates:
  echo:
    description: Echo
    template: "{{text}}"
"#,
        )
        .unwrap();
        assert_eq!(renderer.render("echo", &json!({"text": "Tom's & Jerry's"})).unwrap(), "Tom's & Jerry's");
        assert!(matches!(renderer.render("missing", &json!({})), Err(RenderError::Unknown(_))));
    }

    #[test]
    fn test_default_helper() {
        let renderer = TemplateRenderer::builtin();
        let text = renderer.render("expense_noted", &json!({"amount": 12.5})).unwrap();
        assert_eq!(text, "Noted 12.50 for an uncategorized expense.");
    }
}
