//! Template rendering seam for dynamic endpoint values.
//!
//! # Design
//! The caller only depends on the `TemplateRenderer` trait: a pure
//! string-to-string evaluator that may read ambient context such as the
//! current time. `render_or_literal` implements the caller's side of the
//! contract: empty templates never reach the renderer, and a failed render
//! falls back to the unrendered literal so the call still goes out.
//!
//! `VariableRenderer` is a small built-in evaluator for `{{ name }}`
//! placeholders. Hosts with a richer template language plug in their own.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use regex::Regex;
use tracing::error;

use crate::error::RenderError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Evaluates a template string to its final text.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str) -> Result<String, RenderError>;
}

/// Render `template`, falling back to the literal text when rendering fails.
pub fn render_or_literal(renderer: &dyn TemplateRenderer, template: &str) -> String {
    if template.is_empty() {
        return String::new();
    }
    match renderer.render(template) {
        Ok(rendered) => rendered,
        Err(err) => {
            error!(error = %err, "failed to render template, using literal value");
            template.to_string()
        }
    }
}

/// Renderer that returns every template unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRenderer;

impl TemplateRenderer for PassthroughRenderer {
    fn render(&self, template: &str) -> Result<String, RenderError> {
        Ok(template.to_string())
    }
}

/// Substitutes `{{ name }}` placeholders from a mutable variable table.
///
/// `{{ now }}` expands to the current UTC time in RFC 3339 form unless a
/// variable named `now` is set. Variables can be replaced while callers are
/// live, which is how rotating credentials reach the next call.
#[derive(Debug)]
pub struct VariableRenderer {
    variables: RwLock<HashMap<String, String>>,
}

impl VariableRenderer {
    pub fn new() -> Self {
        Self::with_variables(HashMap::new())
    }

    pub fn with_variables(variables: HashMap<String, String>) -> Self {
        Self {
            variables: RwLock::new(variables),
        }
    }

    /// Set or replace a variable.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.write().insert(name.into(), value.into());
    }

    /// Remove a variable, returning its previous value.
    pub fn unset(&self, name: &str) -> Option<String> {
        self.variables.write().remove(name)
    }

    fn lookup(&self, name: &str) -> Result<String, RenderError> {
        if let Some(value) = self.variables.read().get(name) {
            return Ok(value.clone());
        }
        match name {
            "now" => Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            _ => Err(RenderError::UnknownVariable(name.to_string())),
        }
    }
}

impl Default for VariableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for VariableRenderer {
    fn render(&self, template: &str) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut cursor = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let whole = caps.get(0).ok_or(RenderError::Malformed { offset: cursor })?;
            let literal = &template[cursor..whole.start()];
            if let Some(pos) = literal.find("{{") {
                return Err(RenderError::Malformed { offset: cursor + pos });
            }
            out.push_str(literal);
            out.push_str(&self.lookup(&caps[1])?);
            cursor = whole.end();
        }
        let tail = &template[cursor..];
        if let Some(pos) = tail.find("{{") {
            return Err(RenderError::Malformed { offset: cursor + pos });
        }
        out.push_str(tail);
        Ok(out)
    }
}
