//! Prompt templates for advanced mode.
//!
//! A template accepts three placeholder spellings for the same variable:
//! `{{item}}`, `${item}` and `{$item}`.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Variables a template may reference
pub const ALLOWED_TEMPLATE_VARIABLES: &[&str] = &["item"];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}|\$\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}|\{\$\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}",
        )
        .expect("token pattern is valid")
    })
}

fn generic_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([^}]+)\s*\}\}|\$\{\s*([^}]+)\s*\}|\{\$\s*([^}]+)\s*\}")
            .expect("generic token pattern is valid")
    })
}

fn variable_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("variable name pattern is valid")
    })
}

fn captured_name<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Outcome of checking a template against the allowed variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValidation {
    pub used_variables: Vec<String>,
    pub unknown_variables: Vec<String>,
    pub invalid_tokens: Vec<String>,
}

impl TemplateValidation {
    pub fn is_ok(&self) -> bool {
        self.unknown_variables.is_empty() && self.invalid_tokens.is_empty()
    }

    /// User-facing description of the problems, if any
    pub fn message(&self) -> Option<String> {
        if self.is_ok() {
            return None;
        }
        let mut parts = Vec::new();
        if !self.invalid_tokens.is_empty() {
            parts.push(format!(
                "Invalid template tokens: {}",
                self.invalid_tokens.join(", ")
            ));
        }
        if !self.unknown_variables.is_empty() {
            parts.push(format!(
                "Unknown template variables: {} (allowed: {})",
                self.unknown_variables.join(", "),
                ALLOWED_TEMPLATE_VARIABLES.join(", ")
            ));
        }
        Some(parts.join(". "))
    }
}

/// Result of substituting variables into a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub text: String,
    pub unresolved_variables: Vec<String>,
}

/// Distinct variable names in order of first appearance.
pub fn extract_template_variables(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in token_pattern().captures_iter(template) {
        if let Some(name) = captured_name(&caps) {
            push_unique(&mut names, name);
        }
    }
    names
}

pub fn validate_template(template: &str, allowed: &[&str]) -> TemplateValidation {
    let mut result = TemplateValidation {
        used_variables: extract_template_variables(template),
        ..TemplateValidation::default()
    };

    for caps in generic_token_pattern().captures_iter(template) {
        let raw = captured_name(&caps).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        if !variable_name_pattern().is_match(raw) {
            push_unique(&mut result.invalid_tokens, raw);
            continue;
        }
        if !allowed.contains(&raw) {
            push_unique(&mut result.unknown_variables, raw);
        }
    }

    result
}

/// Substitute known variables; unknown ones render as empty and are reported.
pub fn render_template(template: &str, variables: &HashMap<&str, &str>) -> RenderedTemplate {
    let mut unresolved = Vec::new();
    let text = token_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = captured_name(caps).unwrap_or("");
            match variables.get(name) {
                Some(value) => value.to_string(),
                None => {
                    push_unique(&mut unresolved, name);
                    String::new()
                }
            }
        })
        .into_owned();

    RenderedTemplate {
        text,
        unresolved_variables: unresolved,
    }
}
