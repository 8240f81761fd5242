//! Provider presentation: setup status, model catalogs, input requirements.

use crate::capability::{CapabilityRequirement, ImageSupport, RequirementStatus};
use crate::catalog::ModelEntry;
use crate::config::StudioConfig;
use crate::provider::ProviderKind;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

pub fn format_providers_text(config: &StudioConfig) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["", "Provider", "Model", "Setup"]);
    for provider in ProviderKind::all() {
        let marker = if provider == config.active_provider { "*" } else { "" };
        let hint = provider.configuration_hint(config);
        let setup = if provider.is_configured(config) {
            format!("{}", hint.green())
        } else {
            format!("{}", hint.yellow())
        };
        table.add_row(vec![
            marker.to_string(),
            provider.as_str().to_string(),
            config.model_for(provider).to_string(),
            setup,
        ]);
    }
    format!("{}\n\n* active provider", table)
}

pub fn format_providers_json(config: &StudioConfig) -> String {
    let providers: Vec<_> = ProviderKind::all()
        .iter()
        .map(|provider| {
            json!({
                "provider": provider.as_str(),
                "label": provider.label(),
                "model": config.model_for(*provider),
                "configured": provider.is_configured(config),
                "active": *provider == config.active_provider,
                "accepts_reference_image": provider.accepts_reference_image(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&json!({ "providers": providers }))
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn format_models_text(provider: ProviderKind, models: &[ModelEntry]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Model ID", "Name"]);
    for model in models {
        table.add_row(vec![model.id.as_str(), model.label.as_str()]);
    }
    format!(
        "{}\n\nTotal: {} model(s) from {}",
        table,
        models.len(),
        provider.label()
    )
}

pub fn format_models_json(provider: ProviderKind, models: &[ModelEntry]) -> String {
    let out = json!({
        "provider": provider.as_str(),
        "models": models,
        "total": models.len(),
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

fn support_text(requirement: &CapabilityRequirement) -> String {
    match requirement.image_support {
        ImageSupport::None => "not accepted".to_string(),
        ImageSupport::Optional => format!("{}", "optional".green()),
        ImageSupport::Required => format!("{}", "required".yellow()),
        ImageSupport::Unknown => format!("{}", "unknown".dimmed()),
    }
}

pub fn format_requirement_text(requirement: &CapabilityRequirement) -> String {
    let mut output = format!(
        "Model: {} ({})\n",
        requirement.model_id,
        requirement.provider.label()
    );
    if requirement.status == RequirementStatus::Error {
        output.push_str(&format!(
            "Requirement lookup failed: {}\n",
            requirement.error.red()
        ));
        return output;
    }
    output.push_str(&format!("Reference image: {}\n", support_text(requirement)));
    if let Some(field) = &requirement.preferred_field {
        output.push_str(&format!(
            "Target field: {}{}\n",
            field.name,
            if field.expects_array { " (array)" } else { "" }
        ));
    }
    if requirement.fields.len() > 1 {
        let names: Vec<&str> = requirement.fields.iter().map(|f| f.name.as_str()).collect();
        output.push_str(&format!("Image fields: {}\n", names.join(", ")));
    }
    if !requirement.unsupported_reason.is_empty() {
        output.push_str(&format!(
            "Unsupported: {}\n",
            requirement.unsupported_reason.yellow()
        ));
    }
    output
}

pub fn format_requirement_json(requirement: &CapabilityRequirement) -> String {
    serde_json::to_string_pretty(requirement).unwrap_or_else(|_| "{}".to_string())
}
