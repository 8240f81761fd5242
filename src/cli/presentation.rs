//! CLI presentation: text and json formatters per command family.

mod cards;
mod provider;

pub use cards::{
    format_batch_report_json, format_batch_report_text, format_card_detail_text,
    format_card_list_json, format_card_list_text, status_label,
};
pub use provider::{
    format_models_json, format_models_text, format_providers_json, format_providers_text,
    format_requirement_json, format_requirement_text,
};

/// Shorten to `max` characters on a char boundary, marking the cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace(['\r', '\n'], " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let kept: String = single_line.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}
