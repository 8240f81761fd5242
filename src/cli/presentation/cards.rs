//! Card presentation: list, detail and batch report text/json.

use super::truncate;
use crate::card::{Card, CardInputs, CardStatus, StatusSummary};
use crate::config::StudioConfig;
use crate::scheduler::BatchReport;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

const PROMPT_WIDTH: usize = 48;
const RESULT_WIDTH: usize = 60;

pub fn status_label(status: CardStatus) -> String {
    match status {
        CardStatus::Pending => format!("{}", status.as_str().dimmed()),
        CardStatus::Generating => format!("{}", status.as_str().yellow()),
        CardStatus::Success => format!("{}", status.as_str().green()),
        CardStatus::Error => format!("{}", status.as_str().red()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn result_text(card: &Card) -> String {
    match card.status {
        CardStatus::Success if card.image_url.starts_with("data:") => {
            format!("inline image ({} bytes)", card.image_url.len())
        }
        CardStatus::Success => truncate(&card.image_url, RESULT_WIDTH),
        CardStatus::Error => truncate(&card.error_message, RESULT_WIDTH),
        _ => "-".to_string(),
    }
}

fn card_table(cards: &[Card], config: &StudioConfig) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Status", "Provider / Model", "Prompt", "Result"]);
    for card in cards {
        let provider = card.provider.unwrap_or(config.active_provider);
        let model = if card.model.is_empty() {
            config.model_for(provider).to_string()
        } else {
            card.model.clone()
        };
        let dirty = CardInputs::current(card, config)
            .map(|inputs| card.is_dirty(&inputs))
            .unwrap_or(false);
        let status = if dirty {
            format!("{} {}", status_label(card.status), "(stale)".dimmed())
        } else {
            status_label(card.status)
        };
        table.add_row(vec![
            short_id(&card.id).to_string(),
            status,
            format!("{} / {}", provider, model),
            truncate(&card.prompt, PROMPT_WIDTH),
            result_text(card),
        ]);
    }
    table
}

pub fn format_card_list_text(cards: &[Card], config: &StudioConfig) -> String {
    if cards.is_empty() {
        return "No cards.\n\nUse 'batch-studio generate --prompts ...' to add some.".to_string();
    }
    let summary = StatusSummary::from_cards(cards);
    format!("{}\n\n{}", card_table(cards, config), summary)
}

pub fn format_card_list_json(cards: &[Card]) -> String {
    let out = json!({
        "cards": cards,
        "summary": StatusSummary::from_cards(cards),
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_card_detail_text(card: &Card) -> String {
    let mut output = format!("Card: {}\n", card.id);
    output.push_str(&format!("Status: {}\n", status_label(card.status)));
    if let Some(provider) = card.provider {
        output.push_str(&format!("Provider: {} / {}\n", provider, card.model));
    }
    output.push_str(&format!("Prompt: {}\n", card.prompt));
    if !card.final_prompt.is_empty() && card.final_prompt != card.prompt {
        output.push_str(&format!("Final prompt: {}\n", card.final_prompt));
    }
    match card.status {
        CardStatus::Success => output.push_str(&format!("Image: {}\n", result_text(card))),
        CardStatus::Error => output.push_str(&format!("Error: {}\n", card.error_message)),
        _ => {}
    }
    output
}

pub fn format_batch_report_text(report: &BatchReport, cards: &[Card], config: &StudioConfig) -> String {
    if report.is_empty() {
        return "Nothing to generate.".to_string();
    }
    let headline = if report.failed > 0 {
        format!("{}", report.to_string().yellow())
    } else {
        format!("{}", report.to_string().green())
    };
    let mut output = format!(
        "{}\n  Queued: {}  Concurrency: {}  Duration: {:.1}s",
        headline.bold(),
        report.queued,
        report.concurrency,
        report.duration.as_secs_f64()
    );
    if report.removed > 0 {
        output.push_str(&format!("  Removed: {}", report.removed));
    }
    if !cards.is_empty() {
        output.push_str(&format!("\n\n{}", card_table(cards, config)));
    }
    output
}

pub fn format_batch_report_json(report: &BatchReport, cards: &[Card]) -> String {
    let out = json!({
        "report": report,
        "duration_ms": report.duration.as_millis() as u64,
        "cards": cards,
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}
