//! Cards: one prompt and the outcome of generating it.

use crate::config::{PromptMode, StudioConfig};
use crate::error::GenerationError;
use crate::provider::ProviderKind;
use crate::template::render_template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Message stored on cards found mid-generation at load time
pub const INTERRUPTED_MESSAGE: &str = "Generation was interrupted before it finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    #[default]
    Pending,
    Generating,
    Success,
    Error,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Pending => "pending",
            CardStatus::Generating => "generating",
            CardStatus::Success => "success",
            CardStatus::Error => "error",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs recorded at the last successful generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedWith {
    pub provider: ProviderKind,
    pub model: String,
    pub final_prompt: String,
    pub common_prompt: String,
}

/// Current inputs a card would be generated with, for staleness checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInputs {
    pub provider: ProviderKind,
    pub model: String,
    pub final_prompt: String,
    pub common_prompt: String,
}

impl CardInputs {
    /// Inputs the card would be generated with under `config` right now.
    /// `None` when its prompt cannot be built (unresolved template variables).
    pub fn current(card: &Card, config: &StudioConfig) -> Option<Self> {
        let provider = card.provider.unwrap_or(config.active_provider);
        let snapshot = config.snapshot_for(provider, Some(&card.model));
        let final_prompt = build_prompt_for_request(&snapshot, &card.prompt).ok()?;
        Some(Self {
            provider,
            model: snapshot.model_for(provider).to_string(),
            final_prompt,
            common_prompt: snapshot.common_prompt.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub final_prompt: String,
    #[serde(default)]
    pub status: CardStatus,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub error_message: String,
    /// Provider override; `None` follows the active provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    /// Model override; empty follows the provider's configured model
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_with: Option<GeneratedWith>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            final_prompt: String::new(),
            status: CardStatus::Pending,
            image_url: String::new(),
            error_message: String::new(),
            provider: None,
            model: String::new(),
            generated_with: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True when the card succeeded and any input changed since.
    pub fn is_dirty(&self, inputs: &CardInputs) -> bool {
        if self.status != CardStatus::Success {
            return false;
        }
        match &self.generated_with {
            Some(snapshot) => {
                snapshot.provider != inputs.provider
                    || snapshot.model != inputs.model
                    || snapshot.final_prompt != inputs.final_prompt
                    || snapshot.common_prompt != inputs.common_prompt.trim()
            }
            None => false,
        }
    }

    /// Cards persisted mid-generation cannot resume; mark them failed.
    pub fn recover_interrupted(&mut self) -> bool {
        if self.status != CardStatus::Generating {
            return false;
        }
        self.status = CardStatus::Error;
        self.error_message = INTERRUPTED_MESSAGE.to_string();
        self.touch();
        true
    }
}

/// Split batch input into trimmed, non-empty prompt lines.
pub fn normalize_prompt_lines(batch_text: &str) -> Vec<String> {
    batch_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join the common prompt and a line prompt with a blank line, skipping empty sides.
pub fn build_final_prompt(common_prompt: &str, line_prompt: &str) -> String {
    let common = common_prompt.trim();
    let line = line_prompt.trim();
    match (common.is_empty(), line.is_empty()) {
        (true, _) => line.to_string(),
        (false, true) => common.to_string(),
        (false, false) => format!("{}\n\n{}", common, line),
    }
}

/// Final prompt for a card under the given settings.
pub fn build_prompt_for_request(
    config: &StudioConfig,
    line_prompt: &str,
) -> Result<String, GenerationError> {
    match config.mode {
        PromptMode::Simple => Ok(build_final_prompt(&config.common_prompt, line_prompt)),
        PromptMode::Advanced => {
            let vars = HashMap::from([("item", line_prompt)]);
            let rendered = render_template(&config.common_prompt, &vars);
            if !rendered.unresolved_variables.is_empty() {
                return Err(GenerationError::Validation(format!(
                    "Unresolved template variables: {}",
                    rendered.unresolved_variables.join(", ")
                )));
            }
            Ok(rendered.text.trim().to_string())
        }
    }
}

/// Card counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub generating: usize,
    pub success: usize,
    pub error: usize,
}

impl StatusSummary {
    pub fn from_cards<'a>(cards: impl IntoIterator<Item = &'a Card>) -> Self {
        let mut summary = StatusSummary::default();
        for card in cards {
            summary.total += 1;
            match card.status {
                CardStatus::Pending => summary.pending += 1,
                CardStatus::Generating => summary.generating += 1,
                CardStatus::Success => summary.success += 1,
                CardStatus::Error => summary.error += 1,
            }
        }
        summary
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return f.write_str("Ready");
        }
        write!(
            f,
            "{} cards | done {} | generating {} | error {}",
            self.total, self.success, self.generating, self.error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prompt_lines() {
        let lines = normalize_prompt_lines("  a cat \r\n\r\n b dog\n   \nc bird");
        assert_eq!(lines, vec!["a cat", "b dog", "c bird"]);
        assert!(normalize_prompt_lines("").is_empty());
    }

    #[test]
    fn test_build_final_prompt() {
        assert_eq!(build_final_prompt(" style ", " cat "), "style\n\ncat");
        assert_eq!(build_final_prompt("", "cat"), "cat");
        assert_eq!(build_final_prompt("style", "  "), "style");
    }

    #[test]
    fn test_advanced_mode_renders_template() {
        let mut config = StudioConfig::default();
        config.mode = PromptMode::Advanced;
        config.common_prompt = "  oil painting of {{item}}, ${item} again ".to_string();
        let prompt = build_prompt_for_request(&config, "a lighthouse").unwrap();
        assert_eq!(prompt, "oil painting of a lighthouse, a lighthouse again");
    }

    #[test]
    fn test_advanced_mode_unresolved_is_validation_error() {
        let mut config = StudioConfig::default();
        config.mode = PromptMode::Advanced;
        config.common_prompt = "{{item}} at {{time}}".to_string();
        let err = build_prompt_for_request(&config, "x").unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
        assert!(err.to_string().contains("time"));
    }

    #[test]
    fn test_dirty_detection() {
        let mut card = Card::new("cat");
        card.status = CardStatus::Success;
        card.generated_with = Some(GeneratedWith {
            provider: ProviderKind::Fal,
            model: "m1".to_string(),
            final_prompt: "cat".to_string(),
            common_prompt: String::new(),
        });
        let mut inputs = CardInputs {
            provider: ProviderKind::Fal,
            model: "m1".to_string(),
            final_prompt: "cat".to_string(),
            common_prompt: "  ".to_string(),
        };
        assert!(!card.is_dirty(&inputs));
        inputs.model = "m2".to_string();
        assert!(card.is_dirty(&inputs));

        card.status = CardStatus::Error;
        assert!(!card.is_dirty(&inputs));
    }

    #[test]
    fn test_current_inputs_follow_card_overrides() {
        let mut config = StudioConfig::default();
        config.common_prompt = "style".to_string();
        let mut card = Card::new("cat");
        card.provider = Some(ProviderKind::Google);
        card.model = "gemini-x".to_string();

        let inputs = CardInputs::current(&card, &config).unwrap();
        assert_eq!(inputs.provider, ProviderKind::Google);
        assert_eq!(inputs.model, "gemini-x");
        assert_eq!(inputs.final_prompt, "style\n\ncat");
    }

    #[test]
    fn test_recover_interrupted() {
        let mut card = Card::new("cat");
        card.status = CardStatus::Generating;
        assert!(card.recover_interrupted());
        assert_eq!(card.status, CardStatus::Error);
        assert_eq!(card.error_message, INTERRUPTED_MESSAGE);
        assert!(!card.recover_interrupted());
    }

    #[test]
    fn test_status_summary() {
        let mut cards = vec![Card::new("a"), Card::new("b"), Card::new("c")];
        cards[0].status = CardStatus::Success;
        cards[1].status = CardStatus::Error;
        let summary = StatusSummary::from_cards(&cards);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.to_string(), "3 cards | done 1 | generating 0 | error 1");
        assert_eq!(StatusSummary::from_cards(&Vec::<Card>::new()).to_string(), "Ready");
    }
}
