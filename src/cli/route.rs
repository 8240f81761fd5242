//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::capability::{CapabilityResolver, RequirementTracker};
use crate::card::Card;
use crate::catalog::{fetch_fal_models, fetch_google_models};
use crate::cli::command_name;
use crate::cli::parse::{CardCommands, Commands, ReferenceArgs, RunOverrides};
use crate::cli::presentation::{
    format_batch_report_json, format_batch_report_text, format_card_detail_text,
    format_card_list_json, format_card_list_text, format_models_json, format_models_text,
    format_providers_json, format_providers_text, format_requirement_json,
    format_requirement_text, status_label,
};
use crate::config::{ConfigLoader, FileSettingsStore, SettingsStore, StudioConfig};
use crate::error::GenerationError;
use crate::provider::http::build_provider_http_client;
use crate::provider::{ProviderKind, ProviderRegistry};
use crate::reference::ReferenceImage;
use crate::scheduler::{
    BatchReport, GenerationScheduler, MessageLevel, SchedulerContext, SchedulerEvent,
};
use crate::store::SledCardStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runtime context for CLI execution: settings, data directory and the card store.
pub struct RunContext {
    config: StudioConfig,
    data_dir: PathBuf,
    store: Arc<SledCardStore>,
}

impl RunContext {
    /// Create run context from an optional config path and data directory override.
    pub fn new(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self, GenerationError> {
        let mut config = match &config_path {
            Some(path) => FileSettingsStore::new(path).load()?,
            None => ConfigLoader::load()?,
        };
        if let Some(dir) = data_dir {
            config.storage.data_dir = Some(dir);
        }
        if let Err(problems) = config.validate() {
            return Err(GenerationError::Config(problems.join("; ")));
        }

        let data_dir = config.storage.resolve_data_dir();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            GenerationError::Config(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        let store = Arc::new(SledCardStore::new(config.storage.cards_path())?);
        debug!(data_dir = %data_dir.display(), "Run context ready");

        Ok(Self {
            config,
            data_dir,
            store,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, GenerationError> {
        let started = Instant::now();
        let name = command_name(command);
        info!(command = %name, "Executing command");
        let result = self.execute_inner(command);
        info!(
            command = %name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, GenerationError> {
        match command {
            Commands::Generate {
                prompts,
                file,
                overrides,
                reference,
                format,
            } => {
                let batch_text = match (prompts, file) {
                    (Some(text), _) => Some(text.clone()),
                    (None, Some(path)) => Some(std::fs::read_to_string(path).map_err(|e| {
                        GenerationError::Validation(format!(
                            "Failed to read prompt file {}: {}",
                            path.display(),
                            e
                        ))
                    })?),
                    (None, None) => None,
                };
                self.handle_batch(overrides, reference, format, |scheduler| async move {
                    scheduler.generate_all(batch_text.as_deref()).await
                })
            }
            Commands::RetryFailed {
                overrides,
                reference,
                format,
            } => self.handle_batch(overrides, reference, format, |scheduler| async move {
                scheduler.regenerate_failed().await
            }),
            Commands::Regenerate {
                id,
                overrides,
                reference,
            } => self.handle_regenerate(id, overrides, reference),
            Commands::Cards { command } => self.handle_cards(command),
            Commands::Requirement {
                overrides,
                refresh,
                format,
            } => self.handle_requirement(overrides, *refresh, format),
            Commands::Models { provider, format } => self.handle_models(provider.as_deref(), format),
            Commands::Providers { format } => Ok(match format.as_str() {
                "json" => format_providers_json(&self.config),
                _ => format_providers_text(&self.config),
            }),
        }
    }

    fn runtime() -> Result<Runtime, GenerationError> {
        Runtime::new().map_err(|e| GenerationError::Unknown(format!("Failed to create runtime: {}", e)))
    }

    fn config_with(&self, overrides: &RunOverrides) -> Result<StudioConfig, GenerationError> {
        let mut config = self.config.clone();
        if let Some(provider) = &overrides.provider {
            config.active_provider = provider.parse()?;
        }
        if let Some(model) = overrides.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            config.set_model_for(config.active_provider, model);
        }
        if let Some(concurrency) = overrides.concurrency {
            config.concurrency = concurrency;
        }
        Ok(config)
    }

    fn tracker(&self, config: &StudioConfig) -> Result<Arc<RequirementTracker>, GenerationError> {
        let resolver = CapabilityResolver::new(build_provider_http_client()?);
        Ok(Arc::new(RequirementTracker::with_cache_file(
            Arc::new(resolver),
            config.storage.requirement_cache_path(),
            config,
        )))
    }

    fn scheduler(&self, config: StudioConfig) -> Result<GenerationScheduler, GenerationError> {
        let tracker = self.tracker(&config)?;
        let scheduler = GenerationScheduler::load(SchedulerContext {
            config,
            store: self.store.clone(),
            providers: Arc::new(ProviderRegistry::new()?),
            tracker,
        })?;
        Ok(scheduler)
    }

    fn reference_image(reference: &ReferenceArgs) -> Result<Option<ReferenceImage>, GenerationError> {
        match (&reference.reference_url, &reference.reference_file) {
            (_, Some(path)) => ReferenceImage::from_file(path).map(Some),
            (Some(url), None) => ReferenceImage::from_url(url).map(Some),
            (None, None) => Ok(None),
        }
    }

    fn handle_batch<F, Fut>(
        &self,
        overrides: &RunOverrides,
        reference: &ReferenceArgs,
        format: &str,
        run: F,
    ) -> Result<String, GenerationError>
    where
        F: FnOnce(GenerationScheduler) -> Fut,
        Fut: std::future::Future<Output = Result<BatchReport, GenerationError>>,
    {
        let scheduler = self.scheduler(self.config_with(overrides)?)?;
        scheduler.set_reference_image(Self::reference_image(reference)?);
        let config = scheduler.config();

        let runtime = Self::runtime()?;
        let report = runtime.block_on(async {
            let progress = spawn_progress_printer(&scheduler);
            let report = run(scheduler.clone()).await;
            progress.cancel();
            report
        })?;

        let cards = self.store_cards_for(&scheduler, &report);
        Ok(match format {
            "json" => format_batch_report_json(&report, &cards),
            _ => format_batch_report_text(&report, &cards, &config),
        })
    }

    /// Cards the batch queued, newest first
    fn store_cards_for(&self, scheduler: &GenerationScheduler, report: &BatchReport) -> Vec<Card> {
        scheduler
            .cards()
            .into_iter()
            .filter(|card| report.card_ids.contains(&card.id))
            .collect()
    }

    fn handle_regenerate(
        &self,
        card_id: &str,
        overrides: &RunOverrides,
        reference: &ReferenceArgs,
    ) -> Result<String, GenerationError> {
        let scheduler = self.scheduler(self.config_with(overrides)?)?;
        scheduler.set_reference_image(Self::reference_image(reference)?);
        let card_id = self.resolve_card_id(&scheduler, card_id)?;

        let runtime = Self::runtime()?;
        let card = runtime.block_on(scheduler.regenerate(&card_id))?;
        Ok(match card {
            Some(card) => format_card_detail_text(&card),
            None => "This card is already generating".to_string(),
        })
    }

    /// Accept a full id or an unambiguous prefix as printed by `cards list`.
    fn resolve_card_id(&self, scheduler: &GenerationScheduler, raw: &str) -> Result<String, GenerationError> {
        let raw = raw.trim();
        let matches: Vec<String> = scheduler
            .cards()
            .into_iter()
            .map(|card| card.id)
            .filter(|id| id == raw || id.starts_with(raw))
            .collect();
        match matches.as_slice() {
            [] => Err(GenerationError::Validation(format!("Card not found: {}", raw))),
            [only] => Ok(only.clone()),
            _ if matches.iter().any(|id| id == raw) => Ok(raw.to_string()),
            _ => Err(GenerationError::Validation(format!(
                "Card id prefix '{}' is ambiguous ({} matches)",
                raw,
                matches.len()
            ))),
        }
    }

    fn handle_cards(&self, command: &CardCommands) -> Result<String, GenerationError> {
        let scheduler = self.scheduler(self.config.clone())?;
        match command {
            CardCommands::List { format } => {
                let cards = scheduler.cards();
                Ok(match format.as_str() {
                    "json" => format_card_list_json(&cards),
                    _ => format_card_list_text(&cards, &self.config),
                })
            }
            CardCommands::Remove { id } => {
                let card_id = self.resolve_card_id(&scheduler, id)?;
                scheduler.remove_card(&card_id)?;
                Ok(format!("Removed card: {}", card_id))
            }
            CardCommands::Clear { yes } => {
                let count = scheduler.cards().len();
                if count == 0 {
                    return Ok("No cards to clear".to_string());
                }
                if !yes {
                    use dialoguer::Confirm;
                    let confirmed = Confirm::new()
                        .with_prompt(format!("Remove all {} cards?", count))
                        .interact()
                        .map_err(|e| GenerationError::Config(format!("Failed to get user input: {}", e)))?;
                    if !confirmed {
                        return Ok("Clear cancelled".to_string());
                    }
                }
                let removed = scheduler.clear_cards()?;
                Ok(format!("Removed {} cards", removed))
            }
        }
    }

    fn handle_requirement(
        &self,
        overrides: &RunOverrides,
        refresh: bool,
        format: &str,
    ) -> Result<String, GenerationError> {
        let config = self.config_with(overrides)?;
        let tracker = self.tracker(&config)?;
        let provider = config.active_provider;
        let model = config.active_model().to_string();

        let runtime = Self::runtime()?;
        let requirement = runtime.block_on(tracker.fetch(provider, &model, &config, refresh))?;
        Ok(match format {
            "json" => format_requirement_json(&requirement),
            _ => format_requirement_text(&requirement),
        })
    }

    fn handle_models(&self, provider: Option<&str>, format: &str) -> Result<String, GenerationError> {
        let provider = match provider {
            Some(raw) => raw.parse::<ProviderKind>()?,
            None => self.config.active_provider,
        };
        let http = build_provider_http_client()?;
        let cancel = CancellationToken::new();

        let runtime = Self::runtime()?;
        let models = runtime.block_on(async {
            match provider {
                ProviderKind::Fal => fetch_fal_models(&http, &self.config, &cancel).await,
                ProviderKind::Google => fetch_google_models(&http, &self.config, &cancel).await,
                ProviderKind::Firefly => Err(GenerationError::Validation(
                    "Adobe Firefly does not publish a model list".to_string(),
                )),
            }
        })?;
        Ok(match format {
            "json" => format_models_json(provider, &models),
            _ => format_models_text(provider, &models),
        })
    }
}

/// Print card transitions and scheduler messages to stderr while a batch runs.
fn spawn_progress_printer(scheduler: &GenerationScheduler) -> CancellationToken {
    let stop = CancellationToken::new();
    let mut events = scheduler.subscribe();
    let token = stop.clone();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(SchedulerEvent::CardUpdated(card)) => {
                    eprintln!(
                        "  [{}] {}",
                        status_label(card.status),
                        crate::cli::presentation::truncate(&card.prompt, 60)
                    );
                }
                Ok(SchedulerEvent::Message { level, text }) if level != MessageLevel::Success => {
                    eprintln!("{}", text);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
    stop
}
