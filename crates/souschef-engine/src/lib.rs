pub mod config;
pub mod gemini;
pub mod generator;
pub mod media;
pub mod prompts;
pub mod providers;
pub mod vector;

use std::fs;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use souschef_contracts::candidates::{
    derive_missing_ingredients, parse_json_payload, Candidate, CandidateSet, ChefCard,
    DishCandidate, PassportBatch, PlanCandidate, QuoteCandidate, RecipeCandidate,
};
use souschef_contracts::errors::{FieldError, GenerationError};
use souschef_contracts::events::{EventPayload, EventWriter};
use souschef_contracts::flow::{GeneratorFlow, GeneratorState};
use souschef_contracts::history::{passport_key, HistoryCategory, HistoryLedger};
use souschef_contracts::models::{Capability, ModelSelector};
use souschef_contracts::preferences::{PassportRequest, PlanPreferences, PreferenceInput};
use souschef_contracts::selection::select_unique;
use souschef_contracts::shopping::ShoppingList;
use souschef_contracts::storage::{LocalStore, SessionFlags, API_KEY};

use crate::config::{env_api_key, EngineConfig};
use crate::gemini::GeminiProvider;
use crate::generator::{
    parse_candidates, run_stage2, SelectionRequest, StageOne, PASSPORT_STAGE1_ATTEMPTS,
    RECIPE_STAGE1_ATTEMPTS,
};
use crate::media::MediaAugmenter;
use crate::prompts::{
    chef_card_speech, dish_image_prompt, passport_batch_prompt, plan_batch_prompt,
    plan_image_prompt, recipe_batch_prompt, recipe_image_prompt,
};
use crate::providers::{ContentProvider, DryrunProvider, TextPurpose, TextRequest};
use crate::vector::{
    load_catalog, seed_catalog, BigQueryIndex, BigQueryTable, InMemoryIndex, RecipeHit,
    RecipeIndex, DEFAULT_TOP_K,
};

pub const PASSPORT_RECOMMENDATIONS: usize = 3;

const BATCH_TEMPERATURE: f32 = 0.9;

/// Turns a `json!({...})` literal into an event payload.
pub(crate) fn event_fields(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Recipe,
    Plan,
    Passport,
}

impl FlowKind {
    pub fn label(self) -> &'static str {
        match self {
            FlowKind::Recipe => "recipe",
            FlowKind::Plan => "plan",
            FlowKind::Passport => "passport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModels {
    pub text: String,
    pub image: String,
    pub audio: String,
    pub embedding: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeArtifact {
    pub recipe: RecipeCandidate,
    pub quote: Option<QuoteCandidate>,
    /// `data:<mime>;base64,...`
    pub image: Option<String>,
    pub shopping_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanArtifact {
    pub plan: PlanCandidate,
    pub image: Option<String>,
    pub sources: Vec<RecipeHit>,
    pub shopping_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub dish: DishCandidate,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassportArtifact {
    pub destination: String,
    pub recommendations: Vec<Recommendation>,
    pub chef_card: ChefCard,
    pub audio: Option<String>,
}

pub fn provider_for(
    config: &EngineConfig,
    api_key: Option<String>,
) -> Result<Box<dyn ContentProvider>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiProvider::new(
            &config.gemini_api_base,
            api_key,
            &config.voice,
            config.request_timeout,
        ))),
        "dryrun" => Ok(Box::new(DryrunProvider)),
        other => bail!("unknown provider '{other}' (expected gemini or dryrun)"),
    }
}

/// Persisted state plus the three generators.
pub struct Kitchen {
    config: EngineConfig,
    events: EventWriter,
    store: LocalStore,
    history: HistoryLedger,
    session: SessionFlags,
    provider: Box<dyn ContentProvider>,
    /// Rebuilt when the stored API key changes.
    managed_provider: bool,
    index: Option<Box<dyn RecipeIndex>>,
    index_loaded: bool,
    models: ResolvedModels,
    warnings: Vec<String>,
    recipe_flow: GeneratorFlow,
    plan_flow: GeneratorFlow,
    passport_flow: GeneratorFlow,
}

impl Kitchen {
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = LocalStore::new(config.storage_path());
        let api_key = store.get_string(API_KEY).or_else(env_api_key);
        let provider = provider_for(&config, api_key)?;
        let mut kitchen = Self::with_provider(config, provider, None)?;
        kitchen.managed_provider = true;
        Ok(kitchen)
    }

    /// Uses `provider` as-is; `index` replaces the configured recipe index.
    pub fn with_provider(
        config: EngineConfig,
        provider: Box<dyn ContentProvider>,
        index: Option<Box<dyn RecipeIndex>>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(config.events_path(), session_id);
        let mut warnings = Vec::new();
        let models = resolve_models(&config, &mut warnings)?;

        events.emit(
            "session_started",
            event_fields(json!({
                "provider": config.provider,
                "data_dir": config.data_dir.to_string_lossy().to_string(),
                "models": models,
            })),
        )?;

        let index_loaded = index.is_some();
        Ok(Self {
            store: LocalStore::new(config.storage_path()),
            history: HistoryLedger::new(config.storage_path()),
            session: SessionFlags::new(config.session_path()),
            events,
            provider,
            managed_provider: false,
            index,
            index_loaded,
            models,
            warnings,
            recipe_flow: GeneratorFlow::new(),
            plan_flow: GeneratorFlow::new(),
            passport_flow: GeneratorFlow::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn models(&self) -> &ResolvedModels {
        &self.models
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    /// Model fallbacks and degraded lookups gathered so far.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn api_key(&self) -> Option<String> {
        self.store.get_string(API_KEY).or_else(env_api_key)
    }

    pub fn has_stored_api_key(&self) -> bool {
        self.store.get_string(API_KEY).is_some()
    }

    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            bail!("API key must be a single non-empty token");
        }
        self.store.set(API_KEY, Value::String(key.to_string()))?;
        self.refresh_provider()
    }

    pub fn clear_api_key(&mut self) -> Result<()> {
        self.store.remove(API_KEY)?;
        self.refresh_provider()
    }

    fn refresh_provider(&mut self) -> Result<()> {
        if self.managed_provider {
            let api_key = self.api_key();
            self.provider = provider_for(&self.config, api_key)?;
        }
        Ok(())
    }

    pub fn history(&mut self, category: HistoryCategory) -> Vec<String> {
        self.history.list(category)
    }

    pub fn clear_history(&mut self, category: HistoryCategory) -> Result<()> {
        self.history.clear(category)
    }

    pub fn mark_verified(&mut self) -> Result<()> {
        self.session.mark_verified(Utc::now())
    }

    pub fn is_verified(&mut self) -> bool {
        self.session.is_verified(Utc::now())
    }

    pub fn flow_state(&self, kind: FlowKind) -> &GeneratorState {
        match kind {
            FlowKind::Recipe => self.recipe_flow.state(),
            FlowKind::Plan => self.plan_flow.state(),
            FlowKind::Passport => self.passport_flow.state(),
        }
    }

    /// "Generate another": the shown artifact is dropped by the caller and
    /// the generator returns to `Idle`.
    pub fn reset_flow(&mut self, kind: FlowKind) {
        self.flow_mut(kind).reset();
    }

    fn flow_mut(&mut self, kind: FlowKind) -> &mut GeneratorFlow {
        match kind {
            FlowKind::Recipe => &mut self.recipe_flow,
            FlowKind::Plan => &mut self.plan_flow,
            FlowKind::Passport => &mut self.passport_flow,
        }
    }

    fn submit<T, F>(&mut self, kind: FlowKind, run: F) -> Result<T, GenerationError>
    where
        F: FnOnce(&mut Self) -> Result<T, GenerationError>,
    {
        self.flow_mut(kind).begin()?;
        let outcome = run(self);
        match &outcome {
            Ok(_) => self.flow_mut(kind).succeed(),
            Err(err) => {
                self.flow_mut(kind).fail(err);
                self.events.note(
                    "generation_failed",
                    event_fields(json!({
                        "flow": kind.label(),
                        "kind": err.kind(),
                        "error": err.to_string(),
                    })),
                );
            }
        }
        outcome
    }

    /// Field validation, credential and verification gates, in that order.
    fn preflight(
        &mut self,
        kind: FlowKind,
        validation: Result<(), FieldError>,
    ) -> Result<(), GenerationError> {
        let rejection = if let Err(err) = validation {
            Some(GenerationError::Validation(err))
        } else if !self.provider.credential_ready() {
            Some(GenerationError::MissingCredential)
        } else if self.config.require_verification && !self.session.is_verified(Utc::now()) {
            Some(GenerationError::VerificationRequired)
        } else {
            None
        };
        if let Some(err) = rejection {
            let field = match &err {
                GenerationError::Validation(field_error) => {
                    Value::String(field_error.field.to_string())
                }
                _ => Value::Null,
            };
            self.events.note(
                "submission_rejected",
                event_fields(json!({
                    "flow": kind.label(),
                    "reason": err.kind(),
                    "field": field,
                })),
            );
            return Err(err);
        }
        if self.config.require_verification {
            if let Err(err) = self.session.touch(Utc::now()) {
                self.events.note(
                    "session_touch_failed",
                    event_fields(json!({
                        "flow": kind.label(),
                        "error": format!("{err:#}"),
                    })),
                );
            }
        }
        Ok(())
    }

    fn stage_one(&self, attempts: usize) -> StageOne<'_> {
        StageOne {
            provider: self.provider.as_ref(),
            events: &self.events,
            attempts,
            backoff: self.config.retry_backoff,
        }
    }

    fn augmenter(&self) -> MediaAugmenter<'_> {
        MediaAugmenter::new(
            self.provider.as_ref(),
            &self.models.image,
            &self.models.audio,
            &self.events,
        )
        .with_retry_policy(self.config.media_attempts, self.config.retry_backoff)
    }

    fn note_candidates(&self, kind: FlowKind, count: usize) {
        self.events.note(
            "candidates_generated",
            event_fields(json!({ "flow": kind.label(), "count": count })),
        );
    }

    /// Ledger writes happen after the result exists; a failed write is
    /// logged and the result is still returned.
    fn record_history(&mut self, category: HistoryCategory, keys: &[String]) {
        let outcome = self.history.record_all(category, keys);
        let mut payload = event_fields(json!({
            "category": category.label(),
            "keys": keys,
            "ok": outcome.is_ok(),
        }));
        if let Err(err) = outcome {
            payload.insert("error".to_string(), Value::String(format!("{err:#}")));
            self.warnings
                .push(format!("could not update {} history: {err:#}", category.label()));
        }
        self.events.note("history_recorded", payload);
    }

    pub fn generate_recipe(
        &mut self,
        input: &PreferenceInput,
    ) -> Result<RecipeArtifact, GenerationError> {
        self.submit(FlowKind::Recipe, |kitchen| kitchen.run_recipe(input))
    }

    fn run_recipe(&mut self, input: &PreferenceInput) -> Result<RecipeArtifact, GenerationError> {
        self.preflight(FlowKind::Recipe, input.validate())?;

        let prompt = recipe_batch_prompt(input);
        let request = TextRequest {
            model: &self.models.text,
            prompt: &prompt,
            purpose: TextPurpose::RecipeBatch,
            image: input.image.as_ref().filter(|image| !image.is_empty()),
            temperature: BATCH_TEMPERATURE,
        };
        let (recipes, quotes) = self.stage_one(RECIPE_STAGE1_ATTEMPTS).run(&request, |text| {
            let recipes = parse_candidates::<RecipeCandidate>(text, "recipes")?;
            let quotes = parse_candidates::<QuoteCandidate>(text, "quotes").ok();
            Ok((recipes, quotes))
        })?;
        self.note_candidates(FlowKind::Recipe, recipes.len());

        let seen_titles = self.history.list(HistoryCategory::RecipeTitles);
        let keys = recipes.identities();
        let picks = run_stage2(
            self.provider.as_ref(),
            &self.models.text,
            &SelectionRequest {
                kind: "recipe",
                keys: &keys,
                history: &seen_titles,
                count: 1,
            },
            &self.events,
        );
        let mut recipe = take_candidate(recipes, picks.first().copied().unwrap_or_default())?;
        recipe.missing_ingredients =
            derive_missing_ingredients(&recipe.ingredients, &input.available_ingredients());

        let quote = match quotes {
            Some(quotes) => {
                let seen_quotes = self.history.list(HistoryCategory::Quotes);
                let selection = select_unique(quotes.items(), &seen_quotes);
                quotes.into_items().into_iter().nth(selection.index)
            }
            None => None,
        };

        let image = self
            .augmenter()
            .render_image("recipe", &recipe_image_prompt(&recipe.name, &recipe.description))
            .map(|asset| asset.data_uri());
        let shopping_list = ShoppingList::from_items(recipe.missing_ingredients.clone());

        self.record_history(HistoryCategory::RecipeTitles, &[recipe.name.clone()]);
        if let Some(quote) = &quote {
            self.record_history(HistoryCategory::Quotes, &[quote.text.clone()]);
        }

        Ok(RecipeArtifact {
            recipe,
            quote,
            image,
            shopping_list: shopping_list.items().into_iter().map(str::to_string).collect(),
        })
    }

    pub fn generate_plan(
        &mut self,
        preferences: &PlanPreferences,
    ) -> Result<PlanArtifact, GenerationError> {
        self.submit(FlowKind::Plan, |kitchen| kitchen.run_plan(preferences))
    }

    fn run_plan(&mut self, preferences: &PlanPreferences) -> Result<PlanArtifact, GenerationError> {
        self.preflight(FlowKind::Plan, preferences.validate())?;

        let sources = self.retrieve_recipes(&preferences.search_text());
        let prompt = plan_batch_prompt(preferences, &sources);
        let request = TextRequest {
            model: &self.models.text,
            prompt: &prompt,
            purpose: TextPurpose::PlanBatch,
            image: None,
            temperature: BATCH_TEMPERATURE,
        };
        let plans = self
            .stage_one(self.config.plan_attempts)
            .run(&request, |text| parse_candidates::<PlanCandidate>(text, "plans"))?;
        self.note_candidates(FlowKind::Plan, plans.len());

        let seen = self.history.list(HistoryCategory::PlanTitles);
        let keys = plans.identities();
        let picks = run_stage2(
            self.provider.as_ref(),
            &self.models.text,
            &SelectionRequest {
                kind: "weekly plan",
                keys: &keys,
                history: &seen,
                count: 1,
            },
            &self.events,
        );
        let plan = take_candidate(plans, picks.first().copied().unwrap_or_default())?;
        let image = self
            .augmenter()
            .render_image("plan", &plan_image_prompt(&plan.title, &plan.summary))
            .map(|asset| asset.data_uri());
        let shopping_list = ShoppingList::from_items(plan.shopping_list.clone());

        self.record_history(HistoryCategory::PlanTitles, &[plan.title.clone()]);

        Ok(PlanArtifact {
            plan,
            image,
            sources,
            shopping_list: shopping_list.items().into_iter().map(str::to_string).collect(),
        })
    }

    /// Vector search is context, not a requirement: any failure is logged and
    /// the plan is generated without retrieved recipes.
    fn retrieve_recipes(&mut self, search_text: &str) -> Vec<RecipeHit> {
        match self.try_retrieve(search_text) {
            Ok(hits) => hits,
            Err(err) => {
                self.events.note(
                    "vector_search_failed",
                    event_fields(json!({ "error": format!("{err:#}") })),
                );
                self.warnings
                    .push(format!("recipe search unavailable, planning without it: {err:#}"));
                Vec::new()
            }
        }
    }

    fn try_retrieve(&mut self, search_text: &str) -> Result<Vec<RecipeHit>> {
        if !self.index_loaded {
            // Left unset on failure so the next plan tries again.
            self.index = self.build_index()?;
            self.index_loaded = true;
        }
        let Some(index) = self.index.as_ref() else {
            return Ok(Vec::new());
        };
        let embedding = self
            .provider
            .embed(&self.models.embedding, search_text)
            .context("failed to embed plan preferences")?;
        index
            .search(&embedding, DEFAULT_TOP_K)
            .with_context(|| format!("{} recipe search failed", index.name()))
    }

    fn build_index(&self) -> Result<Option<Box<dyn RecipeIndex>>> {
        if let Some(bigquery) = &self.config.bigquery {
            let table = BigQueryTable::parse(&bigquery.project, &bigquery.table)?;
            return Ok(Some(Box::new(BigQueryIndex::new(
                &bigquery.api_base,
                table,
                &bigquery.access_token,
                self.config.request_timeout,
            ))));
        }
        let catalog = match &self.config.catalog_path {
            Some(path) => load_catalog(path)?,
            None if self.config.provider == "dryrun" => seed_catalog(),
            None => return Ok(None),
        };
        let index = InMemoryIndex::build(catalog, self.provider.as_ref(), &self.models.embedding)?;
        Ok(Some(Box::new(index)))
    }

    pub fn generate_passport(
        &mut self,
        request: &PassportRequest,
    ) -> Result<PassportArtifact, GenerationError> {
        self.submit(FlowKind::Passport, |kitchen| kitchen.run_passport(request))
    }

    fn run_passport(
        &mut self,
        request: &PassportRequest,
    ) -> Result<PassportArtifact, GenerationError> {
        self.preflight(FlowKind::Passport, request.validate())?;
        let destination = request.destination.trim().to_string();

        let prompt = passport_batch_prompt(request);
        let text_request = TextRequest {
            model: &self.models.text,
            prompt: &prompt,
            purpose: TextPurpose::PassportBatch,
            image: None,
            temperature: BATCH_TEMPERATURE,
        };
        let (dishes, chef_card) =
            self.stage_one(PASSPORT_STAGE1_ATTEMPTS)
                .run(&text_request, |text| {
                    let batch: PassportBatch = parse_json_payload(text)?;
                    Ok((CandidateSet::from_vec(batch.dishes)?, batch.chef_card))
                })?;
        self.note_candidates(FlowKind::Passport, dishes.len());

        let seen = self.history.list(HistoryCategory::PassportDishes);
        let keys: Vec<String> = dishes
            .items()
            .iter()
            .map(|dish| passport_key(&destination, &dish.name))
            .collect();
        let picks = run_stage2(
            self.provider.as_ref(),
            &self.models.text,
            &SelectionRequest {
                kind: "dish",
                keys: &keys,
                history: &seen,
                count: PASSPORT_RECOMMENDATIONS,
            },
            &self.events,
        );
        let chosen: Vec<DishCandidate> = dishes
            .into_items()
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| picks.contains(idx))
            .map(|(_, dish)| dish)
            .collect();

        let image_prompts: Vec<(String, String)> = chosen
            .iter()
            .enumerate()
            .map(|(idx, dish)| (format!("dish-{idx}"), dish_image_prompt(&destination, dish)))
            .collect();
        let speech = chef_card_speech(&chef_card);
        let (images, audio) = self.augmenter().render_batch(
            &image_prompts,
            Some(("chef_card", speech.as_str())).filter(|_| !speech.is_empty()),
        );

        let recorded: Vec<String> = chosen
            .iter()
            .map(|dish| passport_key(&destination, &dish.name))
            .collect();
        self.record_history(HistoryCategory::PassportDishes, &recorded);

        let recommendations = chosen
            .into_iter()
            .zip(images)
            .map(|(dish, image)| Recommendation {
                dish,
                image: image.map(|asset| asset.data_uri()),
            })
            .collect();
        Ok(PassportArtifact {
            destination,
            recommendations,
            chef_card,
            audio: audio.map(|asset| asset.data_uri()),
        })
    }
}

fn take_candidate<T: Candidate>(
    set: CandidateSet<T>,
    index: usize,
) -> Result<T, GenerationError> {
    let available = set.len();
    set.into_items()
        .into_iter()
        .nth(index)
        .ok_or_else(|| GenerationError::Overloaded {
            attempts: 1,
            detail: format!("selection {index} is outside a batch of {available}"),
        })
}

fn resolve_models(config: &EngineConfig, warnings: &mut Vec<String>) -> Result<ResolvedModels> {
    let selector = ModelSelector::default();
    let mut pick = |requested: Option<&String>, capability: Capability| -> Result<String> {
        let selection =
            selector.select(requested.map(String::as_str), capability, &config.provider)?;
        if let Some(reason) = selection.fallback_reason {
            warnings.push(format!("{reason}; using '{}'", selection.model.name));
        }
        Ok(selection.model.name)
    };
    Ok(ResolvedModels {
        text: pick(config.models.text.as_ref(), Capability::Text)?,
        image: pick(config.models.image.as_ref(), Capability::Image)?,
        audio: pick(config.models.audio.as_ref(), Capability::Audio)?,
        embedding: pick(config.models.embedding.as_ref(), Capability::Embedding)?,
    })
}
