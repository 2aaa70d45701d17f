//! Generate-then-select.
//!
//! Stage 1 asks for a batch of candidates; stage 2 asks the model which of
//! them the user has not seen yet and checks the answer against the
//! deterministic heuristic in `souschef_contracts::selection`.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use souschef_contracts::candidates::{parse_json_payload, Candidate, CandidateSet};
use souschef_contracts::errors::{GenerationError, ProviderError};
use souschef_contracts::events::EventWriter;
use souschef_contracts::selection::is_seen;

use crate::event_fields;
use crate::prompts::selection_prompt;
use crate::providers::{ContentProvider, TextPurpose, TextRequest};

pub const RECIPE_STAGE1_ATTEMPTS: usize = 1;
pub const PLAN_STAGE1_ATTEMPTS: usize = 3;
pub const PASSPORT_STAGE1_ATTEMPTS: usize = 1;

const SELECTION_TEMPERATURE: f32 = 0.0;

/// Reads the array stored under `field` into a candidate set. A bare
/// top-level array is accepted when no object carries that field.
pub fn parse_candidates<T>(text: &str, field: &str) -> Result<CandidateSet<T>>
where
    T: Candidate + DeserializeOwned,
{
    let rows = candidate_rows(text, field)?;
    let items: Vec<T> = serde_json::from_value(rows)
        .with_context(|| format!("model output has no usable '{field}' list"))?;
    CandidateSet::from_vec(items)
}

fn candidate_rows(text: &str, field: &str) -> Result<Value> {
    if let Ok(mut payload) = parse_json_payload::<Value>(text) {
        if let Some(rows) = payload.get_mut(field) {
            return Ok(rows.take());
        }
    }
    let trimmed = text.trim();
    match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .context("model output is not a JSON array"),
        _ => bail!("model output has no '{field}' list"),
    }
}

pub struct StageOne<'a> {
    pub provider: &'a dyn ContentProvider,
    pub events: &'a EventWriter,
    pub attempts: usize,
    pub backoff: Duration,
}

impl StageOne<'_> {
    /// Sends `request` until `parse` accepts the answer. Transient provider
    /// errors and unparseable answers are retried up to `attempts`; safety
    /// and credential errors end the loop at once.
    pub fn run<T, F>(&self, request: &TextRequest<'_>, parse: F) -> Result<T, GenerationError>
    where
        F: Fn(&str) -> Result<T>,
    {
        let attempts = self.attempts.max(1);
        let mut last_error = ProviderError::Transient("no attempt made".to_string());
        for attempt in 1..=attempts {
            self.events.note(
                "stage1_attempt",
                event_fields(json!({
                    "purpose": request.purpose.label(),
                    "model": request.model,
                    "attempt": attempt,
                    "max_attempts": attempts,
                })),
            );
            let outcome = self
                .provider
                .generate_text(request)
                .and_then(|text| {
                    parse(&text).map_err(|err| {
                        ProviderError::Transient(format!("unusable model output: {err:#}"))
                    })
                });
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.events.note(
                        "stage1_failed",
                        event_fields(json!({
                            "purpose": request.purpose.label(),
                            "attempt": attempt,
                            "retryable": err.is_retryable(),
                            "error": err.to_string(),
                        })),
                    );
                    if !err.is_retryable() {
                        return Err(GenerationError::from_provider(err, attempt));
                    }
                    last_error = err;
                }
            }
            if attempt < attempts {
                thread::sleep(self.backoff * attempt as u32);
            }
        }
        Err(GenerationError::from_provider(last_error, attempts))
    }
}

/// What stage 2 chooses among.
pub struct SelectionRequest<'a> {
    /// Human-readable noun for the prompt, e.g. "recipe".
    pub kind: &'a str,
    /// Ledger key of every candidate, in batch order.
    pub keys: &'a [String],
    pub history: &'a [String],
    pub count: usize,
}

#[derive(Debug, Deserialize)]
struct SelectionAnswer {
    #[serde(default, alias = "index")]
    indices: IndexList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum IndexList {
    Many(Vec<i64>),
    One(i64),
    #[default]
    Missing,
}

impl IndexList {
    fn into_vec(self) -> Vec<i64> {
        match self {
            Self::Many(values) => values,
            Self::One(value) => vec![value],
            Self::Missing => Vec::new(),
        }
    }
}

/// Stage 2. Always yields `min(count, keys.len())` sorted indices; a failed
/// or unusable model answer falls back to the deterministic choice.
pub fn run_stage2(
    provider: &dyn ContentProvider,
    model: &str,
    request: &SelectionRequest<'_>,
    events: &EventWriter,
) -> Vec<usize> {
    if request.history.is_empty() {
        let picks: Vec<usize> = (0..request.count.min(request.keys.len())).collect();
        note_selected(events, request, &picks, "first");
        return picks;
    }

    let prompt = selection_prompt(request.kind, request.keys, request.history, request.count);
    let answer = provider
        .generate_text(&TextRequest {
            model,
            prompt: &prompt,
            purpose: TextPurpose::Selection,
            image: None,
            temperature: SELECTION_TEMPERATURE,
        })
        .map_err(|err| err.to_string())
        .and_then(|text| {
            parse_json_payload::<SelectionAnswer>(&text).map_err(|err| format!("{err:#}"))
        });

    let answered = answer.is_ok();
    let proposed = match answer {
        Ok(answer) => answer.indices.into_vec(),
        Err(error) => {
            events.note(
                "stage2_fallback",
                event_fields(json!({
                    "kind": request.kind,
                    "reason": "request_failed",
                    "error": error,
                })),
            );
            Vec::new()
        }
    };
    let (picks, rejected) = reconcile_selection(&proposed, request);
    if rejected && answered {
        events.note(
            "stage2_fallback",
            event_fields(json!({
                "kind": request.kind,
                "reason": "answer_rejected",
                "proposed": proposed,
            })),
        );
    }
    note_selected(events, request, &picks, "model");
    picks
}

/// Keeps model picks that are in range, distinct and unseen, then tops up
/// with unseen candidates and finally seen ones, in batch order. The flag
/// reports whether any proposed index was discarded or missing.
pub fn reconcile_selection(proposed: &[i64], request: &SelectionRequest<'_>) -> (Vec<usize>, bool) {
    let wanted = request.count.min(request.keys.len());
    let mut picks: Vec<usize> = Vec::with_capacity(wanted);
    let mut rejected = proposed.is_empty();
    for &raw in proposed {
        let accepted = usize::try_from(raw)
            .ok()
            .filter(|idx| *idx < request.keys.len())
            .filter(|idx| !picks.contains(idx))
            .filter(|idx| !is_seen(&request.keys[*idx], request.history));
        match accepted {
            Some(idx) if picks.len() < wanted => picks.push(idx),
            Some(_) => {}
            None => rejected = true,
        }
    }
    if picks.len() < wanted {
        rejected = true;
        let (fresh, seen): (Vec<usize>, Vec<usize>) = (0..request.keys.len())
            .filter(|idx| !picks.contains(idx))
            .partition(|idx| !is_seen(&request.keys[*idx], request.history));
        picks.extend(fresh.into_iter().chain(seen).take(wanted - picks.len()));
    }
    picks.sort_unstable();
    (picks, rejected)
}

fn note_selected(events: &EventWriter, request: &SelectionRequest<'_>, picks: &[usize], via: &str) {
    let keys: Vec<&str> = picks
        .iter()
        .filter_map(|idx| request.keys.get(*idx).map(String::as_str))
        .collect();
    events.note(
        "candidate_selected",
        event_fields(json!({
            "kind": request.kind,
            "indices": picks,
            "keys": keys,
            "via": via,
            "history_len": request.history.len(),
        })),
    );
}
