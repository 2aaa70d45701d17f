//! Candidate records produced by stage 1 and the parsing of model output
//! into them.

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stage 1 asks for exactly this many candidates per batch.
pub const CANDIDATE_COUNT: usize = 5;

/// Anything the ledger can remember by a single identifying string.
pub trait Candidate {
    fn identity(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecipeCandidate {
    #[serde(alias = "title")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub instructions: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub ingredients: Vec<String>,
    #[serde(default, skip_deserializing)]
    pub missing_ingredients: Vec<String>,
    #[serde(default, alias = "nutritionInfo")]
    pub nutrition: String,
}

impl Candidate for RecipeCandidate {
    fn identity(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuoteCandidate {
    #[serde(alias = "quote")]
    pub text: String,
    #[serde(default)]
    pub author: String,
}

impl Candidate for QuoteCandidate {
    fn identity(&self) -> String {
        self.text.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlanDay {
    pub day: String,
    #[serde(default)]
    pub breakfast: String,
    #[serde(default)]
    pub lunch: String,
    #[serde(default)]
    pub dinner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanCandidate {
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub days: Vec<PlanDay>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub shopping_list: Vec<String>,
}

impl Candidate for PlanCandidate {
    fn identity(&self) -> String {
        self.title.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DishCandidate {
    pub name: String,
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub description: String,
}

impl Candidate for DishCandidate {
    fn identity(&self) -> String {
        self.name.clone()
    }
}

/// Dietary needs written out in the destination's language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChefCard {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub translation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeBatch {
    #[serde(default)]
    pub recipes: Vec<RecipeCandidate>,
    #[serde(default)]
    pub quotes: Vec<QuoteCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanBatch {
    #[serde(default)]
    pub plans: Vec<PlanCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportBatch {
    #[serde(default)]
    pub dishes: Vec<DishCandidate>,
    #[serde(default)]
    pub chef_card: ChefCard,
}

/// One stage-1 batch: between 1 and `CANDIDATE_COUNT` usable candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet<T> {
    items: Vec<T>,
}

impl<T: Candidate> CandidateSet<T> {
    /// Drops candidates without an identity and keeps the first five.
    pub fn from_vec(items: Vec<T>) -> anyhow::Result<Self> {
        let items: Vec<T> = items
            .into_iter()
            .filter(|item| !item.identity().trim().is_empty())
            .take(CANDIDATE_COUNT)
            .collect();
        if items.is_empty() {
            bail!("model returned no usable candidates");
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn identities(&self) -> Vec<String> {
        self.items.iter().map(Candidate::identity).collect()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parses a JSON object out of model text, tolerating markdown fences and
/// chatter around the object.
pub fn parse_json_payload<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let trimmed = text.trim();
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => bail!("model output contains no JSON object"),
    };
    serde_json::from_str(body).context("model output is not the expected JSON shape")
}

/// Ingredient lines that mention none of the available ingredients.
pub fn derive_missing_ingredients(ingredients: &[String], available: &[String]) -> Vec<String> {
    let stems: Vec<String> = available
        .iter()
        .map(|item| stem(&item.to_lowercase()))
        .filter(|item| !item.is_empty())
        .collect();
    let mut missing: Vec<String> = Vec::new();
    for line in ingredients {
        let lowered = line.to_lowercase();
        if lowered.trim().is_empty() {
            continue;
        }
        if stems.iter().any(|stem| lowered.contains(stem.as_str())) {
            continue;
        }
        if !missing.contains(line) {
            missing.push(line.clone());
        }
    }
    missing
}

fn stem(word: &str) -> String {
    let word = word.trim();
    if let Some(base) = word.strip_suffix("oes") {
        return format!("{base}o");
    }
    if word.len() > 3 {
        if let Some(base) = word.strip_suffix('s') {
            return base.to_string();
        }
    }
    word.to_string()
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(rows) => rows
            .into_iter()
            .filter_map(|row| match row {
                Value::String(text) => Some(text.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|text| !text.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}
