use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::providers::ContentProvider;

pub const DEFAULT_BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeHit {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Cosine distance to the query; smaller is closer.
    #[serde(default)]
    pub distance: f32,
}

/// Nearest-neighbour lookup over the recipe collection.
pub trait RecipeIndex: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RecipeHit>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigQueryTable {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl BigQueryTable {
    /// Accepts `dataset.table` or `project.dataset.table`.
    pub fn parse(default_project: &str, raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        let (project, dataset, table) = match parts.as_slice() {
            [dataset, table] => (default_project, *dataset, *table),
            [project, dataset, table] => (*project, *dataset, *table),
            _ => bail!("BigQuery table must look like dataset.table, got '{raw}'"),
        };
        for (label, value) in [("project", project), ("dataset", dataset), ("table", table)] {
            validate_identifier(label, value)?;
        }
        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    fn qualified(&self) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

fn validate_identifier(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("BigQuery {label} name is empty");
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        bail!("BigQuery {label} name '{value}' contains unsupported characters");
    }
    Ok(())
}

/// `VECTOR_SEARCH` over a warehouse table with an `embedding` column, run
/// through the synchronous `jobs.query` endpoint.
pub struct BigQueryIndex {
    api_base: String,
    table: BigQueryTable,
    access_token: String,
    timeout: Duration,
    http: HttpClient,
}

impl BigQueryIndex {
    pub fn new(
        api_base: &str,
        table: BigQueryTable,
        access_token: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            table,
            access_token: access_token.trim().to_string(),
            timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/projects/{}/queries", self.api_base, self.table.project)
    }

    pub(crate) fn query_sql(&self) -> String {
        format!(
            "SELECT base.title AS title, base.summary AS summary, base.ingredients AS ingredients, distance \
FROM VECTOR_SEARCH(TABLE {}, 'embedding', (SELECT @query_embedding AS embedding), \
top_k => @top_k, distance_type => 'COSINE') ORDER BY distance",
            self.table.qualified()
        )
    }

    pub(crate) fn request_payload(&self, embedding: &[f32], top_k: usize) -> Value {
        let values: Vec<Value> = embedding
            .iter()
            .map(|value| json!({ "value": value.to_string() }))
            .collect();
        json!({
            "query": self.query_sql(),
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "timeoutMs": self.timeout.as_millis() as u64,
            "queryParameters": [
                {
                    "name": "query_embedding",
                    "parameterType": { "type": "ARRAY", "arrayType": { "type": "FLOAT64" } },
                    "parameterValue": { "arrayValues": values }
                },
                {
                    "name": "top_k",
                    "parameterType": { "type": "INT64" },
                    "parameterValue": { "value": top_k.to_string() }
                }
            ]
        })
    }
}

impl RecipeIndex for BigQueryIndex {
    fn name(&self) -> &str {
        "bigquery"
    }

    fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RecipeHit>> {
        if self.access_token.is_empty() {
            bail!("BigQuery access token is not configured");
        }
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .json(&self.request_payload(embedding, top_k))
            .send()
            .context("BigQuery query request failed")?;
        let status = response.status();
        let body = response
            .text()
            .context("BigQuery response body read failed")?;
        if !status.is_success() {
            bail!("BigQuery query failed ({}): {}", status.as_u16(), body);
        }
        let payload: Value =
            serde_json::from_str(&body).context("BigQuery returned invalid JSON payload")?;
        parse_query_rows(&payload)
    }
}

/// Maps `jobs.query` rows onto hits using the schema's column names.
pub(crate) fn parse_query_rows(payload: &Value) -> Result<Vec<RecipeHit>> {
    if payload.get("jobComplete").and_then(Value::as_bool) == Some(false) {
        bail!("BigQuery query did not finish within the timeout");
    }
    let columns: Vec<String> = payload
        .get("schema")
        .and_then(|schema| schema.get("fields"))
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .map(|field| {
                    field
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default();
    let rows = payload
        .get("rows")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut hits = Vec::new();
    for row in rows {
        let cells = row
            .get("f")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut record = Map::new();
        for (column, cell) in columns.iter().zip(cells) {
            record.insert(column.clone(), cell.get("v").cloned().unwrap_or(Value::Null));
        }
        let title = cell_text(record.get("title"));
        if title.is_empty() {
            continue;
        }
        let ingredients = match record.get("ingredients") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| cell_text(item.get("v")))
                .filter(|item| !item.is_empty())
                .collect(),
            Some(Value::String(text)) => text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        hits.push(RecipeHit {
            title,
            summary: cell_text(record.get("summary")),
            ingredients,
            distance: cell_text(record.get("distance")).parse().unwrap_or(0.0),
        });
    }
    Ok(hits)
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecipe {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl CatalogRecipe {
    fn embedding_text(&self) -> String {
        format!("{}. {}. {}", self.title, self.summary, self.ingredients.join(", "))
    }
}

pub fn load_catalog(path: &Path) -> Result<Vec<CatalogRecipe>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read recipe catalog {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse recipe catalog {}", path.display()))
}

/// Small starter collection used when no catalog file is configured.
pub fn seed_catalog() -> Vec<CatalogRecipe> {
    let rows: [(&str, &str, &[&str]); 8] = [
        (
            "Red Lentil Dal",
            "Spiced lentils simmered with tomato and ginger",
            &["red lentils", "tomato", "ginger", "turmeric"],
        ),
        (
            "Chickpea Shakshuka",
            "Eggs poached in a smoky pepper and chickpea sauce",
            &["eggs", "chickpeas", "bell peppers", "paprika"],
        ),
        (
            "Lemon Herb Salmon",
            "Roasted salmon with lemon, dill and new potatoes",
            &["salmon", "lemon", "dill", "potatoes"],
        ),
        (
            "Tofu Veggie Stir Fry",
            "Crisp tofu with broccoli and snap peas in soy glaze",
            &["tofu", "broccoli", "snap peas", "soy sauce"],
        ),
        (
            "Mushroom Barley Risotto",
            "Creamy pearl barley with mushrooms and thyme",
            &["barley", "mushrooms", "thyme", "parmesan"],
        ),
        (
            "Black Bean Tacos",
            "Charred corn tortillas with black beans and lime slaw",
            &["black beans", "tortillas", "cabbage", "lime"],
        ),
        (
            "Greek Chicken Bowls",
            "Grilled chicken over rice with cucumber and feta",
            &["chicken", "rice", "cucumber", "feta"],
        ),
        (
            "Overnight Oats",
            "Oats soaked with yoghurt, berries and chia",
            &["oats", "yoghurt", "berries", "chia seeds"],
        ),
    ];
    rows.iter()
        .map(|(title, summary, ingredients)| CatalogRecipe {
            title: title.to_string(),
            summary: summary.to_string(),
            ingredients: ingredients.iter().map(|item| item.to_string()).collect(),
            embedding: None,
        })
        .collect()
}

/// Brute-force cosine index over a local catalog.
pub struct InMemoryIndex {
    entries: Vec<(CatalogRecipe, Vec<f32>)>,
}

impl InMemoryIndex {
    /// Embeds catalog rows that arrive without a stored embedding.
    pub fn build(
        catalog: Vec<CatalogRecipe>,
        provider: &dyn ContentProvider,
        embedding_model: &str,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(catalog.len());
        for recipe in catalog {
            let embedding = match recipe.embedding.clone() {
                Some(embedding) if !embedding.is_empty() => embedding,
                _ => provider
                    .embed(embedding_model, &recipe.embedding_text())
                    .with_context(|| format!("failed to embed catalog recipe '{}'", recipe.title))?,
            };
            entries.push((recipe, embedding));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RecipeIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "catalog"
    }

    fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RecipeHit>> {
        let mut hits: Vec<RecipeHit> = self
            .entries
            .iter()
            .filter(|(_, candidate)| candidate.len() == embedding.len())
            .map(|(recipe, candidate)| RecipeHit {
                title: recipe.title.clone(),
                summary: recipe.summary.clone(),
                ingredients: recipe.ingredients.clone(),
                distance: cosine_distance(embedding, candidate),
            })
            .collect();
        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(top_k);
        Ok(hits)
    }
}

pub fn cosine_distance(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm * right_norm)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::DryrunProvider;

    fn index() -> Result<BigQueryIndex> {
        Ok(BigQueryIndex::new(
            DEFAULT_BIGQUERY_API_BASE,
            BigQueryTable::parse("kitchen-prod", "recipes.catalog")?,
            "token",
            Duration::from_secs(30),
        ))
    }

    #[test]
    fn table_identifiers_are_validated() -> Result<()> {
        let table = BigQueryTable::parse("kitchen-prod", "recipes.catalog")?;
        assert_eq!(table.project, "kitchen-prod");
        let table = BigQueryTable::parse("ignored", "other.recipes.catalog")?;
        assert_eq!(table.project, "other");
        assert!(BigQueryTable::parse("p", "recipes").is_err());
        assert!(BigQueryTable::parse("p", "recipes.catalog`; DROP TABLE x").is_err());
        assert!(BigQueryTable::parse("p", "recipes..catalog").is_err());
        Ok(())
    }

    #[test]
    fn request_binds_named_parameters() -> Result<()> {
        let index = index()?;
        let payload = index.request_payload(&[0.5, -0.25], 3);
        let query = payload["query"].as_str().unwrap_or_default();
        assert!(query.contains("VECTOR_SEARCH(TABLE `kitchen-prod.recipes.catalog`, 'embedding'"));
        assert!(query.contains("@query_embedding"));
        assert_eq!(payload["parameterMode"], "NAMED");
        assert_eq!(
            payload["queryParameters"][0]["parameterValue"]["arrayValues"],
            json!([{ "value": "0.5" }, { "value": "-0.25" }])
        );
        assert_eq!(payload["queryParameters"][1]["parameterValue"]["value"], "3");
        assert_eq!(
            index.endpoint(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/kitchen-prod/queries"
        );
        Ok(())
    }

    #[test]
    fn parses_rows_through_schema_names() -> Result<()> {
        let payload = json!({
            "jobComplete": true,
            "schema": { "fields": [
                { "name": "title" },
                { "name": "summary" },
                { "name": "ingredients" },
                { "name": "distance" }
            ]},
            "rows": [
                { "f": [
                    { "v": "Red Lentil Dal" },
                    { "v": "Spiced lentils" },
                    { "v": [{ "v": "lentils" }, { "v": "ginger" }] },
                    { "v": "0.125" }
                ]},
                { "f": [{ "v": null }, { "v": "" }, { "v": [] }, { "v": "0.5" }] }
            ]
        });
        let hits = parse_query_rows(&payload)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Red Lentil Dal");
        assert_eq!(hits[0].ingredients, vec!["lentils", "ginger"]);
        assert!((hits[0].distance - 0.125).abs() < f32::EPSILON);

        assert!(parse_query_rows(&json!({ "jobComplete": false })).is_err());
        Ok(())
    }

    #[test]
    fn in_memory_index_ranks_by_cosine_distance() -> Result<()> {
        let provider = DryrunProvider;
        let index = InMemoryIndex::build(seed_catalog(), &provider, "dryrun-embed-1")?;
        assert_eq!(index.len(), 8);
        let query = provider.embed(
            "dryrun-embed-1",
            "Red Lentil Dal. Spiced lentils simmered with tomato and ginger. \
             red lentils, tomato, ginger, turmeric",
        )?;
        let hits = index.search(&query, 3)?;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Red Lentil Dal");
        assert!(hits[0].distance <= hits[1].distance);
        Ok(())
    }

    #[test]
    fn catalog_file_keeps_stored_embeddings() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("catalog.json");
        fs::write(
            &path,
            json!([{ "title": "Toast", "embedding": [1.0, 0.0] }]).to_string(),
        )?;
        let catalog = load_catalog(&path)?;
        let index = InMemoryIndex::build(catalog, &DryrunProvider, "dryrun-embed-1")?;
        let hits = index.search(&[1.0, 0.0], 5)?;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].distance.abs() < 1e-6);
        Ok(())
    }
}
