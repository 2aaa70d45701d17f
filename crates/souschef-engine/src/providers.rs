use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use souschef_contracts::errors::ProviderError;
use souschef_contracts::preferences::ImagePayload;

/// What a text request is for; providers may use it to shape output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPurpose {
    RecipeBatch,
    PlanBatch,
    PassportBatch,
    Selection,
}

impl TextPurpose {
    pub fn label(self) -> &'static str {
        match self {
            TextPurpose::RecipeBatch => "recipe_batch",
            TextPurpose::PlanBatch => "plan_batch",
            TextPurpose::PassportBatch => "passport_batch",
            TextPurpose::Selection => "selection",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub purpose: TextPurpose,
    pub image: Option<&'a ImagePayload>,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBytes {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Seam to the generative service: text, image, speech and embeddings.
pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &str;

    /// False when a credential is required and none is configured; checked
    /// before a submission leaves the form.
    fn credential_ready(&self) -> bool {
        true
    }

    fn generate_text(&self, request: &TextRequest<'_>) -> Result<String, ProviderError>;

    fn generate_image(&self, model: &str, prompt: &str) -> Result<MediaBytes, ProviderError>;

    fn synthesize_speech(&self, model: &str, text: &str) -> Result<MediaBytes, ProviderError>;

    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError>;
}

pub const DRYRUN_EMBEDDING_DIMS: usize = 64;

const DRYRUN_DISHES: &[&str] = &[
    "Golden Spinach Rice Bake",
    "Garlic Butter Rice Skillet",
    "Lemony Spinach Risotto",
    "Smoky Bean Stew",
    "Crispy Potato Hash",
    "Tomato Basil Pasta",
    "Mushroom Barley Soup",
    "Ginger Tofu Stir Fry",
    "Herbed Lentil Salad",
    "Cheesy Broccoli Gratin",
];

const DRYRUN_QUOTES: &[(&str, &str)] = &[
    ("Cooking is love made visible.", "Unknown"),
    ("Good food is the foundation of genuine happiness.", "Auguste Escoffier"),
    ("People who love to eat are always the best people.", "Julia Child"),
    ("First we eat, then we do everything else.", "M.F.K. Fisher"),
    ("One cannot think well if one has not dined well.", "Virginia Woolf"),
    ("Laughter is brightest where food is best.", "Irish proverb"),
];

/// Deterministic offline provider for demos and tests.
pub struct DryrunProvider;

impl DryrunProvider {
    fn offset(prompt: &str) -> usize {
        let digest = Sha256::digest(prompt.as_bytes());
        usize::from(digest[0])
    }

    fn recipe_batch(prompt: &str) -> Value {
        let offset = Self::offset(prompt);
        let recipes: Vec<Value> = (0..5)
            .map(|idx| {
                let name = DRYRUN_DISHES[(offset + idx) % DRYRUN_DISHES.len()];
                json!({
                    "name": name,
                    "description": format!("A dryrun take on {name}."),
                    "instructions": [
                        "Rinse the rice until the water runs clear.",
                        "Soften the onion in butter, then add the rice.",
                        "Stir in the spinach and simmer until tender."
                    ],
                    "ingredients": [
                        "1 cup rice",
                        "2 cups spinach",
                        "1 onion",
                        "2 tbsp butter"
                    ],
                    "nutrition": "Approx. 420 kcal per serving"
                })
            })
            .collect();
        let quotes: Vec<Value> = (0..5)
            .map(|idx| {
                let (text, author) = DRYRUN_QUOTES[(offset + idx) % DRYRUN_QUOTES.len()];
                json!({ "text": text, "author": author })
            })
            .collect();
        json!({ "recipes": recipes, "quotes": quotes })
    }

    fn plan_batch(prompt: &str) -> Value {
        let offset = Self::offset(prompt);
        let themes = ["Green", "Harvest", "Comfort", "Coastal", "Market", "Sunday", "Spice"];
        let plans: Vec<Value> = (0..5)
            .map(|idx| {
                let theme = themes[(offset + idx) % themes.len()];
                let days: Vec<Value> = ["Monday", "Tuesday", "Wednesday"]
                    .iter()
                    .enumerate()
                    .map(|(day_idx, day)| {
                        json!({
                            "day": day,
                            "breakfast": "Overnight oats",
                            "lunch": DRYRUN_DISHES[(offset + idx + day_idx) % DRYRUN_DISHES.len()],
                            "dinner":
                                DRYRUN_DISHES[(offset + idx + day_idx + 3) % DRYRUN_DISHES.len()],
                        })
                    })
                    .collect();
                json!({
                    "title": format!("{theme} Week"),
                    "summary": format!("A dryrun {theme} plan."),
                    "days": days,
                    "shoppingList": ["oats", "rice", "spinach", "oats", "lentils"]
                })
            })
            .collect();
        json!({ "plans": plans })
    }

    fn passport_batch(prompt: &str) -> Value {
        let offset = Self::offset(prompt);
        let dishes = [
            ("Street Dumplings", "Local dumplings"),
            ("Grilled Skewers", "Market skewers"),
            ("Herb Flatbread", "Village flatbread"),
            ("Slow Bean Pot", "Farmhouse beans"),
            ("Citrus Custard", "Festival custard"),
            ("Fisherman's Soup", "Harbour soup"),
        ];
        let rows: Vec<Value> = (0..5)
            .map(|idx| {
                let (name, local) = dishes[(offset + idx) % dishes.len()];
                json!({
                    "name": name,
                    "localName": local,
                    "description": format!("Dryrun {name}."),
                })
            })
            .collect();
        json!({
            "dishes": rows,
            "chefCard": {
                "language": "English",
                "message": "I have dietary needs. Please help me order safely.",
                "translation": "I have dietary needs. Please help me order safely."
            }
        })
    }
}

impl ContentProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_text(&self, request: &TextRequest<'_>) -> Result<String, ProviderError> {
        let payload = match request.purpose {
            TextPurpose::RecipeBatch => Self::recipe_batch(request.prompt),
            TextPurpose::PlanBatch => Self::plan_batch(request.prompt),
            TextPurpose::PassportBatch => Self::passport_batch(request.prompt),
            TextPurpose::Selection => json!({ "indices": [0] }),
        };
        Ok(payload.to_string())
    }

    fn generate_image(&self, _model: &str, prompt: &str) -> Result<MediaBytes, ProviderError> {
        let digest = Sha256::digest(prompt.as_bytes());
        let mut image = RgbImage::new(64, 64);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([digest[0], digest[1], digest[2]]);
        }
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| ProviderError::Transient(format!("dryrun image encode failed: {err}")))?;
        Ok(MediaBytes {
            bytes: bytes.into_inner(),
            mime_type: "image/png".to_string(),
        })
    }

    fn synthesize_speech(&self, _model: &str, text: &str) -> Result<MediaBytes, ProviderError> {
        // A quarter second of silence per 40 characters of text.
        let quarters = text.chars().count() / 40 + 1;
        Ok(MediaBytes {
            bytes: vec![0u8; quarters * 12_000],
            mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
        })
    }

    fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut values = vec![0f32; DRYRUN_EMBEDDING_DIMS];
        for token in text
            .to_lowercase()
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            values[usize::from(digest[0]) % DRYRUN_EMBEDDING_DIMS] += 1.0;
        }
        let norm = values.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        Ok(values)
    }
}
