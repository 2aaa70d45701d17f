//! Prompt builders for every request the engine sends.
//!
//! Each stage-1 prompt asks for a single JSON object so the answer can be fed
//! straight into `parse_json_payload`.

use souschef_contracts::candidates::{ChefCard, DishCandidate, CANDIDATE_COUNT};
use souschef_contracts::preferences::{PassportRequest, PlanPreferences, PreferenceInput};

use crate::vector::RecipeHit;

const DEFAULT_CHEF_CARD_LANGUAGE: &str = "the local language of the destination";

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

pub fn recipe_batch_prompt(input: &PreferenceInput) -> String {
    let available = input.available_ingredients();
    let disliked = input.disliked_items();
    let mut lines = vec![
        "You are SousChef, a warm and practical home-cooking assistant.".to_string(),
        format!(
            "Suggest {CANDIDATE_COUNT} different recipes for someone in a {} mood with {} to cook.",
            input.mood.label().to_lowercase(),
            input.time_budget.label()
        ),
        format!(
            "Ingredients on hand: {}.",
            join_or(&available, "nothing listed, rely on the photo")
        ),
    ];
    if !disliked.is_empty() {
        lines.push(format!(
            "Never use these disliked ingredients: {}.",
            disliked.join(", ")
        ));
    }
    if input.has_image() {
        lines.push(
            "A photo of the pantry is attached; use the ingredients you can see in it.".to_string(),
        );
    }
    lines.push(format!(
        "Also suggest {CANDIDATE_COUNT} short, real food or cooking quotes with their authors."
    ));
    lines.push(
        "Respond with JSON only, shaped as {\"recipes\":[{\"name\":\"\",\"description\":\"\",\
\"ingredients\":[\"\"],\"instructions\":[\"\"],\"nutrition\":\"\"}],\
\"quotes\":[{\"text\":\"\",\"author\":\"\"}]}."
            .to_string(),
    );
    lines.join("\n")
}

pub fn plan_batch_prompt(preferences: &PlanPreferences, hits: &[RecipeHit]) -> String {
    let dietary = preferences.dietary_items();
    let mut lines = vec![
        "You are SousChef, a meal-planning assistant.".to_string(),
        format!(
            "Draft {CANDIDATE_COUNT} alternative weekly meal plans covering {} day(s) for {} serving(s).",
            preferences.days, preferences.servings
        ),
        format!("Dietary needs: {}.", join_or(&dietary, "none")),
    ];
    let wishes = preferences.preferences.trim();
    if !wishes.is_empty() {
        lines.push(format!("Preferences: {wishes}."));
    }
    if !hits.is_empty() {
        lines.push("Draw on these recipes from our collection where they fit:".to_string());
        for hit in hits {
            let mut row = format!("- {}", hit.title);
            if !hit.summary.trim().is_empty() {
                row.push_str(&format!(": {}", hit.summary.trim()));
            }
            if !hit.ingredients.is_empty() {
                row.push_str(&format!(" (ingredients: {})", hit.ingredients.join(", ")));
            }
            lines.push(row);
        }
    }
    lines.push(
        "Each plan needs a distinct title, a one-line summary, breakfast, lunch and dinner per day, \
and one combined shopping list."
            .to_string(),
    );
    lines.push(
        "Respond with JSON only, shaped as {\"plans\":[{\"title\":\"\",\"summary\":\"\",\
\"days\":[{\"day\":\"\",\"breakfast\":\"\",\"lunch\":\"\",\"dinner\":\"\"}],\
\"shoppingList\":[\"\"]}]}."
            .to_string(),
    );
    lines.join("\n")
}

pub fn passport_batch_prompt(request: &PassportRequest) -> String {
    let dietary = request.dietary_items();
    let language = request
        .language
        .as_deref()
        .map(str::trim)
        .filter(|language| !language.is_empty())
        .unwrap_or(DEFAULT_CHEF_CARD_LANGUAGE);
    [
        "You are SousChef, a culinary travel guide.".to_string(),
        format!(
            "Recommend {CANDIDATE_COUNT} signature local dishes a visitor to {} should try.",
            request.destination.trim()
        ),
        format!(
            "The traveller's dietary needs: {}. Only recommend dishes that can respect them.",
            join_or(&dietary, "none")
        ),
        format!(
            "Then write a short chef card the traveller can show a waiter explaining those needs, \
with the message in English and its translation into {language}."
        ),
        "Respond with JSON only, shaped as {\"dishes\":[{\"name\":\"\",\"localName\":\"\",\
\"description\":\"\"}],\"chefCard\":{\"language\":\"\",\"message\":\"\",\"translation\":\"\"}}."
            .to_string(),
    ]
    .join("\n")
}

/// Stage-2 prompt: pick `count` candidates, preferring ones not already seen.
pub fn selection_prompt(
    kind: &str,
    candidates: &[String],
    history: &[String],
    count: usize,
) -> String {
    let mut lines = vec![
        format!(
            "Here are {} {kind} options, numbered from 0:",
            candidates.len()
        ),
    ];
    for (idx, candidate) in candidates.iter().enumerate() {
        lines.push(format!("{idx}. {candidate}"));
    }
    lines.push(format!("The user has already seen these {kind} entries:"));
    for seen in history {
        lines.push(format!("- {seen}"));
    }
    lines.push(format!(
        "Choose {count} option(s) in list order, skipping any that are the same as or a trivial \
rewording of something already seen. If every option was seen, choose from the start of the list."
    ));
    lines.push("Respond with JSON only, shaped as {\"indices\":[0]}.".to_string());
    lines.join("\n")
}

pub fn recipe_image_prompt(name: &str, description: &str) -> String {
    let mut prompt = format!("A bright, appetising overhead food photograph of {}", name.trim());
    if !description.trim().is_empty() {
        prompt.push_str(&format!(", {}", description.trim()));
    }
    prompt.push_str(". Natural light, home kitchen table, no text.");
    prompt
}

pub fn plan_image_prompt(title: &str, summary: &str) -> String {
    format!(
        "A flat-lay photograph of a week of prepared meals for a plan called \"{}\". {} No text.",
        title.trim(),
        summary.trim()
    )
}

pub fn dish_image_prompt(destination: &str, dish: &DishCandidate) -> String {
    let local = if dish.local_name.trim().is_empty() {
        String::new()
    } else {
        format!(" ({})", dish.local_name.trim())
    };
    format!(
        "A street-food style photograph of {}{local}, as served in {}. No text.",
        dish.name.trim(),
        destination.trim()
    )
}

/// Text read aloud for the chef card: the translation when present.
pub fn chef_card_speech(card: &ChefCard) -> String {
    let translation = card.translation.trim();
    if translation.is_empty() {
        card.message.trim().to_string()
    } else {
        translation.to_string()
    }
}

#[cfg(test)]
mod tests {
    use souschef_contracts::preferences::{Mood, TimeBudget};

    use super::*;

    #[test]
    fn recipe_prompt_carries_every_preference() -> anyhow::Result<()> {
        let mut input = PreferenceInput::new(Mood::Cozy, TimeBudget::Quick);
        input.set_checklist(["Rice", "Spinach"])?;
        input.free_text = "feta".to_string();
        input.disliked = "cilantro, olives".to_string();
        let prompt = recipe_batch_prompt(&input);
        assert!(prompt.contains("cozy mood"));
        assert!(prompt.contains(TimeBudget::Quick.label()));
        assert!(prompt.contains("Rice, Spinach, feta"));
        assert!(prompt.contains("cilantro, olives"));
        assert!(!prompt.contains("photo of the pantry"));
        assert!(prompt.contains("\"quotes\""));
        Ok(())
    }

    #[test]
    fn plan_prompt_lists_retrieved_recipes() {
        let preferences = PlanPreferences {
            dietary_needs: "vegetarian".to_string(),
            preferences: "mediterranean".to_string(),
            days: 5,
            servings: 4,
        };
        let hits = vec![RecipeHit {
            title: "Lentil Soup".to_string(),
            summary: "Hearty and quick".to_string(),
            ingredients: vec!["lentils".to_string(), "carrots".to_string()],
            distance: 0.12,
        }];
        let prompt = plan_batch_prompt(&preferences, &hits);
        assert!(prompt.contains("5 day(s) for 4 serving(s)"));
        assert!(prompt.contains("Dietary needs: vegetarian."));
        assert!(prompt.contains("- Lentil Soup: Hearty and quick (ingredients: lentils, carrots)"));
    }

    #[test]
    fn passport_prompt_defaults_language() {
        let request = PassportRequest {
            destination: " Lisbon ".to_string(),
            dietary_needs: "gluten free".to_string(),
            language: None,
        };
        let prompt = passport_batch_prompt(&request);
        assert!(prompt.contains("visitor to Lisbon should"));
        assert!(prompt.contains("gluten free"));
        assert!(prompt.contains(DEFAULT_CHEF_CARD_LANGUAGE));
    }

    #[test]
    fn selection_prompt_numbers_candidates() {
        let prompt = selection_prompt(
            "recipe",
            &["Soup".to_string(), "Stew".to_string()],
            &["Soup".to_string()],
            1,
        );
        assert!(prompt.contains("0. Soup\n1. Stew"));
        assert!(prompt.contains("- Soup"));
        assert!(prompt.contains("{\"indices\":[0]}"));
    }

    #[test]
    fn chef_card_speech_prefers_translation() {
        let card = ChefCard {
            language: "Portuguese".to_string(),
            message: "No gluten, please.".to_string(),
            translation: "Sem glúten, por favor.".to_string(),
        };
        assert_eq!(chef_card_speech(&card), "Sem glúten, por favor.");
        let untranslated = ChefCard {
            translation: String::new(),
            ..card
        };
        assert_eq!(chef_card_speech(&untranslated), "No gluten, please.");
    }
}
