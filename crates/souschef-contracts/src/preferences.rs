//! Preference collector: the structured inputs of the three flows and their
//! completeness checks.

use indexmap::IndexSet;

use crate::errors::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mood {
    Cozy,
    Adventurous,
    Energized,
    Romantic,
    Lazy,
    Healthy,
    Celebratory,
    Nostalgic,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Cozy,
        Mood::Adventurous,
        Mood::Energized,
        Mood::Romantic,
        Mood::Lazy,
        Mood::Healthy,
        Mood::Celebratory,
        Mood::Nostalgic,
    ];

    /// 1-based position in the mood picker.
    pub fn number(self) -> u8 {
        Self::ALL
            .iter()
            .position(|mood| *mood == self)
            .map(|idx| idx as u8 + 1)
            .unwrap_or(1)
    }

    pub fn from_number(number: u8) -> Option<Self> {
        let idx = usize::from(number).checked_sub(1)?;
        Self::ALL.get(idx).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Mood::Cozy => "Cozy",
            Mood::Adventurous => "Adventurous",
            Mood::Energized => "Energized",
            Mood::Romantic => "Romantic",
            Mood::Lazy => "Lazy",
            Mood::Healthy => "Healthy",
            Mood::Celebratory => "Celebratory",
            Mood::Nostalgic => "Nostalgic",
        }
    }

    /// Accepts either the picker number or the label (case-insensitive).
    pub fn parse(raw: &str) -> Result<Self, FieldError> {
        let trimmed = raw.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Self::from_number(number).ok_or_else(|| {
                FieldError::new("mood", format!("mood number must be 1-8, got {number}"))
            });
        }
        Self::ALL
            .iter()
            .copied()
            .find(|mood| mood.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| FieldError::new("mood", format!("unknown mood '{trimmed}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeBudget {
    Quick,
    #[default]
    HalfHour,
    Hour,
    Leisurely,
}

impl TimeBudget {
    pub const ALL: [TimeBudget; 4] = [
        TimeBudget::Quick,
        TimeBudget::HalfHour,
        TimeBudget::Hour,
        TimeBudget::Leisurely,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeBudget::Quick => "15 minutes",
            TimeBudget::HalfHour => "30 minutes",
            TimeBudget::Hour => "1 hour",
            TimeBudget::Leisurely => "more than 1 hour",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FieldError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "15" | "15m" | "quick" => Ok(TimeBudget::Quick),
            "30" | "30m" | "half-hour" => Ok(TimeBudget::HalfHour),
            "60" | "60m" | "1h" | "hour" => Ok(TimeBudget::Hour),
            "90" | "90m" | "long" | "leisurely" => Ok(TimeBudget::Leisurely),
            other => Err(FieldError::new(
                "time",
                format!("unknown time budget '{other}' (use 15, 30, 60 or long)"),
            )),
        }
    }
}

/// Fixed checklist vocabulary offered by the ingredient picker.
pub const CHECKLIST_VOCABULARY: &[&str] = &[
    "Chicken",
    "Beef",
    "Pork",
    "Fish",
    "Shrimp",
    "Tofu",
    "Eggs",
    "Milk",
    "Cheese",
    "Butter",
    "Rice",
    "Pasta",
    "Bread",
    "Potatoes",
    "Tomatoes",
    "Onions",
    "Garlic",
    "Spinach",
    "Carrots",
    "Bell Peppers",
    "Mushrooms",
    "Broccoli",
    "Beans",
    "Lentils",
];

/// Inline photo of the pantry, already encoded for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub base64_data: String,
}

impl ImagePayload {
    pub fn is_empty(&self) -> bool {
        self.base64_data.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceInput {
    pub mood: Mood,
    pub time_budget: TimeBudget,
    pub checklist: IndexSet<String>,
    pub free_text: String,
    pub disliked: String,
    pub image: Option<ImagePayload>,
}

impl PreferenceInput {
    pub fn new(mood: Mood, time_budget: TimeBudget) -> Self {
        Self {
            mood,
            time_budget,
            checklist: IndexSet::new(),
            free_text: String::new(),
            disliked: String::new(),
            image: None,
        }
    }

    /// Replaces the checklist; every item must come from the vocabulary and
    /// is stored with the vocabulary's spelling.
    pub fn set_checklist<I, S>(&mut self, items: I) -> Result<(), FieldError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut checklist = IndexSet::new();
        for item in items {
            let wanted = item.as_ref().trim();
            if wanted.is_empty() {
                continue;
            }
            let Some(canonical) = CHECKLIST_VOCABULARY
                .iter()
                .find(|known| known.eq_ignore_ascii_case(wanted))
            else {
                return Err(FieldError::new(
                    "checklist",
                    format!("'{wanted}' is not one of the checklist ingredients"),
                ));
            };
            checklist.insert((*canonical).to_string());
        }
        self.checklist = checklist;
        Ok(())
    }

    pub fn free_text_items(&self) -> Vec<String> {
        parse_list(&self.free_text)
    }

    pub fn disliked_items(&self) -> Vec<String> {
        parse_list(&self.disliked)
    }

    /// Checklist plus free-text ingredients, de-duplicated case-insensitively.
    pub fn available_ingredients(&self) -> Vec<String> {
        let mut seen = IndexSet::new();
        let mut out = Vec::new();
        for item in self
            .checklist
            .iter()
            .cloned()
            .chain(self.free_text_items())
        {
            if seen.insert(item.to_lowercase()) {
                out.push(item);
            }
        }
        out
    }

    pub fn has_image(&self) -> bool {
        self.image.as_ref().map(|image| !image.is_empty()).unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if self.checklist.is_empty() && self.free_text_items().is_empty() && !self.has_image() {
            return Err(FieldError::new(
                "ingredients",
                "pick at least one ingredient, type some in, or attach a photo",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPreferences {
    pub dietary_needs: String,
    pub preferences: String,
    pub days: u8,
    pub servings: u8,
}

impl Default for PlanPreferences {
    fn default() -> Self {
        Self {
            dietary_needs: String::new(),
            preferences: String::new(),
            days: 7,
            servings: 2,
        }
    }
}

impl PlanPreferences {
    pub fn dietary_items(&self) -> Vec<String> {
        parse_list(&self.dietary_needs)
    }

    /// Text embedded for the recipe vector search.
    pub fn search_text(&self) -> String {
        let mut parts = self.dietary_items();
        let preferences = self.preferences.trim();
        if !preferences.is_empty() {
            parts.push(preferences.to_string());
        }
        parts.join(". ")
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if self.dietary_items().is_empty() && self.preferences.trim().is_empty() {
            return Err(FieldError::new(
                "preferences",
                "describe your dietary needs or what you would like to eat",
            ));
        }
        if !(1..=7).contains(&self.days) {
            return Err(FieldError::new("days", "a plan covers 1 to 7 days"));
        }
        if !(1..=12).contains(&self.servings) {
            return Err(FieldError::new("servings", "servings must be between 1 and 12"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassportRequest {
    pub destination: String,
    pub dietary_needs: String,
    pub language: Option<String>,
}

impl PassportRequest {
    pub fn dietary_items(&self) -> Vec<String> {
        parse_list(&self.dietary_needs)
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if self.destination.trim().is_empty() {
            return Err(FieldError::new("destination", "where are you travelling?"));
        }
        Ok(())
    }
}

/// Splits a comma separated form field, trimming and dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_submission_is_blocked_with_field_error() {
        let input = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        let err = input.validate().err().unwrap_or_else(|| FieldError::new("none", ""));
        assert_eq!(err.field, "ingredients");
    }

    #[test]
    fn whitespace_only_free_text_does_not_count() {
        let mut input = PreferenceInput::new(Mood::Lazy, TimeBudget::Quick);
        input.free_text = " , ,  ".to_string();
        input.image = Some(ImagePayload {
            mime_type: "image/jpeg".to_string(),
            base64_data: "  ".to_string(),
        });
        assert!(input.validate().is_err());
    }

    #[test]
    fn any_single_ingredient_source_is_enough() -> anyhow::Result<()> {
        let mut checklist = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        checklist.set_checklist(["rice"])?;
        assert!(checklist.validate().is_ok());
        assert_eq!(checklist.checklist.iter().next().map(String::as_str), Some("Rice"));

        let mut typed = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        typed.free_text = "leeks, feta".to_string();
        assert!(typed.validate().is_ok());

        let mut photo = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        photo.image = Some(ImagePayload {
            mime_type: "image/jpeg".to_string(),
            base64_data: "aGVsbG8=".to_string(),
        });
        assert!(photo.validate().is_ok());
        Ok(())
    }

    #[test]
    fn checklist_rejects_items_outside_vocabulary() {
        let mut input = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        let err = input.set_checklist(["Rice", "Unobtainium"]).err();
        assert_eq!(err.map(|err| err.field), Some("checklist"));
        assert!(input.checklist.is_empty());
    }

    #[test]
    fn mood_parses_number_and_label() -> anyhow::Result<()> {
        assert_eq!(Mood::parse("1")?, Mood::Cozy);
        assert_eq!(Mood::parse("nostalgic")?, Mood::Nostalgic);
        assert_eq!(Mood::Nostalgic.number(), 8);
        assert!(Mood::parse("9").is_err());
        assert!(Mood::parse("0").is_err());
        Ok(())
    }

    #[test]
    fn available_ingredients_merge_sources_without_duplicates() -> anyhow::Result<()> {
        let mut input = PreferenceInput::new(Mood::Healthy, TimeBudget::Hour);
        input.set_checklist(["Rice", "Spinach"])?;
        input.free_text = "spinach, chickpeas".to_string();
        assert_eq!(
            input.available_ingredients(),
            vec!["Rice".to_string(), "Spinach".to_string(), "chickpeas".to_string()]
        );
        Ok(())
    }

    #[test]
    fn plan_preferences_need_some_signal_and_sane_ranges() {
        let mut plan = PlanPreferences::default();
        assert_eq!(plan.validate().err().map(|err| err.field), Some("preferences"));
        plan.dietary_needs = "vegetarian, no nuts".to_string();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.search_text(), "vegetarian. no nuts");
        plan.days = 9;
        assert_eq!(plan.validate().err().map(|err| err.field), Some("days"));
    }

    #[test]
    fn passport_requires_destination() {
        let request = PassportRequest {
            destination: "  ".to_string(),
            ..PassportRequest::default()
        };
        assert_eq!(request.validate().err().map(|err| err.field), Some("destination"));
    }
}
