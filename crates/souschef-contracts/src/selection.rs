//! Deterministic duplicate avoidance used to pick among stage-1 candidates.
//!
//! Two keys collide when their normalised forms are equal or when their
//! character-level similarity ratio reaches `SIMILARITY_THRESHOLD`.

use similar::TextDiff;

use crate::candidates::Candidate;

pub const SIMILARITY_THRESHOLD: f32 = 0.9;

const LEADING_ARTICLES: &[&str] = &["the", "a", "an"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    /// Every candidate matched the history; `index` is then 0.
    pub all_seen: bool,
}

/// Lowercases, strips punctuation, drops a leading article and collapses
/// whitespace. Passport keys keep their `destination|dish` separator.
pub fn normalize_key(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '|' {
                ch
            } else {
                ' '
            }
        })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() > 1 && LEADING_ARTICLES.contains(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}

pub fn keys_collide(left: &str, right: &str) -> bool {
    let left = normalize_key(left);
    let right = normalize_key(right);
    if left.is_empty() || right.is_empty() {
        return false;
    }
    if left == right {
        return true;
    }
    TextDiff::from_chars(left.as_str(), right.as_str()).ratio() >= SIMILARITY_THRESHOLD
}

pub fn is_seen(key: &str, history: &[String]) -> bool {
    history.iter().any(|seen| keys_collide(key, seen))
}

/// First candidate not already in `history`; candidate 0 when all collide.
pub fn select_unique<T: Candidate>(candidates: &[T], history: &[String]) -> Selection {
    candidates
        .iter()
        .position(|candidate| !is_seen(&candidate.identity(), history))
        .map(|index| Selection {
            index,
            all_seen: false,
        })
        .unwrap_or(Selection {
            index: 0,
            all_seen: true,
        })
}

#[cfg(test)]
mod tests {
    use crate::candidates::RecipeCandidate;

    use super::*;

    fn recipes(names: &[&str]) -> Vec<RecipeCandidate> {
        names
            .iter()
            .map(|name| RecipeCandidate {
                name: name.to_string(),
                ..RecipeCandidate::default()
            })
            .collect()
    }

    #[test]
    fn skips_candidate_whose_exact_key_is_in_history() {
        let candidates = recipes(&["Spinach Risotto", "Lemon Rice", "Saag Paneer"]);
        let history = vec!["Spinach Risotto".to_string()];
        assert_eq!(
            select_unique(&candidates, &history),
            Selection {
                index: 1,
                all_seen: false
            }
        );
    }

    #[test]
    fn returns_first_candidate_when_everything_collides() {
        let candidates = recipes(&["Spinach Risotto", "Lemon Rice"]);
        let history = vec!["lemon rice".to_string(), "The Spinach Risotto!".to_string()];
        assert_eq!(
            select_unique(&candidates, &history),
            Selection {
                index: 0,
                all_seen: true
            }
        );
    }

    #[test]
    fn empty_history_selects_first() {
        let candidates = recipes(&["A", "B"]);
        assert_eq!(select_unique(&candidates, &[]).index, 0);
    }

    #[test]
    fn near_identical_titles_collide() {
        assert!(keys_collide("Creamy Spinach Risotto", "Creamy Spinach Risottos"));
        assert!(keys_collide("Rome|Cacio e Pepe", "rome|cacio e pepe"));
        assert!(!keys_collide("Spinach Risotto", "Mushroom Risotto"));
        assert!(!keys_collide("", ""));
    }

    #[test]
    fn normalize_drops_punctuation_and_articles() {
        assert_eq!(normalize_key("  The  Best-Ever   Fried Rice! "), "best ever fried rice");
        assert_eq!(normalize_key("A"), "a");
    }
}
