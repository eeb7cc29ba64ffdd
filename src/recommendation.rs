use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::parse::ParseError;

/// Number of recommendations requested from the model.
pub const RECOMMENDATION_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Meals,
    Entertainment,
    Fashion,
    Fitness,
    Travel,
    Books,
    Music,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Meals,
        Category::Entertainment,
        Category::Fashion,
        Category::Fitness,
        Category::Travel,
        Category::Books,
        Category::Music,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Meals => "meals",
            Category::Entertainment => "entertainment",
            Category::Fashion => "fashion",
            Category::Fitness => "fitness",
            Category::Travel => "travel",
            Category::Books => "books",
            Category::Music => "music",
        }
    }

    /// Comma separated list of every category name.
    pub fn names() -> String {
        Category::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Case-insensitive; models do not always keep the lowercase names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub title: String,
    pub reasoning: String,
    pub category: Category,
}

/// Shape sanitized model output into at most [`RECOMMENDATION_COUNT`] items.
///
/// A lone object is treated as a one-element list. Elements that do not fit
/// the item shape are skipped, so a reply with fewer usable items yields a
/// shorter list rather than an error; only an empty result is rejected.
pub fn into_recommendations(value: Value) -> Result<Vec<RecommendationItem>, ParseError> {
    let elements = match value {
        Value::Array(elements) => elements,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(ParseError::UnexpectedShape),
    };

    let items: Vec<RecommendationItem> = elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value(element) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed recommendation");
                None
            }
        })
        .take(RECOMMENDATION_COUNT)
        .collect();

    if items.is_empty() {
        return Err(ParseError::UnexpectedShape);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert_eq!("Books".parse::<Category>(), Ok(Category::Books));
        assert_eq!(" MUSIC ".parse::<Category>(), Ok(Category::Music));
        assert!("gardening".parse::<Category>().is_err());
    }

    #[test]
    fn test_names_lists_all_categories() {
        assert_eq!(
            Category::names(),
            "meals, entertainment, fashion, fitness, travel, books, music"
        );
    }

    #[test]
    fn test_into_recommendations_caps_at_three() {
        let value = json!([
            {"title": "A", "reasoning": "a", "category": "books"},
            {"title": "B", "reasoning": "b", "category": "music"},
            {"title": "C", "reasoning": "c", "category": "travel"},
            {"title": "D", "reasoning": "d", "category": "meals"},
        ]);
        let items = into_recommendations(value).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].title, "C");
    }

    #[test]
    fn test_into_recommendations_skips_invalid_items() {
        let value = json!([
            {"title": "A", "reasoning": "a", "category": "gardening"},
            {"title": "B", "reasoning": "b", "category": "fitness"},
            {"title": "C"},
        ]);
        let items = into_recommendations(value).unwrap();
        assert_eq!(
            items,
            vec![RecommendationItem {
                title: "B".into(),
                reasoning: "b".into(),
                category: Category::Fitness,
            }]
        );
    }

    #[test]
    fn test_into_recommendations_accepts_capitalized_categories() {
        let value = json!([
            {"title": "A", "reasoning": "a", "category": "Books"},
            {"title": "B", "reasoning": "b", "category": "TRAVEL"},
        ]);
        let items = into_recommendations(value).unwrap();
        assert_eq!(items[0].category, Category::Books);
        assert_eq!(items[1].category, Category::Travel);
        let serialized = serde_json::to_value(&items[1]).unwrap();
        assert_eq!(serialized["category"], "travel");
    }

    #[test]
    fn test_into_recommendations_keeps_short_lists() {
        let value = json!([
            {"title": "A", "reasoning": "a", "category": "books"},
            {"title": "B", "reasoning": "b", "category": "music"},
        ]);
        assert_eq!(into_recommendations(value).unwrap().len(), 2);
    }

    #[test]
    fn test_into_recommendations_wraps_single_object() {
        let value = json!({"title": "A", "reasoning": "a", "category": "fashion"});
        assert_eq!(into_recommendations(value).unwrap().len(), 1);
    }

    #[test]
    fn test_into_recommendations_rejects_empty_and_scalars() {
        assert!(into_recommendations(json!([])).is_err());
        assert!(into_recommendations(json!("text")).is_err());
    }
}
