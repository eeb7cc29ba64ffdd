use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("could not extract valid JSON")]
    NoJson,

    #[error("response did not contain any recommendations")]
    UnexpectedShape,
}

/// A greedy span to try whole, and the positions a value may start at.
struct Extraction {
    span: Regex,
    start: Regex,
}

// Best-effort heuristic, not a grammar. Arrays first: recommendation
// payloads are always arrays.
static EXTRACTIONS: Lazy<[Extraction; 2]> = Lazy::new(|| {
    [
        Extraction {
            span: Regex::new(r"(?s)\[\s*\{.*\}\s*\]").expect("array pattern is valid"),
            start: Regex::new(r"\[\s*\{").expect("array start pattern is valid"),
        },
        Extraction {
            span: Regex::new(r#"(?s)\{\s*"\w+".*\}"#).expect("object pattern is valid"),
            start: Regex::new(r#"\{\s*"\w+""#).expect("object start pattern is valid"),
        },
    ]
});

static HEADING_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:[ \t]*#{1,6}[ \t]+)+").expect("heading pattern is valid"));

/// Fields whose text is shown to users verbatim.
const SANITIZED_FIELDS: [&str; 2] = ["title", "reasoning"];

pub fn parse_json(raw: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str(raw.trim()) {
        return Ok(value);
    }

    tracing::debug!("direct parse failed, attempting to extract JSON");
    for extraction in EXTRACTIONS.iter() {
        let Some(found) = extraction.span.find(raw) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str(found.as_str()) {
            return Ok(value);
        }
        // The span may open inside prose or run into it; try the first
        // complete value at each candidate start instead.
        for start in extraction.start.find_iter(raw) {
            if let Some(Ok(value)) = serde_json::Deserializer::from_str(&raw[start.start()..])
                .into_iter::<Value>()
                .next()
            {
                return Ok(value);
            }
        }
        tracing::warn!(candidate = found.as_str(), "found potential JSON but failed to parse");
    }

    Err(ParseError::NoJson)
}

pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(text) if SANITIZED_FIELDS.contains(&key.as_str()) => {
                            Value::String(strip_markdown(&text))
                        }
                        other => sanitize(other),
                    };
                    (key, value)
                })
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Remove emphasis asterisks, backticks and leading heading markers.
pub fn strip_markdown(text: &str) -> String {
    // Dropping every '*' covers both bold and italic markers
    let stripped: String = text.chars().filter(|c| *c != '*' && *c != '`').collect();
    HEADING_MARKERS.replace_all(&stripped, "").into_owned()
}
