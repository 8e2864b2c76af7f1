//! Best-effort view of opaque payload text.

use serde::Serialize;

/// Payload text, parsed as JSON when it is JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "content", rename_all = "lowercase")]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    /// Detects JSON by parsing; anything else is kept as text.
    ///
    /// Bare literals such as `true` or `null` stay text; numbers and quoted
    /// strings are treated as JSON.
    pub fn detect(text: &str) -> Self {
        let trimmed = text.trim();
        let looks_like_json = trimmed
            .chars()
            .next()
            .is_some_and(|c| matches!(c, '{' | '[' | '"' | '-' | '0'..='9'));
        if looks_like_json {
            if let Ok(value) = serde_json::from_str(trimmed) {
                return Payload::Json(value);
            }
        }
        Payload::Text(text.to_string())
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_json_objects_and_arrays() {
        assert!(Payload::detect(r#"{"orderId": 7}"#).is_json());
        assert!(Payload::detect("  [1, 2]\n").is_json());
        assert!(Payload::detect("\"quoted\"").is_json());
        assert!(Payload::detect("42").is_json());
    }

    #[test]
    fn falls_back_to_text() {
        assert_eq!(Payload::detect("timeout after 30s"), Payload::Text("timeout after 30s".to_string()));
        assert_eq!(Payload::detect("{not json"), Payload::Text("{not json".to_string()));
        assert_eq!(Payload::detect("true"), Payload::Text("true".to_string()));
        assert_eq!(Payload::detect(""), Payload::Text(String::new()));
    }
}
