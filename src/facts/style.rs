//! Writing-style preferences passed to the final generation call.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Point of view, e.g. `"First person"`, `"Third person limited"`.
    pub pov: String,
    /// Narrative tense, e.g. `"Past tense"`.
    pub tense: String,
    /// Free-form style notes. May be empty.
    pub style: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            pov: "First person".into(),
            tense: "Past tense".into(),
            style: String::new(),
        }
    }
}

impl StyleConfig {
    /// Render the style as instructions for the generation system prompt.
    pub fn instructions(&self) -> String {
        let mut out = format!(
            "Write in {} and {}.",
            self.pov.trim().to_lowercase(),
            self.tense.trim().to_lowercase()
        );
        let notes = self.style.trim();
        if !notes.is_empty() {
            out.push_str("\nFollow these style notes from the author:\n");
            out.push_str(notes);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style() {
        let style = StyleConfig::default();
        assert_eq!(style.pov, "First person");
        assert_eq!(style.tense, "Past tense");
        assert!(style.style.is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let style: StyleConfig = serde_json::from_str(r#"{"pov": "Second person"}"#).unwrap();
        assert_eq!(style.pov, "Second person");
        assert_eq!(style.tense, "Past tense");
    }

    #[test]
    fn instructions_include_notes_only_when_present() {
        let plain = StyleConfig::default().instructions();
        assert_eq!(plain, "Write in first person and past tense.");

        let noted = StyleConfig {
            style: "Short, punchy sentences.".into(),
            ..StyleConfig::default()
        }
        .instructions();
        assert!(noted.ends_with("Short, punchy sentences."));
    }
}
