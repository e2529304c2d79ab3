//! Heuristic detection of questions asking for images or video.

use crate::core::config::defaults::DEFAULT_VISUAL_KEYWORDS;

/// Keyword table for visual queries: case-insensitive substring match, no stemming.
#[derive(Debug, Clone)]
pub struct VisualKeywords {
    terms: Vec<String>,
}

impl VisualKeywords {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !table.contains(&term) {
                table.push(term);
            }
        }
        Self { terms: table }
    }

    /// Built-in table plus `extra` terms.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        Self::new(
            DEFAULT_VISUAL_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .chain(extra.iter().map(|s| s.as_ref().to_string())),
        )
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_visual(&self, question: &str) -> bool {
        let lowered = question.to_lowercase();
        self.terms.iter().any(|term| lowered.contains(term.as_str()))
    }
}

impl Default for VisualKeywords {
    fn default() -> Self {
        Self::new(DEFAULT_VISUAL_KEYWORDS)
    }
}
