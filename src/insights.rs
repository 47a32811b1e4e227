//! Prompt construction and LLM commentary for a commodity.
//!
//! Collaborator failures never leave this module as errors: they are turned into a
//! display string so the analytical output can still be shown.

use crate::llm::TextGenerator;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

const DONE_MARKER: &str = "[DONE]";

/// Prompt asking for the top five insights about a commodity's exports.
pub fn build_prompt(commodity: &str, year_range: Option<(i32, i32)>, origin_label: &str) -> String {
    match year_range {
        Some((min_year, max_year)) => format!(
            "Given the commodity related to {}, can you provide me the top five insights or trends \
             between the dates {} to {} about the commodity as {} export with references? \
             Please provide specific dates if you've provided any updates on outbreaks, trade \
             agreements, globalization trends, or economic research. It's fine to add sub-bullet \
             points. Please remove any note about being an AI agent in your response.",
            commodity, min_year, max_year, origin_label
        ),
        None => format!(
            "Given the commodity related to {}, can you provide me the top five insights or trends \
             about the commodity as {} export with references? Please remove any AI apparent \
             conversations, and only provide the prompt response.",
            commodity, origin_label
        ),
    }
}

/// One `* ` bullet per non-empty line.
pub fn format_as_markdown(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("* {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Growing display text of a streamed answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightBuffer {
    pub text: String,
    pub fragments: usize,
    /// Set when the stream failed; `text` keeps whatever arrived before.
    pub error: Option<String>,
}

impl InsightBuffer {
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.fragments += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Text to show: the received content, followed by the error line if any.
    pub fn display(&self) -> String {
        match &self.error {
            None => self.text.clone(),
            Some(error) if self.text.trim().is_empty() => error.clone(),
            Some(error) => format!("{}\n\n{}", self.text, error),
        }
    }
}

pub struct InsightOrchestrator {
    generator: Arc<dyn TextGenerator>,
}

impl InsightOrchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Complete answer, or an `Error fetching insights: ...` line.
    pub async fn fetch(&self, prompt: &str) -> String {
        match self.generator.generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Insight generation failed: {}", e);
                error_line(&e)
            }
        }
    }

    /// Consume fragments in arrival order, calling `on_update` with the text so far.
    ///
    /// `[DONE]` fragments are skipped. A failure mid-stream stops consumption and keeps
    /// the partial text.
    pub async fn stream<F>(&self, prompt: &str, mut on_update: F) -> InsightBuffer
    where
        F: FnMut(&str),
    {
        let mut buffer = InsightBuffer::default();

        let mut fragments = match self.generator.generate_stream(prompt).await {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!("Insight stream could not start: {}", e);
                buffer.error = Some(error_line(&e));
                return buffer;
            }
        };

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) if fragment.trim() == DONE_MARKER => continue,
                Ok(fragment) => {
                    buffer.push(&fragment);
                    on_update(&buffer.text);
                }
                Err(e) => {
                    warn!(
                        "Insight stream failed after {} fragments: {}",
                        buffer.fragments, e
                    );
                    buffer.error = Some(error_line(&e));
                    break;
                }
            }
        }

        debug!("Insight stream finished with {} fragments", buffer.fragments);
        buffer
    }
}

fn error_line(error: &impl std::fmt::Display) -> String {
    format!("Error fetching insights: {}", error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_with_range() {
        let prompt = build_prompt("Meat, Chicken", Some((2010, 2015)), "USA");
        assert!(prompt.contains("Meat, Chicken"));
        assert!(prompt.contains("between the dates 2010 to 2015"));
        assert!(prompt.contains("as USA export"));
        assert!(prompt.contains("remove any note about being an AI agent"));
    }

    #[test]
    fn test_prompt_without_range() {
        let prompt = build_prompt("Coffee, Green", None, "USA");
        assert!(prompt.contains("Coffee, Green"));
        assert!(!prompt.contains("between the dates"));
        assert!(prompt.contains("remove any AI apparent conversations"));
    }

    #[test]
    fn test_format_as_markdown() {
        let text = "First insight\n\n  Second insight  \n";
        assert_eq!(format_as_markdown(text), "* First insight\n* Second insight");
        assert_eq!(format_as_markdown(""), "");
    }

    #[test]
    fn test_buffer_display_keeps_partial_text() {
        let mut buffer = InsightBuffer::default();
        buffer.push("Partial");
        buffer.error = Some("Error fetching insights: reset".to_string());
        assert_eq!(buffer.display(), "Partial\n\nError fetching insights: reset");
        assert!(!buffer.is_complete());
    }
}
