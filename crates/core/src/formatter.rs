//! Recipe Formatter
//!
//! Decomposes raw recipe text into a validated [`RecipeDocument`]. Two
//! implementations: one asks a chat model for a [`RecipeDraft`] as JSON, the
//! other reads common plain-text layouts (headings, numbered lists) directly.

use crate::{
    llm_client::{LLMClient, prompt},
    recipe::{PhaseDraft, RecipeDocument, RecipeDraft, RecipeParseError, StepDraft},
};
use async_trait::async_trait;
use schemars::schema_for;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The text could not be decomposed into phases and steps.
    #[error(transparent)]
    Parse(#[from] RecipeParseError),
    /// The formatting backend itself failed.
    #[error("Recipe formatting failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

#[async_trait]
pub trait RecipeFormatter: Send + Sync {
    async fn format(&self, recipe_text: &str) -> Result<RecipeDocument, FormatError>;
}

/// A `RecipeFormatter` backed by a chat-completion model.
pub struct LLMRecipeFormatter {
    llm: Arc<dyn LLMClient>,
    prompts: HashMap<String, String>,
}

impl LLMRecipeFormatter {
    /// `prompts` must contain a `"format_recipe"` template with the
    /// `{recipe_text}` and `{schema}` placeholders.
    pub fn new(llm: Arc<dyn LLMClient>, prompts: HashMap<String, String>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl RecipeFormatter for LLMRecipeFormatter {
    async fn format(&self, recipe_text: &str) -> Result<RecipeDocument, FormatError> {
        let template = prompt(&self.prompts, "format_recipe")?;
        let schema = serde_json::to_string_pretty(&schema_for!(RecipeDraft))
            .map_err(anyhow::Error::from)?;
        let user_prompt = template
            .replace("{schema}", &schema)
            .replace("{recipe_text}", recipe_text);

        let answer = self
            .llm
            .complete_json(
                "You turn recipes into structured cooking plans. Answer with a JSON object only.",
                user_prompt,
            )
            .await?;

        let draft: RecipeDraft = serde_json::from_str(&answer).map_err(|e| {
            warn!(error = %e, "Formatter returned JSON that does not match the recipe shape");
            RecipeParseError::Malformed(e.to_string())
        })?;
        let recipe = RecipeDocument::from_draft(draft)?;
        info!(title = %recipe.title, steps = recipe.total_steps(), "Recipe formatted");
        Ok(recipe)
    }
}

/// Deterministic formatter for markdown-ish recipe text.
///
/// - The first line is the title.
/// - `# Heading` or `Heading:` lines open a phase; `Ingredients` and
///   `Equipment` sections are collected instead.
/// - Numbered (`1.`, `2)`) and bulleted (`-`, `*`) lines are steps.
/// - Durations such as "10 minutes" or "1 hour" become step estimates.
pub struct PlainTextRecipeFormatter;

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Ingredients,
    Equipment,
    Phase,
}

#[async_trait]
impl RecipeFormatter for PlainTextRecipeFormatter {
    async fn format(&self, recipe_text: &str) -> Result<RecipeDocument, FormatError> {
        Ok(parse_plain_text(recipe_text)?)
    }
}

pub fn parse_plain_text(text: &str) -> Result<RecipeDocument, RecipeParseError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let title = lines
        .next()
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .ok_or(RecipeParseError::MissingTitle)?;

    let mut draft = RecipeDraft {
        title,
        ..Default::default()
    };
    let mut section = Section::Preamble;

    for line in lines {
        if let Some(heading) = heading(line) {
            section = match heading.to_lowercase().as_str() {
                "ingredients" => Section::Ingredients,
                "equipment" | "tools" => Section::Equipment,
                _ => {
                    draft.phases.push(PhaseDraft {
                        name: heading.to_string(),
                        ..Default::default()
                    });
                    Section::Phase
                }
            };
            continue;
        }

        match (list_item(line), section) {
            (Some(item), Section::Ingredients) => draft.ingredients.push(item.to_string()),
            (Some(item), Section::Equipment) => draft.equipment.push(item.to_string()),
            (Some(item), _) => {
                if section != Section::Phase {
                    draft.phases.push(PhaseDraft {
                        name: "Steps".to_string(),
                        ..Default::default()
                    });
                    section = Section::Phase;
                }
                if let Some(phase) = draft.phases.last_mut() {
                    phase.steps.push(step_draft(item));
                }
            }
            (None, Section::Preamble) if draft.description.is_none() => {
                draft.description = Some(line.to_string());
            }
            (None, Section::Phase) => {
                if let Some(phase) = draft.phases.last_mut() {
                    match phase.steps.last_mut() {
                        Some(step) => {
                            let tip = step.tip.get_or_insert_with(String::new);
                            if !tip.is_empty() {
                                tip.push(' ');
                            }
                            tip.push_str(line);
                        }
                        None if phase.description.is_none() => {
                            phase.description = Some(line.to_string())
                        }
                        None => {}
                    }
                }
            }
            (None, _) => {}
        }
    }

    // Headings that never received a step (e.g. "Notes:") are not phases.
    draft.phases.retain(|p| !p.steps.is_empty());
    RecipeDocument::from_draft(draft)
}

fn step_draft(instruction: &str) -> StepDraft {
    let duration = parse_duration_seconds(instruction);
    StepDraft {
        estimated_duration_seconds: duration,
        timer_suggested: duration.is_some_and(|d| d >= 120),
        ..StepDraft::new(instruction)
    }
}

fn heading(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('#') {
        return Some(rest.trim_start_matches('#').trim());
    }
    if list_item(line).is_some() {
        return None;
    }
    line.strip_suffix(':')
        .map(str::trim)
        .filter(|h| !h.is_empty() && h.split_whitespace().count() <= 4)
}

fn list_item(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Longest single duration mention taken at face value (one week).
const MAX_MENTIONED_SECONDS: u64 = 7 * 24 * 3600;

/// Sums every "N <unit>" mention, e.g. "1 hour 30 minutes" -> 5400.
/// For ranges like "8-10 minutes" the upper bound counts. Mentions longer
/// than a week are ignored.
pub fn parse_duration_seconds(text: &str) -> Option<u64> {
    let normalized = text.to_lowercase().replace(['-', '–'], " ");
    let words: Vec<&str> = normalized
        .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .filter(|w| !w.is_empty())
        .collect();

    let mut total: u64 = 0;
    for pair in words.windows(2) {
        let Ok(amount) = pair[0].parse::<u64>() else {
            continue;
        };
        let unit = pair[1].trim_end_matches('.');
        let factor = match unit {
            "hour" | "hours" | "hr" | "hrs" => 3600,
            "minute" | "minutes" | "min" | "mins" => 60,
            "second" | "seconds" | "sec" | "secs" => 1,
            _ => continue,
        };
        match amount.checked_mul(factor) {
            Some(seconds) if seconds <= MAX_MENTIONED_SECONDS => {
                total = total.saturating_add(seconds);
            }
            _ => continue,
        }
    }
    (total > 0).then_some(total)
}
