//! Recipe Document Model
//!
//! A selected recipe, decomposed into ordered phases and globally indexed steps.
//! Documents are built once from a [`RecipeDraft`] (the loosely-typed output of a
//! formatter) and are immutable afterwards; sessions share them through an `Arc`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reasons a draft cannot be turned into a [`RecipeDocument`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipeParseError {
    #[error("Recipe has no title")]
    MissingTitle,
    #[error("Recipe has no phases")]
    NoPhases,
    #[error("Phase '{0}' has no steps")]
    EmptyPhase(String),
    #[error("Step {step} of phase '{phase}' has an empty instruction")]
    EmptyInstruction { phase: String, step: usize },
    #[error("Could not decompose recipe text: {0}")]
    Malformed(String),
}

/// A single cooking instruction.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Position in the flattened step sequence (0-based, contiguous across phases).
    pub index: usize,
    pub instruction: String,
    pub estimated_duration_seconds: Option<u64>,
    pub tip: Option<String>,
    /// Whether the formatter thinks a timer is useful for this step.
    pub timer_suggested: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

/// The structured recipe a voice session walks through.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RecipeDraft")]
pub struct RecipeDocument {
    pub title: String,
    pub description: Option<String>,
    pub servings: Option<u32>,
    pub total_time: Option<String>,
    pub ingredients: Vec<String>,
    pub equipment: Vec<String>,
    pub phases: Vec<Phase>,
}

// --- Drafts ---

/// Unvalidated recipe as produced by a formatter. Step indices are assigned
/// during validation, so drafts never carry them.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct RecipeDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub total_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub phases: Vec<PhaseDraft>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct PhaseDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDraft>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct StepDraft {
    pub instruction: String,
    #[serde(default)]
    #[schemars(description = "Rough time this step takes, in seconds")]
    pub estimated_duration_seconds: Option<u64>,
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    #[schemars(description = "True when the cook will likely want a countdown timer for this step")]
    pub timer_suggested: bool,
}

impl StepDraft {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }
}

impl TryFrom<RecipeDraft> for RecipeDocument {
    type Error = RecipeParseError;

    fn try_from(draft: RecipeDraft) -> Result<Self, Self::Error> {
        RecipeDocument::from_draft(draft)
    }
}

impl RecipeDocument {
    /// Validates a draft and assigns global step indices in cooking order.
    pub fn from_draft(draft: RecipeDraft) -> Result<Self, RecipeParseError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(RecipeParseError::MissingTitle);
        }
        if draft.phases.is_empty() {
            return Err(RecipeParseError::NoPhases);
        }

        let mut next_index = 0;
        let mut phases = Vec::with_capacity(draft.phases.len());
        for phase in draft.phases {
            let name = phase.name.trim().to_string();
            if phase.steps.is_empty() {
                return Err(RecipeParseError::EmptyPhase(name));
            }
            let mut steps = Vec::with_capacity(phase.steps.len());
            for (position, step) in phase.steps.into_iter().enumerate() {
                let instruction = step.instruction.trim().to_string();
                if instruction.is_empty() {
                    return Err(RecipeParseError::EmptyInstruction {
                        phase: name,
                        step: position + 1,
                    });
                }
                steps.push(Step {
                    index: next_index,
                    instruction,
                    // A zero estimate carries no information.
                    estimated_duration_seconds: step.estimated_duration_seconds.filter(|s| *s > 0),
                    tip: step.tip.filter(|t| !t.trim().is_empty()),
                    timer_suggested: step.timer_suggested,
                });
                next_index += 1;
            }
            phases.push(Phase {
                name,
                description: phase.description,
                steps,
            });
        }

        Ok(Self {
            title,
            description: draft.description,
            servings: draft.servings,
            total_time: draft.total_time,
            ingredients: draft.ingredients,
            equipment: draft.equipment,
            phases,
        })
    }

    /// Number of steps across all phases. Always at least one.
    pub fn total_steps(&self) -> usize {
        self.phases.iter().map(|p| p.steps.len()).sum()
    }

    /// Iterates the flattened step sequence in cooking order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.phases.iter().flat_map(|p| p.steps.iter())
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps().nth(index)
    }

    /// Returns the phase containing the step at `index`.
    pub fn phase_of(&self, index: usize) -> Option<&Phase> {
        self.phases
            .iter()
            .find(|p| p.steps.iter().any(|s| s.index == index))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A three-step recipe spread over two phases.
    pub(crate) fn sample_recipe() -> RecipeDocument {
        RecipeDocument::from_draft(RecipeDraft {
            title: "Garlic Pasta".into(),
            phases: vec![
                PhaseDraft {
                    name: "Preparation".into(),
                    steps: vec![
                        StepDraft {
                            estimated_duration_seconds: Some(600),
                            timer_suggested: true,
                            ..StepDraft::new("Boil a large pot of salted water")
                        },
                        StepDraft::new("Slice four cloves of garlic"),
                    ],
                    ..Default::default()
                },
                PhaseDraft {
                    name: "Cooking".into(),
                    steps: vec![StepDraft::new("Fry the garlic in olive oil")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_indices_are_global_and_contiguous() {
        let recipe = sample_recipe();
        assert_eq!(recipe.total_steps(), 3);
        let indices: Vec<usize> = recipe.steps().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(recipe.step(2).unwrap().instruction, "Fry the garlic in olive oil");
        assert!(recipe.step(3).is_none());
        assert_eq!(recipe.phase_of(2).unwrap().name, "Cooking");
    }

    #[test]
    fn test_rejects_empty_structures() {
        let no_phases = RecipeDraft {
            title: "Toast".into(),
            ..Default::default()
        };
        assert_eq!(
            RecipeDocument::from_draft(no_phases),
            Err(RecipeParseError::NoPhases)
        );

        let empty_phase = RecipeDraft {
            title: "Toast".into(),
            phases: vec![PhaseDraft {
                name: "Toasting".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            RecipeDocument::from_draft(empty_phase),
            Err(RecipeParseError::EmptyPhase("Toasting".into()))
        );

        let untitled = RecipeDraft {
            title: "   ".into(),
            ..Default::default()
        };
        assert_eq!(
            RecipeDocument::from_draft(untitled),
            Err(RecipeParseError::MissingTitle)
        );
    }

    #[test]
    fn test_blank_instruction_is_rejected() {
        let draft = RecipeDraft {
            title: "Toast".into(),
            phases: vec![PhaseDraft {
                name: "Toasting".into(),
                steps: vec![StepDraft::new("Toast the bread"), StepDraft::new("  ")],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            RecipeDocument::from_draft(draft),
            Err(RecipeParseError::EmptyInstruction {
                phase: "Toasting".into(),
                step: 2
            })
        );
    }

    #[test]
    fn test_deserialization_revalidates() {
        let json = serde_json::to_string(&sample_recipe()).unwrap();
        let parsed: RecipeDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample_recipe());

        let invalid = r#"{"title": "Soup", "phases": []}"#;
        assert!(serde_json::from_str::<RecipeDocument>(invalid).is_err());
    }

    #[test]
    fn test_zero_duration_is_dropped() {
        let draft = RecipeDraft {
            title: "Tea".into(),
            phases: vec![PhaseDraft {
                name: "Brew".into(),
                steps: vec![StepDraft {
                    estimated_duration_seconds: Some(0),
                    ..StepDraft::new("Steep the tea")
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let recipe = RecipeDocument::from_draft(draft).unwrap();
        assert_eq!(recipe.step(0).unwrap().estimated_duration_seconds, None);
    }
}
