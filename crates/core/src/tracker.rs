//! Step Tracker
//!
//! Keeps the current-step pointer and the set of completed steps for one
//! session. The pointer is always a valid index into the recipe's flattened
//! step sequence.

use crate::{
    error::SessionError,
    recipe::{RecipeDocument, Step},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};

/// Read-only snapshot of how far the cook has got.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub completed_count: usize,
    pub total_count: usize,
    pub current_index: usize,
}

#[derive(Debug, Clone)]
pub struct StepTracker {
    recipe: Arc<RecipeDocument>,
    current_step_index: usize,
    completed_steps: BTreeSet<usize>,
}

impl StepTracker {
    pub fn new(recipe: Arc<RecipeDocument>) -> Self {
        Self {
            recipe,
            current_step_index: 0,
            completed_steps: BTreeSet::new(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.recipe.total_steps()
    }

    pub fn current_index(&self) -> usize {
        self.current_step_index
    }

    pub fn completed_steps(&self) -> &BTreeSet<usize> {
        &self.completed_steps
    }

    /// Returns the step under the pointer.
    pub fn current(&self) -> &Step {
        self.step_at(self.current_step_index)
    }

    /// Completes the current step and moves to the next one.
    ///
    /// On the last step the step is still marked complete, the pointer stays
    /// put and `NoMoreSteps` is returned.
    pub fn advance(&mut self) -> Result<&Step, SessionError> {
        self.completed_steps.insert(self.current_step_index);
        if self.current_step_index + 1 >= self.total_steps() {
            return Err(SessionError::NoMoreSteps);
        }
        self.current_step_index += 1;
        Ok(self.current())
    }

    /// Marks a step complete without moving the pointer. Idempotent.
    pub fn mark_complete(&mut self, index: i64) -> Result<(), SessionError> {
        let index = self.validate(index)?;
        self.completed_steps.insert(index);
        Ok(())
    }

    /// Moves the pointer anywhere in the recipe; completion state is untouched.
    pub fn jump_to(&mut self, index: i64) -> Result<&Step, SessionError> {
        self.current_step_index = self.validate(index)?;
        Ok(self.current())
    }

    pub fn progress_summary(&self) -> ProgressSummary {
        ProgressSummary {
            completed_count: self.completed_steps.len(),
            total_count: self.total_steps(),
            current_index: self.current_step_index,
        }
    }

    fn validate(&self, index: i64) -> Result<usize, SessionError> {
        let total = self.total_steps();
        usize::try_from(index)
            .ok()
            .filter(|i| *i < total)
            .ok_or(SessionError::InvalidStepIndex { index, total })
    }

    fn step_at(&self, index: usize) -> &Step {
        let mut remaining = index;
        for phase in &self.recipe.phases {
            if remaining < phase.steps.len() {
                return &phase.steps[remaining];
            }
            remaining -= phase.steps.len();
        }
        // Validated documents always hold `index`; fall back to the final step.
        let last = &self.recipe.phases[self.recipe.phases.len() - 1];
        &last.steps[last.steps.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tests::sample_recipe;

    fn tracker() -> StepTracker {
        StepTracker::new(Arc::new(sample_recipe()))
    }

    #[test]
    fn test_starts_at_first_step() {
        let tracker = tracker();
        assert_eq!(tracker.current().index, 0);
        assert_eq!(
            tracker.progress_summary(),
            ProgressSummary {
                completed_count: 0,
                total_count: 3,
                current_index: 0
            }
        );
    }

    #[test]
    fn test_advance_through_whole_recipe() {
        let mut tracker = tracker();
        assert_eq!(tracker.advance().unwrap().index, 1);
        assert_eq!(tracker.advance().unwrap().index, 2);
        assert_eq!(tracker.current().instruction, "Fry the garlic in olive oil");
        assert_eq!(tracker.advance(), Err(SessionError::NoMoreSteps));
        assert_eq!(tracker.current_index(), 2);
        assert_eq!(tracker.completed_steps().len(), 3);
    }

    #[test]
    fn test_scenario_mark_then_finish() {
        let mut tracker = tracker();
        assert_eq!(tracker.advance().unwrap().index, 1);
        assert_eq!(tracker.advance().unwrap().index, 2);
        tracker.mark_complete(2).unwrap();
        assert_eq!(tracker.advance(), Err(SessionError::NoMoreSteps));
        assert_eq!(
            tracker.progress_summary(),
            ProgressSummary {
                completed_count: 3,
                total_count: 3,
                current_index: 2
            }
        );
    }

    #[test]
    fn test_mark_complete_is_idempotent() {
        let mut tracker = tracker();
        tracker.mark_complete(1).unwrap();
        let after_first = tracker.completed_steps().clone();
        tracker.mark_complete(1).unwrap();
        assert_eq!(tracker.completed_steps(), &after_first);
        assert_eq!(tracker.current_index(), 0);
    }

    #[test]
    fn test_out_of_range_indices_are_rejected() {
        let mut tracker = tracker();
        assert_eq!(
            tracker.mark_complete(3),
            Err(SessionError::InvalidStepIndex { index: 3, total: 3 })
        );
        assert_eq!(
            tracker.jump_to(-1).unwrap_err(),
            SessionError::InvalidStepIndex {
                index: -1,
                total: 3
            }
        );
        assert_eq!(tracker.current_index(), 0);
        assert!(tracker.completed_steps().is_empty());
    }

    #[test]
    fn test_jump_moves_both_ways_without_completing() {
        let mut tracker = tracker();
        assert_eq!(tracker.jump_to(2).unwrap().index, 2);
        assert_eq!(tracker.jump_to(0).unwrap().index, 0);
        assert!(tracker.completed_steps().is_empty());
    }

    #[test]
    fn test_pointer_stays_in_range_under_mixed_navigation() {
        let mut tracker = tracker();
        let moves: [i64; 10] = [5, 1, -3, 2, 9, 0, 2, 2, 1, 7];
        for (i, target) in moves.iter().enumerate() {
            if i % 2 == 0 {
                let _ = tracker.advance();
            }
            let _ = tracker.jump_to(*target);
            assert!(tracker.current_index() < tracker.total_steps());
        }
    }

    #[test]
    fn test_current_resolves_across_phases() {
        let mut tracker = tracker();
        tracker.jump_to(2).unwrap();
        assert_eq!(tracker.current().instruction, "Fry the garlic in olive oil");
        tracker.jump_to(1).unwrap();
        assert_eq!(tracker.current().instruction, "Slice four cloves of garlic");
    }
}
