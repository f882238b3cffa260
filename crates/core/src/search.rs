//! Recipe Search Service
//!
//! Turns a free-form description plus the ingredients on hand into a short,
//! ranked list of candidate recipes. Each candidate carries the full recipe
//! text so it can be formatted into a [`RecipeDocument`](crate::recipe::RecipeDocument)
//! once the cook picks one.

use crate::llm_client::{LLMClient, prompt};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

/// Candidates returned by one search, at most.
pub const MAX_CANDIDATES: usize = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RecipeQuery {
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
}

/// A recipe summary with enough raw text to format later.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RecipeCandidate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Ingredients the recipe needs that the cook did not list.
    #[serde(default)]
    pub missing_ingredients: Vec<String>,
    /// How well the recipe fits the query, 0.0 to 1.0.
    #[serde(default)]
    pub match_score: f64,
    pub recipe_text: String,
}

/// Defines the contract for any service that can search for recipes.
#[async_trait]
pub trait RecipeSearch: Send + Sync {
    /// Returns up to [`MAX_CANDIDATES`] candidates, best match first.
    async fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeCandidate>>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    recipes: Vec<RecipeCandidate>,
}

/// Orders candidates by descending score and keeps the best few.
pub fn rank(mut candidates: Vec<RecipeCandidate>) -> Vec<RecipeCandidate> {
    candidates.retain(|c| !c.title.trim().is_empty() && !c.recipe_text.trim().is_empty());
    candidates.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// An implementation of `RecipeSearch` backed by a chat-completion model.
pub struct LLMRecipeSearch {
    llm: Arc<dyn LLMClient>,
    prompts: HashMap<String, String>,
}

impl LLMRecipeSearch {
    /// `prompts` must contain a `"search_recipes"` template using the
    /// `{description}`, `{ingredients}` and `{dietary_restrictions}` placeholders.
    pub fn new(llm: Arc<dyn LLMClient>, prompts: HashMap<String, String>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl RecipeSearch for LLMRecipeSearch {
    async fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeCandidate>> {
        let template = prompt(&self.prompts, "search_recipes")?;
        let user_prompt = template
            .replace("{description}", query.description.trim())
            .replace("{ingredients}", &list_or_none(&query.ingredients))
            .replace(
                "{dietary_restrictions}",
                &list_or_none(&query.dietary_restrictions),
            );

        let answer = self
            .llm
            .complete_json(
                "You are a recipe search engine. Answer with a JSON object only.",
                user_prompt,
            )
            .await?;
        debug!(bytes = answer.len(), "Search response received");

        let response: SearchResponse =
            serde_json::from_str(&answer).context("Search response was not valid JSON")?;
        let candidates = rank(response.recipes);
        info!(count = candidates.len(), "Recipe search complete");
        Ok(candidates)
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// A mock `RecipeSearch` with deterministic output, for development and tests.
pub struct MockRecipeSearch;

#[async_trait]
impl RecipeSearch for MockRecipeSearch {
    async fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeCandidate>> {
        let missing: Vec<String> = ["spaghetti", "garlic", "olive oil"]
            .into_iter()
            .filter(|item| !query.ingredients.iter().any(|i| i.eq_ignore_ascii_case(item)))
            .map(String::from)
            .collect();
        Ok(vec![RecipeCandidate {
            title: "Garlic Pasta".to_string(),
            description: format!("A quick answer to \"{}\".", query.description),
            prep_time: Some("5 minutes".to_string()),
            cook_time: Some("15 minutes".to_string()),
            servings: Some(2),
            difficulty: Some("easy".to_string()),
            ingredients: vec![
                "200 g spaghetti".to_string(),
                "4 cloves garlic".to_string(),
                "3 tbsp olive oil".to_string(),
            ],
            missing_ingredients: missing,
            match_score: 0.9,
            recipe_text: MOCK_RECIPE_TEXT.to_string(),
        }])
    }
}

pub const MOCK_RECIPE_TEXT: &str = "# Garlic Pasta

Ingredients:
- 200 g spaghetti
- 4 cloves garlic
- 3 tbsp olive oil

Preparation:
1. Boil a large pot of salted water, about 10 minutes.
2. Slice the garlic thinly.

Cooking:
1. Cook the spaghetti for 9 minutes.
2. Fry the garlic in olive oil until golden, 2 minutes.
3. Toss the pasta with the garlic oil and serve.
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockLLMClient;
    use serde_json::json;

    fn candidate(title: &str, score: f64) -> RecipeCandidate {
        RecipeCandidate {
            title: title.into(),
            match_score: score,
            recipe_text: format!("{title} recipe"),
            ..Default::default()
        }
    }

    #[test]
    fn test_rank_sorts_and_truncates() {
        let ranked = rank(vec![
            candidate("Soup", 0.2),
            candidate("Stew", 0.95),
            candidate("Salad", 0.5),
            candidate("Curry", 0.7),
            candidate("", 1.0),
        ]);
        let titles: Vec<&str> = ranked.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Stew", "Curry", "Salad"]);
    }

    #[tokio::test]
    async fn test_llm_search_fills_prompt_and_parses_reply() {
        let mut llm = MockLLMClient::new();
        llm.expect_complete_json()
            .withf(|_, user| {
                user.contains("something cozy")
                    && user.contains("leeks, potatoes")
                    && user.contains("Restrictions: vegetarian")
            })
            .returning(|_, _| {
                Ok(json!({
                    "recipes": [
                        {"title": "Leek Gratin", "match_score": 0.6, "recipe_text": "Bake it."},
                        {"title": "Potato Leek Soup", "match_score": 0.9, "recipe_text": "Simmer it.",
                         "missing_ingredients": ["stock"]}
                    ]
                })
                .to_string())
            });
        let prompts = HashMap::from([(
            "search_recipes".to_string(),
            "Find: {description}\nHave: {ingredients}\nRestrictions: {dietary_restrictions}"
                .to_string(),
        )]);
        let search = LLMRecipeSearch::new(Arc::new(llm), prompts);

        let results = search
            .search(&RecipeQuery {
                description: "something cozy".into(),
                ingredients: vec!["leeks".into(), "potatoes".into()],
                dietary_restrictions: vec!["vegetarian".into()],
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Potato Leek Soup");
        assert_eq!(results[0].missing_ingredients, vec!["stock".to_string()]);
    }

    #[tokio::test]
    async fn test_llm_search_requires_its_prompt() {
        let search = LLMRecipeSearch::new(Arc::new(MockLLMClient::new()), HashMap::new());
        let err = search.search(&RecipeQuery::default()).await.unwrap_err();
        assert!(err.to_string().contains("search_recipes"));
    }

    #[tokio::test]
    async fn test_mock_search_reports_missing_ingredients() {
        let results = MockRecipeSearch
            .search(&RecipeQuery {
                description: "pasta".into(),
                ingredients: vec!["Garlic".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            results[0].missing_ingredients,
            vec!["spaghetti".to_string(), "olive oil".to_string()]
        );
    }
}
