//! API Models
//!
//! Request and response bodies for the REST surface. Domain types from
//! `recipe-road-core` are embedded as opaque JSON objects in the OpenAPI docs.

use chrono::{DateTime, Utc};
use recipe_road_core::{
    ConnectionState, RecipeDocument,
    registry::SessionEntry,
    search::{RecipeCandidate, RecipeQuery},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct SearchRecipesPayload {
    #[schema(example = "something quick with pasta")]
    pub description: String,
    #[serde(default)]
    #[schema(example = json!(["garlic", "spaghetti"]))]
    pub ingredients: Vec<String>,
    #[serde(default)]
    #[schema(example = json!(["vegetarian"]))]
    pub dietary_restrictions: Vec<String>,
}

impl From<SearchRecipesPayload> for RecipeQuery {
    fn from(payload: SearchRecipesPayload) -> Self {
        RecipeQuery {
            description: payload.description,
            ingredients: payload.ingredients,
            dietary_restrictions: payload.dietary_restrictions,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SearchRecipesResponse {
    /// Up to three candidates, best match first.
    #[schema(value_type = Vec<Object>)]
    pub recipes: Vec<RecipeCandidate>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateSessionPayload {
    /// Full text of the selected recipe, usually a candidate's `recipe_text`.
    #[schema(example = "# Garlic Pasta\n\nSteps:\n1. Boil water, 10 minutes.\n2. Cook the pasta.")]
    pub recipe_text: String,
}

/// A created session and the state of its voice connection.
#[derive(Serialize, ToSchema, Debug)]
pub struct SessionView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub recipe: RecipeDocument,
    /// `null` until a client connects to the assistant endpoint.
    #[schema(value_type = Option<String>, example = "active")]
    pub connection_state: Option<ConnectionState>,
}

impl SessionView {
    pub async fn from_entry(entry: &SessionEntry) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            recipe: entry.recipe.as_ref().clone(),
            connection_state: entry.connection_state().await,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_road_core::formatter::parse_plain_text;
    use recipe_road_core::registry::{InMemorySessionRegistry, SessionRegistry};
    use recipe_road_core::search::MOCK_RECIPE_TEXT;
    use serde_json::json;

    #[test]
    fn test_search_payload_defaults() {
        let payload: SearchRecipesPayload =
            serde_json::from_value(json!({"description": "soup"})).unwrap();
        let query: RecipeQuery = payload.into();
        assert_eq!(query.description, "soup");
        assert!(query.ingredients.is_empty());
        assert!(query.dietary_restrictions.is_empty());
    }

    #[test]
    fn test_create_session_payload_missing_field() {
        let result = serde_json::from_value::<CreateSessionPayload>(json!({"text": "x"}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_session_view_serialization() {
        let registry = InMemorySessionRegistry::new();
        let entry = registry
            .create(parse_plain_text(MOCK_RECIPE_TEXT).unwrap())
            .await;

        let view = SessionView::from_entry(&entry).await;
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["id"], json!(entry.id));
        assert_eq!(value["recipe"]["title"], json!("Garlic Pasta"));
        assert_eq!(value["connection_state"], json!(null));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"message": "Session not found"})
        );
    }
}
