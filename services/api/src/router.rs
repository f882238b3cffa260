//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the voice WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CreateSessionPayload, ErrorResponse, HealthResponse, SearchRecipesPayload,
        SearchRecipesResponse, SessionView,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::search_recipes,
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
    ),
    components(
        schemas(SearchRecipesPayload, SearchRecipesResponse, CreateSessionPayload, SessionView, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "Recipe Road API", description = "Recipe search and voice-guided cooking sessions")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/recipes/search", post(handlers::search_recipes))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/assistant", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use recipe_road_core::{
        RealtimeBridge, RealtimeProvider, SessionConfig, SessionError, SessionSetup,
        formatter::PlainTextRecipeFormatter,
        registry::InMemorySessionRegistry,
        search::{MOCK_RECIPE_TEXT, MockRecipeSearch, RecipeCandidate, RecipeQuery, RecipeSearch},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct OfflineProvider;

    #[async_trait]
    impl RealtimeProvider for OfflineProvider {
        async fn connect(&self, _setup: SessionSetup) -> Result<RealtimeBridge, SessionError> {
            Err(SessionError::fatal("offline"))
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl RecipeSearch for BrokenSearch {
        async fn search(&self, _query: &RecipeQuery) -> anyhow::Result<Vec<RecipeCandidate>> {
            Err(anyhow::anyhow!("model unavailable"))
        }
    }

    fn app_with_search(search: Arc<dyn RecipeSearch>) -> Router {
        create_router(Arc::new(AppState {
            registry: Arc::new(InMemorySessionRegistry::new()),
            search,
            formatter: Arc::new(PlainTextRecipeFormatter),
            realtime: Arc::new(OfflineProvider),
            session_config: SessionConfig::default(),
        }))
    }

    fn app() -> Router {
        app_with_search(Arc::new(MockRecipeSearch))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(empty_request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_search_recipes() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/recipes/search",
                json!({"description": "quick dinner", "ingredients": ["garlic"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["recipes"][0]["title"], json!("Garlic Pasta"));
        assert_eq!(
            body["recipes"][0]["missing_ingredients"],
            json!(["spaghetti", "olive oil"])
        );
    }

    #[tokio::test]
    async fn test_search_requires_description() {
        let response = app()
            .oneshot(json_request("POST", "/recipes/search", json!({"description": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_failure_is_internal_error() {
        let response = app_with_search(Arc::new(BrokenSearch))
            .oneshot(json_request("POST", "/recipes/search", json!({"description": "soup"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], json!("An internal server error occurred."));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/sessions",
                json!({"recipe_text": MOCK_RECIPE_TEXT}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["recipe"]["title"], json!("Garlic Pasta"));
        assert_eq!(created["connection_state"], json!(null));
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/sessions/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = body_json(response).await;
        assert_eq!(fetched["id"], json!(id));
        assert_eq!(fetched["recipe"]["phases"].as_array().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/sessions/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(empty_request("GET", &format!("/sessions/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unparseable_recipe_is_rejected() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/sessions",
                json!({"recipe_text": "Grandma's soup\nJust make it the way she did."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("no phases"));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let id = uuid::Uuid::new_v4();
        for (method, uri) in [
            ("GET", format!("/sessions/{id}")),
            ("DELETE", format!("/sessions/{id}")),
            ("GET", format!("/sessions/{id}/assistant")),
        ] {
            let response = app().oneshot(empty_request(method, &uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_assistant_requires_websocket_upgrade() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/sessions",
                json!({"recipe_text": MOCK_RECIPE_TEXT}),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(empty_request("GET", &format!("/sessions/{id}/assistant")))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }
}
