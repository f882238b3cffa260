//! Axum Handlers for the REST API
//!
//! Recipe search, session creation and session lifecycle. Handlers use
//! `utoipa` doc comments to generate the OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use recipe_road_core::{formatter::FormatError, registry::RegistryError};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        CreateSessionPayload, ErrorResponse, HealthResponse, SearchRecipesPayload,
        SearchRecipesResponse, SessionView,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::UnprocessableEntity(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl ApiError {
    pub fn from_registry(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RegistryError::AlreadyConnected(_) => ApiError::Conflict(err.to_string()),
        }
    }

    fn from_format(err: FormatError) -> Self {
        match err {
            FormatError::Parse(e) => ApiError::UnprocessableEntity(e.to_string()),
            FormatError::Upstream(e) => ApiError::InternalServerError(e),
        }
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Find up to three recipes matching a description and the ingredients on hand.
#[utoipa::path(
    post,
    path = "/recipes/search",
    request_body = SearchRecipesPayload,
    responses(
        (status = 200, description = "Ranked recipe candidates", body = SearchRecipesResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn search_recipes(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRecipesPayload>,
) -> Result<Json<SearchRecipesResponse>, ApiError> {
    if payload.description.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "description must not be empty".to_string(),
        ));
    }
    let recipes = state.search.search(&payload.into()).await?;
    Ok(Json(SearchRecipesResponse { recipes }))
}

/// Format the selected recipe and create a cooking session for it.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionView),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 422, description = "Recipe could not be split into phases and steps", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.recipe_text.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "recipe_text must not be empty".to_string(),
        ));
    }

    let recipe = state
        .formatter
        .format(&payload.recipe_text)
        .await
        .map_err(|e| {
            warn!(error = %e, "Recipe formatting failed");
            ApiError::from_format(e)
        })?;

    let entry = state.registry.create(recipe).await;
    info!(session_id = %entry.id, steps = entry.recipe.total_steps(), "Cooking session ready");
    Ok((StatusCode::CREATED, Json(SessionView::from_entry(&entry).await)))
}

/// Get a session, including the state of its voice connection.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let entry = state
        .registry
        .get(id)
        .await
        .map_err(ApiError::from_registry)?;
    Ok(Json(SessionView::from_entry(&entry).await))
}

/// Delete a session. A connected voice session is ended.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .delete(id)
        .await
        .map_err(ApiError::from_registry)?;
    Ok(StatusCode::NO_CONTENT)
}
