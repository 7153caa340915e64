use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::AppState;
use super::actor::RequireActor;
use super::dto::{SearchSubjectsParams, SubjectRequest};
use super::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::subject;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

pub async fn search_subjects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchSubjectsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);
    let subjects = subject::search_subjects(state.store.as_ref(), &params.q, limit)?;
    Ok(Json(ApiResponse::success(subjects)))
}

pub async fn create_subject(
    RequireActor(_actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = subject::create_subject(state.store.as_ref(), &req.name)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(subject))))
}

pub async fn get_subject(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = state
        .store
        .get_subject_by_slug(&slug)?
        .or_not_found("Subject not found")?;
    Ok(Json(ApiResponse::success(subject)))
}

pub async fn rename_subject(
    RequireActor(_actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SubjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = subject::rename_subject(state.store.as_ref(), id, &req.name)?;
    Ok(Json(ApiResponse::success(subject)))
}

pub async fn delete_subject(
    RequireActor(_actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    subject::delete_subject(state.store.as_ref(), id)?;
    Ok(StatusCode::NO_CONTENT)
}
