use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio_util::sync::CancellationToken;

use super::AppState;
use super::actor::{MaybeActor, RequireActor};
use super::dto::{CreateRepoRequest, ForkRepoRequest};
use super::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::access::resolve_permissions;
use crate::fork::{create_repository, delete_repository, fork_repository, record_push};
use crate::graph::ForkGraphBuilder;
use crate::store::RepoLookup;
use crate::types::{GraphParams, Repo, User};

/// Loads a repository the actor may see. Private repositories of other
/// owners are reported as missing.
fn load_visible_repo(state: &AppState, actor: Option<&User>, id: i64) -> Result<Repo, ApiError> {
    let repo = state
        .store
        .get_repo_by_id(id)?
        .or_not_found("Repository not found")?;

    if repo.is_private && actor.is_none_or(|a| a.id != repo.owner_id) {
        return Err(ApiError::not_found("Repository not found"));
    }
    Ok(repo)
}

fn load_owned_repo(state: &AppState, actor: &User, id: i64) -> Result<Repo, ApiError> {
    let repo = load_visible_repo(state, Some(actor), id)?;
    if repo.owner_id != actor.id {
        return Err(ApiError::forbidden("Only the owner can do this"));
    }
    Ok(repo)
}

pub async fn get_repo(
    MaybeActor(actor): MaybeActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_visible_repo(&state, actor.as_ref(), id)?;
    Ok(Json(ApiResponse::success(repo)))
}

pub async fn create_repo(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRepoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = create_repository(
        state.store.as_ref(),
        &actor,
        &req.name,
        req.subject.as_deref(),
    )?;

    tracing::info!("User {} created repository {} ({})", actor.id, repo.name, repo.id);

    Ok((StatusCode::CREATED, Json(ApiResponse::success(repo))))
}

pub async fn fork_repo(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ForkRepoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_repo(&state, Some(&actor), id)?;

    let fork = fork_repository(
        state.store.as_ref(),
        &state.limiter,
        &actor,
        id,
        req.name.as_deref(),
    )?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(fork))))
}

pub async fn push_event(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    load_owned_repo(&state, &actor, id)?;

    let outcome = record_push(state.store.as_ref(), &state.limiter, id)?;
    state.stats.invalidate(id);

    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn delete_repo(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    load_owned_repo(&state, &actor, id)?;

    let outcome = delete_repository(state.store.as_ref(), &state.limiter, id)?;
    state.stats.invalidate(id);

    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn get_fork_graph(
    MaybeActor(actor): MaybeActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<GraphParams>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_visible_repo(&state, actor.as_ref(), id)?;

    // Dropping the request future cancels the build.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let task_state = Arc::clone(&state);
    let graph = tokio::task::spawn_blocking(move || {
        let builder = ForkGraphBuilder::new(
            task_state.store.as_ref(),
            Some(task_state.stats.as_ref()),
            &task_state.config.graph,
        );
        builder.build(&repo, &params, actor.as_ref(), &cancel)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Graph build task failed: {e}")))??;

    Ok(Json(ApiResponse::success(graph)))
}

pub async fn get_permissions(
    MaybeActor(actor): MaybeActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_visible_repo(&state, actor.as_ref(), id)?;
    let permissions = resolve_permissions(Arc::clone(&state.store), actor.as_ref(), &repo).await?;
    Ok(Json(ApiResponse::success(permissions)))
}
