use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::{repos, subjects};
use crate::config::{EngineConfig, ServerConfig};
use crate::fork::ForkTreeLimiter;
use crate::stats::{
    CacheCoordinator, CacheStore, ContributorStatsCache, GitStatsGenerator, MemoryCache,
};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: EngineConfig,
    pub limiter: ForkTreeLimiter,
    pub stats: Arc<ContributorStatsCache>,
}

impl AppState {
    /// Wires the engine around `store`: an in-process cache shared by both
    /// statistics tiers, and the git-backed generator under `repos_dir`.
    pub fn new(store: Arc<dyn Store>, config: &ServerConfig) -> Self {
        let engine = config.engine.clone();
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let coordinator = CacheCoordinator::new();

        let generator = GitStatsGenerator::new(
            config.repos_dir(),
            Some(Arc::clone(&cache)),
            Arc::clone(&coordinator),
            engine.cache.primary_ttl(),
        );
        let stats = ContributorStatsCache::new(
            Arc::new(generator),
            Some(cache),
            coordinator,
            engine.cache.secondary_ttl(),
        );

        Self {
            store,
            limiter: ForkTreeLimiter::new(engine.fork.max_fork_tree_nodes),
            stats: Arc::new(stats),
            config: engine,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Repos
        .route("/repos", post(repos::create_repo))
        .route("/repos/{id}", get(repos::get_repo).delete(repos::delete_repo))
        .route("/repos/{id}/forks", post(repos::fork_repo))
        .route("/repos/{id}/fork-graph", get(repos::get_fork_graph))
        .route("/repos/{id}/permissions", get(repos::get_permissions))
        .route("/repos/{id}/push-events", post(repos::push_event))
        // Subjects
        .route(
            "/subjects",
            get(subjects::search_subjects).post(subjects::create_subject),
        )
        .route(
            "/subjects/{id}",
            get(subjects::get_subject)
                .patch(subjects::rename_subject)
                .delete(subjects::delete_subject),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
