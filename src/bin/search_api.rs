use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vidsearch::{DailyLimit, InMemoryQuota, RankedResult, RequestQuota, SearchArgs, SearchError, SearchService};

const SERVICE_UNAVAILABLE_MESSAGE: &str = "Упс! Кажется, что-то пошло не так 😬 \
     Повторите попытку позднее ⚙️";
const LIMIT_REACHED_MESSAGE: &str = "Вы задали максимум вопросов на сегодня. Возвращайтесь завтра 🙏";

#[derive(Parser, Debug)]
#[command(
    name = "vidsearch-api",
    about = "HTTP API that answers questions with ranked links into indexed videos"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "VIDSEARCH_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Maximum top-k allowed per request.
    #[arg(long, default_value_t = 10)]
    max_top_k: usize,

    /// Requests a user may make per day (0 disables the limit).
    #[arg(long, env = "VIDSEARCH_MAX_REQUESTS_PER_DAY", default_value_t = 5)]
    max_requests_per_day: u32,

    /// Users exempt from the daily limit, comma separated.
    #[arg(long, env = "VIDSEARCH_UNLIMITED_USERS", default_value = "")]
    unlimited_users: String,

    #[command(flatten)]
    search: SearchArgs,
}

#[derive(Clone)]
struct AppState {
    service: SearchService,
    quota: Arc<dyn RequestQuota>,
    limit: Arc<DailyLimit>,
    default_top_k: usize,
    max_top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    answer: String,
    results: Vec<RankedResult>,
    meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
struct ResponseMeta {
    top_k: usize,
    latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    requests_today: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    vidsearch::init_tracing();
    let cli = ApiCli::parse();
    let service = cli.search.build_service().await?;
    let unlimited = cli
        .unlimited_users
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let state = AppState {
        default_top_k: service.settings().top_k,
        service,
        quota: Arc::new(InMemoryQuota::default()),
        limit: Arc::new(DailyLimit::new(cli.max_requests_per_day, unlimited)),
        max_top_k: cli.max_top_k.max(1),
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/search", post(search_handler))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, "vidsearch-api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.query.trim().is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "query text must not be empty"));
    }
    let requests_today = match &request.user_id {
        Some(user) => match state.quota.try_acquire(user, &state.limit).await {
            Some(count) => Some(count),
            None => {
                info!(user, "daily request limit reached");
                return Err(error_body(StatusCode::TOO_MANY_REQUESTS, LIMIT_REACHED_MESSAGE));
            }
        },
        None => None,
    };

    let top_k = request
        .top_k
        .unwrap_or(state.default_top_k)
        .clamp(1, state.max_top_k);
    let start = Instant::now();
    let results = match state.service.search_ranked(&request.query, top_k).await {
        Ok(results) => results,
        Err(err) => {
            // Failed searches are not counted.
            if let Some(user) = &request.user_id {
                state.quota.release(user).await;
            }
            return Err(search_error(err));
        }
    };
    let answer = state.service.format(&results, &request.query);
    if let (Some(user), Some(count)) = (&request.user_id, requests_today) {
        info!(user, count, "request counted");
    }
    Ok(Json(SearchResponse {
        answer,
        results,
        meta: ResponseMeta {
            top_k,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            requests_today,
        },
    }))
}

fn search_error(err: SearchError) -> (StatusCode, Json<ErrorBody>) {
    match err {
        SearchError::EmptyQuery => error_body(StatusCode::BAD_REQUEST, err.to_string()),
        err if err.is_upstream() => {
            warn!(error = %err, "search failed upstream");
            error_body(StatusCode::SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE_MESSAGE)
        }
        err => {
            error!(error = %err, "search failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        ApiCli::command().debug_assert();
    }
}
