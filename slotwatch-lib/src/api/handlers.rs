use http::header::{HeaderMap, CONTENT_TYPE};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::{debug, warn};

use super::response::{failure, full_body, internal_error, json_response, success, RespBody};
use super::state::ApiState;
use crate::alert::HistoryQuery;
use crate::error::{Result, SlotwatchError};
use crate::ingest::{IngestDecision, TaskRequest};
use crate::slots::{UserActivity, UserId};
use crate::telemetry::metrics::values;

pub const RANK_PATH: &str = "/api/active_task/rank";
pub const STATS_PATH: &str = "/api/active_task/stats";
pub const HISTORY_PATH: &str = "/api/active_task/history";
pub const RECORD_PATH: &str = "/api/active_task/record";

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";
pub const REQUEST_PATH_HEADER: &str = "x-request-path";
pub const MODEL_HEADER: &str = "x-model";

#[derive(Serialize)]
struct RankPayload {
    rank: Vec<UserActivity>,
    window_seconds: i64,
}

#[derive(Serialize)]
struct RecordPayload {
    recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
}

/// Dispatch one request. Never fails; internal errors become a 500.
pub async fn route<B>(req: Request<B>, state: &ApiState) -> Response<RespBody>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let query = query.as_deref();

    let (name, result) = match (&method, path.as_str()) {
        (&Method::GET, "/health") => {
            ("health", json_response(StatusCode::OK, &HealthPayload { status: "healthy" }))
        }
        (&Method::GET, "/metrics") => ("metrics", metrics(state)),
        (&Method::GET, RANK_PATH) => ("rank", rank(query, state)),
        (&Method::GET, STATS_PATH) => ("stats", success(StatusCode::OK, state.slots.stats())),
        (&Method::GET, HISTORY_PATH) => ("history", history(query, state).await),
        (&Method::POST, RECORD_PATH) => ("record", record(req, state).await),
        (_, "/health" | "/metrics" | RANK_PATH | STATS_PATH | HISTORY_PATH | RECORD_PATH) => {
            ("method_not_allowed", failure(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
        }
        _ => ("not_found", failure(StatusCode::NOT_FOUND, "Not Found")),
    };

    let response = result.unwrap_or_else(|e| {
        warn!(route = name, error = %e, "Failed to build API response");
        internal_error()
    });

    debug!(%method, path = %path, status = response.status().as_u16(), "API request served");
    if let Some(m) = &state.metrics {
        m.record_api_request(name, response.status().as_u16());
    }
    response
}

/// Prometheus text exposition of the registry, 404 when metrics are off.
fn metrics(state: &ApiState) -> Result<Response<RespBody>> {
    let Some(registry) = &state.registry else {
        return failure(StatusCode::NOT_FOUND, "Metrics are disabled");
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| SlotwatchError::Http(format!("Failed to encode metrics: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, encoder.format_type())
        .body(full_body(buffer))
        .map_err(|e| SlotwatchError::Http(format!("Failed to build response: {e}")))
}

fn rank(query: Option<&str>, state: &ApiState) -> Result<Response<RespBody>> {
    let limits = &state.limits;

    let mut window_seconds = param_i64(query, "window");
    if window_seconds <= 0 {
        window_seconds = state.slots.limits().default_window_secs;
    }
    window_seconds = window_seconds.min(limits.max_window_secs);

    let limit = clamp_limit(
        param_i64(query, "limit"),
        limits.default_rank_limit,
        limits.max_rank_limit,
    );

    let mut rank = state.slots.active_task_rank(window_seconds);
    rank.truncate(limit);

    success(StatusCode::OK, RankPayload { rank, window_seconds })
}

async fn history(query: Option<&str>, state: &ApiState) -> Result<Response<RespBody>> {
    let mut history_query = HistoryQuery::from_params(
        param_i64(query, "start_time"),
        param_i64(query, "end_time"),
        param_i64(query, "user_id"),
        param_i64(query, "limit"),
    );
    history_query.limit = history_query.limit.min(state.limits.max_history_limit);

    match state.history.fetch(&history_query).await {
        Ok(records) => success(StatusCode::OK, records),
        Err(e) => {
            warn!(error = %e, "Failed to read alert history");
            failure(StatusCode::SERVICE_UNAVAILABLE, "Alert history is unavailable")
        }
    }
}

async fn record<B>(req: Request<B>, state: &ApiState) -> Result<Response<RespBody>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let Some(user_id) =
        header_str(&parts.headers, USER_ID_HEADER).and_then(|v| v.trim().parse::<UserId>().ok())
    else {
        return failure(StatusCode::BAD_REQUEST, "Missing or invalid x-user-id header");
    };
    let Some(path) = header_str(&parts.headers, REQUEST_PATH_HEADER) else {
        return failure(StatusCode::BAD_REQUEST, "Missing x-request-path header");
    };
    let username = header_str(&parts.headers, USERNAME_HEADER).unwrap_or_default();
    let model = header_str(&parts.headers, MODEL_HEADER).unwrap_or_default();

    let body = match Limited::new(body, state.limits.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return failure(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(e) => {
            debug!(error = %e, "Failed to read record body");
            return failure(StatusCode::BAD_REQUEST, "Unable to read request body");
        }
    };

    let request = TaskRequest { user_id, username, path, body: Some(&body), model };
    match state.ingest.record(&state.slots, &request) {
        IngestDecision::Recorded(outcome) => {
            if let Some(m) = &state.metrics {
                m.record_task(&outcome, state.slots.len());
            }
            success(
                StatusCode::ACCEPTED,
                RecordPayload { recorded: true, outcome: Some(outcome.as_str()), reason: None },
            )
        }
        IngestDecision::InvalidUser => ignored(state, values::REASON_INVALID_USER),
        IngestDecision::IneligiblePath => ignored(state, values::REASON_INELIGIBLE_PATH),
    }
}

fn ignored(state: &ApiState, reason: &'static str) -> Result<Response<RespBody>> {
    if let Some(m) = &state.metrics {
        m.record_task_ignored(reason);
    }
    success(StatusCode::OK, RecordPayload { recorded: false, outcome: None, reason: Some(reason) })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Integer query parameter; absent or unparsable values read as 0.
fn param_i64(query: Option<&str>, name: &str) -> i64 {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn clamp_limit(raw: i64, default: usize, max: usize) -> usize {
    let limit = usize::try_from(raw)
        .ok()
        .filter(|l| *l > 0)
        .unwrap_or(default);
    limit.min(max)
}
