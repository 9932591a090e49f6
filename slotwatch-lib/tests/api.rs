use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use slotwatch_lib::alert::{AlertRecord, AlertStore, MemoryAlertStore};
use slotwatch_lib::api::{
    route, serve, ApiState, HISTORY_PATH, MODEL_HEADER, RANK_PATH, RECORD_PATH, REQUEST_PATH_HEADER,
    STATS_PATH, USERNAME_HEADER, USER_ID_HEADER,
};
use slotwatch_lib::config::{ApiConfig, SlotConfig};
use slotwatch_lib::slots::{ManualClock, SlotStore};
use slotwatch_lib::IngestFilter;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

struct Fixture {
    state: ApiState,
    history: Arc<MemoryAlertStore>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(100_000));
    let slots = Arc::new(SlotStore::with_clock(&SlotConfig::default(), clock));
    let history = Arc::new(MemoryAlertStore::new(100));
    let limits = ApiConfig { max_body_bytes: 1_024, max_rank_limit: 2, ..ApiConfig::default() };
    let state = ApiState::new(slots, history.clone(), IngestFilter::default()).with_limits(limits);
    Fixture { state, history }
}

fn get(uri: &str) -> Result<Request<Full<Bytes>>, http::Error> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Full::new(Bytes::new()))
}

fn record_request(user_id: &str, path: &str, body: impl Into<Bytes>) -> Result<Request<Full<Bytes>>, http::Error> {
    Request::builder()
        .method(Method::POST)
        .uri(RECORD_PATH)
        .header(USER_ID_HEADER, user_id)
        .header(USERNAME_HEADER, format!("user-{user_id}"))
        .header(REQUEST_PATH_HEADER, path)
        .header(MODEL_HEADER, "gpt-4o")
        .body(Full::new(body.into()))
}

async fn call(state: &ApiState, req: Request<Full<Bytes>>) -> Result<(StatusCode, Value), Box<dyn std::error::Error + Send + Sync>> {
    let resp = route(req, state).await;
    let status = resp.status();
    let bytes = resp.into_body().collect().await?.to_bytes();
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn health_is_not_enveloped() -> TestResult {
    let fx = fixture();
    let (status, body) = call(&fx.state, get("/health")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn record_then_rank() -> TestResult {
    let fx = fixture();
    for (user, task) in [("1", "task-a"), ("1", "task-b"), ("2", "task-c"), ("3", "task-d")] {
        let (status, body) = call(&fx.state, record_request(user, "/v1/chat/completions", task)?).await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["recorded"], true);
        assert_eq!(body["data"]["outcome"], "allocated");
    }

    let (status, body) = call(&fx.state, get(RANK_PATH)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["window_seconds"], 30);
    let rank = body["data"]["rank"].as_array().ok_or("rank is not an array")?;
    // capped by max_rank_limit
    assert_eq!(rank.len(), 2);
    assert_eq!(rank[0]["user_id"], 1);
    assert_eq!(rank[0]["active_slots"], 2);
    assert_eq!(rank[0]["username"], "user-1");
    assert_eq!(rank[1]["user_id"], 2);
    Ok(())
}

#[tokio::test]
async fn rank_window_is_clamped() -> TestResult {
    let fx = fixture();
    let (_, body) = call(&fx.state, get(&format!("{RANK_PATH}?window=999999"))?).await?;
    assert_eq!(body["data"]["window_seconds"], 3_600);

    let (_, body) = call(&fx.state, get(&format!("{RANK_PATH}?window=-4&limit=1"))?).await?;
    assert_eq!(body["data"]["window_seconds"], 30);
    Ok(())
}

#[tokio::test]
async fn repeated_record_matches_same_slot() -> TestResult {
    let fx = fixture();
    call(&fx.state, record_request("5", "/v1/messages", "task-a")?).await?;
    let (status, body) = call(&fx.state, record_request("5", "/v1/messages", "task-a")?).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["outcome"], "matched");
    assert_eq!(fx.state.slots.user_slot_count(5), 1);
    Ok(())
}

#[tokio::test]
async fn record_ignores_anonymous_users_and_other_paths() -> TestResult {
    let fx = fixture();

    let (status, body) = call(&fx.state, record_request("0", "/v1/chat/completions", "task-a")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recorded"], false);
    assert_eq!(body["data"]["reason"], "invalid_user");

    let (status, body) = call(&fx.state, record_request("4", "/v1/embeddings", "task-a")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reason"], "ineligible_path");

    assert!(fx.state.slots.is_empty());
    Ok(())
}

#[tokio::test]
async fn record_rejects_bad_requests() -> TestResult {
    let fx = fixture();

    let (status, body) = call(&fx.state, record_request("abc", "/v1/chat/completions", "task-a")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let req = Request::builder()
        .method(Method::POST)
        .uri(RECORD_PATH)
        .header(USER_ID_HEADER, "4")
        .body(Full::new(Bytes::from_static(b"task-a")))?;
    let (status, _) = call(&fx.state, req).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let oversized = vec![b'a'; 2_048];
    let (status, _) = call(&fx.state, record_request("4", "/v1/chat/completions", oversized)?).await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    assert!(fx.state.slots.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_body_falls_back_to_model() -> TestResult {
    let fx = fixture();
    call(&fx.state, record_request("6", "/v1/responses", Bytes::new())?).await?;
    let (_, body) = call(&fx.state, record_request("6", "/v1/responses", "gpt-4o")?).await?;
    assert_eq!(body["data"]["outcome"], "matched");
    Ok(())
}

#[tokio::test]
async fn stats_and_history() -> TestResult {
    let fx = fixture();
    call(&fx.state, record_request("1", "/v1/chat/completions", "task-a")?).await?;
    fx.history.append(AlertRecord::new(1, "user-1", 9, 600, 1_000)).await?;
    fx.history.append(AlertRecord::new(2, "user-2", 7, 600, 2_000)).await?;

    let (status, body) = call(&fx.state, get(STATS_PATH)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_slots"], 1);
    assert_eq!(body["data"]["active_users"], 1);
    assert_eq!(body["data"]["max_global_slots"], 1_000);

    let (status, body) = call(&fx.state, get(HISTORY_PATH)?).await?;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"].as_array().ok_or("history is not an array")?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["user_id"], 2);

    let (_, body) = call(&fx.state, get(&format!("{HISTORY_PATH}?user_id=1&start_time=500"))?).await?;
    let records = body["data"].as_array().ok_or("history is not an array")?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["active_slots"], 9);
    Ok(())
}

#[tokio::test]
async fn unknown_routes_and_methods() -> TestResult {
    let fx = fixture();

    let (status, _) = call(&fx.state, get("/api/nope")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&fx.state, get(RECORD_PATH)?).await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    // metrics are disabled in this state
    let (status, _) = call(&fx.state, get("/metrics")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn serves_over_http() -> TestResult {
    let fx = fixture();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(listener, fx.state.clone(), shutdown.clone()));

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}{RECORD_PATH}"))
        .header(USER_ID_HEADER, "11")
        .header(USERNAME_HEADER, "kim")
        .header(REQUEST_PATH_HEADER, "/v1/chat/completions")
        .body("task-http")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

    let body: Value = client
        .get(format!("http://{addr}{RANK_PATH}?window=60"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["rank"][0]["username"], "kim");

    shutdown.cancel();
    server.await??;
    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_exposes_counters() -> TestResult {
    let fx = fixture();
    let (metrics, registry) = slotwatch_lib::telemetry::init_metrics()?;
    let state = fx.state.with_metrics(Some(metrics), Some(registry));

    call(&state, record_request("8", "/v1/chat/completions", "task-m")?).await?;

    let resp = route(get("/metrics")?, &state).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await?.to_bytes();
    let text = String::from_utf8(bytes.to_vec())?;
    assert!(text.contains("slotwatch_record_task"));
    assert!(text.contains("slotwatch_build_info"));
    Ok(())
}
