//! End-to-end tests for the session broker HTTP API.
//!
//! These tests spin up the **real** Axum router on an OS-assigned ephemeral
//! port, make actual HTTP requests via `reqwest` and [`BrokerClient`], and
//! verify the full request/response cycle.  Time is driven by a
//! [`ManualClock`] so expiry can be exercised without sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nexa_vault::{Clock, ManualClock, SessionStore};
use nexa_web::server::router;
use nexa_web::{AppState, BrokerClient, Startup, TokenStatus, acquire_port};
use serde_json::{Value, json};

// ── helpers ──────────────────────────────────────────────────────────────────

struct TestBroker<C: Clock = ManualClock> {
    base: String,
    clock: Arc<C>,
    http: reqwest::Client,
    _server: tokio::task::JoinHandle<()>,
}

impl<C: Clock> TestBroker<C> {
    fn client(&self) -> BrokerClient {
        BrokerClient::new(&self.base).unwrap()
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .expect("request failed");
        let status = resp.status().as_u16();
        (status, resp.json().await.expect("invalid JSON"))
    }

    async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut req = self.http.post(format!("{}{path}", self.base));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.expect("request failed");
        let status = resp.status().as_u16();
        (status, resp.json().await.expect("invalid JSON"))
    }
}

/// Bind 127.0.0.1:0, start the broker router, return a handle to it.
async fn start_test_broker() -> TestBroker {
    start_test_broker_with_clock(Arc::new(ManualClock::new())).await
}

async fn start_test_broker_with_clock<C: Clock + 'static>(clock: Arc<C>) -> TestBroker<C> {
    let store = SessionStore::with_clock(Duration::from_secs(1800), clock.clone()).unwrap();
    let state = Arc::new(AppState::new(Arc::new(store)));

    let listener = acquire_port("127.0.0.1:0").await.expect("bind to port 0");
    let base = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        axum::serve(listener, router(state)).await.ok();
    });

    TestBroker {
        base,
        clock,
        http: reqwest::Client::new(),
        _server: server,
    }
}

// ── raw HTTP ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_matches_documented_scenario() {
    let broker = start_test_broker().await;

    let (status, body) = broker
        .post("/set_token", Some(json!({"token": "hf_abc123"})))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "stored", "expires_in": 1800}));

    let (status, body) = broker.get("/get_token").await;
    assert_eq!(status, 200);
    assert_eq!(body["token"], "hf_abc123");
    assert!(body["expires_in"].as_u64().unwrap() <= 1800);

    broker.clock.advance(Duration::from_secs(1801));

    let (status, body) = broker.get("/get_token").await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Token expired");

    let (status, body) = broker.get("/get_token").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "No token found");
}

#[tokio::test]
async fn empty_token_is_bad_request_and_keeps_prior_entry() {
    let broker = start_test_broker().await;
    broker
        .post("/set_token", Some(json!({"token": "keep-me"})))
        .await;

    let (status, body) = broker.post("/set_token", Some(json!({"token": ""}))).await;
    assert_eq!(status, 400);
    assert!(body["error"].is_string());

    let (_, body) = broker.get("/get_token").await;
    assert_eq!(body["token"], "keep-me");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let broker = start_test_broker().await;

    for body in [json!({}), json!({"token": 42}), json!({"tok": "hf_abc123"})] {
        let (status, _) = broker.post("/set_token", Some(body)).await;
        assert_eq!(status, 400);
    }

    let (status, _) = broker.post("/set_token", None).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn clear_never_fails_and_is_terminal() {
    let broker = start_test_broker().await;

    let (status, body) = broker.post("/clear_token", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "cleared");

    broker
        .post("/set_token", Some(json!({"token": "hf_abc123"})))
        .await;
    let (status, _) = broker.post("/clear_token", None).await;
    assert_eq!(status, 200);

    let (status, _) = broker.get("/get_token").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn overwrite_returns_latest_token() {
    let broker = start_test_broker().await;
    broker.post("/set_token", Some(json!({"token": "t1"}))).await;
    broker.post("/set_token", Some(json!({"token": "t2"}))).await;

    let (_, body) = broker.get("/get_token").await;
    assert_eq!(body["token"], "t2");
}

#[tokio::test]
async fn health_reports_uptime_and_token_presence() {
    let broker = start_test_broker().await;

    let (status, body) = broker.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_u64());
    assert_eq!(body["token_present"], false);

    broker
        .post("/set_token", Some(json!({"token": "hf_abc123"})))
        .await;
    let (_, body) = broker.get("/health").await;
    assert_eq!(body["token_present"], true);
    assert!(!body.to_string().contains("hf_abc123"));
}

#[tokio::test]
async fn error_bodies_never_echo_the_token() {
    let broker = start_test_broker().await;
    broker
        .post("/set_token", Some(json!({"token": "hf_secret_value"})))
        .await;
    broker.clock.advance(Duration::from_secs(3600));

    let (_, body) = broker.get("/get_token").await;
    assert!(!body.to_string().contains("hf_secret_value"));
}

// ── BrokerClient ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn client_roundtrip() {
    let broker = start_test_broker().await;
    let client = broker.client();

    assert!(client.is_running().await);
    assert!(matches!(
        client.get_token().await.unwrap(),
        TokenStatus::NotFound
    ));

    assert_eq!(client.set_token("hf_abc123").await.unwrap(), 1800);
    match client.get_token().await.unwrap() {
        TokenStatus::Valid { token, expires_in } => {
            assert_eq!(token, "hf_abc123");
            assert!(expires_in <= 1800);
        }
        other => panic!("expected a valid token, got {other:?}"),
    }

    client.clear_token().await.unwrap();
    assert!(client.get_token().await.unwrap().into_token().is_none());
}

#[tokio::test]
async fn client_sees_expiry_then_not_found() {
    let broker = start_test_broker().await;
    let client = broker.client();

    client.set_token("hf_abc123").await.unwrap();
    broker.clock.advance(Duration::from_secs(1801));

    assert!(matches!(client.get_token().await.unwrap(), TokenStatus::Expired));
    assert!(matches!(client.get_token().await.unwrap(), TokenStatus::NotFound));
}

#[tokio::test]
async fn client_reports_rejected_empty_token() {
    let broker = start_test_broker().await;
    let err = broker.client().set_token("  ").await.unwrap_err();
    assert!(matches!(
        err,
        nexa_web::WebError::UnexpectedStatus { status: 400, .. }
    ));
}

#[tokio::test]
async fn client_wait_until_ready_gives_up_without_broker() {
    // Reserve a port, then free it so nothing is listening there.
    let addr = {
        let listener = acquire_port("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = BrokerClient::new(format!("http://{addr}")).unwrap();

    assert!(!client.is_running().await);
    let err = client
        .wait_until_ready(3, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, nexa_web::WebError::NotReady { attempts: 3 }));
}

#[tokio::test]
async fn concurrent_clients_observe_whole_tokens() {
    let broker = start_test_broker().await;
    let tokens: Vec<String> = (0..6).map(|i| format!("hf_concurrent_{i}")).collect();

    let mut tasks = Vec::new();
    for (i, token) in tokens.iter().cloned().enumerate() {
        let client = broker.client();
        let valid = tokens.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..10 {
                match (i + round) % 3 {
                    0 => {
                        client.set_token(&token).await.unwrap();
                    }
                    1 => {
                        if let Some(got) = client.get_token().await.unwrap().into_token() {
                            assert!(valid.contains(&got));
                        }
                    }
                    _ => client.clear_token().await.unwrap(),
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    if let Some(got) = broker.client().get_token().await.unwrap().into_token() {
        assert!(tokens.contains(&got));
    }
}

#[tokio::test]
async fn ensure_running_leaves_live_broker_alone() {
    let broker = start_test_broker().await;

    let startup = broker
        .client()
        .ensure_running(|| panic!("must not launch a second broker"))
        .await
        .unwrap();
    assert_eq!(startup, Startup::AlreadyRunning);
}

#[tokio::test]
async fn ensure_running_launches_and_waits_for_broker() {
    // Reserve a port, then free it so the first health check finds nothing.
    let addr = {
        let listener = acquire_port("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let client = BrokerClient::new(format!("http://{addr}")).unwrap();
    let store = SessionStore::new(Duration::from_secs(60)).unwrap();
    let state = Arc::new(AppState::new(Arc::new(store)));

    let startup = client
        .ensure_running(move || {
            tokio::spawn(async move {
                let listener = acquire_port(&addr).await.expect("rebind reserved port");
                axum::serve(listener, router(state)).await.ok();
            });
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(startup, Startup::Launched);
    assert!(client.is_running().await);
}

#[tokio::test]
async fn ensure_running_reports_launch_failure() {
    let addr = {
        let listener = acquire_port("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = BrokerClient::new(format!("http://{addr}")).unwrap();

    let err = client
        .ensure_running(|| Err(std::io::Error::other("no binary")))
        .await
        .unwrap_err();
    assert!(matches!(err, nexa_web::WebError::Io(_)));
}

// ── internal faults ──────────────────────────────────────────────────────────

/// Panics on the first read after `arm`, then reads the wall clock.
#[derive(Default)]
struct FailOnceClock {
    armed: AtomicBool,
}

impl FailOnceClock {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl Clock for FailOnceClock {
    fn now(&self) -> DateTime<Utc> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("clock failure");
        }
        Utc::now()
    }
}

#[tokio::test]
async fn handler_panic_is_generic_500_and_broker_recovers() {
    let broker = start_test_broker_with_clock(Arc::new(FailOnceClock::default())).await;
    broker
        .post("/set_token", Some(json!({"token": "hf_before"})))
        .await;

    broker.clock.arm();
    let (status, body) = broker
        .post("/set_token", Some(json!({"token": "hf_during_fault"})))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body, json!({"error": "Internal server error"}));
    assert!(!body.to_string().contains("hf_during_fault"));

    let (status, body) = broker.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["token_present"], true);

    let (status, body) = broker.get("/get_token").await;
    assert_eq!(status, 200);
    assert_eq!(body["token"], "hf_before");

    let (status, _) = broker.post("/clear_token", None).await;
    assert_eq!(status, 200);

    let (status, _) = broker
        .post("/set_token", Some(json!({"token": "hf_after"})))
        .await;
    assert_eq!(status, 200);
    let (_, body) = broker.get("/get_token").await;
    assert_eq!(body["token"], "hf_after");
}
