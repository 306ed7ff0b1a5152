//! Integration tests for the reflection REST API.
//!
//! Each test spins up an Axum server on a random port and drives the turn
//! contract over HTTP with reqwest, round-tripping the flow state the way a
//! real client would.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use coparent_reflect::config::FlowConfig;
use coparent_reflect::error::LlmError;
use coparent_reflect::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use coparent_reflect::reflection::{
    PhaseCatalog, ReflectionRouteState, TurnOrchestrator, reflection_routes,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const PHASE_ONE_REPLY: &str = "[Phase 1: Name It] That sounds exhausting. Who else does this touch?\n\
     [EXTRACTED: {\"situation_description\": \"ex missed Wednesday pickup again\", \
     \"parties_involved\": \"me, my ex, Maya\"}]";

/// Stub LLM provider: always answers with a phase-one reply carrying a full
/// extraction, and counts calls.
struct StubLlm {
    calls: AtomicU32,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: PHASE_ONE_REPLY.to_string(),
            input_tokens: 10,
            output_tokens: 20,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// Start an Axum server on a random port, return (base url, stub).
async fn start_server() -> (String, Arc<StubLlm>) {
    let stub = Arc::new(StubLlm {
        calls: AtomicU32::new(0),
    });
    let llm: Arc<dyn LlmProvider> = stub.clone();
    let orchestrator = Arc::new(TurnOrchestrator::new(
        llm,
        PhaseCatalog::standard(),
        FlowConfig::default(),
    ));
    let app = reflection_routes(ReflectionRouteState::new(orchestrator));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), stub)
}

async fn post_turn(base: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{base}/api/reflection/turn"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn confirmed_dense_turn_advances_and_state_round_trips() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_server().await;

        let (status, first) = post_turn(
            &base,
            json!({
                "userInput": "Yes, that's everything: last Wednesday my ex missed the school \
                              pickup for the third time, so I left work early.",
                "currentPhase": 1,
                "sessionId": null
            }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(first["original_phase"], 1);
        assert_eq!(first["current_phase"], 2);
        assert_eq!(first["phase_advanced"], true);
        assert_eq!(first["forced"], false);
        assert!(first["readiness"].as_f64().unwrap() >= 0.7);
        assert!(first["content"].as_str().unwrap().starts_with("[Phase 2: Beneath]"));
        assert!(!first["content"].as_str().unwrap().contains("[EXTRACTED"));
        assert!(first["summary"].as_str().unwrap().starts_with("Identified:"));
        assert!(first.get("error").is_none());
        // Base reply plus the re-scoped transition reply.
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);

        let state = first["flow_state"].clone();
        assert_eq!(state["currentPhase"], 2);
        assert_eq!(state["readiness"], 0.0);
        assert_eq!(state["turnsInPhase"], 0);
        assert_eq!(state["conversationHistory"].as_array().unwrap().len(), 2);

        let session_id = first["session_id"].as_str().unwrap().to_string();
        let (status, second) = post_turn(
            &base,
            json!({
                "userInput": "hm",
                "currentPhase": 2,
                "flowState": state,
                "sessionId": session_id
            }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(second["session_id"], session_id.as_str());
        assert_eq!(second["current_phase"], 2);
        assert_eq!(second["phase_advanced"], false);
        assert!(second["content"].as_str().unwrap().starts_with("[Phase 2: Beneath]"));
        assert_eq!(second["flow_state"]["turnsInPhase"], 1);
        assert_eq!(
            second["flow_state"]["conversationHistory"]
                .as_array()
                .unwrap()
                .len(),
            4
        );
        assert_eq!(
            second["flow_state"]["context"]["situation_description"],
            "ex missed Wednesday pickup again"
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn mismatched_phase_is_rejected_without_generation() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_server().await;
        let (status, body) = post_turn(
            &base,
            json!({ "userInput": "hello", "currentPhase": 4 }),
        )
        .await;
        assert_eq!(status, 422);
        assert!(body["error"].is_string());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn out_of_bounds_readiness_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (base, _stub) = start_server().await;
        let (status, _) = post_turn(
            &base,
            json!({
                "userInput": "hello",
                "currentPhase": 1,
                "flowState": {
                    "readiness": 1.5,
                    "context": {},
                    "lastPrompt": "",
                    "lastResponse": "",
                    "conversationHistory": [],
                    "currentPhase": 1,
                    "turnsInPhase": 0
                }
            }),
        )
        .await;
        assert_eq!(status, 422);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn phases_and_health_endpoints() {
    timeout(TEST_TIMEOUT, async {
        let (base, _stub) = start_server().await;
        let client = reqwest::Client::new();

        let phases: Value = client
            .get(format!("{base}/api/reflection/phases"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = phases["phases"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            ["Name It", "Beneath", "Why", "Co-Parent", "Child", "Options", "Choose"]
        );

        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);
    })
    .await
    .expect("test timed out");
}
