//! End-to-end tests: the real server on an ephemeral port, backed by a
//! mocked Ollama `/api/generate` endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::oneshot;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use revu::Server;
use revu::client::{ClientError, ReviewClient};
use revu::config::OllamaConfig;
use revu::llm::{DisabledBackend, LlmBackend, OllamaClient};
use revu::review::{FocusArea, ReviewService};

const MODEL: &str = "phi3:3.8b";

const STRUCTURED_REPLY: &str = r#"{
  "summary": ["Adds an add(a, b) helper", "No type hints", "No input validation"],
  "findings": [
    {"category": "style", "severity": "Low", "message": "Add type hints to add()."},
    {"category": "security", "severity": "Low", "message": "Validate numeric input."},
    {"category": "performance", "severity": "Low", "message": "Nothing to optimize here."}
  ]
}"#;

struct TestApp {
    base: String,
    _shutdown: oneshot::Sender<()>,
}

async fn spawn_app(backend: Arc<dyn LlmBackend>) -> TestApp {
    let app = revu::api::app(Arc::new(ReviewService::new(backend)));
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", server.local_addr());
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(server.run_until(
        move |req| {
            let app = app.clone();
            async move { app.handle(req).await }
        },
        async {
            let _ = rx.await;
        },
    ));

    TestApp {
        base,
        _shutdown: tx,
    }
}

fn ollama(mock: &MockServer, timeout: Duration) -> Arc<dyn LlmBackend> {
    let config = OllamaConfig {
        enabled: true,
        model: MODEL.into(),
        base_url: mock.uri(),
        timeout,
    };
    Arc::new(OllamaClient::new(&config).unwrap())
}

fn generate_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": MODEL,
        "created_at": "2024-05-01T12:00:00Z",
        "response": text,
        "done": true
    }))
}

async fn post_review(app: &TestApp, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}/review", app.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

fn assert_valid_review(body: &Value) {
    assert!(!body["summary"].as_str().unwrap().trim().is_empty());
    for finding in body["findings"].as_array().unwrap() {
        let category = finding["category"].as_str().unwrap();
        let severity = finding["severity"].as_str().unwrap();
        assert!(["security", "performance", "style"].contains(&category));
        assert!(["Low", "Medium", "High"].contains(&severity));
        assert!(!finding["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn structured_reply_is_returned_as_findings() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": MODEL, "stream": false})))
        .respond_with(generate_reply(STRUCTURED_REPLY))
        .expect(1)
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_secs(5))).await;
    let (status, body) = post_review(
        &app,
        json!({"text": "def add(a,b): return a+b", "focus": ["security", "performance", "style"]}),
    )
    .await;

    assert_eq!(status, 200);
    assert_valid_review(&body);
    assert!(!body["findings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unrequested_category_is_kept() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply(
            r#"{"summary": ["Evaluates user input"], "findings": [
                {"category": "security", "severity": "High", "message": "eval() on request data."}
            ]}"#,
        ))
        .expect(1)
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_secs(5))).await;
    let (status, body) = post_review(&app, json!({"text": "x = eval(y)", "focus": ["style"]})).await;

    assert_eq!(status, 200);
    assert_valid_review(&body);
    let findings = body["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["category"], "security");
}

#[tokio::test]
async fn unstructured_reply_becomes_summary() {
    let mock = MockServer::start().await;
    let prose = "The helper is fine. Consider adding type hints at some point.";
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply(prose))
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_secs(5))).await;
    let (status, body) = post_review(&app, json!({"text": "x = 1", "focus": ["style"]})).await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"], prose);
    assert_eq!(body["findings"], json!([]));
}

#[tokio::test]
async fn slow_backend_is_503() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply(STRUCTURED_REPLY).set_delay(Duration::from_secs(3)))
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_millis(300))).await;
    let (status, body) = post_review(&app, json!({"text": "x = 1"})).await;

    assert_eq!(status, 503);
    assert_eq!(body["error"], "upstream_unavailable");
    assert!(body.get("findings").is_none());
}

#[tokio::test]
async fn backend_error_status_is_502() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'phi3:3.8b' not found"})),
        )
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_secs(5))).await;
    let (status, body) = post_review(&app, json!({"text": "x = 1"})).await;

    assert_eq!(status, 502);
    assert!(body["detail"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn invalid_input_never_reaches_backend() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply(STRUCTURED_REPLY))
        .expect(0)
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_secs(5))).await;
    for body in [
        json!({"text": "", "focus": ["security"]}),
        json!({"text": "   ", "focus": ["security"]}),
        json!({"text": "x = 1", "focus": []}),
    ] {
        let (status, reply) = post_review(&app, body).await;
        assert_eq!(status, 400);
        assert_eq!(reply["error"], "invalid_request");
    }
}

#[tokio::test]
async fn health_does_not_need_a_backend() {
    let app = spawn_app(Arc::new(DisabledBackend)).await;
    let response = reqwest::get(format!("{}/health", app.base)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["llm_enabled"], false);

    // Enabled but unreachable: still healthy, since health never calls out.
    let unreachable = OllamaConfig {
        enabled: true,
        model: MODEL.into(),
        base_url: "http://127.0.0.1:9".into(),
        timeout: Duration::from_secs(1),
    };
    let app = spawn_app(Arc::new(OllamaClient::new(&unreachable).unwrap())).await;
    let body: Value = reqwest::get(format!("{}/health", app.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["provider"], "ollama");
    assert_eq!(body["model"], MODEL);
}

#[tokio::test]
async fn disabled_backend_is_503() {
    let app = spawn_app(Arc::new(DisabledBackend)).await;
    let (status, body) = post_review(&app, json!({"text": "x = 1"})).await;
    assert_eq!(status, 503);
    assert!(body["detail"].as_str().unwrap().contains("USE_OLLAMA"));
}

#[tokio::test]
async fn terminal_client_round_trip() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply(STRUCTURED_REPLY))
        .mount(&mock)
        .await;

    let app = spawn_app(ollama(&mock, Duration::from_secs(5))).await;
    let client = ReviewClient::new(format!("{}/review", app.base), Duration::from_secs(10)).unwrap();

    let result = client
        .review("def add(a,b): return a+b", &FocusArea::all())
        .await
        .unwrap();
    assert!(!result.summary.is_empty());
    assert_eq!(result.findings.len(), 3);

    let rendered = revu::client::render(&result);
    assert!(rendered.starts_with("Summary\n"));
    assert!(rendered.contains("- Style / Low — Add type hints to add()."));

    let err = client.review("x = 1", &Default::default()).await.unwrap_err();
    match err {
        ClientError::Api { status, .. } => assert_eq!(status, 400),
        other => panic!("expected an API error, got {other:?}"),
    }
}
