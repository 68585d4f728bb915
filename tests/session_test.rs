//! Integration tests for the execution bridge.
//!
//! These drive a `Session` through a scripted mock handle that records every
//! script invocation, so request marshalling, header merging, timeout
//! classification, and lifecycle behavior are all verified without a
//! browser. The one live test at the bottom needs a running chromedriver.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_test::assert_ok;

use browser_requests::{BrowserHandle, Error, HandleError, Session, SessionConfig};

static TRACING: Once = Once::new();

/// Route bridge logs through the test harness; opt in with RUST_LOG.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// What the mock reports for one `execute` call.
enum ScriptOutcome {
    Resolve(Value),
    Fail(HandleError),
    /// Never settle; the driver-side timeout is assumed broken too, so the
    /// bridge's own guard has to fire.
    Hang,
}

#[derive(Default)]
struct MockInner {
    outcomes: Mutex<VecDeque<ScriptOutcome>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    script_timeout: Mutex<Option<Duration>>,
    fail_setup: AtomicBool,
    close_count: AtomicUsize,
}

#[derive(Clone, Default)]
struct MockHandle {
    inner: Arc<MockInner>,
}

impl MockHandle {
    fn with_outcomes(outcomes: Vec<ScriptOutcome>) -> Self {
        let handle = Self::default();
        *handle.inner.outcomes.lock().unwrap() = outcomes.into();
        handle
    }

    fn failing_setup() -> Self {
        let handle = Self::default();
        handle.inner.fail_setup.store(true, Ordering::SeqCst);
        handle
    }

    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.inner.calls.lock().unwrap().clone()
    }

    fn close_count(&self) -> usize {
        self.inner.close_count.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ScriptOutcome {
        self.inner
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                ScriptOutcome::Resolve(json!({
                    "status": 200,
                    "headers": {},
                    "url": "https://example.test/",
                    "body": "",
                }))
            })
    }
}

#[async_trait]
impl BrowserHandle for MockHandle {
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, HandleError> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((script.to_string(), args));
        match self.next_outcome() {
            ScriptOutcome::Resolve(value) => Ok(value),
            ScriptOutcome::Fail(err) => Err(err),
            ScriptOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(HandleError::Closed)
            }
        }
    }

    async fn execute_sync(&self, script: &str, args: Vec<Value>) -> Result<Value, HandleError> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((script.to_string(), args));
        Ok(Value::Null)
    }

    async fn set_script_timeout(&self, timeout: Duration) -> Result<(), HandleError> {
        if self.inner.fail_setup.load(Ordering::SeqCst) {
            return Err(HandleError::Script {
                message: "driver refused timeout configuration".to_string(),
            });
        }
        *self.inner.script_timeout.lock().unwrap() = Some(timeout);
        Ok(())
    }

    async fn close(self) -> Result<(), HandleError> {
        self.inner.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn session_with(
    handle: &MockHandle,
    config: SessionConfig,
) -> Session<MockHandle> {
    init_tracing();
    Session::new(handle.clone(), config)
        .await
        .expect("session setup")
}

#[tokio::test]
async fn get_resolves_into_response() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Resolve(json!({
        "status": 200,
        "headers": {"content-type": "text/plain"},
        "url": "https://example.test/a",
        "body": "hi",
    }))]);
    let session = session_with(&handle, SessionConfig::default()).await;

    let response = assert_ok!(session.get("https://example.test/a").send().await);
    assert_eq!(response.status_code(), 200);
    assert!(response.ok());
    assert_eq!(response.text(), "hi");
    assert_eq!(response.header("content-type"), Some("text/plain"));

    let calls = handle.calls();
    assert_eq!(calls.len(), 1);
    let (script, args) = &calls[0];
    assert!(script.contains("fetch("));
    assert_eq!(args[0], json!("GET"));
    assert_eq!(args[1], json!("https://example.test/a"));
    assert_eq!(args[2], Value::Null);
}

#[tokio::test]
async fn post_json_sends_serialized_body_and_content_type() {
    let handle = MockHandle::default();
    let session = session_with(&handle, SessionConfig::default()).await;

    assert_ok!(
        session
            .post("https://example.test/api")
            .json(&json!({"x": 1}))
            .send()
            .await
    );

    let (_, args) = &handle.calls()[0];
    assert_eq!(args[0], json!("POST"));
    assert_eq!(args[2], json!(r#"{"x":1}"#));
    assert_eq!(args[3]["Content-Type"], json!("application/json"));
}

#[tokio::test]
async fn caller_content_type_beats_implied_one() {
    let handle = MockHandle::default();
    let session = session_with(&handle, SessionConfig::default()).await;

    assert_ok!(
        session
            .post("https://example.test/api")
            .json(&json!({"x": 1}))
            .header("content-type", "application/vnd.api+json")
            .send()
            .await
    );

    let (_, args) = &handle.calls()[0];
    let headers = args[3].as_object().unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers["content-type"], json!("application/vnd.api+json"));
}

#[tokio::test]
async fn form_body_is_urlencoded() {
    let handle = MockHandle::default();
    let session = session_with(&handle, SessionConfig::default()).await;

    assert_ok!(
        session
            .post("https://example.test/login")
            .form(&[("user", "a b"), ("pass", "x&y")])
            .send()
            .await
    );

    let (_, args) = &handle.calls()[0];
    assert_eq!(args[2], json!("user=a+b&pass=x%26y"));
    assert_eq!(
        args[3]["Content-Type"],
        json!("application/x-www-form-urlencoded")
    );
}

#[tokio::test]
async fn request_headers_override_session_defaults() {
    let handle = MockHandle::default();
    let mut config = SessionConfig::default();
    config.headers = HashMap::from([
        ("X-Token".to_string(), "abc".to_string()),
        ("User-Agent".to_string(), "default-agent".to_string()),
    ]);
    let session = session_with(&handle, config).await;

    assert_ok!(
        session
            .get("https://example.test/")
            .header("user-agent", "custom-agent")
            .send()
            .await
    );

    let (_, args) = &handle.calls()[0];
    let headers = args[3].as_object().unwrap();
    assert_eq!(headers["X-Token"], json!("abc"));
    assert_eq!(headers["user-agent"], json!("custom-agent"));
    assert!(!headers.contains_key("User-Agent"));
}

#[tokio::test]
async fn script_error_message_is_preserved() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Fail(HandleError::Script {
        message: "javascript error: boom".to_string(),
    })]);
    let session = session_with(&handle, SessionConfig::default()).await;

    let err = session.get("https://example.test/").send().await.unwrap_err();
    match err {
        Error::RequestException(message) => assert_eq!(message, "javascript error: boom"),
        other => panic!("expected RequestException, got {other:?}"),
    }
}

#[tokio::test]
async fn page_reported_failure_is_a_request_exception() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Resolve(json!({
        "error": "TypeError: Failed to fetch",
        "timedOut": false,
    }))]);
    let session = session_with(&handle, SessionConfig::default()).await;

    let err = session.get("https://example.test/").send().await.unwrap_err();
    match err {
        Error::RequestException(message) => assert_eq!(message, "TypeError: Failed to fetch"),
        other => panic!("expected RequestException, got {other:?}"),
    }
}

#[tokio::test]
async fn page_side_abort_is_classified_as_timeout() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Resolve(json!({
        "error": "aborted by page timer after 4500ms",
        "timedOut": true,
    }))]);
    let config = SessionConfig {
        timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let session = session_with(&handle, config).await;

    let err = session.get("https://example.test/").send().await.unwrap_err();
    match err {
        Error::Timeout { timeout } => assert_eq!(timeout, Duration::from_secs(5)),
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn driver_script_timeout_carries_configured_value() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Fail(
        HandleError::ScriptTimeout {
            message: "script timeout".to_string(),
        },
    )]);
    let config = SessionConfig {
        timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let session = session_with(&handle, config).await;

    let err = session.get("https://example.test/").send().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Timeout { timeout } if timeout == Duration::from_secs(5)
    ));
}

#[tokio::test]
async fn never_resolving_handle_times_out_not_before_the_bound() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Hang]);
    let timeout = Duration::from_millis(200);
    let config = SessionConfig {
        timeout,
        ..SessionConfig::default()
    };
    let session = session_with(&handle, config).await;

    let started = Instant::now();
    let err = session.get("https://example.test/").send().await.unwrap_err();
    assert!(started.elapsed() >= timeout, "timed out early");
    assert!(matches!(err, Error::Timeout { timeout: t } if t == timeout));
}

#[tokio::test]
async fn malformed_payload_is_a_contract_violation() {
    let handle = MockHandle::with_outcomes(vec![ScriptOutcome::Resolve(json!({
        "status": 200
    }))]);
    let session = session_with(&handle, SessionConfig::default()).await;

    let err = session.get("https://example.test/").send().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}

#[tokio::test]
async fn invalid_url_fails_before_any_browser_interaction() {
    let handle = MockHandle::default();
    let session = session_with(&handle, SessionConfig::default()).await;

    let err = session.get("not a url").send().await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert!(handle.calls().is_empty());
}

#[tokio::test]
async fn close_is_idempotent_and_later_calls_fail_fast() {
    let handle = MockHandle::default();
    let session = session_with(&handle, SessionConfig::default()).await;

    session.close().await;
    session.close().await;
    assert_eq!(handle.close_count(), 1);

    let err = session.get("https://example.test/").send().await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed));
    let err = session.set_origin("https://example.test/", None).await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed));
    assert!(handle.calls().is_empty());
}

#[tokio::test]
async fn failed_setup_still_releases_the_handle() {
    init_tracing();
    let handle = MockHandle::failing_setup();
    let result = Session::new(handle.clone(), SessionConfig::default()).await;

    assert!(result.is_err());
    assert_eq!(handle.close_count(), 1, "partially-acquired handle leaked");
}

#[tokio::test]
async fn set_origin_rewrites_history_before_the_next_send() {
    let handle = MockHandle::default();
    let session = session_with(&handle, SessionConfig::default()).await;

    assert_ok!(session.set_origin("https://other.test/", Some("Other")).await);
    assert_ok!(session.get("https://example.test/data").send().await);

    let calls = handle.calls();
    assert_eq!(calls.len(), 2);
    let (origin_script, origin_args) = &calls[0];
    assert!(origin_script.contains("history.replaceState"));
    assert_eq!(origin_args[0], json!("https://other.test/"));
    assert_eq!(origin_args[1], json!("Other"));
    let (request_script, _) = &calls[1];
    assert!(request_script.contains("fetch("));
}

mod live {
    use super::*;
    use browser_requests::LaunchOptions;

    #[tokio::test]
    #[ignore] // Requires chromedriver running on localhost:9515
    async fn live_get_against_example_com() {
        super::init_tracing();
        let session = Session::launch(&LaunchOptions::default(), SessionConfig::default())
            .await
            .expect("launch browser session");

        let response = session
            .get("https://example.com/")
            .send()
            .await
            .expect("in-page request");
        assert!(response.ok());
        assert!(response.text().contains("Example Domain"));

        session.close().await;
    }
}
