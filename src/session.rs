//! The execution bridge: turns [`Request`] values into in-page fetch calls.
//!
//! A [`Session`] owns one browser session handle for its lifetime. Calls
//! through the handle are strictly serialized (the handle is not safe for
//! concurrent invocation), request/response values are immutable and freely
//! shareable, and the handle is released exactly once on [`Session::close`].

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handle::{BrowserHandle, HandleError};
use crate::models::{Body, Method, Request, Response};

/// The in-page request script, embedded at compile time so the bundle ships
/// with the crate and editors still get JS syntax highlighting.
const REQUEST_SCRIPT: &str = include_str!("js/request.js");

/// Rewrites the page's apparent location without a network call, so later
/// requests carry browser-native Referer/Origin/Sec-Fetch-* headers.
const SET_ORIGIN_SCRIPT: &str = "history.replaceState(null, arguments[1], arguments[0]);";

/// Margin between the page-side abort timer and the driver's script timeout.
/// The page timer fires first, so timeouts are reported from inside the page
/// and classified deterministically instead of racing the driver.
const PAGE_ABORT_MARGIN: Duration = Duration::from_millis(500);
const PAGE_ABORT_FLOOR: Duration = Duration::from_millis(100);

/// Extra slack on the bridge-side await. The driver enforces the real script
/// timeout; this guard only keeps a wedged handle from hanging the caller.
const ROUND_TRIP_GRACE: Duration = Duration::from_millis(250);

/// Session construction options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on how long one `send` waits for the page script to settle.
    pub timeout: Duration,
    /// Default headers merged into every request. Per-request headers win on
    /// case-insensitive key collision.
    pub headers: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            headers: HashMap::new(),
        }
    }
}

/// An HTTP-style client whose requests run inside a real browser page.
pub struct Session<H: BrowserHandle> {
    handle: Mutex<Option<H>>,
    timeout: Duration,
    default_headers: HashMap<String, String>,
}

impl<H: BrowserHandle> Session<H> {
    /// Wrap a launched browser handle.
    ///
    /// Applies the script timeout to the handle; if that fails, the handle is
    /// closed before the error propagates so no session leaks from the
    /// failure path.
    pub async fn new(handle: H, config: SessionConfig) -> Result<Self> {
        if let Err(err) = handle.set_script_timeout(config.timeout).await {
            warn!("Closing handle after failed session setup: {err}");
            if let Err(close_err) = handle.close().await {
                warn!("Handle cleanup after failed setup also failed: {close_err}");
            }
            return Err(map_handle_error(err, config.timeout));
        }
        Ok(Self {
            handle: Mutex::new(Some(handle)),
            timeout: config.timeout,
            default_headers: config.headers,
        })
    }

    /// The configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a prepared request and wait for the in-page call to settle.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let (body, implied_content_type) = request.body().encode()?;
        let mut headers = merge_headers(&self.default_headers, request.headers());
        if let Some(content_type) = implied_content_type {
            let already_set = headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
            if !already_set {
                headers.insert("Content-Type".to_string(), content_type.to_string());
            }
        }

        let args = vec![
            json!(request.method().as_str()),
            json!(request.url()),
            json!(body),
            json!(headers),
            json!(page_abort_budget(self.timeout).as_millis() as u64),
        ];

        debug!("Dispatching {} {}", request.method(), request.url());

        let guard = self.handle.lock().await;
        let handle = guard.as_ref().ok_or(Error::SessionClosed)?;
        let executed = tokio::time::timeout(
            self.timeout + ROUND_TRIP_GRACE,
            handle.execute(REQUEST_SCRIPT, args),
        )
        .await;
        drop(guard);

        let payload = match executed {
            Ok(result) => result.map_err(|err| map_handle_error(err, self.timeout))?,
            Err(_) => {
                warn!(
                    "Handle did not return within {:?} + grace; treating as timeout",
                    self.timeout
                );
                return Err(Error::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        // The script reports failures through the callback as {error, timedOut}.
        // A page-side abort is a timeout, never a generic request failure.
        if let Some(object) = payload.as_object() {
            if let Some(message) = object.get("error").and_then(Value::as_str) {
                if object
                    .get("timedOut")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    return Err(Error::Timeout {
                        timeout: self.timeout,
                    });
                }
                return Err(Error::RequestException(message.to_string()));
            }
        }

        Response::from_payload(payload, request.url())
    }

    /// Rewrite the page's apparent location (no network call) so subsequent
    /// sends carry Referer/Origin/Sec-Fetch-* headers for that origin.
    ///
    /// Not idempotent with respect to browser history state.
    pub async fn set_origin(&self, url: &str, title: Option<&str>) -> Result<()> {
        debug!("Setting page origin to {url}");
        let guard = self.handle.lock().await;
        let handle = guard.as_ref().ok_or(Error::SessionClosed)?;
        handle
            .execute_sync(SET_ORIGIN_SCRIPT, vec![json!(url), json!(title)])
            .await
            .map_err(|err| map_handle_error(err, self.timeout))?;
        Ok(())
    }

    /// Release the browser session. Idempotent; any later operation fails
    /// fast with [`Error::SessionClosed`].
    pub async fn close(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            if let Err(err) = handle.close().await {
                warn!("Browser handle close reported an error: {err}");
            }
        }
    }

    /// Start building a request with an arbitrary method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_, H> {
        RequestBuilder {
            session: self,
            request: Request::new(method, url),
        }
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_, H> {
        self.request(Method::Get, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_, H> {
        self.request(Method::Post, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_, H> {
        self.request(Method::Put, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_, H> {
        self.request(Method::Patch, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_, H> {
        self.request(Method::Delete, url)
    }
}

/// Builds a request against a session and sends it.
///
/// Construction errors are deferred and surfaced from [`send`], so call
/// chains stay flat; use [`Request::new`] directly for eager validation.
///
/// [`send`]: RequestBuilder::send
#[must_use = "a request builder does nothing until sent"]
pub struct RequestBuilder<'a, H: BrowserHandle> {
    session: &'a Session<H>,
    request: Result<Request>,
}

impl<'a, H: BrowserHandle> RequestBuilder<'a, H> {
    /// Attach a JSON body (implies `Content-Type: application/json` unless a
    /// caller header overrides it).
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.request = self.request.and_then(|request| {
            let value = serde_json::to_value(value)
                .map_err(|err| Error::InvalidRequest(format!("unserializable json body: {err}")))?;
            request.with_body(Body::Json(value))
        });
        self
    }

    /// Attach a form body (implies `Content-Type:
    /// application/x-www-form-urlencoded` unless overridden).
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.request = self.request.and_then(|request| {
            let pairs = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            request.with_body(Body::Form(pairs))
        });
        self
    }

    /// Attach a raw string body. No content type is implied.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.request = self
            .request
            .and_then(|request| request.with_body(Body::Raw(body.into())));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.map(|request| request.with_header(key, value));
        self
    }

    pub fn headers(mut self, headers: &HashMap<String, String>) -> Self {
        self.request = self.request.map(|request| {
            headers.iter().fold(request, |request, (key, value)| {
                request.with_header(key.clone(), value.clone())
            })
        });
        self
    }

    pub async fn send(self) -> Result<Response> {
        self.session.send(self.request?).await
    }
}

pub(crate) fn map_handle_error(err: HandleError, timeout: Duration) -> Error {
    match err {
        HandleError::Script { message } => Error::RequestException(message),
        HandleError::ScriptTimeout { .. } => Error::Timeout { timeout },
        HandleError::Closed => Error::SessionClosed,
    }
}

/// Merge default headers with per-request headers; request headers win on
/// case-insensitive key collision, all other defaults are preserved.
fn merge_headers(
    defaults: &HashMap<String, String>,
    request: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = defaults.clone();
    for (key, value) in request {
        merged.retain(|k, _| !k.eq_ignore_ascii_case(key));
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Page-side abort budget: below the driver script timeout by a fixed margin,
/// floored so very small timeouts still give the fetch a chance to start.
fn page_abort_budget(timeout: Duration) -> Duration {
    timeout.saturating_sub(PAGE_ABORT_MARGIN).max(PAGE_ABORT_FLOOR)
}
