//! Request and response data model.
//!
//! Everything here is plain, immutable data. Construction validates; nothing
//! in this module touches the browser.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// HTTP verbs the bridge supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::InvalidRequest(format!(
                "unrecognized HTTP method: {other}"
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body variants.
///
/// A tagged enum instead of separate `data`/`json` fields, so a request with
/// two body sources cannot be represented at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No payload.
    Empty,
    /// Caller-supplied string payload, sent as-is.
    Raw(String),
    /// Key/value pairs encoded as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// A JSON value serialized into the payload.
    Json(Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Encode into the wire payload and the implied content type.
    ///
    /// Raw and empty bodies imply no content type; the browser (or the
    /// caller's own headers) decides.
    pub(crate) fn encode(&self) -> Result<(Option<String>, Option<&'static str>)> {
        match self {
            Body::Empty => Ok((None, None)),
            Body::Raw(text) => Ok((Some(text.clone()), None)),
            Body::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .finish();
                Ok((Some(encoded), Some("application/x-www-form-urlencoded")))
            }
            Body::Json(value) => {
                let encoded = serde_json::to_string(value)
                    .map_err(|err| Error::InvalidRequest(format!("unserializable json body: {err}")))?;
                Ok((Some(encoded), Some("application/json")))
            }
        }
    }
}

/// An outbound call, validated at construction and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    body: Body,
    headers: HashMap<String, String>,
}

impl Request {
    /// Create a request. The URL must be absolute.
    pub fn new(method: Method, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::InvalidRequest("url must not be empty".to_string()));
        }
        url::Url::parse(&url)
            .map_err(|err| Error::InvalidRequest(format!("invalid url {url:?}: {err}")))?;
        Ok(Self {
            method,
            url,
            body: Body::Empty,
            headers: HashMap::new(),
        })
    }

    pub fn get(url: impl Into<String>) -> Result<Self> {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Result<Self> {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Result<Self> {
        Self::new(Method::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Result<Self> {
        Self::new(Method::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Result<Self> {
        Self::new(Method::Delete, url)
    }

    /// Attach a body. Fails if a body source was already set, matching the
    /// original rejection of simultaneous `data` and `json`.
    pub fn with_body(mut self, body: Body) -> Result<Self> {
        if !self.body.is_empty() && !body.is_empty() {
            return Err(Error::InvalidRequest(
                "request body already set; at most one body source is allowed".to_string(),
            ));
        }
        self.body = body;
        Ok(self)
    }

    /// Set a header, replacing any existing header whose key matches
    /// case-insensitively.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.headers.insert(key, value.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

/// The structured result of a successful in-page call.
///
/// Constructed once from the page script's payload and never mutated.
#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    headers: HashMap<String, String>,
    url: String,
    body: String,
}

impl Response {
    /// Decode the page script's resolved payload.
    ///
    /// `status`, `headers` and `body` are load-bearing: a payload missing any
    /// of them is a bridge/script contract violation. A missing `url` falls
    /// back to the request URL.
    pub(crate) fn from_payload(payload: Value, request_url: &str) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::MalformedResponse(format!("expected object, got {payload}")))?;

        let status_code = object
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
            .ok_or_else(|| Error::MalformedResponse("missing or non-integer status".to_string()))?;

        let raw_headers = object
            .get("headers")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::MalformedResponse("missing headers object".to_string()))?;
        let mut headers = HashMap::with_capacity(raw_headers.len());
        for (key, value) in raw_headers {
            let value = value.as_str().ok_or_else(|| {
                Error::MalformedResponse(format!("non-string header value for {key:?}"))
            })?;
            headers.insert(key.clone(), value.to_string());
        }

        let body = object
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedResponse("missing or non-string body".to_string()))?
            .to_string();

        let url = object
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(request_url)
            .to_string();

        Ok(Self {
            status_code,
            headers,
            url,
            body,
        })
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Headers as the browser reported them; key case is the browser's,
    /// typically lower-cased by the fetch API.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Final URL after any redirects the browser followed.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn content(&self) -> &[u8] {
        self.body.as_bytes()
    }

    pub fn ok(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}
