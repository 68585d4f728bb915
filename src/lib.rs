//! browser-requests - an HTTP-style client that sends its requests from
//! inside a real browser page.
//!
//! Requests are translated into an in-page `fetch` call and executed in a
//! WebDriver-controlled browser, so they inherit the browser's cookies, TLS
//! fingerprint, and anti-bot characteristics instead of a bare HTTP client's.
//! Full HTTP semantics (redirects, cookie storage, connection handling) are
//! delegated to the browser itself.
//!
//! The browser boundary is the [`BrowserHandle`] trait; [`WebDriverHandle`]
//! is the bundled `thirtyfour`-backed implementation, and test code can
//! substitute its own double.
//!
//! # Example
//! ```no_run
//! use browser_requests::{LaunchOptions, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> browser_requests::Result<()> {
//!     let session = Session::launch(&LaunchOptions::default(), SessionConfig::default()).await?;
//!
//!     session.set_origin("https://example.com/app", Some("App")).await?;
//!     let response = session
//!         .post("https://example.com/api/items")
//!         .json(&serde_json::json!({"name": "widget"}))
//!         .send()
//!         .await?;
//!     assert!(response.ok());
//!     println!("{}", response.text());
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handle;
pub mod models;
pub mod session;
pub mod webdriver;

pub use error::{Error, Result};
pub use handle::{BrowserHandle, HandleError};
pub use models::{Body, Method, Request, Response};
pub use session::{RequestBuilder, Session, SessionConfig};
pub use webdriver::{LaunchOptions, WebDriverHandle, DEFAULT_USER_AGENT};
