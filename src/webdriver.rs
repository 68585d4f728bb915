//! WebDriver-backed browser session handle.
//!
//! Adapts a Chrome session driven over the WebDriver protocol (via
//! `thirtyfour`) to the [`BrowserHandle`] boundary. Launch flags reproduce
//! the hardened profile the original tooling used: headless, web security
//! relaxed so cross-origin calls are possible, and driver chatter suppressed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::{Capabilities, ChromeCapabilities};
use tracing::debug;

use crate::error::Result;
use crate::handle::{BrowserHandle, HandleError};
use crate::session::{Session, SessionConfig};

/// Desktop Chrome user agent reported when the caller does not override it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Explicit launch configuration for a WebDriver-controlled Chrome.
///
/// Passed to [`WebDriverHandle::launch`]; there is no ambient process-wide
/// driver configuration.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Address of the WebDriver server (chromedriver).
    pub webdriver_url: String,
    /// Route all browser traffic through this proxy.
    pub proxy_url: Option<String>,
    /// User agent the browser reports. Defaults to [`DEFAULT_USER_AGENT`];
    /// `None` keeps the browser's own (which leaks `HeadlessChrome` when
    /// running headless).
    pub user_agent: Option<String>,
    /// Run without a visible UI.
    pub headless: bool,
    /// Relax same-origin restrictions so cross-origin calls are possible.
    pub disable_web_security: bool,
    /// Suppress verbose browser diagnostics.
    pub quiet_logging: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            proxy_url: None,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            headless: true,
            disable_web_security: true,
            quiet_logging: true,
        }
    }
}

/// A live Chrome session reached over the WebDriver protocol.
pub struct WebDriverHandle {
    driver: WebDriver,
}

impl WebDriverHandle {
    /// Launch a browser session with the given options.
    pub async fn launch(options: &LaunchOptions) -> std::result::Result<Self, HandleError> {
        let caps = chrome_capabilities(options)?;
        debug!("Connecting to WebDriver at {}", options.webdriver_url);
        let driver = WebDriver::new(&options.webdriver_url, caps)
            .await
            .map_err(map_webdriver_error)?;
        Ok(Self { driver })
    }
}

/// Translate launch options into Chrome capabilities.
fn chrome_capabilities(
    options: &LaunchOptions,
) -> std::result::Result<ChromeCapabilities, HandleError> {
    let mut caps = DesiredCapabilities::chrome();
    if options.headless {
        caps.add_arg("--headless=new").map_err(map_webdriver_error)?;
    }
    if options.disable_web_security {
        caps.add_arg("--disable-web-security")
            .map_err(map_webdriver_error)?;
    }
    if options.quiet_logging {
        caps.add_arg("--log-level=3").map_err(map_webdriver_error)?;
        caps.add_experimental_option("excludeSwitches", serde_json::json!(["enable-logging"]))
            .map_err(map_webdriver_error)?;
    }
    if let Some(proxy_url) = &options.proxy_url {
        caps.add_arg(&format!("--proxy-server={proxy_url}"))
            .map_err(map_webdriver_error)?;
    }
    if let Some(user_agent) = &options.user_agent {
        caps.add_arg(&format!("--user-agent={user_agent}"))
            .map_err(map_webdriver_error)?;
    }
    Ok(caps)
}

#[async_trait]
impl BrowserHandle for WebDriverHandle {
    async fn execute(&self, script: &str, args: Vec<Value>) -> std::result::Result<Value, HandleError> {
        let ret = self
            .driver
            .execute_async(script, args)
            .await
            .map_err(map_webdriver_error)?;
        Ok(ret.json().clone())
    }

    async fn execute_sync(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, HandleError> {
        let ret = self
            .driver
            .execute(script, args)
            .await
            .map_err(map_webdriver_error)?;
        Ok(ret.json().clone())
    }

    async fn set_script_timeout(&self, timeout: Duration) -> std::result::Result<(), HandleError> {
        self.driver
            .set_script_timeout(timeout)
            .await
            .map_err(map_webdriver_error)
    }

    async fn close(self) -> std::result::Result<(), HandleError> {
        self.driver.quit().await.map_err(map_webdriver_error)
    }
}

impl Session<WebDriverHandle> {
    /// Launch a WebDriver-controlled browser and wrap it in a session.
    pub async fn launch(options: &LaunchOptions, config: SessionConfig) -> Result<Self> {
        let handle = WebDriverHandle::launch(options)
            .await
            .map_err(|err| crate::session::map_handle_error(err, config.timeout))?;
        Session::new(handle, config).await
    }
}

/// Classify a WebDriver error by its spec error code.
///
/// The WebDriver spec transports error codes as strings ("script timeout",
/// "invalid session id"), which thirtyfour preserves in the rendered message;
/// matching on those is stable across driver implementations.
fn map_webdriver_error(err: WebDriverError) -> HandleError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("script timeout") {
        HandleError::ScriptTimeout { message }
    } else if lower.contains("invalid session id")
        || lower.contains("session not created")
        || lower.contains("terminated or not started")
    {
        HandleError::Closed
    } else {
        HandleError::Script { message }
    }
}
