//! The browser session handle boundary.
//!
//! Everything the bridge needs from a browser is behind [`BrowserHandle`]:
//! execute a script in the page context and release the session. Script
//! failures and script timeouts must arrive as distinguishable errors, since
//! the bridge maps them to different caller-facing error kinds.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure conditions a browser session handle can report.
#[derive(Error, Debug)]
pub enum HandleError {
    /// The script threw, or the driver rejected the execution.
    #[error("Script execution failed: {message}")]
    Script { message: String },

    /// The script did not settle within the driver's script timeout.
    #[error("Script execution timed out: {message}")]
    ScriptTimeout { message: String },

    /// The underlying session is terminated or was never started.
    #[error("Browser session handle is closed")]
    Closed,
}

/// A controllable browser session.
///
/// Handles are not safe for concurrent invocation; [`crate::Session`]
/// serializes access. A handle is released exactly once via [`close`], which
/// consumes it.
///
/// [`close`]: BrowserHandle::close
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Execute an asynchronous script in the page context. The driver passes
    /// the completion callback as the script's final argument and enforces
    /// the configured script timeout.
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, HandleError>;

    /// Execute a synchronous script in the page context.
    async fn execute_sync(&self, script: &str, args: Vec<Value>) -> Result<Value, HandleError>;

    /// Configure the driver-side script timeout applied to [`execute`].
    ///
    /// [`execute`]: BrowserHandle::execute
    async fn set_script_timeout(&self, timeout: Duration) -> Result<(), HandleError>;

    /// Terminate the browser session.
    async fn close(self) -> Result<(), HandleError>
    where
        Self: Sized;
}
