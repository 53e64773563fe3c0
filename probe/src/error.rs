//! Error taxonomy for the measurement pipeline (spec §7).
//!
//! Executors never let a `JobError` escape as a Rust `Err` past their own
//! boundary — every terminal state is converted into a `ResultFrame` before
//! returning. `JobError` exists so that conversion has one place to read the
//! rules from, and so the `exposable` flag (spec §7 point 8, §9 open
//! question 3) has a single definition shared by every executor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("Private IP ranges are not allowed")]
    PrivateIp,

    #[error("{0}")]
    ToolRuntime(String),

    #[error("The measurement command timed out.")]
    Timeout,

    #[error("{0}")]
    Network(String),

    #[error("HTTP/2 not supported by the server.")]
    Http2Unsupported,

    #[error("Request timeout.")]
    RequestTimeout,

    #[error("internal error")]
    Internal(#[from] std::io::Error),
}

impl JobError {
    /// Whether `self`'s `Display` text is safe to forward to the control
    /// plane verbatim, or must be replaced by a generic message.
    ///
    /// The safe set is exactly: private-IP, HTTP/2-not-supported,
    /// request-timeout, tool-runtime output (stdout/stderr text collected by
    /// the executor itself), and the command-timeout explanation. Anything
    /// wrapping a raw `std::io::Error` or other plumbing detail is not.
    pub fn exposable(&self) -> bool {
        !matches!(self, JobError::Internal(_))
    }

    pub fn user_message(&self) -> String {
        if self.exposable() {
            self.to_string()
        } else {
            "Test failed. Please try again.".to_string()
        }
    }
}
