//! Session error codes.

/// Failure reported by the remote session for a fetch or mutation.
///
/// The bridge logs these and keeps the previously cached value; they are never
/// handed to facade callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No live connection to the service (connect failed or was dropped).
    #[error("session is not connected")]
    NotConnected,
    /// The service could not be reached or answered garbage.
    #[error("session unavailable: {0}")]
    Unavailable(String),
    /// The service refused the request.
    #[error("session rejected request (code {code}): {message}")]
    Rejected { code: i32, message: String },
    /// The service did not answer in time.
    #[error("session request timed out")]
    Timeout,
}
