//! Error types for vCloud Director API calls.
//!
//! Every failure surfaces through [`Error`]. Server-side failures keep the HTTP status, the
//! server's request correlation id and, when the server sent one, the parsed error envelope.
//! Session, link, query and task failures have their own nested enums so callers can match on
//! the family without caring about the transport details.

use crate::model::{Reference, TaskStatus, VcdError};
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// The main error type for vCloud Director API calls.
///
/// # Examples
///
/// ```no_run
/// use vcd_client::{Error, VcdClient};
///
/// # async fn example(client: VcdClient) -> Result<(), Error> {
/// match client.admin().await {
///     Ok(admin) => println!("admin root: {:?}", admin.href),
///     Err(Error::Server { status, request_id, vcd_error, .. }) => {
///         eprintln!("status {status}, request {request_id:?}: {vcd_error:?}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection refused, DNS failure, TLS failure, ...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request exceeded its configured deadline.
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a failure status.
    ///
    /// `vcd_error` is present when the body was an error envelope; `message` when the
    /// body was plain text or bare XML. Both are `None` for an empty body.
    #[error(
        "Server error {status} (request id {}): {}",
        .request_id.as_deref().unwrap_or("-"),
        describe(.vcd_error.as_ref(), .message.as_deref())
    )]
    Server {
        status: StatusCode,
        request_id: Option<String>,
        vcd_error: Option<VcdError>,
        message: Option<String>,
        raw_response: String,
        headers: Box<HeaderMap>,
    },

    /// A failure response whose body could not be interpreted.
    #[error("Unprocessable error response (status {status}): {reason}")]
    ResponseProcessing {
        status: StatusCode,
        request_id: Option<String>,
        raw_response: String,
        reason: String,
    },

    /// A successful status other than the one the operation requires.
    #[error("Expected status {expected} but received {actual}")]
    UnexpectedStatus {
        expected: StatusCode,
        actual: StatusCode,
        request_id: Option<String>,
        raw_response: String,
    },

    /// Failed to deserialize the response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        raw_response: String,
        serde_error: String,
        status: StatusCode,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    QueryCardinality(#[from] QueryCardinalityError),

    /// A task ended in `error` or `aborted`.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A task ended in `canceled`.
    #[error("Task {task} was canceled")]
    TaskCanceled {
        task: String,
        owner: Option<Reference>,
    },

    /// A task did not reach a terminal state before the deadline.
    #[error("Task {task} did not finish within {timeout:?}")]
    TaskTimeout { task: String, timeout: Duration },

    /// `track` was called after the tracking future was created.
    #[error("Task tracker is sealed; no further tasks can be tracked")]
    TrackerSealed,

    /// The bulk tracking future was cancelled before all tasks finished.
    #[error("Task tracking was canceled")]
    TrackingCanceled,

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided or derived.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Computing a request signature failed.
    #[error("Signing failed: {0}")]
    Signing(String),
}

fn describe(vcd_error: Option<&VcdError>, message: Option<&str>) -> String {
    match (vcd_error, message) {
        (Some(e), _) => e.to_string(),
        (None, Some(m)) => m.to_string(),
        (None, None) => "<empty response>".to_string(),
    }
}

impl Error {
    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Server { status, .. }
            | Error::ResponseProcessing { status, .. }
            | Error::DeserializationFailed { status, .. } => Some(*status),
            Error::UnexpectedStatus { actual, .. } => Some(*actual),
            Error::Session(SessionError::ReauthenticationFailed { source }) => source.status(),
            _ => None,
        }
    }

    /// Returns the server's request correlation id if one was received.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Server { request_id, .. }
            | Error::ResponseProcessing { request_id, .. }
            | Error::UnexpectedStatus { request_id, .. } => request_id.as_deref(),
            Error::Session(SessionError::ReauthenticationFailed { source }) => source.request_id(),
            _ => None,
        }
    }

    /// Returns the parsed error envelope, from a server error or a failed task.
    pub fn vcd_error(&self) -> Option<&VcdError> {
        match self {
            Error::Server { vcd_error, .. } => vcd_error.as_ref(),
            Error::Task(TaskError { error, .. }) => error.as_ref(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Server { raw_response, .. }
            | Error::ResponseProcessing { raw_response, .. }
            | Error::UnexpectedStatus { raw_response, .. }
            | Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns `true` for 401 and 403 server errors.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
        )
    }
}

/// Session lifecycle failures.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The operation needs a session and the client has none.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Re-authentication was requested but no credentials were ever supplied.
    #[error("No credentials available to log in with")]
    NoCredentials,

    /// The login response did not carry an `x-vcloud-authorization` header.
    #[error("Login response did not include an authentication token")]
    MissingAuthToken,

    /// Logging in again after an authorization failure did not succeed.
    #[error("Re-authentication failed: {source}")]
    ReauthenticationFailed {
        #[source]
        source: Box<Error>,
    },
}

/// Failure to resolve a link by relation and media type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("No link with rel '{rel}' and type {media_type:?} on {href}")]
    Missing {
        href: String,
        rel: String,
        media_type: Option<String>,
    },

    #[error("Multiple links with rel '{rel}' and type {media_type:?} on {href}")]
    Multiple {
        href: String,
        rel: String,
        media_type: Option<String>,
    },
}

/// `find_unique` did not see exactly one record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryCardinalityError {
    #[error("No record matched query {query}")]
    MissingRecord { query: String },

    #[error("More than one record matched query {query}")]
    MultipleRecords { query: String },
}

/// A task that finished in `error` or `aborted`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error(
    "Task {task} finished with status {status}: {}",
    .error.as_ref().map(ToString::to_string).unwrap_or_else(|| "<no detail>".to_string())
)]
pub struct TaskError {
    pub task: String,
    pub status: TaskStatus,
    pub owner: Option<Reference>,
    pub error: Option<VcdError>,
}

/// A specialized `Result` type for vCloud Director API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status: StatusCode) -> Error {
        Error::Server {
            status,
            request_id: Some("req-1".into()),
            vcd_error: Some(VcdError {
                message: Some("boom".into()),
                major_error_code: status.as_u16() as i32,
                minor_error_code: Some("ACCESS_TO_RESOURCE_IS_FORBIDDEN".into()),
                ..Default::default()
            }),
            message: None,
            raw_response: String::new(),
            headers: Box::default(),
        }
    }

    #[test]
    fn test_server_error_accessors() {
        let err = server_error(StatusCode::FORBIDDEN);
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(err.request_id(), Some("req-1"));
        assert_eq!(err.vcd_error().and_then(|e| e.message.as_deref()), Some("boom"));
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("req-1"));
        assert!(!server_error(StatusCode::NOT_FOUND).is_unauthorized());
    }

    #[test]
    fn test_reauth_failure_exposes_inner_status() {
        let err: Error = SessionError::ReauthenticationFailed {
            source: Box::new(server_error(StatusCode::UNAUTHORIZED)),
        }
        .into();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.request_id(), Some("req-1"));
    }

    #[test]
    fn test_task_error_message() {
        let err = TaskError {
            task: "urn:vcloud:task:1".into(),
            status: TaskStatus::Error,
            owner: None,
            error: Some(VcdError {
                message: Some("disk full".into()),
                major_error_code: 500,
                ..Default::default()
            }),
        };
        assert!(err.to_string().contains("disk full"));
    }
}
