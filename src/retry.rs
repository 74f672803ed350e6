//! Classification of failed exchanges into retry or fail decisions.
//!
//! The request executor consults an [`ErrorClassifier`] after every failed attempt. The
//! classifier only decides; refreshing authentication before the retry is the executor's job.

use crate::transport::TransportFailure;
use http::StatusCode;

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    Fail,
}

/// Decides whether a failed attempt should be retried.
///
/// `attempt` is 1 for the first attempt.
///
/// # Examples
///
/// ```
/// use vcd_client::retry::{Disposition, ErrorClassifier};
/// use vcd_client::transport::TransportFailure;
///
/// struct NeverRetry;
///
/// impl ErrorClassifier for NeverRetry {
///     fn classify(&self, _failure: &TransportFailure, _attempt: usize) -> Disposition {
///         Disposition::Fail
///     }
/// }
/// ```
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, failure: &TransportFailure, attempt: usize) -> Disposition;
}

/// Retry limits for authorization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How many times a 401/403 is retried. Defaults to 1.
    pub max_auth_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_auth_retries: 1,
        }
    }
}

/// The default classifier: retry 401 and 403 while `attempt <= max_auth_retries`.
///
/// With the default policy only the first failure is retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReauthClassifier {
    policy: RetryPolicy,
}

impl ReauthClassifier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl ErrorClassifier for ReauthClassifier {
    fn classify(&self, failure: &TransportFailure, attempt: usize) -> Disposition {
        let auth_failure = matches!(
            failure.status(),
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
        );
        if auth_failure && attempt <= self.policy.max_auth_retries {
            Disposition::Retry
        } else {
            Disposition::Fail
        }
    }
}

/// Retries connection failures (no response received) up to `max_attempts` attempts in total.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError {
    pub max_attempts: usize,
}

impl ErrorClassifier for RetryOnConnectionError {
    fn classify(&self, failure: &TransportFailure, attempt: usize) -> Disposition {
        match failure {
            TransportFailure::Network(e) if !e.is_timeout() && attempt < self.max_attempts => {
                Disposition::Retry
            }
            _ => Disposition::Fail,
        }
    }
}

/// Retries if any inner classifier retries.
pub struct AnyOf {
    classifiers: Vec<Box<dyn ErrorClassifier>>,
}

impl AnyOf {
    pub fn new(classifiers: Vec<Box<dyn ErrorClassifier>>) -> Self {
        Self { classifiers }
    }
}

impl ErrorClassifier for AnyOf {
    fn classify(&self, failure: &TransportFailure, attempt: usize) -> Disposition {
        if self
            .classifiers
            .iter()
            .any(|c| c.classify(failure, attempt) == Disposition::Retry)
        {
            Disposition::Retry
        } else {
            Disposition::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FailedResponse;
    use http::HeaderMap;

    fn status_failure(status: StatusCode) -> TransportFailure {
        TransportFailure::Status(FailedResponse {
            status,
            headers: HeaderMap::new(),
            raw_body: String::new(),
            envelope: None,
        })
    }

    #[test]
    fn test_first_auth_failure_is_retried() {
        let classifier = ReauthClassifier::default();
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert_eq!(classifier.classify(&status_failure(status), 1), Disposition::Retry);
            assert_eq!(classifier.classify(&status_failure(status), 2), Disposition::Fail);
        }
    }

    #[test]
    fn test_other_statuses_fail() {
        let classifier = ReauthClassifier::default();
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert_eq!(classifier.classify(&status_failure(status), 1), Disposition::Fail);
        }
    }

    #[test]
    fn test_tunable_limit() {
        let classifier = ReauthClassifier::new(RetryPolicy {
            max_auth_retries: 3,
        });
        let failure = status_failure(StatusCode::UNAUTHORIZED);
        assert_eq!(classifier.classify(&failure, 3), Disposition::Retry);
        assert_eq!(classifier.classify(&failure, 4), Disposition::Fail);
    }

    #[test]
    fn test_any_of() {
        let classifier = AnyOf::new(vec![
            Box::new(RetryOnConnectionError { max_attempts: 3 }),
            Box::new(ReauthClassifier::default()),
        ]);
        assert_eq!(
            classifier.classify(&status_failure(StatusCode::FORBIDDEN), 1),
            Disposition::Retry
        );
        assert_eq!(
            classifier.classify(&status_failure(StatusCode::CONFLICT), 1),
            Disposition::Fail
        );
    }
}
