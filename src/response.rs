//! Response wrapper that preserves both parsed data and per-call metadata.
//!
//! Every successful call returns a [`Response`]: the typed body together with the status,
//! headers, latency and attempt count of the exchange that produced it.

use crate::constants::REQUEST_ID_HEADER;
use crate::link::parse_link_header;
use crate::model::Link;
use http::header::{CONTENT_TYPE, LINK, LOCATION};
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful response and the metadata of the call that produced it.
///
/// # Examples
///
/// ```no_run
/// use vcd_client::{model::Resource, Response, VcdClient};
///
/// # async fn example(client: VcdClient) -> Result<(), vcd_client::Error> {
/// let org: Response<Resource> = client.logged_in_org().await?;
///
/// println!("Org: {:?}", org.name);
/// println!("Request id: {:?}", org.request_id());
/// println!("Took {:?} over {} attempt(s)", org.latency, org.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from the first attempt until the successful response, including
    /// any re-authentication.
    pub latency: Duration,

    /// Number of attempts, `1` when the first attempt succeeded.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use vcd_client::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     "42".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The server's request correlation id.
    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// The task URI of an accepted (`202`) asynchronous operation.
    ///
    /// # Examples
    ///
    /// ```
    /// # use vcd_client::Response;
    /// # use http::{HeaderMap, HeaderValue, StatusCode};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("location", HeaderValue::from_static("https://vcd/api/task/1"));
    /// let response = Response::new((), String::new(), StatusCode::ACCEPTED, headers, Duration::ZERO, 1);
    /// assert_eq!(response.task_href(), Some("https://vcd/api/task/1"));
    /// ```
    pub fn task_href(&self) -> Option<&str> {
        if self.status == StatusCode::ACCEPTED {
            self.header(LOCATION.as_str())
        } else {
            None
        }
    }

    /// Links advertised in `Link` response headers.
    pub fn links(&self) -> Vec<Link> {
        self.headers
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_link_header)
            .collect()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_task_href_only_on_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://vcd/api/task/1"));
        let ok = Response::new((), String::new(), StatusCode::OK, headers.clone(), Duration::ZERO, 1);
        assert_eq!(ok.task_href(), None);
        let accepted = Response::new((), String::new(), StatusCode::ACCEPTED, headers, Duration::ZERO, 1);
        assert_eq!(accepted.task_href(), Some("https://vcd/api/task/1"));
    }

    #[test]
    fn test_links_from_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(LINK, HeaderValue::from_static("<https://vcd/a>;rel=\"up\""));
        headers.append(LINK, HeaderValue::from_static("<https://vcd/b>;rel=\"remove\""));
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("r-1"));
        let response = Response::new((), String::new(), StatusCode::OK, headers, Duration::ZERO, 2);
        let rels: Vec<_> = response.links().into_iter().map(|l| l.rel).collect();
        assert_eq!(rels, vec!["up", "remove"]);
        assert_eq!(response.request_id(), Some("r-1"));
        assert!(response.was_retried());
    }
}
