//! The request executor and the [`VcdClient`] entry point.
//!
//! [`VcdClient`] composes the [`Transport`], an [`ErrorClassifier`] and the session state in a
//! [`SecurityContext`]. Use [`ClientBuilder`] to configure and create clients.

use crate::constants::{path, rel, CLIENT_REQUEST_ID_HEADER, DEFAULT_CONTENT_TYPE};
use crate::link::required_link;
use crate::metadata::RequestMetadata;
use crate::model::{Linked, Reference, SupportedVersions, Task};
use crate::retry::{Disposition, ErrorClassifier, ReauthClassifier, RetryPolicy};
use crate::session::{AuthState, SecurityContext};
use crate::tasks::{TaskMonitor, TaskMonitorConfig};
use crate::transport::{RawResponse, Transport, TransportConfig, TransportRequest};
use crate::version::ApiVersion;
use crate::{error::SessionError, Error, Response, Result};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use url::Url;

/// Generates the `X-VMWARE-VCLOUD-CLIENT-REQUEST-ID` of each request. An empty id is not sent.
pub type ClientRequestIdProvider = Arc<dyn Fn() -> String + Send + Sync>;

fn random_request_id() -> ClientRequestIdProvider {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// A vCloud Director API client.
///
/// Cloning is cheap and clones share everything, including the session. Use
/// [`duplicate`](VcdClient::duplicate) for an independent client in the same or a new session.
///
/// # Examples
///
/// ```no_run
/// use vcd_client::{credentials::BasicCredentials, VcdClient};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), vcd_client::Error> {
/// let client = VcdClient::builder()
///     .endpoint("https://vcd.example.com/api")?
///     .api_version("36.0")?
///     .timeout(Duration::from_secs(60))
///     .build()?;
///
/// client.login(BasicCredentials::new("admin", "System", "secret")).await?;
///
/// let org = client.logged_in_org().await?;
/// println!("Logged in to {:?} (request {:?})", org.name, org.request_id());
///
/// client.logout().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VcdClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Transport,
    transport_config: TransportConfig,
    endpoint: Url,
    /// Parsed version and the label sent on the wire, e.g. `37.0.0-alpha`.
    api_version: Option<(ApiVersion, String)>,
    multisite_locations: Option<String>,
    default_headers: HeaderMap,
    classifier: Arc<dyn ErrorClassifier>,
    reauthenticate: bool,
    client_request_id: Option<ClientRequestIdProvider>,
    task_monitor_config: TaskMonitorConfig,
    security: Arc<SecurityContext>,
    query_list: OnceCell<HashMap<String, Url>>,
}

impl VcdClient {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The API root, always ending in `/`.
    pub fn endpoint_url(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn api_version(&self) -> Option<ApiVersion> {
        self.inner.api_version.as_ref().map(|(version, _)| *version)
    }

    /// The shared authentication state of this client.
    pub fn security_context(&self) -> &Arc<SecurityContext> {
        &self.inner.security
    }

    pub(crate) fn task_monitor_config(&self) -> &TaskMonitorConfig {
        &self.inner.task_monitor_config
    }

    /// Task waiting bound to this client.
    pub fn task_monitor(&self) -> TaskMonitor {
        TaskMonitor::new(self.clone())
    }

    pub(crate) fn api_url(&self, relative: &str) -> Result<Url> {
        Ok(self.inner.endpoint.join(relative)?)
    }

    /// A client identical to this one but bound to `security`.
    pub(crate) fn with_security_context(&self, security: Arc<SecurityContext>) -> Result<Self> {
        self.derive(
            security,
            self.inner.transport_config.clone(),
            self.inner.api_version.clone(),
        )
    }

    /// A client with its own transport and settings over `security`.
    pub(crate) fn derive(
        &self,
        security: Arc<SecurityContext>,
        transport_config: TransportConfig,
        api_version: Option<(ApiVersion, String)>,
    ) -> Result<Self> {
        let inner = &self.inner;
        Ok(Self {
            inner: Arc::new(ClientInner {
                transport: Transport::new(&transport_config)?,
                transport_config,
                endpoint: inner.endpoint.clone(),
                api_version,
                multisite_locations: inner.multisite_locations.clone(),
                default_headers: inner.default_headers.clone(),
                classifier: inner.classifier.clone(),
                reauthenticate: inner.reauthenticate,
                client_request_id: inner.client_request_id.clone(),
                task_monitor_config: inner.task_monitor_config.clone(),
                security,
                query_list: OnceCell::new(),
            }),
        })
    }

    pub(crate) fn transport_config(&self) -> &TransportConfig {
        &self.inner.transport_config
    }

    /// `media_type;version=X.Y[;multisite=...]`.
    pub(crate) fn versioned(&self, media_type: &str) -> String {
        let mut value = media_type.to_string();
        if let Some((_, version)) = &self.inner.api_version {
            value.push_str(&format!(";version={version}"));
        }
        if let Some(locations) = &self.inner.multisite_locations {
            value.push_str(&format!(";multisite={locations}"));
        }
        value
    }

    /// Assembles one attempt: defaults, content negotiation, request id, authentication, then
    /// per-request overrides. `Content-Type` is only sent with a body. Sessionless credentials
    /// sign last.
    pub(crate) fn build_request(
        &self,
        method: Method,
        url: Url,
        state: &AuthState,
        metadata: Option<&RequestMetadata>,
        body: Option<Vec<u8>>,
    ) -> Result<TransportRequest> {
        let mut request = TransportRequest::new(method, url);
        let headers = &mut request.headers;
        headers.extend(self.inner.default_headers.clone());

        let accept = metadata
            .and_then(|m| m.accept.as_deref())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        headers.insert(ACCEPT, header_value(&self.versioned(accept))?);
        if body.is_some() {
            let content_type = metadata
                .and_then(|m| m.content_type.as_deref())
                .unwrap_or(DEFAULT_CONTENT_TYPE);
            headers.insert(CONTENT_TYPE, header_value(&self.versioned(content_type))?);
        }

        if let Some(provider) = &self.inner.client_request_id {
            let id = provider();
            if !id.is_empty() {
                headers.insert(
                    HeaderName::from_static(CLIENT_REQUEST_ID_HEADER),
                    header_value(&id)?,
                );
            }
        }

        headers.extend(state.auth_headers()?);
        if let Some(metadata) = metadata {
            for (name, value) in &metadata.headers {
                headers.insert(name.clone(), value.clone());
            }
        }
        request.body = body;

        if let Some(credentials) = state.credentials().filter(|c| c.supports_sessionless()) {
            credentials.sign_request(&mut request)?;
        }
        Ok(request)
    }

    /// One exchange with no retry, requiring `expected`. Used by the session manager.
    pub(crate) async fn send_once(
        &self,
        request: TransportRequest,
        expected: StatusCode,
    ) -> Result<RawResponse> {
        let response = self
            .inner
            .transport
            .execute(request)
            .await
            .map_err(|f| f.into_error())?;
        check_status(&response, expected)?;
        Ok(response)
    }

    /// Runs one request through the retry loop and returns the successful exchange.
    ///
    /// After a failure the classifier decides. A retry after `401` first logs in again when
    /// re-authentication is enabled and the client holds session credentials.
    async fn execute(
        &self,
        metadata: &RequestMetadata,
        body: Option<Vec<u8>>,
    ) -> Result<(RawResponse, usize, Duration)> {
        let start_time = Instant::now();
        let url = metadata.full_url();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let state = self.inner.security.snapshot();
            let request = self.build_request(
                metadata.method.clone(),
                url.clone(),
                &state,
                Some(metadata),
                body.clone(),
            )?;

            let failure = match self.inner.transport.execute(request).await {
                Ok(response) => return Ok((response, attempt, start_time.elapsed())),
                Err(failure) => failure,
            };

            let disposition = self.inner.classifier.classify(&failure, attempt);
            tracing::warn!(
                error = %failure,
                attempt = attempt,
                method = %metadata.method,
                url = %url,
                disposition = ?disposition,
                "Request failed"
            );

            if disposition == Disposition::Fail {
                return Err(failure.into_error());
            }

            if failure.status() == Some(StatusCode::UNAUTHORIZED) && self.inner.reauthenticate {
                self.reauthenticate(&state).await?;
            }
        }
    }

    async fn reauthenticate(&self, state: &AuthState) -> Result<()> {
        match state.credentials() {
            Some(credentials) if !credentials.supports_sessionless() => {
                tracing::info!("Session rejected; logging in again before retry");
                self.relogin()
                    .await
                    .map_err(|e| SessionError::ReauthenticationFailed {
                        source: Box::new(e),
                    })?;
                Ok(())
            }
            _ => {
                tracing::debug!("No session credentials to log in again with; retrying as is");
                Ok(())
            }
        }
    }

    /// Makes a typed request.
    ///
    /// Handles serialization, retries, logging, and deserialization.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vcd_client::{metadata::RequestMetadata, model::Resource, VcdClient};
    /// use http::Method;
    /// use url::Url;
    ///
    /// # async fn example(client: VcdClient) -> Result<(), vcd_client::Error> {
    /// let url = Url::parse("https://vcd.example.com/api/admin/org/1")?;
    /// let metadata = RequestMetadata::new(Method::GET, url)
    ///     .with_accept("application/vnd.vmware.admin.organization+json");
    ///
    /// let org = client.call::<(), Resource>(metadata, None).await?;
    /// println!("{:?}", org.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let raw = self.call_raw(metadata, body).await?;
        parse_body(raw)
    }

    /// Makes a request and returns the body unparsed.
    pub async fn call_raw<Req>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<()>>
    where
        Req: Serialize + ?Sized,
    {
        let body = body.map(serialize).transpose()?;
        self.call_bytes(metadata, body).await
    }

    /// Makes a request with an already encoded body and returns the response unparsed.
    pub(crate) async fn call_bytes(
        &self,
        metadata: RequestMetadata,
        body: Option<Vec<u8>>,
    ) -> Result<Response<()>> {
        let (response, attempts, latency) = self.execute(&metadata, body).await?;
        Ok(Response::new(
            (),
            response.body,
            response.status,
            response.headers,
            latency,
            attempts,
        ))
    }

    /// Makes a request that must answer `204 No Content`.
    pub async fn call_void<Req>(&self, metadata: RequestMetadata, body: Option<&Req>) -> Result<()>
    where
        Req: Serialize + ?Sized,
    {
        let body = body.map(serialize).transpose()?;
        let (response, _, _) = self.execute(&metadata, body).await?;
        check_status(&response, StatusCode::NO_CONTENT)
    }

    fn metadata(&self, method: Method, href: &str, media_type: Option<&str>) -> Result<RequestMetadata> {
        let metadata = RequestMetadata::new(method, Url::parse(href)?);
        Ok(match media_type {
            Some(media_type) => metadata.with_accept(media_type).with_content_type(media_type),
            None => metadata,
        })
    }

    /// GET `href` as `application/*+json`.
    pub async fn get<Res: DeserializeOwned>(&self, href: &str) -> Result<Response<Res>> {
        self.call::<(), Res>(self.metadata(Method::GET, href, None)?, None)
            .await
    }

    /// GET `href` accepting a specific media type.
    pub async fn get_typed<Res: DeserializeOwned>(
        &self,
        href: &str,
        media_type: &str,
    ) -> Result<Response<Res>> {
        self.call::<(), Res>(self.metadata(Method::GET, href, Some(media_type))?, None)
            .await
    }

    pub async fn get_raw(&self, href: &str) -> Result<Response<()>> {
        self.call_raw::<()>(self.metadata(Method::GET, href, None)?, None)
            .await
    }

    /// PUT `contents` of `media_type` to `href`.
    pub async fn put<Req, Res>(
        &self,
        href: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::PUT, Url::parse(href)?)
            .with_content_type(media_type);
        self.call(metadata, Some(contents)).await
    }

    pub async fn put_raw<Req: Serialize + ?Sized>(
        &self,
        href: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<()>> {
        let metadata = RequestMetadata::new(Method::PUT, Url::parse(href)?)
            .with_content_type(media_type);
        self.call_raw(metadata, Some(contents)).await
    }

    pub async fn put_void<Req: Serialize + ?Sized>(
        &self,
        href: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<()> {
        let metadata = RequestMetadata::new(Method::PUT, Url::parse(href)?)
            .with_content_type(media_type);
        self.call_void(metadata, Some(contents)).await
    }

    /// POST `contents` of `media_type` to `href`.
    pub async fn post<Req, Res>(
        &self,
        href: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::POST, Url::parse(href)?)
            .with_content_type(media_type);
        self.call(metadata, Some(contents)).await
    }

    pub async fn post_raw<Req: Serialize + ?Sized>(
        &self,
        href: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<()>> {
        let metadata = RequestMetadata::new(Method::POST, Url::parse(href)?)
            .with_content_type(media_type);
        self.call_raw(metadata, Some(contents)).await
    }

    pub async fn post_void<Req: Serialize + ?Sized>(
        &self,
        href: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<()> {
        let metadata = RequestMetadata::new(Method::POST, Url::parse(href)?)
            .with_content_type(media_type);
        self.call_void(metadata, Some(contents)).await
    }

    pub async fn delete<Res: DeserializeOwned>(&self, href: &str) -> Result<Response<Res>> {
        self.call::<(), Res>(self.metadata(Method::DELETE, href, None)?, None)
            .await
    }

    pub async fn delete_raw(&self, href: &str) -> Result<Response<()>> {
        self.call_raw::<()>(self.metadata(Method::DELETE, href, None)?, None)
            .await
    }

    /// DELETE `href`, requiring `204 No Content`.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedStatus`] for any other success status.
    pub async fn delete_void(&self, href: &str) -> Result<()> {
        self.call_void::<()>(self.metadata(Method::DELETE, href, None)?, None)
            .await
    }

    pub async fn options(&self, href: &str) -> Result<Response<()>> {
        self.call_raw::<()>(self.metadata(Method::OPTIONS, href, None)?, None)
            .await
    }

    /// Follows the link of `resource` with relation `rel` and type `media_type`.
    pub async fn get_linked<R, Res>(
        &self,
        resource: &R,
        rel: &str,
        media_type: &str,
    ) -> Result<Response<Res>>
    where
        R: Linked + ?Sized,
        Res: DeserializeOwned,
    {
        let link = required_link(resource, rel, Some(media_type))?;
        self.get_typed(&link.href, media_type).await
    }

    pub async fn put_linked<R, Req, Res>(
        &self,
        resource: &R,
        rel: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<Res>>
    where
        R: Linked + ?Sized,
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let link = required_link(resource, rel, Some(media_type))?;
        self.put(&link.href, media_type, contents).await
    }

    pub async fn post_linked<R, Req, Res>(
        &self,
        resource: &R,
        rel: &str,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<Res>>
    where
        R: Linked + ?Sized,
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let link = required_link(resource, rel, Some(media_type))?;
        self.post(&link.href, media_type, contents).await
    }

    /// GET the resource `reference` points at. See
    /// [`resolve_reference`](VcdClient::resolve_reference) for stale hrefs.
    pub async fn get_referenced<Res: DeserializeOwned>(
        &self,
        reference: &Reference,
    ) -> Result<Response<Res>> {
        self.get(&reference.href).await
    }

    pub async fn put_referenced<Req, Res>(
        &self,
        reference: &Reference,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.put(&reference.href, media_type, contents).await
    }

    pub async fn post_referenced<Req, Res>(
        &self,
        reference: &Reference,
        media_type: &str,
        contents: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.post(&reference.href, media_type, contents).await
    }

    /// DELETE the resource `reference` points at, with optional `force` and `recursive`.
    pub async fn delete_referenced<Res: DeserializeOwned>(
        &self,
        reference: &Reference,
        force: Option<bool>,
        recursive: Option<bool>,
    ) -> Result<Response<Res>> {
        let metadata = delete_metadata(&reference.href, force, recursive)?;
        self.call::<(), Res>(metadata, None).await
    }

    /// Deletes `resource` through its untyped `remove` link.
    ///
    /// `force` and `recursive` are sent as query parameters when set.
    pub async fn remove<R: Linked + ?Sized>(
        &self,
        resource: &R,
        force: Option<bool>,
        recursive: Option<bool>,
    ) -> Result<Response<Task>> {
        let link = required_link(resource, rel::REMOVE, None)?;
        let metadata = delete_metadata(&link.href, force, recursive)?;
        self.call::<(), Task>(metadata, None).await
    }

    /// Checks `<endpoint>/server_status`. Returns the raw response.
    pub async fn server_status(&self) -> Result<Response<()>> {
        let metadata = RequestMetadata::new(Method::GET, self.api_url(path::SERVER_STATUS)?)
            .with_header(ACCEPT.as_str(), "*/*")?;
        self.call_raw::<()>(metadata, None).await
    }

    /// Lists the API versions the server supports.
    pub async fn versions(&self) -> Result<Response<SupportedVersions>> {
        self.get(self.api_url(path::VERSIONS)?.as_str()).await
    }

    /// The query-list map, keyed by `"<media type>!<query name>"`. Loaded once per client.
    pub(crate) async fn query_list_map(&self) -> Result<&HashMap<String, Url>> {
        self.inner
            .query_list
            .get_or_try_init(|| async {
                let list = self.query_list().await?;
                let mut map = HashMap::new();
                for link in &list.link {
                    if let (Some(media_type), Some(name)) = (&link.media_type, &link.name) {
                        map.insert(query_list_key(media_type, name), Url::parse(&link.href)?);
                    }
                }
                tracing::debug!(queries = map.len(), "Loaded query list");
                Ok(map)
            })
            .await
    }
}

pub(crate) fn query_list_key(media_type: &str, name: &str) -> String {
    format!("{media_type}!{name}")
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))
}

fn delete_metadata(href: &str, force: Option<bool>, recursive: Option<bool>) -> Result<RequestMetadata> {
    let mut metadata = RequestMetadata::new(Method::DELETE, Url::parse(href)?);
    if let Some(force) = force {
        metadata = metadata.with_query_param("force", force.to_string());
    }
    if let Some(recursive) = recursive {
        metadata = metadata.with_query_param("recursive", recursive.to_string());
    }
    Ok(metadata)
}

fn serialize<Req: Serialize + ?Sized>(body: &Req) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| Error::SerializationFailed(e.to_string()))
}

fn check_status(response: &RawResponse, expected: StatusCode) -> Result<()> {
    if response.status == expected {
        return Ok(());
    }
    tracing::error!(
        expected = expected.as_u16(),
        actual = response.status.as_u16(),
        "Unexpected response status"
    );
    Err(Error::UnexpectedStatus {
        expected,
        actual: response.status,
        request_id: response
            .header(crate::constants::REQUEST_ID_HEADER)
            .map(str::to_string),
        raw_response: response.body.clone(),
    })
}

fn parse_body<Res: DeserializeOwned>(raw: Response<()>) -> Result<Response<Res>> {
    match serde_json::from_str::<Res>(&raw.raw_body) {
        Ok(data) => Ok(raw.map(|_| data)),
        Err(e) => {
            tracing::error!(
                error = %e,
                raw_response = %raw.raw_body,
                "Failed to deserialize response"
            );

            Err(Error::DeserializationFailed {
                raw_response: raw.raw_body,
                serde_error: e.to_string(),
                status: raw.status,
            })
        }
    }
}

/// Builder for configuring and creating a [`VcdClient`].
///
/// # Examples
///
/// ```no_run
/// use vcd_client::{ClientBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), vcd_client::Error> {
/// let client = ClientBuilder::new()
///     .endpoint("https://vcd.example.com/api")?
///     .api_version("36.0")?
///     .connect_timeout(Duration::from_secs(10))
///     .retry_policy(RetryPolicy { max_auth_retries: 2 })
///     .default_header("X-Trace", "on")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    endpoint: Option<Url>,
    api_version: Option<(ApiVersion, String)>,
    multisite_locations: Option<String>,
    default_headers: HeaderMap,
    transport: TransportConfig,
    retry_policy: RetryPolicy,
    classifier: Option<Arc<dyn ErrorClassifier>>,
    reauthenticate: bool,
    client_request_id: Option<ClientRequestIdProvider>,
    task_monitor_config: TaskMonitorConfig,
    security: Option<Arc<SecurityContext>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            api_version: None,
            multisite_locations: None,
            default_headers: HeaderMap::new(),
            transport: TransportConfig {
                user_agent: Some("vcd-client".to_string()),
                ..TransportConfig::default()
            },
            retry_policy: RetryPolicy::default(),
            classifier: None,
            reauthenticate: true,
            client_request_id: Some(random_request_id()),
            task_monitor_config: TaskMonitorConfig::default(),
            security: None,
        }
    }

    /// Sets the API root, e.g. `https://vcd.example.com/api`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn endpoint(mut self, url: impl AsRef<str>) -> Result<Self> {
        let mut url = Url::parse(url.as_ref())?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.endpoint = Some(url);
        Ok(self)
    }

    /// Sets the API version sent in every `Accept` and `Content-Type`.
    pub fn api_version(mut self, version: impl AsRef<str>) -> Result<Self> {
        let label = version.as_ref().trim();
        self.api_version = Some((label.parse()?, label.to_string()));
        Ok(self)
    }

    /// Sets the multisite location list sent with the media types.
    pub fn multisite_locations(mut self, locations: impl Into<String>) -> Self {
        self.multisite_locations = Some(locations.into());
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        self.default_headers.insert(name, header_value(value.as_ref())?);
        Ok(self)
    }

    /// Sets the deadline of each exchange. Defaults to 90 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    /// Sets the connection deadline. Defaults to 30 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.transport.user_agent = Some(user_agent.into());
        self
    }

    /// Accepts self-signed server certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.transport.accept_invalid_certs = accept;
        self
    }

    /// Sets the retry limit of the default classifier.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Replaces the default [`ReauthClassifier`].
    pub fn error_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Whether a `401` triggers a fresh login before the retry. Enabled by default.
    pub fn reauthenticate(mut self, enabled: bool) -> Self {
        self.reauthenticate = enabled;
        self
    }

    /// Whether to send a random `X-VMWARE-VCLOUD-CLIENT-REQUEST-ID`. Enabled by default.
    pub fn client_request_id(mut self, enabled: bool) -> Self {
        self.client_request_id = enabled.then(random_request_id);
        self
    }

    /// Generates client request ids with `provider` instead of random UUIDs.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::atomic::{AtomicU64, Ordering};
    /// use vcd_client::VcdClient;
    ///
    /// let next = AtomicU64::new(1);
    /// let builder = VcdClient::builder()
    ///     .client_request_id_provider(move || format!("job-7-{}", next.fetch_add(1, Ordering::Relaxed)));
    /// ```
    pub fn client_request_id_provider(
        mut self,
        provider: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.client_request_id = Some(Arc::new(provider));
        self
    }

    pub fn task_monitor_config(mut self, config: TaskMonitorConfig) -> Self {
        self.task_monitor_config = config;
        self
    }

    /// Shares an existing security context, joining the session of the clients that use it.
    pub fn security_context(mut self, security: Arc<SecurityContext>) -> Self {
        self.security = Some(security);
        self
    }

    /// Builds the configured `VcdClient`.
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint was provided or if the HTTP client cannot be built.
    pub fn build(self) -> Result<VcdClient> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::ConfigurationError("Endpoint is required".to_string()))?;

        let transport = Transport::new(&self.transport)?;
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(ReauthClassifier::new(self.retry_policy)));

        Ok(VcdClient {
            inner: Arc::new(ClientInner {
                transport,
                transport_config: self.transport,
                endpoint,
                api_version: self.api_version,
                multisite_locations: self.multisite_locations,
                default_headers: self.default_headers,
                classifier,
                reauthenticate: self.reauthenticate,
                client_request_id: self.client_request_id.clone(),
                task_monitor_config: self.task_monitor_config,
                security: self.security.unwrap_or_default(),
                query_list: OnceCell::new(),
            }),
        })
    }

    /// Builds a client speaking the first of `candidates` the server supports.
    ///
    /// The version listing is fetched without a version parameter.
    pub async fn build_negotiated(mut self, candidates: &[&str]) -> Result<VcdClient> {
        self.api_version = None;
        let bootstrap = ClientBuilder {
            security: Some(SecurityContext::new()),
            ..self.clone_settings()
        }
        .build()?;
        let versions = bootstrap.versions().await?;
        let chosen = versions.negotiate(candidates).ok_or_else(|| {
            Error::ConfigurationError(format!(
                "No preferred API version is supported by the server. Preferred: {:?}; supported: {:?}",
                candidates,
                versions.version_info.iter().map(|v| v.version.as_str()).collect::<Vec<_>>()
            ))
        })?;
        tracing::info!(version = chosen, "Negotiated API version");
        self.api_version(chosen)?.build()
    }

    fn clone_settings(&self) -> ClientBuilder {
        ClientBuilder {
            endpoint: self.endpoint.clone(),
            api_version: self.api_version.clone(),
            multisite_locations: self.multisite_locations.clone(),
            default_headers: self.default_headers.clone(),
            transport: self.transport.clone(),
            retry_policy: self.retry_policy,
            classifier: self.classifier.clone(),
            reauthenticate: self.reauthenticate,
            client_request_id: self.client_request_id.clone(),
            task_monitor_config: self.task_monitor_config.clone(),
            security: self.security.clone(),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::media_type;

    fn client(version: Option<&str>) -> VcdClient {
        let mut builder = VcdClient::builder().endpoint("https://vcd.example.com/api").unwrap();
        if let Some(version) = version {
            builder = builder.api_version(version).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_endpoint_gets_trailing_slash() {
        let client = client(None);
        assert_eq!(client.endpoint_url().as_str(), "https://vcd.example.com/api/");
        assert_eq!(
            client.api_url(path::SESSIONS).unwrap().as_str(),
            "https://vcd.example.com/api/sessions"
        );
    }

    #[test]
    fn test_versioned_media_types() {
        assert_eq!(
            client(Some("36.0")).versioned(DEFAULT_CONTENT_TYPE),
            "application/*+json;version=36.0"
        );
        assert_eq!(client(None).versioned(media_type::TASK), media_type::TASK);

        let multisite = VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .api_version("36.0")
            .unwrap()
            .multisite_locations("site-a,site-b")
            .build()
            .unwrap();
        assert_eq!(
            multisite.versioned(DEFAULT_CONTENT_TYPE),
            "application/*+json;version=36.0;multisite=site-a,site-b"
        );
    }

    #[test]
    fn test_build_request_headers() {
        let client = client(Some("36.0"));
        let state = AuthState {
            auth_token: Some("tok".into()),
            ..AuthState::default()
        };
        let url = Url::parse("https://vcd.example.com/api/org").unwrap();
        let metadata = RequestMetadata::new(Method::GET, url.clone())
            .with_accept(media_type::ORGANIZATION)
            .with_header("x-extra", "1")
            .unwrap();
        let request = client
            .build_request(Method::GET, url, &state, Some(&metadata), None)
            .unwrap();

        assert_eq!(
            request.headers[ACCEPT],
            "application/vnd.vmware.vcloud.org+json;version=36.0"
        );
        assert_eq!(request.headers["x-vcloud-authorization"], "tok");
        assert_eq!(request.headers["x-extra"], "1");
        assert!(request.headers.contains_key(CLIENT_REQUEST_ID_HEADER));
    }

    #[test]
    fn test_content_type_only_with_body() {
        let client = client(Some("36.0"));
        let url = Url::parse("https://vcd.example.com/api/org").unwrap();
        let state = AuthState::default();

        let get = client
            .build_request(Method::GET, url.clone(), &state, None, None)
            .unwrap();
        assert!(!get.headers.contains_key(CONTENT_TYPE));
        assert!(get.body.is_none());

        let metadata = RequestMetadata::new(Method::PUT, url.clone())
            .with_content_type(media_type::ORGANIZATION);
        let put = client
            .build_request(Method::PUT, url, &state, Some(&metadata), Some(b"{}".to_vec()))
            .unwrap();
        assert_eq!(
            put.headers[CONTENT_TYPE],
            "application/vnd.vmware.vcloud.org+json;version=36.0"
        );
        assert_eq!(put.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_client_request_id_provider() {
        let url = Url::parse("https://vcd.example.com/api/org").unwrap();
        let state = AuthState::default();

        let custom = VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .client_request_id_provider(|| "batch-42".to_string())
            .build()
            .unwrap();
        let request = custom
            .build_request(Method::GET, url.clone(), &state, None, None)
            .unwrap();
        assert_eq!(request.headers[CLIENT_REQUEST_ID_HEADER], "batch-42");

        let empty = VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .client_request_id_provider(String::new)
            .build()
            .unwrap();
        let request = empty
            .build_request(Method::GET, url.clone(), &state, None, None)
            .unwrap();
        assert!(!request.headers.contains_key(CLIENT_REQUEST_ID_HEADER));

        let disabled = VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .client_request_id(false)
            .build()
            .unwrap();
        let request = disabled
            .build_request(Method::GET, url, &state, None, None)
            .unwrap();
        assert!(!request.headers.contains_key(CLIENT_REQUEST_ID_HEADER));
    }

    #[test]
    fn test_missing_endpoint_is_configuration_error() {
        assert!(matches!(
            VcdClient::builder().build(),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_operations_before_login_fail() {
        let client = client(Some("36.0"));
        assert!(matches!(
            client.endpoint(crate::session::WellKnownEndpoint::Admin),
            Err(Error::Session(SessionError::NotLoggedIn))
        ));
        assert_eq!(
            client.openapi_endpoint().unwrap().as_str(),
            "https://vcd.example.com/cloudapi"
        );
    }
}
