//! Session state and the session-manager operations of [`VcdClient`].
//!
//! Authentication state lives in a [`SecurityContext`] that any number of clients may share. The
//! state is an immutable [`AuthState`] snapshot behind a lock; every change builds a new snapshot
//! and swaps it in whole, so a request never observes a half-updated session.

use crate::client::VcdClient;
use crate::constants::{
    media_type, path, rel, ACCESS_TOKEN_HEADER, AUTH_CONTEXT_HEADER, JWT_COOKIE_NAME,
    SESSION_COOKIE_NAME, TENANT_CONTEXT_HEADER, VCLOUD_AUTHENTICATION_HEADER, VCLOUD_COOKIE_NAME,
};
use crate::credentials::{Credentials, AUTHORIZATION};
use crate::error::{LinkError, SessionError};
use crate::link::{find_link, required_link};
use crate::model::{Identified, Reference, Resource, SessionResource, UserInfo};
use crate::transport::RawResponse;
use crate::{Error, Response, Result};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Entry points advertised by the session resource, each found by a (relation, media type) pair.
///
/// The first four are present whenever the server is not in maintenance mode; the rest depend on
/// the rights of the logged-in principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownEndpoint {
    EntityResolver,
    LoggedInOrg,
    OrgList,
    QueryList,
    Admin,
    ApiExtensibility,
    Extension,
    OpenApi,
    Network,
}

impl WellKnownEndpoint {
    pub const ALL: [WellKnownEndpoint; 9] = [
        WellKnownEndpoint::EntityResolver,
        WellKnownEndpoint::LoggedInOrg,
        WellKnownEndpoint::OrgList,
        WellKnownEndpoint::QueryList,
        WellKnownEndpoint::Admin,
        WellKnownEndpoint::ApiExtensibility,
        WellKnownEndpoint::Extension,
        WellKnownEndpoint::OpenApi,
        WellKnownEndpoint::Network,
    ];

    pub fn rel(&self) -> &'static str {
        match self {
            WellKnownEndpoint::EntityResolver => rel::ENTITY_RESOLVER,
            WellKnownEndpoint::ApiExtensibility => rel::API_EXTENSIBILITY,
            WellKnownEndpoint::OpenApi => rel::OPENAPI,
            WellKnownEndpoint::Network => rel::NSX,
            _ => rel::DOWN,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            WellKnownEndpoint::EntityResolver => media_type::ENTITY,
            WellKnownEndpoint::LoggedInOrg => media_type::ORGANIZATION,
            WellKnownEndpoint::OrgList => media_type::ORGANIZATION_LIST,
            WellKnownEndpoint::QueryList => media_type::QUERY_LIST,
            WellKnownEndpoint::Admin => media_type::ADMIN_VCLOUD,
            WellKnownEndpoint::ApiExtensibility => media_type::API_EXTENSIBILITY,
            WellKnownEndpoint::Extension => media_type::VMW_EXTENSION,
            WellKnownEndpoint::OpenApi => media_type::APPLICATION_JSON,
            WellKnownEndpoint::Network => media_type::APPLICATION_XML,
        }
    }
}

/// What the client knows about the server-side session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub href: Url,
    pub org: Option<String>,
    pub user: Option<String>,
    endpoints: HashMap<WellKnownEndpoint, Url>,
}

impl SessionInfo {
    /// Derives the endpoint map from the session resource's links.
    ///
    /// An absent link is not an error here; it only fails when that endpoint is used.
    pub fn from_resource(resource: &SessionResource, fallback_href: &Url) -> Result<Self> {
        let href = match resource.href.as_deref() {
            Some(href) => Url::parse(href)?,
            None => fallback_href.clone(),
        };
        let mut endpoints = HashMap::new();
        for endpoint in WellKnownEndpoint::ALL {
            if let Some(link) =
                find_link(resource, endpoint.rel(), Some(endpoint.media_type()), false)?
            {
                endpoints.insert(endpoint, Url::parse(&link.href)?);
            }
        }
        Ok(Self {
            href,
            org: resource.org.clone(),
            user: resource.user.clone(),
            endpoints,
        })
    }

    pub fn endpoint(&self, endpoint: WellKnownEndpoint) -> Option<&Url> {
        self.endpoints.get(&endpoint)
    }

    /// Resolves an endpoint or reports the missing session link.
    pub fn require(&self, endpoint: WellKnownEndpoint) -> Result<&Url> {
        self.endpoint(endpoint).ok_or_else(|| {
            LinkError::Missing {
                href: self.href.to_string(),
                rel: endpoint.rel().to_string(),
                media_type: Some(endpoint.media_type().to_string()),
            }
            .into()
        })
    }
}

/// An exported session: the legacy auth token and the `vcloud-token` cookie.
///
/// Importing it with [`VcdClient::login_with_token`] joins the same server-side session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    auth_token: String,
    vcloud_token: Option<String>,
}

impl SessionToken {
    pub fn new(auth_token: impl Into<String>, vcloud_token: Option<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            vcloud_token,
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn vcloud_token(&self) -> Option<&str> {
        self.vcloud_token.as_deref()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken").finish_non_exhaustive()
    }
}

/// One immutable snapshot of authentication state.
#[derive(Clone, Default)]
pub struct AuthState {
    pub(crate) credentials: Option<Arc<dyn Credentials>>,
    pub(crate) jwt: Option<String>,
    pub(crate) auth_context: Option<String>,
    pub(crate) tenant_context: Option<String>,
    pub(crate) auth_token: Option<String>,
    pub(crate) cookies: BTreeMap<String, String>,
    pub(crate) session: Option<Arc<SessionInfo>>,
}

impl AuthState {
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_deref()
    }

    pub fn jwt(&self) -> Option<&str> {
        self.jwt.as_deref()
    }

    pub fn auth_context(&self) -> Option<&str> {
        self.auth_context.as_deref()
    }

    pub fn credentials(&self) -> Option<&Arc<dyn Credentials>> {
        self.credentials.as_ref()
    }

    fn sessionless_credentials(&self) -> Option<&Arc<dyn Credentials>> {
        self.credentials.as_ref().filter(|c| c.supports_sessionless())
    }

    /// Authentication headers for a request made under this state.
    ///
    /// Sessionless credentials win, then a JWT (with its auth context), then the legacy token.
    /// Cookies are only sent when the credentials are not sessionless.
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(credentials) = self.sessionless_credentials() {
            insert(&mut headers, credentials.header_name(), &credentials.header_value())?;
        } else if let Some(jwt) = &self.jwt {
            insert(&mut headers, AUTHORIZATION, &format!("Bearer {jwt}"))?;
            if let Some(context) = &self.auth_context {
                insert(&mut headers, AUTH_CONTEXT_HEADER, context)?;
            }
        } else if let Some(token) = &self.auth_token {
            insert(&mut headers, VCLOUD_AUTHENTICATION_HEADER, token)?;
        }

        if let Some(tenant) = &self.tenant_context {
            insert(&mut headers, TENANT_CONTEXT_HEADER, tenant)?;
        }

        if self.sessionless_credentials().is_none() {
            let cookie = [JWT_COOKIE_NAME, SESSION_COOKIE_NAME, VCLOUD_COOKIE_NAME]
                .iter()
                .filter_map(|name| self.cookies.get(*name).map(|v| format!("{name}={v}")))
                .collect::<Vec<_>>()
                .join("; ");
            if !cookie.is_empty() {
                insert(&mut headers, COOKIE.as_str(), &cookie)?;
            }
        }

        Ok(headers)
    }

    /// Session state with everything derived from the last login removed.
    fn cleared(&self) -> AuthState {
        AuthState {
            credentials: self.credentials.clone(),
            tenant_context: self.tenant_context.clone(),
            ..AuthState::default()
        }
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("credentials", &self.credentials)
            .field("has_jwt", &self.jwt.is_some())
            .field("auth_context", &self.auth_context)
            .field("tenant_context", &self.tenant_context)
            .field("has_auth_token", &self.auth_token.is_some())
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("session", &self.session.as_ref().map(|s| s.href.as_str()))
            .finish()
    }
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
    headers.insert(name, value);
    Ok(())
}

/// Shared, swappable authentication state.
///
/// Clients built with the same `Arc<SecurityContext>` act in the same session.
#[derive(Debug, Default)]
pub struct SecurityContext {
    state: RwLock<Arc<AuthState>>,
}

impl SecurityContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The current state. Later updates do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<AuthState> {
        self.state.read().clone()
    }

    /// Replaces the state with `f` applied to a copy of it.
    pub fn update(&self, f: impl FnOnce(&mut AuthState)) {
        let mut guard = self.state.write();
        let mut next = AuthState::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    pub(crate) fn replace(&self, state: AuthState) {
        *self.state.write() = Arc::new(state);
    }

    /// Drops tokens, cookies and the session; credentials and tenant context survive.
    pub fn clear(&self) {
        let mut guard = self.state.write();
        let next = guard.cleared();
        *guard = Arc::new(next);
    }
}

fn header_str<'a>(response: &'a RawResponse, name: &str) -> Option<&'a str> {
    response.header(name).filter(|v| !v.is_empty())
}

fn session_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            [JWT_COOKIE_NAME, SESSION_COOKIE_NAME, VCLOUD_COOKIE_NAME]
                .contains(&name)
                .then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

impl VcdClient {
    /// Creates a session with `credentials` (`POST /sessions`).
    ///
    /// Endpoint links the principal may not see are not an error; they fail with
    /// [`LinkError::Missing`] when used.
    ///
    /// # Errors
    ///
    /// [`SessionError::MissingAuthToken`] if the response carries no `x-vcloud-authorization`
    /// header, or the server error for a rejected login.
    pub async fn login(&self, credentials: impl Credentials + 'static) -> Result<()> {
        self.login_shared(Arc::new(credentials)).await
    }

    pub(crate) async fn login_shared(&self, credentials: Arc<dyn Credentials>) -> Result<()> {
        let url = self.api_url(path::SESSIONS)?;
        tracing::debug!(url = %url, provider = credentials.is_provider(), "Logging in");

        let current = self.security_context().snapshot();
        let mut request = self.build_request(
            Method::POST,
            url.clone(),
            &AuthState {
                tenant_context: current.tenant_context.clone(),
                ..AuthState::default()
            },
            None,
            None,
        )?;
        let name = HeaderName::try_from(credentials.header_name())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(credentials.header_value())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        request.headers.insert(name, value);
        credentials.sign_request(&mut request)?;

        let response = self.send_once(request, StatusCode::OK).await?;

        let auth_token = header_str(&response, VCLOUD_AUTHENTICATION_HEADER)
            .ok_or(SessionError::MissingAuthToken)?
            .to_string();
        let jwt = header_str(&response, ACCESS_TOKEN_HEADER).map(str::to_string);
        let cookies = session_cookies(&response.headers);
        let session = self.parse_session(&response)?;

        tracing::info!(
            session = %session.href,
            user = session.user.as_deref().unwrap_or("-"),
            org = session.org.as_deref().unwrap_or("-"),
            "Logged in"
        );

        self.security_context().replace(AuthState {
            credentials: Some(credentials),
            jwt,
            auth_context: None,
            tenant_context: current.tenant_context.clone(),
            auth_token: Some(auth_token),
            cookies,
            session: Some(Arc::new(session)),
        });
        Ok(())
    }

    /// Logs in again with the credentials of the last login.
    pub async fn relogin(&self) -> Result<()> {
        let credentials = self
            .security_context()
            .snapshot()
            .credentials
            .clone()
            .ok_or(SessionError::NoCredentials)?;
        self.login_shared(credentials).await
    }

    /// Installs `credentials`. Sessionless credentials only validate against `GET /session`;
    /// others perform a full login.
    pub async fn set_credentials(&self, credentials: impl Credentials + 'static) -> Result<()> {
        self.set_credentials_shared(Arc::new(credentials)).await
    }

    pub(crate) async fn set_credentials_shared(
        &self,
        credentials: Arc<dyn Credentials>,
    ) -> Result<()> {
        if credentials.supports_sessionless() {
            let current = self.security_context().snapshot();
            self.reuse_session(AuthState {
                credentials: Some(credentials),
                tenant_context: current.tenant_context.clone(),
                ..AuthState::default()
            })
            .await
        } else {
            self.login_shared(credentials).await
        }
    }

    /// Joins the session identified by `token` (`GET /session`, no login).
    pub async fn login_with_token(&self, token: &SessionToken) -> Result<()> {
        let mut cookies = BTreeMap::new();
        if let Some(vcloud_token) = &token.vcloud_token {
            cookies.insert(VCLOUD_COOKIE_NAME.to_string(), vcloud_token.clone());
        }
        let current = self.security_context().snapshot();
        self.reuse_session(AuthState {
            auth_token: Some(token.auth_token.clone()),
            cookies,
            tenant_context: current.tenant_context.clone(),
            ..AuthState::default()
        })
        .await
    }

    /// Authenticates with a JWT, optionally scoped to an organization, and loads the session.
    pub async fn login_with_jwt(
        &self,
        jwt: impl Into<String>,
        auth_context: Option<String>,
    ) -> Result<()> {
        let current = self.security_context().snapshot();
        self.reuse_session(AuthState {
            jwt: Some(jwt.into()),
            auth_context,
            tenant_context: current.tenant_context.clone(),
            ..AuthState::default()
        })
        .await
    }

    async fn reuse_session(&self, candidate: AuthState) -> Result<()> {
        let url = self.api_url(path::SESSION)?;
        let request = self.build_request(Method::GET, url, &candidate, None, None)?;
        let response = self.send_once(request, StatusCode::OK).await?;
        let session = self.parse_session(&response)?;

        tracing::info!(session = %session.href, "Joined existing session");

        self.security_context().replace(AuthState {
            session: Some(Arc::new(session)),
            ..candidate
        });
        Ok(())
    }

    fn parse_session(&self, response: &RawResponse) -> Result<SessionInfo> {
        let resource: SessionResource =
            serde_json::from_str(&response.body).map_err(|e| Error::DeserializationFailed {
                raw_response: response.body.clone(),
                serde_error: e.to_string(),
                status: response.status,
            })?;
        SessionInfo::from_resource(&resource, &self.api_url(path::SESSION)?)
    }

    /// Deletes the session (`DELETE /session`, expecting `204`).
    ///
    /// Local session state is cleared whatever the outcome; the returned error only reports
    /// what the server said.
    pub async fn logout(&self) -> Result<()> {
        let result: Result<RawResponse> = async {
            let url = self.api_url(path::SESSION)?;
            let state = self.security_context().snapshot();
            let request = self.build_request(Method::DELETE, url, &state, None, None)?;
            self.send_once(request, StatusCode::NO_CONTENT).await
        }
        .await;

        self.security_context().clear();

        match result {
            Ok(_) => {
                tracing::info!("Logged out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Logout request failed; local session cleared");
                Err(e)
            }
        }
    }

    /// A new client with its own security context.
    ///
    /// With `new_session` the duplicate logs in again with the same credentials; otherwise it
    /// joins the current session through its JWT or session token.
    pub async fn duplicate(&self, new_session: bool) -> Result<VcdClient> {
        let state = self.security_context().snapshot();
        let duplicate = self.with_security_context(SecurityContext::new())?;
        duplicate
            .security_context()
            .update(|s| s.tenant_context = state.tenant_context.clone());

        if new_session {
            let credentials = state
                .credentials
                .clone()
                .ok_or(SessionError::NoCredentials)?;
            duplicate.set_credentials_shared(credentials).await?;
        } else if let Some(jwt) = &state.jwt {
            duplicate
                .login_with_jwt(jwt.clone(), state.auth_context.clone())
                .await?;
        } else {
            let token = self.session_token().ok_or(SessionError::NotLoggedIn)?;
            duplicate.login_with_token(&token).await?;
        }
        Ok(duplicate)
    }

    /// Exports the current session, or `None` if no auth token is held.
    pub fn session_token(&self) -> Option<SessionToken> {
        let state = self.security_context().snapshot();
        let auth_token = state.auth_token.clone()?;
        Some(SessionToken {
            auth_token,
            vcloud_token: state.cookies.get(VCLOUD_COOKIE_NAME).cloned(),
        })
    }

    /// Scopes subsequent requests to a tenant (`X-VMWARE-VCLOUD-TENANT-CONTEXT`).
    pub fn set_tenant_context(&self, tenant: Option<String>) {
        self.security_context().update(|s| s.tenant_context = tenant);
    }

    /// The current session, or [`SessionError::NotLoggedIn`].
    pub fn session_info(&self) -> Result<Arc<SessionInfo>> {
        self.security_context()
            .snapshot()
            .session
            .clone()
            .ok_or_else(|| SessionError::NotLoggedIn.into())
    }

    /// Fetches the session resource.
    pub async fn session(&self) -> Result<Response<SessionResource>> {
        let href = self.session_info()?.href.clone();
        self.get(href.as_str()).await
    }

    /// Fetches `<session>/userInfo`.
    pub async fn session_user_info(&self) -> Result<Response<UserInfo>> {
        let href = self.session_info()?.href.clone();
        let url = Url::parse(&format!("{}/userInfo", href.as_str().trim_end_matches('/')))?;
        self.get(url.as_str()).await
    }

    /// Resolves a well-known endpoint of the current session.
    pub fn endpoint(&self, endpoint: WellKnownEndpoint) -> Result<Url> {
        Ok(self.session_info()?.require(endpoint)?.clone())
    }

    async fn get_endpoint<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: WellKnownEndpoint,
    ) -> Result<Response<T>> {
        let url = self.endpoint(endpoint)?;
        self.get_typed(url.as_str(), endpoint.media_type()).await
    }

    /// The admin root. Requires admin rights.
    pub async fn admin(&self) -> Result<Response<Resource>> {
        self.get_endpoint(WellKnownEndpoint::Admin).await
    }

    /// The extension root. Requires system administrator rights.
    pub async fn extension(&self) -> Result<Response<Resource>> {
        self.get_endpoint(WellKnownEndpoint::Extension).await
    }

    pub async fn query_list(&self) -> Result<Response<Resource>> {
        self.get_endpoint(WellKnownEndpoint::QueryList).await
    }

    pub async fn api_extensibility(&self) -> Result<Response<Resource>> {
        self.get_endpoint(WellKnownEndpoint::ApiExtensibility).await
    }

    pub async fn logged_in_org(&self) -> Result<Response<Resource>> {
        self.get_endpoint(WellKnownEndpoint::LoggedInOrg).await
    }

    /// The admin view of the logged-in organization, via the org's `alternate` link.
    pub async fn logged_in_admin_org(&self) -> Result<Response<Resource>> {
        let org = self.logged_in_org().await?;
        self.get_linked(&org.data, rel::ALTERNATE, media_type::ADMIN_ORGANIZATION)
            .await
    }

    /// Organizations visible to the principal.
    pub async fn organizations(&self) -> Result<Vec<Reference>> {
        #[derive(serde::Deserialize)]
        struct OrgList {
            #[serde(default)]
            org: Vec<Reference>,
        }
        let list: Response<OrgList> = self.get_endpoint(WellKnownEndpoint::OrgList).await?;
        Ok(list.data.org)
    }

    /// Resolves an entity URN through the entity resolver.
    pub async fn resolve_entity(&self, id: &str) -> Result<Response<Resource>> {
        let base = self.endpoint(WellKnownEndpoint::EntityResolver)?;
        let url = Url::parse(&format!("{}/{}", base.as_str().trim_end_matches('/'), id))?;
        self.get_typed(url.as_str(), media_type::ENTITY).await
    }

    /// Resolves `id` and follows the entity's `alternate` link of `media_type`.
    pub async fn entity<T: serde::de::DeserializeOwned>(
        &self,
        id: &str,
        media_type: &str,
    ) -> Result<Response<T>> {
        self.follow_resolved(id, Some(media_type)).await
    }

    async fn follow_resolved<T: serde::de::DeserializeOwned>(
        &self,
        id: &str,
        media_type: Option<&str>,
    ) -> Result<Response<T>> {
        let entity = self.resolve_entity(id).await?;
        let link = required_link(&entity.data, rel::ALTERNATE, media_type)?;
        match media_type {
            Some(media_type) => self.get_typed(&link.href, media_type).await,
            None => self.get(&link.href).await,
        }
    }

    /// Fetches what `reference` points at, repairing a stale href.
    ///
    /// The href is tried first. If it fails with anything but `401`, or answers with another
    /// entity, the reference's id goes through the entity resolver and `on_href_changed`
    /// receives the entity's current href. When the resolver fails too, the error from the
    /// original href is returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vcd_client::model::{Reference, Resource};
    /// use vcd_client::VcdClient;
    ///
    /// # async fn example(client: VcdClient, mut stored: Reference) -> Result<(), vcd_client::Error> {
    /// let mut moved = None;
    /// let vapp = client
    ///     .resolve_reference::<Resource>(&stored, |href| moved = Some(href.to_string()))
    ///     .await?;
    /// if let Some(href) = moved {
    ///     stored.href = href;
    /// }
    /// println!("{:?}", vapp.data.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn resolve_reference<T>(
        &self,
        reference: &Reference,
        on_href_changed: impl FnOnce(&str),
    ) -> Result<Response<T>>
    where
        T: serde::de::DeserializeOwned + Identified,
    {
        let mut href_error = None;
        if !reference.href.is_empty() {
            match self.get::<T>(&reference.href).await {
                Ok(response) => match reference.id.as_deref() {
                    None => return Ok(response),
                    Some(id) if response.data.id() == Some(id) => return Ok(response),
                    Some(id) => tracing::debug!(
                        href = %reference.href,
                        expected = %id,
                        found = ?response.data.id(),
                        "Reference href points at another entity"
                    ),
                },
                Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => return Err(e),
                Err(e) => {
                    tracing::debug!(href = %reference.href, error = %e, "Reference href failed");
                    href_error = Some(e);
                }
            }
        }

        let Some(id) = reference.id.as_deref() else {
            return Err(href_error.unwrap_or_else(|| {
                Error::ConfigurationError("Reference has neither href nor id".to_string())
            }));
        };
        let response = match self
            .follow_resolved::<T>(id, reference.media_type.as_deref())
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(href_error.unwrap_or(e)),
        };

        if let Some(href) = response.data.href() {
            tracing::info!(id = %id, old = %reference.href, new = %href, "Repaired reference href");
            on_href_changed(href);
        }
        Ok(response)
    }

    /// The OpenAPI root: the session's `openapi` link, or `<host>/cloudapi`.
    pub fn openapi_endpoint(&self) -> Result<Url> {
        let advertised = self
            .security_context()
            .snapshot()
            .session
            .as_ref()
            .and_then(|s| s.endpoint(WellKnownEndpoint::OpenApi).cloned());
        match advertised {
            Some(url) => Ok(url),
            None => Ok(self.endpoint_url().join(&format!("/{}", path::CLOUDAPI))?),
        }
    }

    /// The network (NSX) proxy root.
    pub fn network_endpoint(&self) -> Result<Url> {
        self.endpoint(WellKnownEndpoint::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{BasicCredentials, SignCredentials};
    use crate::model::Link;

    fn session_resource(links: Vec<Link>) -> SessionResource {
        SessionResource {
            href: Some("https://vcd/api/session".into()),
            org: Some("acme".into()),
            user: Some("bob".into()),
            user_id: None,
            link: links,
        }
    }

    #[test]
    fn test_endpoint_map_from_links() {
        let resource = session_resource(vec![
            Link::new("down", "https://vcd/api/admin", Some(media_type::ADMIN_VCLOUD)),
            Link::new("down", "https://vcd/api/query", Some(media_type::QUERY_LIST)),
            Link::new("openapi", "https://vcd/cloudapi", Some(media_type::APPLICATION_JSON)),
        ]);
        let fallback = Url::parse("https://vcd/api/session").unwrap();
        let info = SessionInfo::from_resource(&resource, &fallback).unwrap();

        assert_eq!(
            info.require(WellKnownEndpoint::Admin).unwrap().as_str(),
            "https://vcd/api/admin"
        );
        assert!(info.endpoint(WellKnownEndpoint::QueryList).is_some());
        assert!(info.endpoint(WellKnownEndpoint::OpenApi).is_some());
        match info.require(WellKnownEndpoint::Extension) {
            Err(Error::Link(LinkError::Missing { rel, media_type, .. })) => {
                assert_eq!(rel, "down");
                assert_eq!(media_type.as_deref(), Some(media_type::VMW_EXTENSION));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_header_priority_legacy_token_and_cookies() {
        let mut cookies = BTreeMap::new();
        cookies.insert(VCLOUD_COOKIE_NAME.to_string(), "legacy".to_string());
        cookies.insert(JWT_COOKIE_NAME.to_string(), "jwt-cookie".to_string());
        cookies.insert(SESSION_COOKIE_NAME.to_string(), "sid".to_string());
        let state = AuthState {
            auth_token: Some("tok".into()),
            cookies,
            ..AuthState::default()
        };
        let headers = state.auth_headers().unwrap();
        assert_eq!(headers[VCLOUD_AUTHENTICATION_HEADER], "tok");
        assert_eq!(
            headers[COOKIE],
            "vcloud_jwt=jwt-cookie; vcloud_session_id=sid; vcloud-token=legacy"
        );
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_jwt_beats_legacy_token() {
        let state = AuthState {
            jwt: Some("ey.jwt".into()),
            auth_context: Some("acme".into()),
            auth_token: Some("tok".into()),
            tenant_context: Some("urn:vcloud:org:1".into()),
            ..AuthState::default()
        };
        let headers = state.auth_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer ey.jwt");
        assert_eq!(headers[AUTH_CONTEXT_HEADER], "acme");
        assert_eq!(headers[TENANT_CONTEXT_HEADER], "urn:vcloud:org:1");
        assert!(headers.get(VCLOUD_AUTHENTICATION_HEADER).is_none());
    }

    #[test]
    fn test_sessionless_credentials_win_and_suppress_cookies() {
        let credentials = SignCredentials::bearer("<saml/>", "acme").unwrap();
        let expected = credentials.header_value();
        let mut cookies = BTreeMap::new();
        cookies.insert(VCLOUD_COOKIE_NAME.to_string(), "legacy".to_string());
        let state = AuthState {
            credentials: Some(Arc::new(credentials)),
            jwt: Some("ey.jwt".into()),
            cookies,
            ..AuthState::default()
        };
        let headers = state.auth_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], expected.as_str());
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_session_credentials_are_not_sent_per_request() {
        let state = AuthState {
            credentials: Some(Arc::new(BasicCredentials::new("bob", "acme", "pw"))),
            ..AuthState::default()
        };
        assert!(state.auth_headers().unwrap().is_empty());
    }

    #[test]
    fn test_clear_keeps_credentials() {
        let context = SecurityContext::new();
        context.replace(AuthState {
            credentials: Some(Arc::new(BasicCredentials::new("bob", "acme", "pw"))),
            auth_token: Some("tok".into()),
            jwt: Some("jwt".into()),
            ..AuthState::default()
        });
        let before = context.snapshot();
        context.clear();
        let after = context.snapshot();
        assert!(after.credentials.is_some());
        assert!(after.auth_token.is_none());
        assert!(after.jwt.is_none());
        assert!(before.auth_token.is_some());
    }

    #[test]
    fn test_set_cookie_parsing_keeps_known_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("vcloud-token=abc; Secure; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("other=zzz; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("vcloud_jwt=ey; HttpOnly"));
        let cookies = session_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[VCLOUD_COOKIE_NAME], "abc");
        assert_eq!(cookies[JWT_COOKIE_NAME], "ey");
    }
}
