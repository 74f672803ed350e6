//! Header names, cookie names, link relations and media types used on the wire.

/// Response header carrying the legacy session authentication token.
pub const VCLOUD_AUTHENTICATION_HEADER: &str = "x-vcloud-authorization";

/// Response header carrying a JWT access token issued at login.
pub const ACCESS_TOKEN_HEADER: &str = "x-vmware-vcloud-access-token";

/// Request header selecting the organization a JWT acts in.
pub const AUTH_CONTEXT_HEADER: &str = "x-vmware-vcloud-auth-context";

/// Request header selecting the tenant an operation is scoped to.
pub const TENANT_CONTEXT_HEADER: &str = "x-vmware-vcloud-tenant-context";

/// Request header with a client-generated id, random per call.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-vmware-vcloud-client-request-id";

/// Response header with the server-side id used to correlate errors.
pub const REQUEST_ID_HEADER: &str = "x-vmware-vcloud-request-id";

/// Legacy session cookie.
pub const VCLOUD_COOKIE_NAME: &str = "vcloud-token";

/// JWT cookie.
pub const JWT_COOKIE_NAME: &str = "vcloud_jwt";

/// Session id cookie.
pub const SESSION_COOKIE_NAME: &str = "vcloud_session_id";

/// Content type sent on requests that carry no explicit type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/*+json";

/// Paths relative to the API endpoint.
pub mod path {
    /// Session creation (`POST`).
    pub const SESSIONS: &str = "sessions";
    /// Current session (`GET`/`DELETE`).
    pub const SESSION: &str = "session";
    /// Supported versions listing.
    pub const VERSIONS: &str = "versions";
    /// Unauthenticated health check.
    pub const SERVER_STATUS: &str = "server_status";
    /// Root of the OpenAPI surface when the session does not advertise one.
    pub const CLOUDAPI: &str = "cloudapi";
    /// OpenAPI session creation for tenant principals.
    pub const OPENAPI_SESSIONS: &str = "1.0.0/sessions";
    /// OpenAPI session creation for provider principals.
    pub const OPENAPI_PROVIDER_SESSIONS: &str = "1.0.0/sessions/provider";
}

/// Link relations.
pub mod rel {
    pub const DOWN: &str = "down";
    pub const ALTERNATE: &str = "alternate";
    pub const REMOVE: &str = "remove";
    pub const NEXT_PAGE: &str = "nextPage";
    pub const PREVIOUS_PAGE: &str = "previousPage";
    pub const ENTITY_RESOLVER: &str = "entityResolver";
    pub const API_EXTENSIBILITY: &str = "down:extensibility";
    pub const OPENAPI: &str = "openapi";
    pub const NSX: &str = "nsx";
}

/// Media types.
pub mod media_type {
    pub const ENTITY: &str = "application/vnd.vmware.vcloud.entity+json";
    pub const ORGANIZATION: &str = "application/vnd.vmware.vcloud.org+json";
    pub const ORGANIZATION_LIST: &str = "application/vnd.vmware.vcloud.orgList+json";
    pub const QUERY_LIST: &str = "application/vnd.vmware.vcloud.query.queryList+json";
    pub const ADMIN_VCLOUD: &str = "application/vnd.vmware.admin.vcloud+json";
    pub const ADMIN_ORGANIZATION: &str = "application/vnd.vmware.admin.organization+json";
    pub const API_EXTENSIBILITY: &str = "application/vnd.vmware.vcloud.apiextensibility+json";
    pub const VMW_EXTENSION: &str = "application/vnd.vmware.admin.vmwextension+json";
    pub const SYSTEM_SETTINGS: &str = "application/vnd.vmware.admin.systemSettings+json";
    pub const AMQP_SETTINGS: &str = "application/vnd.vmware.admin.amqpSettings+json";
    pub const SESSION: &str = "application/vnd.vmware.vcloud.session+json";
    pub const TASK: &str = "application/vnd.vmware.vcloud.task+json";
    pub const RECORDS: &str = "application/vnd.vmware.vcloud.query.records+json";
    pub const ID_RECORDS: &str = "application/vnd.vmware.vcloud.query.idrecords+json";
    pub const REFERENCES: &str = "application/vnd.vmware.vcloud.query.references+json";
    pub const APPLICATION_JSON: &str = "application/json";
    pub const APPLICATION_XML: &str = "application/xml";
    /// Prefix shared by the XML and JSON renditions of the error envelope.
    pub const ERROR: &str = "application/vnd.vmware.vcloud.error";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_XML: &str = "text/xml";
}
