//! # vcd-client - a session-aware vCloud Director REST client
//!
//! `vcd-client` is an async client for the vCloud Director REST API built on top of `reqwest`.
//! It manages the login session, retries once after an authorization failure with a fresh
//! login, normalizes server failures into typed errors, waits for long-running tasks and walks
//! paginated queries.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vcd_client::{credentials::BasicCredentials, model::Resource, VcdClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vcd_client::Error> {
//!     let client = VcdClient::builder()
//!         .endpoint("https://vcd.example.com/api")?
//!         .api_version("36.0")?
//!         .timeout(Duration::from_secs(60))
//!         .build()?;
//!
//!     client.login(BasicCredentials::new("admin", "System", "secret")).await?;
//!
//!     // Well-known endpoints come from the session's links
//!     let admin = client.admin().await?;
//!     println!("Admin root {:?} in {:?}", admin.href, admin.latency);
//!
//!     // Long-running operations return tasks
//!     let vapp: Resource = client.get("https://vcd.example.com/api/vApp/vapp-1").await?.data;
//!     let task = client.remove(&vapp, Some(true), None).await?;
//!     client.task_monitor().wait_for(&task).await?;
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Sessions** - Basic, bearer, SAML and multisite credentials, JWT and session-token import,
//!   a security context shared between clients
//! - **Retry with re-authentication** - `401`/`403` is retried once; a `401` logs in again first
//! - **Typed errors** - Server error envelopes, request ids and raw bodies on every failure
//! - **Response metadata** - Status, headers, latency, attempts, links and task hrefs per call
//! - **Tasks** - Single-task waits and a bulk tracker resolving to every task's final status
//! - **Queries** - Filters, projections, sorting, a bidirectional page iterator and a stream
//! - **References** - Stale hrefs are repaired through the entity resolver
//! - **Network proxy** - Raw XML calls to the NSX proxy over the same session
//! - **Logging** - Structured `tracing` events for requests, responses, retries and sessions
//!
//! ## Error Handling
//!
//! Server failures keep the parsed envelope and the correlation id:
//!
//! ```no_run
//! use vcd_client::{Error, VcdClient};
//!
//! # async fn example(client: VcdClient) -> Result<(), Error> {
//! match client.extension().await {
//!     Ok(extension) => println!("Extension: {:?}", extension.href),
//!     Err(Error::Link(missing)) => eprintln!("Not a system administrator: {}", missing),
//!     Err(Error::Server { status, request_id, vcd_error, .. }) => {
//!         eprintln!("HTTP {} (request {:?}): {:?}", status, request_id, vcd_error);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Queries
//!
//! ```no_run
//! use vcd_client::{model::TaskRecord, query::QueryResultFormat, VcdClient};
//!
//! # async fn example(client: VcdClient) -> Result<(), vcd_client::Error> {
//! let mut pages = client
//!     .query::<TaskRecord>("task", QueryResultFormat::IdRecords)
//!     .equality_filter([("status", "error")])
//!     .page_size(100)
//!     .execute()
//!     .await?;
//!
//! while let Some(page) = pages.next().await? {
//!     for task in page.record {
//!         println!("{:?} failed", task.name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
pub mod credentials;
mod error;
pub mod events;
pub mod link;
pub mod metadata;
pub mod model;
pub mod network;
mod multisite;
pub mod notification;
pub mod openapi;
pub mod query;
mod response;
pub mod retry;
pub mod session;
pub mod tasks;
pub mod transport;
mod version;

pub use client::{ClientBuilder, VcdClient};
pub use error::{Error, LinkError, QueryCardinalityError, Result, SessionError, TaskError};
pub use response::Response;
pub use retry::{ErrorClassifier, RetryPolicy};
pub use session::{SecurityContext, SessionToken, WellKnownEndpoint};
pub use version::ApiVersion;
