//! Wire types for the subset of the vCloud Director JSON schema the client itself consumes.
//!
//! These are deliberately partial: each type captures the fields the session, task and
//! query machinery reads, and keeps everything else in a flattened `extra` map where the
//! round trip matters. Callers with richer schema types can use them directly with the
//! generic verbs on [`VcdClient`](crate::VcdClient).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A typed hyperlink embedded in a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// The relation, e.g. `down`, `remove`, `nextPage`.
    pub rel: String,
    /// Absolute URI of the target.
    pub href: String,
    /// Media type of the target, if the server advertises one.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Link {
    /// Creates a link without a name.
    pub fn new(rel: impl Into<String>, href: impl Into<String>, media_type: Option<&str>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            media_type: media_type.map(str::to_string),
            name: None,
        }
    }
}

/// Resources that carry an `href` and a list of links.
pub trait Linked {
    /// The resource's own URI.
    fn href(&self) -> Option<&str>;

    /// The resource's links.
    fn links(&self) -> &[Link];
}

/// Resources identified by a vCloud URN.
pub trait Identified: Linked {
    fn id(&self) -> Option<&str>;
}

/// A reference to another resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default)]
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.href),
            None => f.write_str(&self.href),
        }
    }
}

/// A generic resource: the common envelope fields plus everything else untyped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Vec<Link>,
    /// Tasks currently running against this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksInProgress>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Linked for Resource {
    fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    fn links(&self) -> &[Link] {
        &self.link
    }
}

impl Identified for Resource {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// The `tasks` element of an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TasksInProgress {
    #[serde(default)]
    pub task: Vec<Task>,
}

/// The session resource returned by `POST /sessions` and `GET /session`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub link: Vec<Link>,
}

impl Linked for SessionResource {
    fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    fn links(&self) -> &[Link] {
        &self.link
    }
}

/// The error envelope returned by the server with a `vnd.vmware.vcloud.error` content type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcdError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub major_error_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor_error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_specific_error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl fmt::Display for VcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (major: {}, minor: {})",
            self.message.as_deref().unwrap_or("<no message>"),
            self.major_error_code,
            self.minor_error_code.as_deref().unwrap_or("-")
        )
    }
}

/// Lifecycle state of a server-side task.
///
/// Progresses `pending → pre-running → running` and ends in one of the four
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    PreRunning,
    Running,
    Success,
    Aborted,
    Error,
    Canceled,
}

impl TaskStatus {
    /// The server's label for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::PreRunning => "pre-running",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Error => "error",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// Returns `true` for `success`, `aborted`, `error` and `canceled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Aborted | TaskStatus::Error | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "pre-running" => Ok(TaskStatus::PreRunning),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "aborted" => Ok(TaskStatus::Aborted),
            "error" => Ok(TaskStatus::Error),
            "canceled" => Ok(TaskStatus::Canceled),
            other => Err(crate::Error::ConfigurationError(format!(
                "Unknown task status: {other}"
            ))),
        }
    }
}

/// A snapshot of a long-running operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub href: String,
    /// URN of the form `urn:vcloud:task:<uuid>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VcdError>,
    #[serde(default)]
    pub link: Vec<Link>,
}

impl Task {
    /// The task's URN, falling back to its href when the server omitted the id.
    pub fn urn(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.href)
    }
}

impl Linked for Task {
    fn href(&self) -> Option<&str> {
        Some(&self.href)
    }

    fn links(&self) -> &[Link] {
        &self.link
    }
}

impl Identified for Task {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// One page of query results.
///
/// `record` also accepts the `reference` array produced by the references format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultContainer<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub link: Vec<Link>,
    #[serde(default = "Vec::new", alias = "reference")]
    pub record: Vec<T>,
}

impl<T> Linked for QueryResultContainer<T> {
    fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    fn links(&self) -> &[Link] {
        &self.link
    }
}

/// A row of the `task` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(default)]
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

/// A row of the `event` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_namespace: Option<String>,
}

/// One entry of the `versions` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
}

/// Response of `GET /versions`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedVersions {
    #[serde(default)]
    pub version_info: Vec<VersionInfo>,
    /// Pre-release version, only listed when the server enables alpha APIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_info_alpha: Option<VersionInfo>,
}

impl SupportedVersions {
    /// Returns the first of `preferred` the server lists, in preference order.
    pub fn negotiate<'a>(&self, preferred: &[&'a str]) -> Option<&'a str> {
        preferred.iter().copied().find(|candidate| {
            self.version_info
                .iter()
                .chain(self.version_info_alpha.iter())
                .any(|v| v.version == *candidate)
        })
    }
}

/// Response of `GET <session>/userInfo`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_status_labels() {
        let status: TaskStatus = serde_json::from_value(json!("pre-running")).unwrap();
        assert_eq!(status, TaskStatus::PreRunning);
        assert_eq!(serde_json::to_value(TaskStatus::Canceled).unwrap(), json!("canceled"));
        assert_eq!("error".parse::<TaskStatus>().unwrap(), TaskStatus::Error);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = [
            TaskStatus::Pending,
            TaskStatus::PreRunning,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Aborted,
            TaskStatus::Error,
            TaskStatus::Canceled,
        ]
        .into_iter()
        .filter(TaskStatus::is_terminal)
        .collect();
        assert_eq!(
            terminal,
            vec![
                TaskStatus::Success,
                TaskStatus::Aborted,
                TaskStatus::Error,
                TaskStatus::Canceled
            ]
        );
    }

    #[test]
    fn test_container_accepts_references() {
        let page: QueryResultContainer<Reference> = serde_json::from_value(json!({
            "total": 1,
            "reference": [{"href": "https://vcd/api/org/1", "name": "one"}]
        }))
        .unwrap();
        assert_eq!(page.record.len(), 1);
        assert_eq!(page.record[0].name.as_deref(), Some("one"));
    }

    #[test]
    fn test_negotiate_prefers_first_supported() {
        let versions = SupportedVersions {
            version_info: vec![
                VersionInfo {
                    version: "35.0".into(),
                    deprecated: false,
                    login_url: None,
                },
                VersionInfo {
                    version: "36.0".into(),
                    deprecated: false,
                    login_url: None,
                },
            ],
            version_info_alpha: Some(VersionInfo {
                version: "37.0.0-alpha".into(),
                deprecated: false,
                login_url: None,
            }),
        };
        assert_eq!(versions.negotiate(&["37.0", "36.0", "35.0"]), Some("36.0"));
        assert_eq!(versions.negotiate(&["37.0.0-alpha", "36.0"]), Some("37.0.0-alpha"));
        assert_eq!(versions.negotiate(&["38.0"]), None);
    }
}
