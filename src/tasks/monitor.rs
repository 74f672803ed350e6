use crate::client::VcdClient;
use crate::constants::media_type;
use crate::error::TaskError;
use crate::model::{Resource, Task, TaskStatus};
use crate::tasks::MultiTaskTracker;
use crate::{Error, Result};
use std::time::Duration;

/// Polling settings for [`TaskMonitor`] and [`MultiTaskTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMonitorConfig {
    /// Interval between re-fetches of a single task.
    pub poll_interval: Duration,
    /// Interval between completion queries of the bulk tracker.
    pub bulk_poll_interval: Duration,
}

impl Default for TaskMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            bulk_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Waits for server-side tasks to finish.
///
/// # Examples
///
/// ```no_run
/// use vcd_client::{model::Resource, VcdClient};
///
/// # async fn example(client: VcdClient, vapp: Resource) -> Result<(), vcd_client::Error> {
/// let task = client.remove(&vapp, Some(true), None).await?;
/// let finished = client.task_monitor().wait_for(&task).await?;
/// println!("{} finished at {:?}", finished.urn(), finished.end_time);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskMonitor {
    client: VcdClient,
}

impl TaskMonitor {
    pub(crate) fn new(client: VcdClient) -> Self {
        Self { client }
    }

    /// Polls `task` until it is terminal.
    ///
    /// # Errors
    ///
    /// [`Error::Task`] when it ends in `error` or `aborted`, [`Error::TaskCanceled`] when it
    /// ends in `canceled`.
    pub async fn wait_for(&self, task: &Task) -> Result<Task> {
        let mut current = task.clone();
        let interval = self.client.task_monitor_config().poll_interval;

        while !current.status.is_terminal() {
            tracing::debug!(
                task = current.urn(),
                status = %current.status,
                "Waiting for task"
            );
            tokio::time::sleep(interval).await;
            current = self.fetch(&current.href).await?;
        }

        tracing::info!(task = current.urn(), status = %current.status, "Task finished");
        outcome(current)
    }

    /// Fetches the task at `href` and waits for it, e.g. from [`Response::task_href`].
    ///
    /// [`Response::task_href`]: crate::Response::task_href
    pub async fn wait_for_href(&self, href: &str) -> Result<Task> {
        let task = self.fetch(href).await?;
        self.wait_for(&task).await
    }

    /// Like [`wait_for`](Self::wait_for), failing with [`Error::TaskTimeout`] after `timeout`.
    pub async fn wait_for_with_timeout(&self, task: &Task, timeout: Duration) -> Result<Task> {
        match tokio::time::timeout(timeout, self.wait_for(task)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(task = task.urn(), timeout = ?timeout, "Gave up waiting for task");
                Err(Error::TaskTimeout {
                    task: task.urn().to_string(),
                    timeout,
                })
            }
        }
    }

    /// A tracker for many tasks at once.
    pub fn multi_task_tracker(&self) -> MultiTaskTracker {
        MultiTaskTracker::new(self.client.clone())
    }

    async fn fetch(&self, href: &str) -> Result<Task> {
        Ok(self.client.get_typed::<Task>(href, media_type::TASK).await?.data)
    }
}

/// The task running against `entity`, if there is exactly one.
pub fn task_from_entity(entity: &Resource) -> Option<&Task> {
    match entity.tasks.as_ref().map(|t| t.task.as_slice()) {
        Some([task]) => Some(task),
        _ => None,
    }
}

fn outcome(task: Task) -> Result<Task> {
    match task.status {
        TaskStatus::Error | TaskStatus::Aborted => Err(TaskError {
            task: task.urn().to_string(),
            status: task.status,
            owner: task.owner,
            error: task.error,
        }
        .into()),
        TaskStatus::Canceled => Err(Error::TaskCanceled {
            task: task.urn().to_string(),
            owner: task.owner,
        }),
        _ => Ok(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TasksInProgress, VcdError};

    fn task(status: TaskStatus) -> Task {
        Task {
            href: "https://vcd/api/task/1".into(),
            id: Some("urn:vcloud:task:1".into()),
            name: Some("task".into()),
            operation_name: Some("vappDeploy".into()),
            status,
            start_time: None,
            end_time: None,
            owner: None,
            error: Some(VcdError {
                message: Some("out of capacity".into()),
                major_error_code: 500,
                ..Default::default()
            }),
            link: Vec::new(),
        }
    }

    #[test]
    fn test_outcome_by_status() {
        assert!(outcome(task(TaskStatus::Success)).is_ok());
        match outcome(task(TaskStatus::Error)) {
            Err(Error::Task(e)) => {
                assert_eq!(e.status, TaskStatus::Error);
                assert_eq!(e.task, "urn:vcloud:task:1");
                assert_eq!(
                    e.error.and_then(|e| e.message).as_deref(),
                    Some("out of capacity")
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(outcome(task(TaskStatus::Aborted)), Err(Error::Task(_))));
        assert!(matches!(
            outcome(task(TaskStatus::Canceled)),
            Err(Error::TaskCanceled { .. })
        ));
    }

    #[test]
    fn test_task_from_entity() {
        let mut entity = Resource::default();
        assert!(task_from_entity(&entity).is_none());
        entity.tasks = Some(TasksInProgress {
            task: vec![task(TaskStatus::Running)],
        });
        assert_eq!(
            task_from_entity(&entity).map(|t| t.status),
            Some(TaskStatus::Running)
        );
    }
}
