use crate::client::VcdClient;
use crate::model::{Task, TaskRecord, TaskStatus};
use crate::query::QueryResultFormat;
use crate::tasks::timing::TaskTimingInfo;
use crate::{Error, Result};
use chrono::SecondsFormat;
use futures::TryStreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TASK_QUERY: &str = "task";

/// Tracks many tasks and resolves once all of them are terminal.
///
/// Register tasks with [`track`](Self::track), then call
/// [`to_tracking_future`](Self::to_tracking_future). Completed tasks are found with one query per
/// poll for tasks that ended at or after a watermark, rather than one request per task.
///
/// # Examples
///
/// ```no_run
/// use vcd_client::{model::Task, VcdClient};
///
/// # async fn example(client: VcdClient, tasks: Vec<Task>) -> Result<(), vcd_client::Error> {
/// let tracker = client.task_monitor().multi_task_tracker();
/// tracker.track(&tasks)?;
/// let statuses = tracker.to_tracking_future()?.await?;
/// for (id, status) in statuses {
///     println!("{id}: {status}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct MultiTaskTracker {
    client: VcdClient,
    shared: Arc<Tracked>,
}

#[derive(Default)]
struct Tracked {
    state: Mutex<TrackedState>,
    timing: TaskTimingInfo,
}

#[derive(Default)]
struct TrackedState {
    sealed: bool,
    /// Tracked task id by href, for records that carry no id.
    ids_by_href: HashMap<String, String>,
    pending: HashMap<String, String>,
    finished: HashMap<String, TaskStatus>,
}

impl TrackedState {
    fn resolve(&self, record: &TaskRecord) -> Option<String> {
        record
            .id
            .as_ref()
            .filter(|id| self.pending.contains_key(*id))
            .cloned()
            .or_else(|| self.ids_by_href.get(&record.href).cloned())
            .filter(|id| self.pending.contains_key(id))
    }
}

impl MultiTaskTracker {
    pub(crate) fn new(client: VcdClient) -> Self {
        Self {
            client,
            shared: Arc::new(Tracked::default()),
        }
    }

    /// Adds tasks to track. Tasks already terminal are recorded as they are.
    ///
    /// # Errors
    ///
    /// [`Error::TrackerSealed`] once the tracking future was created.
    pub fn track<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.sealed {
            return Err(Error::TrackerSealed);
        }

        for task in tasks {
            let id = task.urn().to_string();
            self.shared.timing.update_start(task.start_time);
            state.ids_by_href.insert(task.href.clone(), id.clone());
            if task.status.is_terminal() {
                state.pending.remove(&id);
                state.finished.insert(id, task.status);
            } else {
                state.pending.insert(id.clone(), task.href.clone());
            }
        }
        Ok(())
    }

    /// Seals the tracker and starts polling in the background.
    ///
    /// The returned future resolves to the final status of every tracked task. Cancelling or
    /// dropping it stops the polling; server-side tasks are left alone.
    pub fn to_tracking_future(&self) -> Result<TrackingFuture> {
        {
            let mut state = self.shared.state.lock();
            if state.sealed {
                return Err(Error::TrackerSealed);
            }
            state.sealed = true;
            tracing::debug!(
                pending = state.pending.len(),
                finished = state.finished.len(),
                "Sealed task tracker"
            );
        }

        let cancel = CancellationToken::new();
        let poller = Poller {
            client: self.client.clone(),
            shared: self.shared.clone(),
        };
        let handle = tokio::spawn(poller.run(cancel.clone()));
        Ok(TrackingFuture { handle, cancel })
    }
}

struct Poller {
    client: VcdClient,
    shared: Arc<Tracked>,
}

impl Poller {
    async fn run(self, cancel: CancellationToken) -> Result<HashMap<String, TaskStatus>> {
        let interval = self.client.task_monitor_config().bulk_poll_interval;

        loop {
            if let Some(finished) = self.finished() {
                tracing::info!(tasks = finished.len(), "All tracked tasks finished");
                return Ok(finished);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Task tracking canceled");
                    return Err(Error::TrackingCanceled);
                }
                polled = self.poll() => polled?,
            }

            if self.finished().is_some() {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Task tracking canceled");
                    return Err(Error::TrackingCanceled);
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    fn finished(&self) -> Option<HashMap<String, TaskStatus>> {
        let state = self.shared.state.lock();
        state.pending.is_empty().then(|| state.finished.clone())
    }

    /// One completion query from the current watermark.
    async fn poll(&self) -> Result<()> {
        let mut query = self
            .client
            .query::<TaskRecord>(TASK_QUERY, QueryResultFormat::IdRecords)
            .sort_asc("endDate");
        let watermark = self.shared.timing.end();
        if let Some(watermark) = watermark {
            query = query.filter(format!(
                "endDate=ge={}",
                watermark.to_rfc3339_opts(SecondsFormat::Millis, true)
            ));
        }
        tracing::debug!(watermark = ?watermark, "Polling for completed tasks");

        let mut records = Box::pin(query.stream());
        let mut latest_end = None;
        while let Some(record) = records.try_next().await? {
            if record.end_date.is_some() {
                latest_end = record.end_date;
            }
            if !record.status.is_terminal() {
                continue;
            }
            let mut state = self.shared.state.lock();
            if let Some(id) = state.resolve(&record) {
                tracing::debug!(task = %id, status = %record.status, "Tracked task finished");
                state.pending.remove(&id);
                state.finished.insert(id, record.status);
            }
        }

        if latest_end.is_some() {
            self.shared.timing.update_end(latest_end);
        }
        Ok(())
    }
}

/// Handle to a running bulk tracker.
///
/// Resolves to task id → final status. Dropping the handle cancels the tracking.
pub struct TrackingFuture {
    handle: JoinHandle<Result<HashMap<String, TaskStatus>>>,
    cancel: CancellationToken,
}

impl TrackingFuture {
    /// Stops polling. The future then resolves to [`Error::TrackingCanceled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Future for TrackingFuture {
    type Output = Result<HashMap<String, TaskStatus>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => {
                tracing::error!(error = %e, "Task tracker stopped unexpectedly");
                Poll::Ready(Err(Error::TrackingCanceled))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TrackingFuture {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VcdClient {
        VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .build()
            .unwrap()
    }

    fn task(n: u32, status: TaskStatus) -> Task {
        Task {
            href: format!("https://vcd/api/task/{n}"),
            id: Some(format!("urn:vcloud:task:{n}")),
            name: None,
            operation_name: None,
            status,
            start_time: None,
            end_time: None,
            owner: None,
            error: None,
            link: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_tracking_only_finished_tasks_resolves_without_polling() {
        let tracker = MultiTaskTracker::new(client());
        tracker
            .track(&[task(1, TaskStatus::Success), task(2, TaskStatus::Error)])
            .unwrap();
        let statuses = tracker.to_tracking_future().unwrap().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses["urn:vcloud:task:2"], TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_track_after_seal_is_rejected() {
        let tracker = MultiTaskTracker::new(client());
        let future = tracker.to_tracking_future().unwrap();
        assert!(matches!(
            tracker.track(&[task(1, TaskStatus::Running)]),
            Err(Error::TrackerSealed)
        ));
        assert!(matches!(tracker.to_tracking_future(), Err(Error::TrackerSealed)));
        assert!(future.await.unwrap().is_empty());
    }

    #[test]
    fn test_records_resolve_by_id_or_href() {
        let mut state = TrackedState::default();
        state
            .pending
            .insert("urn:vcloud:task:1".into(), "https://vcd/api/task/1".into());
        state
            .ids_by_href
            .insert("https://vcd/api/task/1".into(), "urn:vcloud:task:1".into());

        let by_href = TaskRecord {
            href: "https://vcd/api/task/1".into(),
            id: None,
            name: None,
            status: TaskStatus::Success,
            start_date: None,
            end_date: None,
        };
        assert_eq!(state.resolve(&by_href).as_deref(), Some("urn:vcloud:task:1"));

        let unknown = TaskRecord {
            id: Some("urn:vcloud:task:9".into()),
            href: "https://vcd/api/task/9".into(),
            ..by_href
        };
        assert_eq!(state.resolve(&unknown), None);
    }
}
