//! Lookups over the `event` query.

use crate::client::VcdClient;
use crate::error::QueryCardinalityError;
use crate::model::EventRecord;
use crate::query::{Query, QueryResultFormat};
use crate::Result;

const EVENT_QUERY: &str = "event";

/// Reads audit events of the logged-in principal's scope.
#[derive(Clone)]
pub struct EventViewer {
    client: VcdClient,
}

impl VcdClient {
    pub fn event_viewer(&self) -> EventViewer {
        EventViewer {
            client: self.clone(),
        }
    }
}

impl EventViewer {
    fn query(&self) -> Query<EventRecord> {
        self.client
            .query::<EventRecord>(EVENT_QUERY, QueryResultFormat::Records)
    }

    /// The one event of `event_type` recorded for the entity at `entity_href`.
    ///
    /// # Errors
    ///
    /// [`QueryCardinalityError`] unless exactly one such event exists.
    pub async fn single_event(&self, event_type: &str, entity_href: &str) -> Result<EventRecord> {
        self.query()
            .equality_filter([("eventType", event_type), ("entity", entity_href)])
            .find_unique()
            .await
    }

    /// The most recent event of `event_type`.
    pub async fn latest_event(&self, event_type: &str) -> Result<EventRecord> {
        let query = self
            .query()
            .equality_filter([("eventType", event_type)])
            .sort_desc("timeStamp");
        let mut pages = query.execute().await?;
        let latest = match pages.next().await? {
            Some(page) => page.record.into_iter().next(),
            None => None,
        };
        latest.ok_or_else(|| {
            QueryCardinalityError::MissingRecord {
                query: query.to_string(),
            }
            .into()
        })
    }
}
