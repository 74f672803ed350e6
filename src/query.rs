//! Paginated queries against the vCloud query service.
//!
//! A [`Query`] is built from the client, refined with filters, projections and sort order, then
//! either executed into a [`PageIterator`] that walks the `nextPage`/`previousPage` links, or
//! flattened into a record stream.
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use vcd_client::{model::TaskRecord, query::QueryResultFormat, VcdClient};
//!
//! # async fn example(client: VcdClient) -> Result<(), vcd_client::Error> {
//! let running: Vec<TaskRecord> = client
//!     .query::<TaskRecord>("task", QueryResultFormat::Records)
//!     .equality_filter([("status", "running")])
//!     .sort_desc("startDate")
//!     .page_size(50)
//!     .stream()
//!     .try_collect()
//!     .await?;
//! println!("{} tasks running", running.len());
//! # Ok(())
//! # }
//! ```

use crate::client::{query_list_key, VcdClient};
use crate::constants::{media_type, rel};
use crate::error::{LinkError, QueryCardinalityError};
use crate::link::find_link;
use crate::model::{Link, Linked, QueryResultContainer};
use crate::session::WellKnownEndpoint;
use crate::Result;
use futures::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use url::Url;

/// One page of results, with its total count and pagination links.
pub type QueryListPage<T> = QueryResultContainer<T>;

/// Shape of the rows a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryResultFormat {
    /// Records referencing other entities by href.
    Records,
    /// Records referencing other entities by URN.
    IdRecords,
    /// Bare references.
    References,
}

impl QueryResultFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            QueryResultFormat::Records => media_type::RECORDS,
            QueryResultFormat::IdRecords => media_type::ID_RECORDS,
            QueryResultFormat::References => media_type::REFERENCES,
        }
    }

    /// Value of the `format` query parameter.
    pub fn api_string(&self) -> &'static str {
        match self {
            QueryResultFormat::Records => "records",
            QueryResultFormat::IdRecords => "idrecords",
            QueryResultFormat::References => "references",
        }
    }
}

#[derive(Debug, Clone)]
enum Target {
    /// A query type from the query list, e.g. `task`.
    Typed(String),
    /// A path under the API endpoint, e.g. `admin/extension/hostReferences`.
    Packaged(String),
}

/// A query under construction.
///
/// Nothing is sent until [`execute`](Query::execute), [`find_unique`](Query::find_unique) or
/// [`stream`](Query::stream).
pub struct Query<T> {
    client: VcdClient,
    target: Target,
    format: QueryResultFormat,
    page: u32,
    page_size: Option<u32>,
    fields: Vec<String>,
    filter: Option<String>,
    sort_asc: Option<String>,
    sort_desc: Option<String>,
    include_links: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            target: self.target.clone(),
            format: self.format,
            page: self.page,
            page_size: self.page_size,
            fields: self.fields.clone(),
            filter: self.filter.clone(),
            sort_asc: self.sort_asc.clone(),
            sort_desc: self.sort_desc.clone(),
            include_links: self.include_links,
            _record: PhantomData,
        }
    }
}

impl VcdClient {
    /// A query over the query-list type `type_name`.
    pub fn query<T: DeserializeOwned>(&self, type_name: &str, format: QueryResultFormat) -> Query<T> {
        Query::new(self.clone(), Target::Typed(type_name.to_string()), format)
    }

    /// A packaged query at `path` relative to the API endpoint.
    pub fn packaged_query<T: DeserializeOwned>(
        &self,
        path: &str,
        format: QueryResultFormat,
    ) -> Query<T> {
        Query::new(
            self.clone(),
            Target::Packaged(path.trim_start_matches('/').to_string()),
            format,
        )
    }
}

impl<T> Query<T> {
    fn new(client: VcdClient, target: Target, format: QueryResultFormat) -> Self {
        Self {
            client,
            target,
            format,
            page: 1,
            page_size: None,
            fields: Vec::new(),
            filter: None,
            sort_asc: None,
            sort_desc: None,
            include_links: true,
            _record: PhantomData,
        }
    }

    /// The first page to fetch, 1-based.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Restricts the attributes returned per record.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// A raw FIQL filter expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// A conjunction of `name==value` terms.
    pub fn equality_filter<I, K, V>(self, terms: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let filter = terms
            .into_iter()
            .map(|(k, v)| format!("{}=={}", k.as_ref(), v.as_ref()))
            .collect::<Vec<_>>()
            .join(";");
        self.filter(filter)
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort_asc = Some(field.into());
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort_desc = Some(field.into());
        self
    }

    /// Whether records carry their links. On by default.
    pub fn include_links(mut self, include: bool) -> Self {
        self.include_links = include;
        self
    }

    pub fn format(&self) -> QueryResultFormat {
        self.format
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", self.page.to_string())];
        if let Some(page_size) = self.page_size {
            params.push(("pageSize", page_size.to_string()));
        }
        if !self.fields.is_empty() {
            params.push(("fields", self.fields.join(",")));
        }
        if let Some(filter) = &self.filter {
            params.push(("filter", filter.clone()));
        }
        if let Some(field) = &self.sort_asc {
            params.push(("sortAsc", field.clone()));
        }
        if self.include_links {
            params.push(("links", "true".to_string()));
        }
        if let Some(field) = &self.sort_desc {
            params.push(("sortDesc", field.clone()));
        }
        params
    }

    /// The query root before parameters: the query-list href for typed queries.
    async fn base_url(&self) -> Result<Url> {
        match &self.target {
            Target::Packaged(path) => {
                let mut url = self.client.api_url(path)?;
                url.query_pairs_mut()
                    .append_pair("format", self.format.api_string());
                Ok(url)
            }
            Target::Typed(name) => {
                let queries = self.client.query_list_map().await?;
                let key = query_list_key(self.format.media_type(), name);
                match queries.get(&key) {
                    Some(url) => Ok(url.clone()),
                    None => Err(LinkError::Missing {
                        href: self.client.endpoint(WellKnownEndpoint::QueryList)?.to_string(),
                        rel: rel::DOWN.to_string(),
                        media_type: Some(self.format.media_type().to_string()),
                    }
                    .into()),
                }
            }
        }
    }

    async fn url(&self) -> Result<Url> {
        let mut url = self.base_url().await?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in self.params() {
                pairs.append_pair(key, &value);
            }
        }
        Ok(url)
    }
}

impl<T: DeserializeOwned> Query<T> {
    /// Fetches the first page and returns an iterator positioned before it.
    pub async fn execute(&self) -> Result<PageIterator<T>> {
        let url = self.url().await?;
        tracing::debug!(query = %self, url = %url, "Executing query");
        let page = self
            .client
            .get_typed::<QueryResultContainer<T>>(url.as_str(), self.format.media_type())
            .await?
            .data;
        Ok(PageIterator::new(self.client.clone(), self.format, page))
    }

    /// The single record matching this query.
    ///
    /// # Errors
    ///
    /// [`QueryCardinalityError::MissingRecord`] for no match and
    /// [`QueryCardinalityError::MultipleRecords`] for more than one.
    pub async fn find_unique(&self) -> Result<T> {
        let mut pages = self.execute().await?;
        let missing = || QueryCardinalityError::MissingRecord {
            query: self.to_string(),
        };

        let page = pages.next().await?.ok_or_else(missing)?;
        if page.total > 1 || page.record.len() > 1 {
            return Err(QueryCardinalityError::MultipleRecords {
                query: self.to_string(),
            }
            .into());
        }
        page.record
            .into_iter()
            .next()
            .ok_or_else(|| missing().into())
    }

    /// All records of all pages, fetched lazily page by page.
    pub fn stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::once(async move { self.execute().await })
            .map_ok(PageIterator::into_stream)
            .try_flatten()
    }
}

impl<T> fmt::Display for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Typed(name) => write!(
                f,
                "{}query?type={}&format={}",
                self.client.endpoint_url(),
                name,
                self.format.api_string()
            )?,
            Target::Packaged(path) => write!(
                f,
                "{}{}?format={}",
                self.client.endpoint_url(),
                path,
                self.format.api_string()
            )?,
        }
        for (key, value) in self.params() {
            write!(f, "&{key}={value}")?;
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.to_string()).finish()
    }
}

/// Position of a [`PageIterator`]: the links and total of the last fetched page.
struct Cursor {
    href: Option<String>,
    media_type: Option<String>,
    total: u64,
    link: Vec<Link>,
}

impl Linked for Cursor {
    fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    fn links(&self) -> &[Link] {
        &self.link
    }
}

/// Bidirectional iteration over the pages of an executed query.
///
/// The first call to [`next`](PageIterator::next) yields the page fetched by
/// [`Query::execute`]; later calls follow `nextPage` links. Each step past the first is one
/// HTTP request.
pub struct PageIterator<T> {
    client: VcdClient,
    format: QueryResultFormat,
    cursor: Cursor,
    unread: Option<QueryResultContainer<T>>,
}

impl<T: DeserializeOwned> PageIterator<T> {
    fn new(client: VcdClient, format: QueryResultFormat, page: QueryResultContainer<T>) -> Self {
        let mut iterator = Self {
            client,
            format,
            cursor: Cursor {
                href: None,
                media_type: None,
                total: 0,
                link: Vec::new(),
            },
            unread: None,
        };
        iterator.position(&page);
        iterator.unread = Some(page);
        iterator
    }

    fn position(&mut self, page: &QueryResultContainer<T>) {
        self.cursor = Cursor {
            href: page.href.clone(),
            media_type: page.media_type.clone(),
            total: page.total,
            link: page.link.clone(),
        };
    }

    fn page_link(&self, rel: &str) -> Result<Option<String>> {
        Ok(
            find_link(&self.cursor, rel, self.cursor.media_type.as_deref(), false)?
                .map(|link| link.href.clone()),
        )
    }

    /// Total number of records across all pages, as reported by the last page.
    pub fn total(&self) -> u64 {
        self.cursor.total
    }

    /// # Errors
    ///
    /// [`LinkError::Multiple`](crate::LinkError::Multiple) when the page carries more than one
    /// `nextPage` link of its own type.
    pub fn has_next(&self) -> Result<bool> {
        let link = self.page_link(rel::NEXT_PAGE)?;
        Ok((self.unread.is_some() && self.cursor.total > 0) || link.is_some())
    }

    /// # Errors
    ///
    /// [`LinkError::Multiple`](crate::LinkError::Multiple) for more than one `previousPage` link.
    pub fn has_previous(&self) -> Result<bool> {
        let link = self.page_link(rel::PREVIOUS_PAGE)?;
        Ok(self.unread.is_none() && link.is_some())
    }

    /// The next page, or `None` after the last one.
    pub async fn next(&mut self) -> Result<Option<QueryListPage<T>>> {
        if !self.has_next()? {
            return Ok(None);
        }
        if let Some(page) = self.unread.take() {
            return Ok(Some(page));
        }
        match self.page_link(rel::NEXT_PAGE)? {
            Some(href) => self.fetch(&href).await.map(Some),
            None => Ok(None),
        }
    }

    /// The previous page, or `None` on the first one.
    pub async fn previous(&mut self) -> Result<Option<QueryListPage<T>>> {
        if !self.has_previous()? {
            return Ok(None);
        }
        match self.page_link(rel::PREVIOUS_PAGE)? {
            Some(href) => self.fetch(&href).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fetch(&mut self, href: &str) -> Result<QueryListPage<T>> {
        tracing::debug!(href = %href, "Fetching query page");
        let page = self
            .client
            .get_typed::<QueryResultContainer<T>>(href, self.format.media_type())
            .await?
            .data;
        self.position(&page);
        Ok(page)
    }

    /// Flattens the remaining pages into a stream of records.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::try_unfold(
            (self, VecDeque::new()),
            |(mut pages, mut buffer)| async move {
                loop {
                    if let Some(record) = buffer.pop_front() {
                        return Ok::<_, crate::Error>(Some((record, (pages, buffer))));
                    }
                    match pages.next().await? {
                        Some(page) => buffer.extend(page.record),
                        None => return Ok(None),
                    }
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskRecord;

    fn client() -> VcdClient {
        VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_params_order_and_equality_filter() {
        let query = client()
            .query::<TaskRecord>("task", QueryResultFormat::IdRecords)
            .page_size(25)
            .fields(["name", "status"])
            .equality_filter([("status", "running"), ("name", "deploy")])
            .sort_asc("endDate");
        let params: Vec<_> = query.params().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            params,
            vec!["page", "pageSize", "fields", "filter", "sortAsc", "links"]
        );
        assert_eq!(
            query.filter.as_deref(),
            Some("status==running;name==deploy")
        );
    }

    #[test]
    fn test_page_size_omitted_unless_set() {
        let query = client().query::<TaskRecord>("task", QueryResultFormat::Records);
        assert_eq!(
            query.params(),
            vec![("page", "1".to_string()), ("links", "true".to_string())]
        );
    }

    #[test]
    fn test_display_is_query_uri() {
        let query = client()
            .packaged_query::<TaskRecord>("/admin/extension/hostReferences", QueryResultFormat::References)
            .include_links(false);
        assert_eq!(
            query.to_string(),
            "https://vcd.example.com/api/admin/extension/hostReferences?format=references&page=1"
        );

        let typed = client()
            .query::<TaskRecord>("task", QueryResultFormat::Records)
            .filter("status==error");
        assert_eq!(
            typed.to_string(),
            "https://vcd.example.com/api/query?type=task&format=records&page=1&filter=status==error&links=true"
        );
    }

    #[test]
    fn test_format_media_types() {
        assert_eq!(QueryResultFormat::IdRecords.api_string(), "idrecords");
        assert_eq!(
            QueryResultFormat::References.media_type(),
            "application/vnd.vmware.vcloud.query.references+json"
        );
    }

    fn page(total: u64, links: Vec<Link>) -> QueryResultContainer<TaskRecord> {
        QueryResultContainer {
            href: Some("https://vcd/api/query?page=1".into()),
            media_type: Some(media_type::RECORDS.into()),
            name: Some("task".into()),
            page: 1,
            page_size: 25,
            total,
            link: links,
            record: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_single_page_navigation_flags() {
        let mut pages = PageIterator::new(client(), QueryResultFormat::Records, page(3, vec![]));
        assert!(pages.has_next().unwrap());
        assert!(!pages.has_previous().unwrap());
        assert!(pages.next().await.unwrap().is_some());
        assert!(!pages.has_next().unwrap());
        assert!(!pages.has_previous().unwrap());
        assert!(pages.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_result_has_no_pages() {
        let mut pages = PageIterator::new(client(), QueryResultFormat::Records, page(0, vec![]));
        assert!(!pages.has_next().unwrap());
        assert!(pages.next().await.unwrap().is_none());
    }

    #[test]
    fn test_links_must_match_container_type() {
        let pages = PageIterator::new(
            client(),
            QueryResultFormat::Records,
            page(
                50,
                vec![
                    Link::new(rel::NEXT_PAGE, "https://vcd/api/query?page=2", Some(media_type::RECORDS)),
                    Link::new(rel::PREVIOUS_PAGE, "https://vcd/api/query?page=0", Some(media_type::ID_RECORDS)),
                ],
            ),
        );
        assert_eq!(
            pages.page_link(rel::NEXT_PAGE).unwrap().as_deref(),
            Some("https://vcd/api/query?page=2")
        );
        assert_eq!(pages.page_link(rel::PREVIOUS_PAGE).unwrap(), None);
    }

    #[tokio::test]
    async fn test_ambiguous_next_page_is_an_error() {
        let mut pages = PageIterator::new(
            client(),
            QueryResultFormat::Records,
            page(
                50,
                vec![
                    Link::new(rel::NEXT_PAGE, "https://vcd/api/query?page=2", Some(media_type::RECORDS)),
                    Link::new(rel::NEXT_PAGE, "https://vcd/api/query?page=3", Some(media_type::RECORDS)),
                ],
            ),
        );
        assert!(matches!(
            pages.has_next(),
            Err(crate::Error::Link(crate::LinkError::Multiple { ref rel, .. })) if rel == "nextPage"
        ));
        assert!(matches!(
            pages.next().await,
            Err(crate::Error::Link(crate::LinkError::Multiple { .. }))
        ));
    }
}
