//! Async boundary around a frozen [`SearchIndex`].
//!
//! Query execution is CPU-bound and synchronous, so each call runs on the
//! blocking pool. A timed-out query is abandoned: its worker finishes in
//! the background and the result is dropped.

use nestfind_core::Listing;
use nestfind_semantic::{ParsedQuery, SearchIndex, SearchResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Engine(#[from] nestfind_semantic::Error),

    #[error("query worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServiceError {
    /// Whether retrying the same query may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout(_) => true,
            ServiceError::Engine(nestfind_semantic::Error::EmptyQuery) => false,
            ServiceError::Engine(e) => !e.is_configuration_fault(),
            ServiceError::Join(_) => false,
        }
    }
}

/// Cheap to clone; clones share the index.
#[derive(Clone)]
pub struct SearchService {
    index: Arc<SearchIndex>,
    timeout: Duration,
}

impl SearchService {
    pub fn new(index: SearchIndex) -> Self {
        Self::from_shared(Arc::new(index))
    }

    pub fn from_shared(index: Arc<SearchIndex>) -> Self {
        Self {
            index,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        explain: bool,
    ) -> Result<SearchResponse, ServiceError> {
        let query = query.to_string();
        self.run(move |index| index.search(&query, limit, explain).map_err(ServiceError::from))
            .await
    }

    pub async fn parse(&self, query: &str) -> Result<Arc<ParsedQuery>, ServiceError> {
        let query = query.to_string();
        self.run(move |index| Ok(index.parse_query(&query))).await
    }

    pub async fn featured(&self, n: usize) -> Result<Vec<Listing>, ServiceError> {
        self.run(move |index| Ok(index.featured(n).into_iter().cloned().collect()))
            .await
    }

    async fn run<T, F>(&self, job: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&SearchIndex) -> Result<T, ServiceError> + Send + 'static,
    {
        let index = self.index.clone();
        let handle = tokio::task::spawn_blocking(move || job(&index));
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!("Query abandoned after {:?}", self.timeout);
                Err(ServiceError::Timeout(self.timeout))
            }
        }
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("listings", &self.index.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
