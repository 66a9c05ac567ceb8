use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

mod memory;
pub mod query;

pub use memory::InMemoryLiveQuery;
pub use query::{Filter, Query};

/// One full evaluation of a watched query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub data: Vec<Value>,
}

impl ResultSet {
    pub fn new(data: Vec<Value>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveQueryError {
    #[error("live query on {collection} failed: {reason}")]
    Failed { collection: String, reason: String },
    #[error("live query service unavailable: {0}")]
    Unavailable(String),
}

/// A live result stream. It yields a complete result set whenever the
/// underlying collection changes; dropping it unsubscribes.
pub type ResultStream = BoxStream<'static, Result<ResultSet, LiveQueryError>>;

#[async_trait]
pub trait LiveQueryService: Send + Sync {
    async fn watch(&self, collection: &str, query: Query) -> Result<ResultStream, LiveQueryError>;
}

pub struct MissingLiveQueryService;

#[async_trait]
impl LiveQueryService for MissingLiveQueryService {
    async fn watch(&self, collection: &str, _query: Query) -> Result<ResultStream, LiveQueryError> {
        Err(LiveQueryError::Unavailable(format!(
            "no backend configured for collection {collection}"
        )))
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod query_tests;

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod memory_tests;
