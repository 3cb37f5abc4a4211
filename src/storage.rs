//! Storage execution contract.

use crate::error::Result;
use crate::sql_compiler::{CompiledQuery, CompiledUpdate};
use crate::Row;
use async_trait::async_trait;
use uuid::Uuid;

/// An open transaction owned by the caller.
///
/// This layer never begins, commits or rolls back; it only threads the scope
/// through to every storage call of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionScope {
    pub id: Uuid,
}

impl TransactionScope {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for TransactionScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes compiled statements. Implementations report transient failures
/// (deadlocks, lost connections) with [`Error::transient`](crate::Error::transient).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows in result order; a single `{count}` row for count queries.
    async fn select(&self, query: &CompiledQuery, trx: Option<&TransactionScope>) -> Result<Vec<Row>>;

    /// Apply an update and return the row as written.
    async fn update(&self, update: &CompiledUpdate, trx: Option<&TransactionScope>) -> Result<Row>;
}
