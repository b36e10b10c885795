use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ExecResult, QueryRow, Rows, Statement, TxOptions, Value};

/// Connection pool operations a session issues against the database
#[async_trait]
pub trait ConnPool: Send + Sync + 'static {
    /// Compile a statement without running it
    async fn prepare(&self, sql: &str) -> Result<Statement>;

    /// Run a statement that returns no rows
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Run a query and collect every row
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows>;

    /// Run a query for at most one row; errors are deferred into the row
    async fn query_row(&self, sql: &str, args: &[Value]) -> QueryRow;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Transaction-begin capability, when the pool has one
    fn as_beginner(&self) -> Option<&dyn ConnPoolBeginner> {
        None
    }

    /// Commit/rollback capability, present on transaction-bound pools
    fn as_committer(&self) -> Option<&dyn TxCommitter> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
pub trait ConnPoolBeginner: Send + Sync {
    /// Start a transaction; the returned pool is bound to it
    async fn begin_tx(&self, opts: &TxOptions) -> Result<Arc<dyn ConnPool>>;
}

#[async_trait]
pub trait TxCommitter: Send + Sync {
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
}
