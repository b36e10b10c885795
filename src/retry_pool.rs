use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ExecResult, QueryRow, Rows, Statement, TxOptions, Value};
use crate::pool::{ConnPool, ConnPoolBeginner, TxCommitter};
use crate::retry::RetryPolicy;

/// Connection pool wrapper that retries transient failures of the pool it
/// wraps.
///
/// `query_row` is forwarded without retry: its error is deferred into the
/// returned row, so there is nothing to classify when the call returns.
#[derive(Clone)]
pub struct RetryConnPool {
    inner: Arc<dyn ConnPool>,
    policy: Arc<RetryPolicy>,
}

impl RetryConnPool {
    pub fn new(inner: Arc<dyn ConnPool>, policy: Arc<RetryPolicy>) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Arc<dyn ConnPool> {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether `pool` is already a retry wrapper
    pub fn is_wrapped(pool: &dyn ConnPool) -> bool {
        pool.as_any().is::<RetryConnPool>()
    }
}

#[async_trait]
impl ConnPool for RetryConnPool {
    async fn prepare(&self, sql: &str) -> Result<Statement> {
        let first = self.inner.prepare(sql).await;
        self.policy
            .retry("prepare", first, || self.inner.prepare(sql))
            .await
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let first = self.inner.exec(sql, args).await;
        self.policy
            .retry("exec", first, || self.inner.exec(sql, args))
            .await
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        let first = self.inner.query(sql, args).await;
        self.policy
            .retry("query", first, || self.inner.query(sql, args))
            .await
    }

    async fn query_row(&self, sql: &str, args: &[Value]) -> QueryRow {
        self.inner.query_row(sql, args).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    fn as_beginner(&self) -> Option<&dyn ConnPoolBeginner> {
        Some(self)
    }

    fn as_committer(&self) -> Option<&dyn TxCommitter> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl ConnPoolBeginner for RetryConnPool {
    /// Begin on the wrapped pool and wrap the transaction with the same
    /// policy. A pool without transactions yields this wrapper unchanged.
    async fn begin_tx(&self, opts: &TxOptions) -> Result<Arc<dyn ConnPool>> {
        let Some(beginner) = self.inner.as_beginner() else {
            return Ok(Arc::new(self.clone()));
        };
        let first = beginner.begin_tx(opts).await;
        let tx = self
            .policy
            .retry("begin", first, || beginner.begin_tx(opts))
            .await?;
        Ok(Arc::new(Self::new(tx, Arc::clone(&self.policy))))
    }
}

#[async_trait]
impl TxCommitter for RetryConnPool {
    async fn commit(&self) -> Result<()> {
        let Some(committer) = self.inner.as_committer() else {
            return Ok(());
        };
        let first = committer.commit().await;
        self.policy
            .retry("commit", first, || committer.commit())
            .await
    }

    async fn rollback(&self) -> Result<()> {
        let Some(committer) = self.inner.as_committer() else {
            return Ok(());
        };
        let first = committer.rollback().await;
        self.policy
            .retry("rollback", first, || committer.rollback())
            .await
    }
}
