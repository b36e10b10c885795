use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DbRetryError, Result};
use crate::models::{ExecResult, QueryRow, Rows, Statement, TxOptions, Value};
use crate::plugin::Plugin;
use crate::pool::ConnPool;

/// Database session: the current connection pool plus registered plugins.
///
/// Plugins may replace the pool during initialization; every query issued
/// afterwards goes through the replacement.
pub struct Session {
    pool: Arc<dyn ConnPool>,
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl Session {
    pub fn new(pool: Arc<dyn ConnPool>) -> Self {
        Self {
            pool,
            plugins: HashMap::new(),
        }
    }

    pub fn conn_pool(&self) -> &Arc<dyn ConnPool> {
        &self.pool
    }

    pub fn set_conn_pool(&mut self, pool: Arc<dyn ConnPool>) {
        self.pool = pool;
    }

    /// Register and initialize a plugin. Names are unique per session.
    pub fn use_plugin<P: Plugin + 'static>(&mut self, plugin: P) -> Result<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(DbRetryError::PluginRegistered(name));
        }
        plugin.initialize(self)?;
        tracing::debug!("Registered plugin {}", name);
        self.plugins.insert(name, Arc::new(plugin));
        Ok(())
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name).map(|p| p.as_ref())
    }

    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        self.pool.prepare(sql).await
    }

    pub async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.pool.exec(sql, args).await
    }

    pub async fn exec_prepared(&self, stmt: &Statement, args: &[Value]) -> Result<ExecResult> {
        self.pool.exec(stmt.sql(), args).await
    }

    pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        self.pool.query(sql, args).await
    }

    pub async fn query_row(&self, sql: &str, args: &[Value]) -> QueryRow {
        self.pool.query_row(sql, args).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Begin a transaction. Without transaction support the returned handle
    /// runs on the session pool and commit/rollback are no-ops.
    pub async fn begin(&self, opts: TxOptions) -> Result<Transaction> {
        let pool = match self.pool.as_beginner() {
            Some(beginner) => beginner.begin_tx(&opts).await?,
            None => Arc::clone(&self.pool),
        };
        Ok(Transaction::new(pool))
    }

    /// Run `f` inside a transaction: commit when it returns `Ok`, roll back
    /// and return its error otherwise.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let tx = self.begin(TxOptions::default()).await?;
        let outcome = f(&tx).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed after {}: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Pool bound to an open transaction
pub struct Transaction {
    pool: Arc<dyn ConnPool>,
    finished: bool,
}

impl Transaction {
    fn new(pool: Arc<dyn ConnPool>) -> Self {
        Self {
            pool,
            finished: false,
        }
    }

    pub async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.pool.exec(sql, args).await
    }

    pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        self.pool.query(sql, args).await
    }

    pub async fn query_row(&self, sql: &str, args: &[Value]) -> QueryRow {
        self.pool.query_row(sql, args).await
    }

    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        match self.pool.as_committer() {
            Some(committer) => committer.commit().await,
            None => Ok(()),
        }
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        match self.pool.as_committer() {
            Some(committer) => committer.rollback().await,
            None => Ok(()),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Transaction dropped without commit or rollback");
        }
    }
}
