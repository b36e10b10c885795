use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use deadpool_sqlite::{Config as DeadpoolConfig, Object, Pool, PoolConfig, Runtime, Timeouts};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};

use crate::config::DatabaseConfig;
use crate::error::{DbRetryError, Result};
use crate::models::{ExecResult, QueryRow, Rows, Statement, TxOptions, Value};
use crate::pool::{ConnPool, ConnPoolBeginner, TxCommitter};

/// SQLite connection pool
#[derive(Clone)]
pub struct SqlitePool {
    pool: Pool,
}

impl SqlitePool {
    /// Create the pool and verify a connection can be opened
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        tracing::info!(
            "Opening SQLite database at {} (pool size: {})",
            config.path.display(),
            config.pool.max_size
        );

        let mut cfg = DeadpoolConfig::new(config.path.clone());
        cfg.pool = Some(PoolConfig {
            max_size: config.pool.max_size,
            timeouts: Timeouts {
                wait: Some(config.pool_timeout()),
                create: Some(config.pool_create_timeout()),
                recycle: Some(config.pool_recycle_timeout()),
            },
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Runtime::Tokio1)
            .map_err(|e| DbRetryError::PoolCreation(e.to_string()))?;

        let instance = Self { pool };
        instance.ping().await?;
        tracing::info!("SQLite connection established");
        Ok(instance)
    }

    async fn connection(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl ConnPool for SqlitePool {
    async fn prepare(&self, sql: &str) -> Result<Statement> {
        let conn = self.connection().await?;
        prepare_on(&conn, sql).await
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let conn = self.connection().await?;
        exec_on(&conn, sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        let conn = self.connection().await?;
        query_on(&conn, sql, args, None).await
    }

    async fn query_row(&self, sql: &str, args: &[Value]) -> QueryRow {
        let result = match self.connection().await {
            Ok(conn) => query_on(&conn, sql, args, Some(1)).await,
            Err(e) => Err(e),
        };
        QueryRow::new(result.map(Rows::into_first))
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.connection().await?;
        conn.interact(|c| c.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await??;
        Ok(())
    }

    fn as_beginner(&self) -> Option<&dyn ConnPoolBeginner> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl ConnPoolBeginner for SqlitePool {
    async fn begin_tx(&self, opts: &TxOptions) -> Result<Arc<dyn ConnPool>> {
        let conn = self.connection().await?;
        let begin = if opts.read_only {
            "BEGIN DEFERRED; PRAGMA query_only = ON;"
        } else {
            "BEGIN IMMEDIATE"
        };
        conn.interact(move |c| c.execute_batch(begin)).await??;
        Ok(Arc::new(SqliteTx::new(conn, opts.read_only)))
    }
}

/// A transaction pinned to one pooled connection.
///
/// Read-only transactions switch the connection to `query_only` so writes
/// fail with `SQLITE_READONLY`; the flag is cleared when the transaction
/// finishes.
pub struct SqliteTx {
    conn: Option<Object>,
    read_only: bool,
    finished: AtomicBool,
}

impl SqliteTx {
    fn new(conn: Object, read_only: bool) -> Self {
        Self {
            conn: Some(conn),
            read_only,
            finished: AtomicBool::new(false),
        }
    }

    fn conn(&self) -> Result<&Object> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(DbRetryError::TxDone);
        }
        self.conn.as_ref().ok_or(DbRetryError::TxDone)
    }

    async fn finish(&self, sql: &'static str) -> Result<()> {
        let conn = self.conn()?;
        let read_only = self.read_only;
        conn.interact(move |c| {
            c.execute_batch(sql)?;
            if read_only {
                c.execute_batch("PRAGMA query_only = OFF")?;
            }
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ConnPool for SqliteTx {
    async fn prepare(&self, sql: &str) -> Result<Statement> {
        prepare_on(self.conn()?, sql).await
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        exec_on(self.conn()?, sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        query_on(self.conn()?, sql, args, None).await
    }

    async fn query_row(&self, sql: &str, args: &[Value]) -> QueryRow {
        let result = match self.conn() {
            Ok(conn) => query_on(conn, sql, args, Some(1)).await,
            Err(e) => Err(e),
        };
        QueryRow::new(result.map(Rows::into_first))
    }

    fn as_committer(&self) -> Option<&dyn TxCommitter> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl TxCommitter for SqliteTx {
    async fn commit(&self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        // Closing the connection rolls the transaction back and drops any
        // query_only flag; it must not go back to the pool with either set.
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Discarding connection of unfinished transaction");
            drop(Object::take(conn));
        }
    }
}

async fn prepare_on(conn: &Object, sql: &str) -> Result<Statement> {
    let owned = sql.to_string();
    let count = conn
        .interact(move |c| c.prepare(&owned).map(|stmt| stmt.parameter_count()))
        .await??;
    Ok(Statement::new(sql, count))
}

async fn exec_on(conn: &Object, sql: &str, args: &[Value]) -> Result<ExecResult> {
    let sql = sql.to_string();
    let params = to_sql_values(args);
    let result = conn
        .interact(move |c| run_exec(c, &sql, params))
        .await??;
    Ok(result)
}

async fn query_on(conn: &Object, sql: &str, args: &[Value], limit: Option<usize>) -> Result<Rows> {
    let sql = sql.to_string();
    let params = to_sql_values(args);
    let rows = conn
        .interact(move |c| run_query(c, &sql, params, limit))
        .await??;
    Ok(rows)
}

fn run_exec(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> rusqlite::Result<ExecResult> {
    let changed = conn.execute(sql, params_from_iter(params))?;
    Ok(ExecResult {
        rows_affected: changed as u64,
        last_insert_id: conn.last_insert_rowid(),
    })
}

fn run_query(
    conn: &Connection,
    sql: &str,
    params: Vec<SqlValue>,
    limit: Option<usize>,
) -> rusqlite::Result<Rows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(Value::from(row.get::<_, SqlValue>(idx)?));
        }
        out.push(values);
        if limit.is_some_and(|max| out.len() >= max) {
            break;
        }
    }

    Ok(Rows { columns, rows: out })
}

fn to_sql_values(args: &[Value]) -> Vec<SqlValue> {
    args.iter()
        .map(|v| match v {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Real(f) => SqlValue::Real(*f),
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Blob(b) => SqlValue::Blob(b.clone()),
        })
        .collect()
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(f) => Value::Real(f),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Blob(b),
        }
    }
}
