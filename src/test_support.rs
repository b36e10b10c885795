//! Scripted connection pool shared by the unit tests
use async_trait::async_trait;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::{DbRetryError, Result};
use crate::models::{ExecResult, QueryRow, Row, Rows, Statement, TxOptions, Value};
use crate::pool::{ConnPool, ConnPoolBeginner, TxCommitter};

#[derive(Default)]
struct Script {
    // None succeeds, Some(message) fails with that message
    outcomes: VecDeque<Option<String>>,
    calls: HashMap<&'static str, u32>,
}

/// Pool whose calls consume a shared queue of outcomes. Once the queue is
/// empty every call succeeds.
#[derive(Clone, Default)]
pub struct ScriptedPool {
    script: Arc<Mutex<Script>>,
    transactional: bool,
    in_tx: bool,
}

impl ScriptedPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool that can begin transactions
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            ..Self::default()
        }
    }

    pub fn fail_times(&self, message: &str, times: usize) -> &Self {
        let mut script = self.script.lock().unwrap();
        for i in 0..times {
            script.outcomes.push_back(Some(format!("{message} [{i}]")));
        }
        self
    }

    pub fn succeed(&self) -> &Self {
        self.script.lock().unwrap().outcomes.push_back(None);
        self
    }

    pub fn calls(&self, operation: &str) -> u32 {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().outcomes.len()
    }

    fn next(&self, operation: &'static str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        *script.calls.entry(operation).or_default() += 1;
        match script.outcomes.pop_front().flatten() {
            Some(message) => Err(DbRetryError::Driver(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConnPool for ScriptedPool {
    async fn prepare(&self, sql: &str) -> Result<Statement> {
        self.next("prepare")?;
        Ok(Statement::new(sql, sql.matches('?').count()))
    }

    async fn exec(&self, _sql: &str, _args: &[Value]) -> Result<ExecResult> {
        self.next("exec")?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: 1,
        })
    }

    async fn query(&self, _sql: &str, _args: &[Value]) -> Result<Rows> {
        self.next("query")?;
        Ok(Rows {
            columns: vec!["n".to_string()],
            rows: vec![vec![Value::Integer(1)]],
        })
    }

    async fn query_row(&self, _sql: &str, _args: &[Value]) -> QueryRow {
        QueryRow::new(self.next("query_row").map(|_| {
            Some(Row {
                columns: vec!["n".to_string()],
                values: vec![Value::Integer(1)],
            })
        }))
    }

    async fn ping(&self) -> Result<()> {
        self.next("ping")
    }

    fn as_beginner(&self) -> Option<&dyn ConnPoolBeginner> {
        if self.transactional && !self.in_tx {
            Some(self)
        } else {
            None
        }
    }

    fn as_committer(&self) -> Option<&dyn TxCommitter> {
        if self.in_tx { Some(self) } else { None }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl ConnPoolBeginner for ScriptedPool {
    async fn begin_tx(&self, _opts: &TxOptions) -> Result<Arc<dyn ConnPool>> {
        self.next("begin")?;
        Ok(Arc::new(Self {
            script: Arc::clone(&self.script),
            transactional: self.transactional,
            in_tx: true,
        }))
    }
}

#[async_trait]
impl TxCommitter for ScriptedPool {
    async fn commit(&self) -> Result<()> {
        self.next("commit")
    }

    async fn rollback(&self) -> Result<()> {
        self.next("rollback")
    }
}
