pub mod config;
pub mod error;
pub mod models;
pub mod plugin;
pub mod pool;
pub mod retry;
pub mod retry_pool;
pub mod session;
pub mod sqlite;

#[cfg(test)]
mod test_support;

pub use crate::config::{Config, RetryConfig};
pub use crate::error::{DbRetryError, Result};
pub use crate::models::{ExecResult, QueryRow, Row, Rows, Statement, TxOptions, Value};
pub use crate::plugin::{Plugin, RetryPlugin};
pub use crate::pool::{ConnPool, ConnPoolBeginner, TxCommitter};
pub use crate::retry::{RetryPolicy, RetryRule, TRANSIENT_SIGNATURES};
pub use crate::retry_pool::RetryConnPool;
pub use crate::session::{Session, Transaction};
pub use crate::sqlite::SqlitePool;
