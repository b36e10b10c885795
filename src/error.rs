use thiserror::Error;

/// Errors produced by pools, sessions and the retry plugin
#[derive(Error, Debug)]
pub enum DbRetryError {
    /// Error reported by a database driver, message kept verbatim
    #[error("{0}")]
    Driver(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("failed to create connection pool: {0}")]
    PoolCreation(String),

    #[error("connection task failed: {0}")]
    Interact(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("plugin '{0}' is already registered")]
    PluginRegistered(String),

    #[error("record not found")]
    RecordNotFound,

    #[error("transaction has already been committed or rolled back")]
    TxDone,
}

impl DbRetryError {
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }
}

impl From<deadpool_sqlite::PoolError> for DbRetryError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for DbRetryError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        Self::Interact(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbRetryError>;
