use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use db_retry::{Config, RetryPlugin, Session, SqlitePool, Value};

/// Run a statement against a SQLite database with transient-error retry
#[derive(Parser, Debug)]
#[command(name = "db-retry", version)]
struct Cli {
    /// Database file
    #[arg(long, short, env = "DB_PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a statement and print the affected row count
    Exec { sql: String, args: Vec<String> },
    /// Run a query and print the rows as JSON
    Query { sql: String, args: Vec<String> },
    /// Check that the database is reachable
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, results to stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    let pool = SqlitePool::open(&config.database).await?;
    let mut session = Session::new(Arc::new(pool));
    session.use_plugin(RetryPlugin::new(config.retry))?;

    match cli.command {
        Command::Exec { sql, args } => {
            let args = parse_args(&args);
            let result = session.exec(&sql, &args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Query { sql, args } => {
            let args = parse_args(&args);
            let rows = session.query(&sql, &args).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Ping => {
            session.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}

fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|a| Value::parse_arg(a)).collect()
}
