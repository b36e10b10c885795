use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{DbRetryError, Result};

/// Error message fragments that mark a failure as transient
pub const TRANSIENT_SIGNATURES: [&str; 3] = [
    "connection reset by peer",
    "write: broken pipe",
    "connection refused",
];

/// One row of the retry table: a message signature and how to retry it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRule {
    pub signature: String,
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryRule {
    pub fn new(signature: impl Into<String>, attempts: u32, delay: Duration) -> Self {
        Self {
            signature: signature.into(),
            attempts,
            delay,
        }
    }
}

/// Ordered retry table. The first rule whose signature occurs in an error
/// message decides how that error is retried.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    rules: Vec<RetryRule>,
}

impl RetryPolicy {
    pub fn new(rules: Vec<RetryRule>) -> Self {
        Self { rules }
    }

    /// The fixed transient signature table, each row using the configured
    /// attempt count and delay
    pub fn from_config(config: &RetryConfig) -> Self {
        let rules = TRANSIENT_SIGNATURES
            .iter()
            .map(|sig| RetryRule::new(*sig, config.attempt, config.delay))
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[RetryRule] {
        &self.rules
    }

    pub fn classify(&self, err: &DbRetryError) -> Option<&RetryRule> {
        let message = err.to_string();
        self.rules
            .iter()
            .find(|rule| message.contains(rule.signature.as_str()))
    }

    /// Retry `op` after a failed first attempt.
    ///
    /// `first` is the outcome of the attempt the caller already made. A
    /// success or an unrecognised error is handed back untouched. A transient
    /// error triggers up to `attempts` further calls, sleeping `delay` before
    /// each, and the last outcome is returned.
    pub async fn retry<T, F, Fut>(&self, operation: &str, first: Result<T>, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let err = match first {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(rule) = self.classify(&err) else {
            return Err(err);
        };

        let mut last_err = err;
        for attempt in 1..=rule.attempts {
            tracing::warn!(
                operation,
                attempt,
                max_attempts = rule.attempts,
                signature = %rule.signature,
                error = %last_err,
                "Retrying the execution"
            );
            tokio::time::sleep(rule.delay).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}
