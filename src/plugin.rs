use std::sync::Arc;

use crate::config::RetryConfig;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::retry_pool::RetryConnPool;
use crate::session::Session;

pub const RETRY_PLUGIN_NAME: &str = "db_retry";

/// A component registered into a session to extend it without changing
/// call sites
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn initialize(&self, session: &mut Session) -> Result<()>;
}

/// Installs a `RetryConnPool` in front of the session's connection pool
#[derive(Debug, Clone)]
pub struct RetryPlugin {
    policy: Arc<RetryPolicy>,
}

impl RetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_policy(RetryPolicy::from_config(&config))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// Build the plugin from `DB_RETRY_ATTEMPT` / `DB_RETRY_DELAY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(RetryConfig::from_env()?))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Plugin for RetryPlugin {
    fn name(&self) -> &str {
        RETRY_PLUGIN_NAME
    }

    fn initialize(&self, session: &mut Session) -> Result<()> {
        let base = Arc::clone(session.conn_pool());
        if RetryConnPool::is_wrapped(base.as_ref()) {
            tracing::debug!("Connection pool already wrapped for retry, skipping");
            return Ok(());
        }

        let wrapped = RetryConnPool::new(base, Arc::clone(&self.policy));
        session.set_conn_pool(Arc::new(wrapped));
        tracing::info!(
            signatures = self.policy.rules().len(),
            "Installed {} plugin",
            RETRY_PLUGIN_NAME
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedPool;
    use std::time::Duration;

    fn plugin() -> RetryPlugin {
        RetryPlugin::new(RetryConfig {
            attempt: 3,
            delay: Duration::from_millis(10),
        })
    }

    fn layers(session: &Session) -> usize {
        let mut depth = 0;
        let mut pool = Arc::clone(session.conn_pool());
        while let Some(wrapper) = pool.as_any().downcast_ref::<RetryConnPool>() {
            let inner = Arc::clone(wrapper.inner());
            depth += 1;
            pool = inner;
        }
        depth
    }

    #[test]
    fn initialize_wraps_pool_once() {
        let mut session = Session::new(Arc::new(ScriptedPool::new()));
        let plugin = plugin();

        plugin.initialize(&mut session).unwrap();
        plugin.initialize(&mut session).unwrap();

        assert_eq!(layers(&session), 1);
    }

    #[test]
    fn policy_comes_from_config() {
        let plugin = plugin();
        assert_eq!(plugin.name(), "db_retry");
        assert_eq!(plugin.policy().rules().len(), 3);
        assert!(
            plugin
                .policy()
                .rules()
                .iter()
                .all(|r| r.attempts == 3 && r.delay == Duration::from_millis(10))
        );
    }
}
