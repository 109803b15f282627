use std::time::Duration;
use tokio::runtime::Handle;

/// Bridge configuration
///
/// Selects the execution context for blocking work and the context-acquisition policy.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum number of units of work running on blocking workers at once
    pub max_concurrency: usize,

    /// How long a subscription may wait for a free worker before failing
    pub acquire_timeout: Duration,

    /// Runtime whose blocking pool runs the work (defaults to the subscriber's runtime)
    pub runtime: Option<Handle>,

    /// Reuse one persistence context for every unit of work instead of one per call
    pub shared_context: bool,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self {
            max_concurrency: 10,
            acquire_timeout: Duration::from_secs(30),
            runtime: None,
            shared_context: false,
        }
    }

    /// Set the maximum number of concurrently running units of work
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the worker acquisition timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Run blocking work on the given runtime
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Serialize all units of work through a single shared context
    pub fn shared_context(mut self, shared: bool) -> Self {
        self.shared_context = shared;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be > 0".to_string());
        }

        if self.acquire_timeout.is_zero() {
            return Err("acquire_timeout must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert!(config.runtime.is_none());
        assert!(!config.shared_context);
    }

    #[test]
    fn test_builder_pattern() {
        let config = BridgeConfig::new()
            .max_concurrency(2)
            .acquire_timeout(Duration::from_millis(250))
            .shared_context(true);

        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert!(config.shared_context);
    }

    #[test]
    fn test_validate() {
        assert!(BridgeConfig::new().validate().is_ok());
        assert!(BridgeConfig::new().max_concurrency(0).validate().is_err());
        assert!(
            BridgeConfig::new()
                .acquire_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_runtime_handle() {
        let config = BridgeConfig::new().runtime(Handle::current());
        assert!(config.runtime.is_some());
    }
}
