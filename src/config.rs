//! Orchestrator configuration.

/// Configuration for an orchestrator run
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrchestratorConfig {
    /// Maximum number of payloads buffered between producers and consumers
    pub buffer_size: usize,
    /// Maximum number of producers executing at the same time
    pub max_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            max_concurrency: 1,
        }
    }
}

impl OrchestratorConfig {
    /// Create a config with the given buffer size and concurrency cap
    pub fn new(buffer_size: usize, max_concurrency: usize) -> Self {
        Self {
            buffer_size,
            max_concurrency,
        }
    }

    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the maximum concurrency
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Whether payloads are handed over directly instead of buffered.
    /// A `buffer_size` of zero means every `send` waits for a `receive`.
    pub fn is_unbuffered(&self) -> bool {
        self.buffer_size == 0
    }

    /// Capacity of the underlying channel. An unbuffered orchestrator still
    /// needs one slot to park the payload being handed over.
    pub(crate) fn channel_capacity(&self) -> usize {
        self.buffer_size.max(1)
    }

    /// Admission gate capacity. Zero is raised to one.
    pub(crate) fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::default()
            .buffer_size(16)
            .max_concurrency(4);
        assert_eq!(config, OrchestratorConfig::new(16, 4));
    }

    #[test]
    fn test_zero_values() {
        let config = OrchestratorConfig::new(0, 0);
        assert!(config.is_unbuffered());
        assert_eq!(config.channel_capacity(), 1);
        assert_eq!(config.effective_max_concurrency(), 1);

        let config = OrchestratorConfig::new(8, 3);
        assert!(!config.is_unbuffered());
        assert_eq!(config.channel_capacity(), 8);
        assert_eq!(config.effective_max_concurrency(), 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_deserialize_partial() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{ "max_concurrency": 8 }"#).unwrap();
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.max_concurrency, 8);
    }
}
