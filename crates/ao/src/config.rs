//! Runtime configuration for active objects.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration applied when an active object spawns its worker.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConfig {
    /// Name of the object, also used as the worker thread name.
    pub name: String,
    /// Worker stack size in bytes; platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self {
            name: "active".to_string(),
            stack_size: None,
        }
    }
}

impl ActiveConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ActiveConfigBuilder {
        ActiveConfigBuilder::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::builder().name(name).build()
    }
}

/// Builder for [`ActiveConfig`].
#[derive(Debug, Clone, Default)]
pub struct ActiveConfigBuilder {
    config: ActiveConfig,
}

impl ActiveConfigBuilder {
    /// Sets the object and worker thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the worker stack size in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    pub fn build(self) -> ActiveConfig {
        self.config
    }
}
