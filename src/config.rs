//! Runtime configuration for the operator
//!
//! Built by the binary from CLI flags and their environment fallbacks; the
//! library only ever sees the resolved [`OperatorConfig`].

use std::time::Duration;

/// Resolved operator configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace watched and provisioned into
    pub namespace: String,
    /// Shared instance handed to every slice, bypassing capacity accounting.
    /// Bootstrap/testing shortcut only.
    pub fallback_shared_instance: Option<String>,
    /// Slice capacity for shared services that don't declare one
    pub default_capacity: u32,
    /// Deadline for each external call
    pub call_timeout: Duration,
    /// Interval at which every cached resource is re-delivered
    pub resync_period: Duration,
    /// Upper bound on reconciles running at once
    pub max_concurrent_reconciles: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            fallback_shared_instance: None,
            default_capacity: crate::DEFAULT_SLICE_CAPACITY,
            call_timeout: Duration::from_secs(30),
            resync_period: Duration::from_secs(5),
            max_concurrent_reconciles: 16,
        }
    }
}

impl OperatorConfig {
    /// Config for the given namespace with all other values defaulted
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Set the fallback shared instance, ignoring empty values
    pub fn with_fallback_shared_instance(mut self, instance: Option<String>) -> Self {
        self.fallback_shared_instance = instance.filter(|s| !s.is_empty());
        self
    }
}
