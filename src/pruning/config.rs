//! Dependency-graph configuration.

use serde::{Deserialize, Serialize};

use super::error::DepGraphError;
use super::node::OpType;
use crate::nn::LayerRole;

/// What to do when a chain walk meets a node with several consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPolicy {
    /// Fail with [`DepGraphError::UnsupportedBranching`].
    #[default]
    Reject,
    /// Follow the first forward edge and log a warning.
    FirstSuccessor,
}

/// Kind given to ownerless operations that are neither activations nor
/// reshapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerlessFallback {
    /// Treat them as reshapes.
    #[default]
    Flatten,
    /// Keep them as a distinct functional kind.
    Functional,
}

impl OwnerlessFallback {
    /// Operation kind this fallback assigns.
    #[must_use]
    pub fn op_type(self) -> OpType {
        match self {
            OwnerlessFallback::Flatten => OpType::Flatten,
            OwnerlessFallback::Functional => OpType::Functional,
        }
    }
}

fn default_tracked_roles() -> Vec<LayerRole> {
    vec![
        LayerRole::Convolution,
        LayerRole::FullyConnected,
        LayerRole::Normalization,
        LayerRole::Activation,
    ]
}

/// Options for building a [`DependencyGraph`](super::DependencyGraph).
///
/// # Example
///
/// ```
/// use aprender_depgraph::pruning::{BranchPolicy, GraphConfig};
///
/// let config = GraphConfig::from_json(r#"{ "branch_policy": "first_successor" }"#).unwrap();
/// assert_eq!(config.branch_policy, BranchPolicy::FirstSuccessor);
/// assert_eq!(config.tracked_roles.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Layer roles that get a forward hook.
    pub tracked_roles: Vec<LayerRole>,
    /// Behavior on fan-out.
    pub branch_policy: BranchPolicy,
    /// Kind of ownerless non-activation operations.
    pub ownerless_fallback: OwnerlessFallback,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            tracked_roles: default_tracked_roles(),
            branch_policy: BranchPolicy::default(),
            ownerless_fallback: OwnerlessFallback::default(),
        }
    }
}

impl GraphConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, DepGraphError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DepGraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), DepGraphError> {
        if self.tracked_roles.contains(&LayerRole::Container) {
            return Err(DepGraphError::Config(
                "containers produce no operations and cannot be tracked".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the tracked layer roles.
    #[must_use]
    pub fn with_tracked_roles(mut self, roles: impl IntoIterator<Item = LayerRole>) -> Self {
        self.tracked_roles = roles.into_iter().collect();
        self
    }

    /// Set the branch policy.
    #[must_use]
    pub fn with_branch_policy(mut self, policy: BranchPolicy) -> Self {
        self.branch_policy = policy;
        self
    }

    /// Set the ownerless fallback kind.
    #[must_use]
    pub fn with_ownerless_fallback(mut self, fallback: OwnerlessFallback) -> Self {
        self.ownerless_fallback = fallback;
        self
    }

    /// Whether layers with `role` get a hook.
    #[must_use]
    pub fn tracks(&self, role: LayerRole) -> bool {
        self.tracked_roles.contains(&role)
    }
}
