//! Read-only snapshots of a model for monitors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::{DagNode, NodeId};

/// State of one node at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub value: serde_json::Value,
    /// Present for stochastic nodes.
    pub ln_probability: Option<f64>,
    pub clamped: bool,
}

impl NodeSnapshot {
    #[must_use]
    pub fn capture(node: &dyn DagNode) -> Self {
        Self {
            id: node.id(),
            name: node.name().to_string(),
            value: node.value_json(),
            ln_probability: node.is_stochastic().then(|| node.ln_probability()),
            clamped: node.is_clamped(),
        }
    }
}

/// State of a whole model after some generation of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub generation: u64,
    /// Chain index when produced by a multi-chain run.
    pub chain: Option<usize>,
    pub ln_posterior: f64,
    pub nodes: Vec<NodeSnapshot>,
}

impl MonitorSnapshot {
    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Serializes the snapshot as one JSON line. Non-finite numbers are
    /// written as `null`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a node value cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
