//! Error types for phylodag.
//!
//! Errors are strongly typed using thiserror and split by who is at fault:
//! structural errors are bugs in the calling model or driver, input errors
//! are malformed model definitions caught at construction time.
//!
//! Numerical infeasibility (a tree outside a process' support, a violated
//! clade constraint, a NaN intermediate) is never an error. It is reported
//! as a log-probability of negative infinity.

use thiserror::Error;

/// Structural errors raised by graph operations.
///
/// These indicate a programming error in the model or the MCMC driver and
/// are never retried.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Adding '{parent}' as a parameter of '{node}' would create a cycle")]
    CycleDetected {
        node: String,
        parent: String,
    },

    #[error("'{parent}' is not a parameter of '{node}'")]
    ParameterNotFound {
        node: String,
        parent: String,
    },

    #[error("'{parent}' is still read by the distribution or function of '{node}'")]
    ParameterInUse {
        node: String,
        parent: String,
    },

    #[error("Parameter '{parent}' of '{node}' must hold a {expected} value")]
    ParameterTypeMismatch {
        node: String,
        parent: String,
        expected: &'static str,
    },

    #[error("Protocol violation on '{node}': {reason}")]
    ProtocolViolation {
        node: String,
        reason: String,
    },

    #[error("Simulation is not supported by {model}")]
    SimulationUnsupported {
        model: String,
    },

    #[error("Simulation failed: {reason}")]
    SimulationFailed {
        reason: String,
    },

    #[error("Node '{node}' is clamped to observed data")]
    ClampedNode {
        node: String,
    },

    #[error("Node '{node}' is constant and has no parameters")]
    ConstantNode {
        node: String,
    },
}

/// Input errors raised while constructing a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    #[error("'{name}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Change times of '{name}' must be strictly increasing and non-negative")]
    UnsortedChangeTimes {
        name: String,
    },

    #[error("Exactly one of origin and root age must be given")]
    StartAgeAmbiguous,

    #[error("Taxon '{taxon}' refers to unknown species '{species}'")]
    UnknownSpecies {
        taxon: String,
        species: String,
    },

    #[error("Malformed record '{record}': {reason}")]
    MalformedState {
        record: String,
        reason: String,
    },

    #[error("Unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownOption {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid tree: {reason}")]
    InvalidTree {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Top-level error type for phylodag.
#[derive(Debug, Error)]
pub enum PhyloError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PhyloError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a structural (graph) error.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Graph(_))
    }

    /// Returns true if this is an input (model construction) error.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for phylodag operations.
pub type PhyloResult<T> = Result<T, PhyloError>;
