//! Error types.
//!
//! [`CircuitError`] covers everything the node store and the node queries can
//! report. Missing ids, cycles and incomplete mappings are invariant
//! violations: callers should abort the current compilation instead of
//! retrying. [`CompileError`] wraps them together with configuration, solver
//! and input errors of the compiler.

use std::io;

use thiserror::Error;

use crate::types::NodeId;

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("node {0} does not exist in the circuit")]
    NodeNotFound(NodeId),

    #[error("variable {0} does not occur in the sub-circuit")]
    VariableNotInCircuit(u32),

    #[error("adding edge {from} -> {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    #[error("node {0} is not an inner node")]
    NotInnerNode(NodeId),

    #[error("sub-circuit of node {0} is not decomposable")]
    NotDecomposable(NodeId),

    #[error("sub-circuit of node {0} is not deterministic")]
    NotDeterministic(NodeId),

    #[error("sub-circuit of node {0} is not smooth")]
    NotSmooth(NodeId),

    #[error("both {0} and -{0} occur in the assumption")]
    ComplementaryLiterals(u32),

    #[error("variable {0} is both assumed and existentially quantified")]
    AssumptionNotDisjoint(u32),

    #[error("node {0} does not support minimum default cardinality")]
    MinimumCardinalityUnsupported(NodeId),

    #[error("variable {var} of node {node} has no image under the mapping")]
    IncompleteMapping { node: NodeId, var: u32 },

    #[error("node {0} cannot be written in the NNF format")]
    NotSerializable(NodeId),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CircuitError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        CircuitError::Parse {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Circuit(#[from] CircuitError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("SAT solver failure: {0}")]
    Solver(String),

    #[error("malformed DIMACS input: {0}")]
    Dimacs(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = CircuitError> = std::result::Result<T, E>;
