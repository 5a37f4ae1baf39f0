//! Type-safe identifiers and classifications for circuit nodes.
//!
//! Variables are plain 1-indexed `u32` values and literals are signed `i32`
//! values in DIMACS convention (`-3` is the negation of variable `3`).
//! Nodes are referenced by [`NodeId`], which is only meaningful inside the
//! [`Circuit`][crate::circuit::Circuit] that created it.

use std::fmt;

/// Unique identifier for a node inside one circuit.
///
/// Identifiers are handed out by a per-circuit monotonic counter, so a node id
/// is never reused while the circuit is alive.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new node id from a raw value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the index for array access.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

/// The kind of a circuit node, without its payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeKind {
    Constant,
    Literal,
    And,
    Or,
    Mapping,
    TwoCnf,
    Horn,
}

impl NodeKind {
    /// Returns true for kinds that own children.
    pub fn is_inner(self) -> bool {
        matches!(self, NodeKind::And | NodeKind::Or | NodeKind::Mapping)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Constant => "constant",
            NodeKind::Literal => "literal",
            NodeKind::And => "and",
            NodeKind::Or => "or",
            NodeKind::Mapping => "mapping",
            NodeKind::TwoCnf => "2-cnf",
            NodeKind::Horn => "horn",
        };
        write!(f, "{}", name)
    }
}

/// Language classification of a circuit, derived from the root's flags.
///
/// | decomposable | deterministic | smooth | type |
/// |---|---|---|---|
/// | no | - | no | `Nnf` |
/// | no | - | yes | `SNnf` |
/// | yes | no | no | `Bdmc` |
/// | yes | no | yes | `SBdmc` |
/// | yes | yes | no | `DBdmc` |
/// | yes | yes | yes | `SdBdmc` |
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CircuitType {
    Nnf,
    SNnf,
    Bdmc,
    SBdmc,
    DBdmc,
    SdBdmc,
}

impl CircuitType {
    pub fn classify(decomposable: bool, deterministic: bool, smooth: bool) -> Self {
        match (decomposable, deterministic, smooth) {
            (false, _, false) => CircuitType::Nnf,
            (false, _, true) => CircuitType::SNnf,
            (true, false, false) => CircuitType::Bdmc,
            (true, false, true) => CircuitType::SBdmc,
            (true, true, false) => CircuitType::DBdmc,
            (true, true, true) => CircuitType::SdBdmc,
        }
    }
}

impl fmt::Display for CircuitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitType::Nnf => "NNF",
            CircuitType::SNnf => "S-NNF",
            CircuitType::Bdmc => "BDMC",
            CircuitType::SBdmc => "S-BDMC",
            CircuitType::DBdmc => "D-BDMC",
            CircuitType::SdBdmc => "SD-BDMC",
        };
        write!(f, "{}", name)
    }
}

/// Returns the variable of a DIMACS literal.
#[inline]
pub fn var_of(lit: i32) -> u32 {
    lit.unsigned_abs()
}

/// Builds a DIMACS literal from a variable and a polarity.
#[inline]
pub fn lit_of(var: u32, polarity: bool) -> i32 {
    if polarity {
        var as i32
    } else {
        -(var as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let a = NodeId::new(3);
        let b = NodeId::from(4usize);
        assert_eq!(a.raw(), 3);
        assert_eq!(b.index(), 4);
        assert!(a < b);
        assert_eq!(a.to_string(), "n3");
    }

    #[test]
    fn test_classify() {
        assert_eq!(CircuitType::classify(false, true, false), CircuitType::Nnf);
        assert_eq!(CircuitType::classify(false, false, true), CircuitType::SNnf);
        assert_eq!(CircuitType::classify(true, false, false), CircuitType::Bdmc);
        assert_eq!(CircuitType::classify(true, false, true), CircuitType::SBdmc);
        assert_eq!(CircuitType::classify(true, true, false), CircuitType::DBdmc);
        assert_eq!(CircuitType::classify(true, true, true), CircuitType::SdBdmc);
        assert_eq!(CircuitType::SdBdmc.to_string(), "SD-BDMC");
    }

    #[test]
    fn test_literals() {
        assert_eq!(var_of(-7), 7);
        assert_eq!(var_of(7), 7);
        assert_eq!(lit_of(5, true), 5);
        assert_eq!(lit_of(5, false), -5);
    }
}
