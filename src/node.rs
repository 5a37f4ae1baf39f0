//! Circuit node representation.
//!
//! # Node Types
//!
//! A circuit node is one of:
//! - **Constant**: ⊤ or ⊥
//! - **Literal**: a variable or its negation
//! - **And** / **Or**: inner nodes over an arbitrary set of children; an OR
//!   node may carry the decision variable it branches on
//! - **Mapping**: a single child seen through a variable renaming, used to
//!   reuse a cached sub-circuit under different variable names
//! - **TwoCnf** / **Horn**: tractable residual formulas kept as leaves
//!
//! Besides its payload every node carries derived data maintained by the
//! [`Circuit`][crate::circuit::Circuit]: size, variable and literal sets, the
//! local and in-circuit structural flags, its parents, and per-query result
//! caches.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use num_bigint::BigUint;

use crate::leaf::{HornFormula, TwoCnfFormula};
use crate::types::{lit_of, var_of, NodeId, NodeKind};

/// Renaming between the variables of a Mapping node's child ("local") and the
/// variables the Mapping node exposes ("global").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableMapping {
    local_to_global: BTreeMap<u32, u32>,
    global_to_local: BTreeMap<u32, u32>,
}

impl VariableMapping {
    /// Builds the mapping from its local-to-global direction.
    ///
    /// Returns `None` if the mapping is not injective.
    pub fn new(local_to_global: BTreeMap<u32, u32>) -> Option<Self> {
        let global_to_local: BTreeMap<u32, u32> = local_to_global.iter().map(|(&l, &g)| (g, l)).collect();
        if global_to_local.len() != local_to_global.len() {
            return None;
        }
        Some(Self {
            local_to_global,
            global_to_local,
        })
    }

    pub fn local_to_global(&self) -> &BTreeMap<u32, u32> {
        &self.local_to_global
    }

    pub fn global_to_local(&self) -> &BTreeMap<u32, u32> {
        &self.global_to_local
    }

    pub fn is_identity(&self) -> bool {
        self.local_to_global.iter().all(|(l, g)| l == g)
    }

    pub fn to_global(&self, lit: i32) -> Option<i32> {
        translate(lit, &self.local_to_global)
    }

    pub fn to_local(&self, lit: i32) -> Option<i32> {
        translate(lit, &self.global_to_local)
    }
}

fn translate(lit: i32, map: &BTreeMap<u32, u32>) -> Option<i32> {
    map.get(&var_of(lit)).map(|&var| lit_of(var, lit > 0))
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Constant(bool),
    Literal(i32),
    And,
    Or { decision: Option<u32> },
    Mapping(VariableMapping),
    TwoCnf(TwoCnfFormula),
    Horn(HornFormula),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Constant(_) => NodeKind::Constant,
            NodeData::Literal(_) => NodeKind::Literal,
            NodeData::And => NodeKind::And,
            NodeData::Or { .. } => NodeKind::Or,
            NodeData::Mapping(_) => NodeKind::Mapping,
            NodeData::TwoCnf(_) => NodeKind::TwoCnf,
            NodeData::Horn(_) => NodeKind::Horn,
        }
    }
}

/// Structural flags of a node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Properties {
    pub decomposable: bool,
    pub deterministic: bool,
    pub smooth: bool,
}

impl Properties {
    pub const ALL: Properties = Properties {
        decomposable: true,
        deterministic: true,
        smooth: true,
    };

    pub fn and(self, other: Properties) -> Properties {
        Properties {
            decomposable: self.decomposable && other.decomposable,
            deterministic: self.deterministic && other.deterministic,
            smooth: self.smooth && other.smooth,
        }
    }
}

/// Memoised query results, keyed by the canonical restriction string.
#[derive(Debug, Default, Clone)]
pub(crate) struct QueryCaches {
    pub satisfiable: HashMap<String, bool>,
    pub model_count: HashMap<String, BigUint>,
    pub min_cardinality: HashMap<String, f64>,
}

impl QueryCaches {
    pub fn clear(&mut self) {
        self.satisfiable.clear();
        self.model_count.clear();
        self.min_cardinality.clear();
    }
}

/// A node of a circuit together with its derived data.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) data: NodeData,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parents: BTreeSet<NodeId>,
    pub(crate) size: u64,
    pub(crate) variables: BTreeSet<u32>,
    pub(crate) literals: BTreeSet<i32>,
    /// Literals every model of the node satisfies syntactically
    /// (the node itself or a conjunct of it).
    pub(crate) conjuncts: BTreeSet<i32>,
    pub(crate) local: Properties,
    pub(crate) in_circuit: Properties,
    pub(crate) caches: RefCell<QueryCaches>,
}

impl Node {
    pub(crate) fn new(id: NodeId, data: NodeData, children: Vec<NodeId>) -> Self {
        Self {
            id,
            data,
            children,
            parents: BTreeSet::new(),
            size: 0,
            variables: BTreeSet::new(),
            literals: BTreeSet::new(),
            conjuncts: BTreeSet::new(),
            local: Properties::ALL,
            in_circuit: Properties::ALL,
            caches: RefCell::new(QueryCaches::default()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn is_inner(&self) -> bool {
        self.kind().is_inner()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parents(&self) -> &BTreeSet<NodeId> {
        &self.parents
    }

    /// Edge count of the sub-circuit plus leaf sizes, counted as a tree.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn variables(&self) -> &BTreeSet<u32> {
        &self.variables
    }

    pub fn literals(&self) -> &BTreeSet<i32> {
        &self.literals
    }

    pub fn decision_variable(&self) -> Option<u32> {
        match self.data {
            NodeData::Or { decision } => decision,
            _ => None,
        }
    }

    pub fn is_decomposable(&self) -> bool {
        self.local.decomposable
    }

    pub fn is_deterministic(&self) -> bool {
        self.local.deterministic
    }

    pub fn is_smooth(&self) -> bool {
        self.local.smooth
    }

    pub fn decomposable_in_circuit(&self) -> bool {
        self.in_circuit.decomposable
    }

    pub fn deterministic_in_circuit(&self) -> bool {
        self.in_circuit.deterministic
    }

    pub fn smoothness_in_circuit(&self) -> bool {
        self.in_circuit.smooth
    }

    pub(crate) fn clear_caches(&self) {
        self.caches.borrow_mut().clear();
    }
}

/// Structural signature used for hash-consing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum UniqueKey {
    Constant(bool),
    Literal(i32),
    And(Vec<NodeId>),
    Or(Vec<NodeId>, Option<u32>),
    Mapping(NodeId, Vec<(u32, u32)>),
}

impl UniqueKey {
    pub fn of(data: &NodeData, children: &[NodeId]) -> Option<Self> {
        let sorted = || {
            let mut ids = children.to_vec();
            ids.sort();
            ids
        };
        match data {
            NodeData::Constant(value) => Some(UniqueKey::Constant(*value)),
            NodeData::Literal(lit) => Some(UniqueKey::Literal(*lit)),
            NodeData::And => Some(UniqueKey::And(sorted())),
            NodeData::Or { decision } => Some(UniqueKey::Or(sorted(), *decision)),
            NodeData::Mapping(mapping) => Some(UniqueKey::Mapping(
                children[0],
                mapping.local_to_global().iter().map(|(&l, &g)| (l, g)).collect(),
            )),
            NodeData::TwoCnf(_) | NodeData::Horn(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_translation() {
        let mapping = VariableMapping::new(BTreeMap::from([(1, 5), (2, 7)])).unwrap();
        assert_eq!(mapping.to_global(-1), Some(-5));
        assert_eq!(mapping.to_global(2), Some(7));
        assert_eq!(mapping.to_local(-7), Some(-2));
        assert_eq!(mapping.to_local(3), None);
        assert!(!mapping.is_identity());
    }

    #[test]
    fn test_mapping_not_injective() {
        assert!(VariableMapping::new(BTreeMap::from([(1, 5), (2, 5)])).is_none());
    }

    #[test]
    fn test_unique_key_ignores_child_order() {
        let a = UniqueKey::of(&NodeData::And, &[NodeId::new(3), NodeId::new(1)]);
        let b = UniqueKey::of(&NodeData::And, &[NodeId::new(1), NodeId::new(3)]);
        assert_eq!(a, b);
        let c = UniqueKey::of(&NodeData::Or { decision: None }, &[NodeId::new(1), NodeId::new(3)]);
        assert_ne!(a, c);
    }
}
