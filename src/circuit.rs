//! The circuit node store.
//!
//! A [`Circuit`] owns every node of one compiled circuit. All nodes are created
//! through its factory methods, which hash-cons structurally identical nodes,
//! maintain parent back-references, and keep the derived per-node data
//! (size, variables, local and in-circuit properties) up to date under
//! mutation.
//!
//! # Examples
//!
//! ```
//! use dnnf_rs::circuit::Circuit;
//! use num_bigint::BigUint;
//!
//! let mut circuit = Circuit::new();
//! let x2 = circuit.create_literal(2);
//! let x3 = circuit.create_literal(3);
//! // (x1 ∧ x2) ∨ (¬x1 ∧ x3)
//! let root = circuit.create_decision_node(1, x2, x3).unwrap();
//! circuit.set_root(root).unwrap();
//! circuit.smooth();
//!
//! let root = circuit.root().unwrap();
//! assert_eq!(circuit.model_counting(root, &[], true).unwrap(), BigUint::from(4u32));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use log::debug;

use crate::error::{CircuitError, Result};
use crate::leaf::{condition, most_occurring, split_components, HornFormula, TwoCnfFormula};
use crate::node::{Node, NodeData, Properties, UniqueKey, VariableMapping};
use crate::types::{lit_of, var_of, CircuitType, NodeId, NodeKind};

#[derive(Debug, Clone)]
pub struct Circuit {
    nodes: Vec<Node>,
    unique_table: HashMap<UniqueKey, NodeId>,
    unique_nodes: bool,
    root: Option<NodeId>,
    circuit_type: Option<CircuitType>,
    size: u64,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            unique_table: HashMap::new(),
            unique_nodes: true,
            root: None,
            circuit_type: None,
            size: 0,
        }
    }

    /// Enables or disables hash-consing of newly created nodes.
    pub fn set_unique_nodes(&mut self, enabled: bool) {
        self.unique_nodes = enabled;
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.index()).ok_or(CircuitError::NodeNotFound(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.children.len()).sum()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Classification of the sub-circuit below the root.
    pub fn circuit_type(&self) -> Option<CircuitType> {
        self.circuit_type
    }

    /// Size of the sub-circuit below the root.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_decomposable(&self) -> bool {
        self.root_node().map_or(true, Node::decomposable_in_circuit)
    }

    pub fn is_deterministic(&self) -> bool {
        self.root_node().map_or(true, Node::deterministic_in_circuit)
    }

    pub fn is_smooth(&self) -> bool {
        self.root_node().map_or(true, Node::smoothness_in_circuit)
    }

    pub fn number_of_variables(&self) -> usize {
        self.root_node().map_or(0, |node| node.variables.len())
    }

    fn root_node(&self) -> Option<&Node> {
        self.root.and_then(|id| self.nodes.get(id.index()))
    }

    pub fn set_root(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.root = Some(id);
        self.refresh_root();
        Ok(())
    }

    fn refresh_root(&mut self) {
        if let Some(node) = self.root_node() {
            let props = node.in_circuit;
            let size = node.size;
            self.circuit_type = Some(CircuitType::classify(props.decomposable, props.deterministic, props.smooth));
            self.size = size;
        }
    }

    // ─── Factory ───

    pub fn create_constant(&mut self, value: bool) -> NodeId {
        self.insert(NodeData::Constant(value), Vec::new())
    }

    pub fn create_literal(&mut self, literal: i32) -> NodeId {
        assert_ne!(literal, 0, "Literal 0 is not allowed");
        self.insert(NodeData::Literal(literal), Vec::new())
    }

    /// Creates an AND node; the empty conjunction is the constant true.
    pub fn create_and(&mut self, children: impl IntoIterator<Item = NodeId>) -> Result<NodeId> {
        let children = self.collect_children(children)?;
        if children.is_empty() {
            return Ok(self.create_constant(true));
        }
        Ok(self.insert(NodeData::And, children))
    }

    /// Creates an OR node; the empty disjunction is the constant false.
    ///
    /// A decision variable must occur below one of the children.
    pub fn create_or(&mut self, children: impl IntoIterator<Item = NodeId>, decision: Option<u32>) -> Result<NodeId> {
        let children = self.collect_children(children)?;
        if children.is_empty() {
            return Ok(self.create_constant(false));
        }
        if let Some(var) = decision {
            if !children.iter().any(|&c| self.nodes[c.index()].variables.contains(&var)) {
                return Err(CircuitError::VariableNotInCircuit(var));
            }
        }
        Ok(self.insert(NodeData::Or { decision }, children))
    }

    /// Creates the decision node `(x ∧ high) ∨ (¬x ∧ low)` for `x = var`.
    pub fn create_decision_node(&mut self, var: u32, high: NodeId, low: NodeId) -> Result<NodeId> {
        let pos = self.create_literal(var as i32);
        let neg = self.create_literal(-(var as i32));
        let high = self.create_and([high, pos])?;
        let low = self.create_and([low, neg])?;
        self.create_or([high, low], Some(var))
    }

    /// Creates a Mapping node exposing `child` under the renaming `mapping`.
    ///
    /// Every variable of the child must have an image. An identity mapping
    /// returns the child itself.
    pub fn create_mapping(&mut self, child: NodeId, mapping: VariableMapping) -> Result<NodeId> {
        let node = self.node(child)?;
        if let Some(&var) = node.variables.iter().find(|v| !mapping.local_to_global().contains_key(v)) {
            return Err(CircuitError::IncompleteMapping { node: child, var });
        }
        if node.variables.iter().all(|v| mapping.local_to_global().get(v) == Some(v)) {
            return Ok(child);
        }
        Ok(self.insert(NodeData::Mapping(mapping), vec![child]))
    }

    pub fn create_two_cnf(&mut self, formula: TwoCnfFormula) -> NodeId {
        if formula.is_empty() {
            return self.create_constant(true);
        }
        self.insert(NodeData::TwoCnf(formula), Vec::new())
    }

    pub fn create_horn(&mut self, formula: HornFormula) -> NodeId {
        if formula.is_empty() {
            return self.create_constant(true);
        }
        self.insert(NodeData::Horn(formula), Vec::new())
    }

    fn collect_children(&self, children: impl IntoIterator<Item = NodeId>) -> Result<Vec<NodeId>> {
        let children: BTreeSet<NodeId> = children.into_iter().collect();
        for &child in &children {
            self.node(child)?;
        }
        Ok(children.into_iter().collect())
    }

    fn insert(&mut self, data: NodeData, children: Vec<NodeId>) -> NodeId {
        let key = UniqueKey::of(&data, &children);
        if self.unique_nodes {
            if let Some(&id) = key.as_ref().and_then(|k| self.unique_table.get(k)) {
                return id;
            }
        }

        let id = NodeId::from(self.nodes.len());
        for &child in &children {
            self.nodes[child.index()].parents.insert(id);
        }
        debug!("new node {} ({}) with {} children", id, data.kind(), children.len());
        self.nodes.push(Node::new(id, data, children));
        if let Some(key) = key {
            self.unique_table.entry(key).or_insert(id);
        }
        self.update_node(id);
        id
    }

    // ─── Mutation ───

    /// Adds the edge `from -> to`.
    ///
    /// On failure the circuit is left unchanged.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let source = self.node(from)?;
        self.node(to)?;
        if !matches!(source.kind(), NodeKind::And | NodeKind::Or) {
            return Err(CircuitError::NotInnerNode(from));
        }
        if source.children.contains(&to) {
            return Ok(());
        }
        if from == to || self.dominated_nodes(to)?.contains(&from) {
            return Err(CircuitError::CycleDetected { from, to });
        }

        let mut children = self.nodes[from.index()].children.clone();
        children.push(to);
        self.replace_children(from, children);
        self.nodes[to.index()].parents.insert(from);
        self.update_upwards(from);
        self.refresh_root();
        Ok(())
    }

    fn replace_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        let node = &self.nodes[id.index()];
        if let Some(old) = UniqueKey::of(&node.data, &node.children) {
            if self.unique_table.get(&old) == Some(&id) {
                self.unique_table.remove(&old);
            }
        }
        if let Some(new) = UniqueKey::of(&node.data, &children) {
            self.unique_table.entry(new).or_insert(id);
        }
        self.nodes[id.index()].children = children;
    }

    /// Recomputes `id` and all of its ancestors, children first.
    fn update_upwards(&mut self, id: NodeId) {
        let mut affected = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for &parent in &self.nodes[current.index()].parents {
                if affected.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        for current in self.bottom_up(&affected) {
            self.update_node(current);
        }
    }

    /// Orders `subset` so that children come before their parents, processing
    /// a node only once all of its children inside the subset are done.
    fn bottom_up(&self, subset: &BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut pending: HashMap<NodeId, usize> = subset
            .iter()
            .map(|&id| {
                let count = self.nodes[id.index()].children.iter().filter(|c| subset.contains(c)).count();
                (id, count)
            })
            .collect();
        let mut frontier: VecDeque<NodeId> = subset.iter().copied().filter(|id| pending[id] == 0).collect();

        let mut order = Vec::with_capacity(subset.len());
        while let Some(id) = frontier.pop_front() {
            order.push(id);
            for &parent in &self.nodes[id.index()].parents {
                if let Some(count) = pending.get_mut(&parent) {
                    *count -= 1;
                    if *count == 0 {
                        frontier.push_back(parent);
                    }
                }
            }
        }
        order
    }

    fn recompute_all(&mut self) {
        let all: BTreeSet<NodeId> = (0..self.nodes.len()).map(NodeId::from).collect();
        for id in self.bottom_up(&all) {
            self.update_node(id);
        }
        self.refresh_root();
    }

    /// Recomputes the derived data of a single node from its children.
    fn update_node(&mut self, id: NodeId) {
        let node = &self.nodes[id.index()];
        let children: Vec<&Node> = node.children.iter().map(|c| &self.nodes[c.index()]).collect();

        let mut size: u64;
        let mut variables = BTreeSet::new();
        let mut literals = BTreeSet::new();
        let mut conjuncts = BTreeSet::new();
        let mut local = Properties::ALL;

        match &node.data {
            NodeData::Constant(_) => size = 1,
            NodeData::Literal(lit) => {
                size = 1;
                variables.insert(var_of(*lit));
                literals.insert(*lit);
                conjuncts.insert(*lit);
            }
            NodeData::And | NodeData::Or { .. } => {
                size = children.len() as u64;
                let mut total_vars = 0;
                for child in &children {
                    size = size.saturating_add(child.size);
                    total_vars += child.variables.len();
                    variables.extend(child.variables.iter().copied());
                    literals.extend(child.literals.iter().copied());
                }
                if matches!(node.data, NodeData::And) {
                    local.decomposable = total_vars == variables.len();
                    for child in &children {
                        conjuncts.extend(child.conjuncts.iter().copied());
                    }
                } else {
                    let alive: Vec<&&Node> = children
                        .iter()
                        .filter(|c| !matches!(c.data, NodeData::Constant(false)))
                        .collect();
                    local.deterministic = alive.iter().enumerate().all(|(i, a)| {
                        alive[i + 1..]
                            .iter()
                            .all(|b| a.conjuncts.iter().any(|lit| b.conjuncts.contains(&-lit)))
                    });
                    local.smooth = children.iter().all(|c| c.variables == variables);
                    if let Some((first, rest)) = alive.split_first() {
                        conjuncts = first.conjuncts.clone();
                        for child in rest {
                            conjuncts.retain(|lit| child.conjuncts.contains(lit));
                        }
                    }
                }
            }
            NodeData::Mapping(mapping) => {
                let child = children[0];
                size = child.size.saturating_add(1);
                variables = child.variables.iter().filter_map(|&v| mapping.local_to_global().get(&v).copied()).collect();
                literals = child.literals.iter().filter_map(|&l| mapping.to_global(l)).collect();
                conjuncts = child.conjuncts.iter().filter_map(|&l| mapping.to_global(l)).collect();
            }
            NodeData::TwoCnf(formula) => {
                size = formula.clauses().iter().map(|c| c.len() as u64).sum();
                variables = formula.variables().clone();
                literals = formula.clauses().iter().flatten().copied().collect();
            }
            NodeData::Horn(formula) => {
                let original = formula.original_clauses();
                size = original.iter().map(|c| c.len() as u64).sum();
                variables = formula.variables().clone();
                literals = original.into_iter().flatten().collect();
            }
        }

        let in_circuit = children.iter().fold(local, |acc, child| acc.and(child.in_circuit));

        let node = &mut self.nodes[id.index()];
        node.size = size;
        node.variables = variables;
        node.literals = literals;
        node.conjuncts = conjuncts;
        node.local = local;
        node.in_circuit = in_circuit;
        node.clear_caches();
    }

    /// Makes every OR node smooth.
    ///
    /// Each child of a non-smooth OR node that misses variables of its
    /// siblings is conjoined with `(v ∨ ¬v)` for every missing `v`.
    pub fn smooth(&mut self) {
        let targets: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|node| matches!(node.data, NodeData::Or { .. }) && !node.local.smooth)
            .map(|node| node.id)
            .collect();
        if targets.is_empty() {
            return;
        }
        debug!("smoothing {} OR nodes", targets.len());

        let mut gadgets: HashMap<u32, NodeId> = HashMap::new();
        for id in targets {
            let variables = self.nodes[id.index()].variables.clone();
            let old_children = self.nodes[id.index()].children.clone();
            let mut children = Vec::with_capacity(old_children.len());
            for child in old_children {
                let missing: Vec<u32> = variables
                    .difference(&self.nodes[child.index()].variables)
                    .copied()
                    .collect();
                if missing.is_empty() {
                    children.push(child);
                    continue;
                }
                let mut parts: Vec<NodeId> = match self.nodes[child.index()].data {
                    NodeData::And => self.nodes[child.index()].children.clone(),
                    _ => vec![child],
                };
                for var in missing {
                    parts.push(self.gadget(var, &mut gadgets));
                }
                children.push(self.insert(NodeData::And, dedup(parts)));
            }

            let children = dedup(children);
            for &child in &children {
                self.nodes[child.index()].parents.insert(id);
            }
            for old in self.nodes[id.index()].children.clone() {
                if !children.contains(&old) {
                    self.nodes[old.index()].parents.remove(&id);
                }
            }
            self.replace_children(id, children);
        }

        self.recompute_all();
    }

    fn gadget(&mut self, var: u32, gadgets: &mut HashMap<u32, NodeId>) -> NodeId {
        if let Some(&id) = gadgets.get(&var) {
            return id;
        }
        let pos = self.create_literal(var as i32);
        let neg = self.create_literal(-(var as i32));
        let id = self.insert(NodeData::Or { decision: None }, dedup(vec![pos, neg]));
        gadgets.insert(var, id);
        id
    }

    // ─── Renaming ───

    /// Builds a structural copy of the sub-circuit of `id` with every variable
    /// renamed through `mapping`. Mapping nodes are dissolved on the way.
    pub fn copy_renamed(&mut self, id: NodeId, mapping: &BTreeMap<u32, u32>) -> Result<NodeId> {
        let mut memo: HashMap<NodeId, NodeId> = HashMap::new();
        self.copy_rec(id, mapping, false, &mut memo)
    }

    fn copy_rec(
        &mut self,
        id: NodeId,
        mapping: &BTreeMap<u32, u32>,
        expand_leaves: bool,
        memo: &mut HashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        if let Some(&copy) = memo.get(&id) {
            return Ok(copy);
        }
        let rename = |var: u32| -> Result<u32> {
            mapping
                .get(&var)
                .copied()
                .ok_or(CircuitError::IncompleteMapping { node: id, var })
        };
        let node = self.node(id)?;
        let data = node.data.clone();
        let children = node.children.clone();

        let copy = match data {
            NodeData::Constant(value) => self.create_constant(value),
            NodeData::Literal(lit) => {
                let var = rename(var_of(lit))?;
                self.create_literal(lit_of(var, lit > 0))
            }
            NodeData::And => {
                let mut copies = Vec::with_capacity(children.len());
                for child in children {
                    copies.push(self.copy_rec(child, mapping, expand_leaves, memo)?);
                }
                self.create_and(copies)?
            }
            NodeData::Or { decision } => {
                let decision = decision.map(rename).transpose()?;
                let mut copies = Vec::with_capacity(children.len());
                for child in children {
                    copies.push(self.copy_rec(child, mapping, expand_leaves, memo)?);
                }
                self.create_or(copies, decision)?
            }
            NodeData::Mapping(inner) => {
                let mut composed = BTreeMap::new();
                for (&local, &global) in inner.local_to_global() {
                    if let Some(&target) = mapping.get(&global) {
                        composed.insert(local, target);
                    }
                }
                // Memo entries are only valid for one mapping.
                self.copy_rec(children[0], &composed, expand_leaves, &mut HashMap::new())?
            }
            NodeData::TwoCnf(formula) => {
                let renamed = formula
                    .renamed(mapping)
                    .ok_or_else(|| incomplete(id, formula.variables(), mapping))?;
                if expand_leaves {
                    self.expand_clauses(renamed.clauses().to_vec(), renamed.variables().clone(), &mut HashMap::new())?
                } else {
                    self.create_two_cnf(renamed)
                }
            }
            NodeData::Horn(formula) => {
                let renamed = formula
                    .renamed(mapping)
                    .ok_or_else(|| incomplete(id, formula.variables(), mapping))?;
                if expand_leaves {
                    self.expand_clauses(renamed.original_clauses(), renamed.variables().clone(), &mut HashMap::new())?
                } else {
                    self.create_horn(renamed)
                }
            }
        };
        memo.insert(id, copy);
        Ok(copy)
    }

    /// Replaces every Mapping node below the root by an explicit copy and
    /// moves the root to the result.
    pub fn expand_mappings(&mut self) -> Result<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let has_mapping = self
            .dominated_nodes(root)?
            .iter()
            .any(|id| matches!(self.nodes[id.index()].data, NodeData::Mapping(_)));
        if !has_mapping {
            return Ok(());
        }
        let identity: BTreeMap<u32, u32> = self.nodes[root.index()].variables.iter().map(|&v| (v, v)).collect();
        let expanded = self.copy_renamed(root, &identity)?;
        self.set_root(expanded)
    }

    /// Replaces every 2-CNF and Horn leaf below the root by an equivalent
    /// decision sub-circuit over the same variables and moves the root to the
    /// result. Mapping nodes are dissolved as well.
    ///
    /// The replacement is decomposable, deterministic and smooth, so the
    /// properties of the circuit are preserved.
    pub fn expand_leaves(&mut self) -> Result<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let has_leaf = self
            .dominated_nodes(root)?
            .iter()
            .any(|id| matches!(self.nodes[id.index()].data, NodeData::TwoCnf(_) | NodeData::Horn(_)));
        if !has_leaf {
            return Ok(());
        }
        let identity: BTreeMap<u32, u32> = self.nodes[root.index()].variables.iter().map(|&v| (v, v)).collect();
        let expanded = self.copy_rec(root, &identity, true, &mut HashMap::new())?;
        self.set_root(expanded)
    }

    /// Compiles `clauses` over `variables` into decision nodes, splitting
    /// into independent components on the way. Variables without an
    /// occurrence get a `(v ∨ ¬v)` gadget.
    fn expand_clauses(
        &mut self,
        mut clauses: Vec<Vec<i32>>,
        variables: BTreeSet<u32>,
        memo: &mut HashMap<(Vec<Vec<i32>>, BTreeSet<u32>), NodeId>,
    ) -> Result<NodeId> {
        if clauses.iter().any(Vec::is_empty) {
            return Ok(self.create_constant(false));
        }
        clauses.sort();
        let key = (clauses, variables);
        if let Some(&id) = memo.get(&key) {
            return Ok(id);
        }
        let (clauses, variables) = &key;

        let occurring: BTreeSet<u32> = clauses.iter().flatten().map(|&lit| var_of(lit)).collect();
        let mut gadgets = HashMap::new();
        let mut parts = Vec::new();
        for &var in variables.difference(&occurring) {
            parts.push(self.gadget(var, &mut gadgets));
        }

        let components = split_components(clauses);
        if components.len() > 1 {
            for (component, vars) in components {
                let part = self.expand_clauses(component, vars, memo)?;
                if self.is_false(part) {
                    return Ok(part);
                }
                parts.push(part);
            }
        } else if let Some(var) = most_occurring(clauses) {
            let rest: BTreeSet<u32> = occurring.iter().copied().filter(|&v| v != var).collect();
            let mut branches = Vec::with_capacity(2);
            for polarity in [true, false] {
                let branch = match condition(clauses, &HashSet::from([lit_of(var, polarity)])) {
                    Some(conditioned) => self.expand_clauses(conditioned, rest.clone(), memo)?,
                    None => self.create_constant(false),
                };
                branches.push(branch);
            }
            let (high, low) = (branches[0], branches[1]);
            let part = match (self.is_false(high), self.is_false(low)) {
                (true, true) => return Ok(high),
                (false, true) => {
                    let pos = self.create_literal(lit_of(var, true));
                    self.create_and([pos, high])?
                }
                (true, false) => {
                    let neg = self.create_literal(lit_of(var, false));
                    self.create_and([neg, low])?
                }
                (false, false) => self.create_decision_node(var, high, low)?,
            };
            parts.push(part);
        }

        let id = if parts.len() == 1 {
            parts[0]
        } else {
            self.create_and(parts)?
        };
        memo.insert(key, id);
        Ok(id)
    }

    fn is_false(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.index()].data, NodeData::Constant(false))
    }

    // ─── Introspection ───

    /// All nodes of the sub-circuit of `id`, including `id` itself.
    pub fn dominated_nodes(&self, id: NodeId) -> Result<BTreeSet<NodeId>> {
        self.node(id)?;
        let mut seen = BTreeSet::from([id]);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for &child in &self.nodes[current.index()].children {
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
        Ok(seen)
    }

    /// Nodes of the sub-circuit of `id`, children before parents.
    pub fn topological_order(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let dominated = self.dominated_nodes(id)?;
        Ok(self.bottom_up(&dominated))
    }
}

fn incomplete(node: NodeId, variables: &BTreeSet<u32>, mapping: &BTreeMap<u32, u32>) -> CircuitError {
    let var = variables.iter().copied().find(|v| !mapping.contains_key(v)).unwrap_or(0);
    CircuitError::IncompleteMapping { node, var }
}

fn dedup(ids: Vec<NodeId>) -> Vec<NodeId> {
    let set: BTreeSet<NodeId> = ids.into_iter().collect();
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;

    fn check_sizes(circuit: &Circuit) {
        for node in circuit.nodes() {
            if node.kind() == NodeKind::Mapping {
                let child = circuit.node(node.children()[0]).unwrap();
                assert_eq!(node.size(), child.size() + 1);
            } else if node.is_inner() {
                let sum: u64 = node.children().iter().map(|&c| circuit.node(c).unwrap().size()).sum();
                assert_eq!(node.size(), node.children().len() as u64 + sum, "size of {}", node.id());
            }
        }
    }

    #[test]
    fn test_hash_consing() {
        let mut circuit = Circuit::new();
        let a = circuit.create_literal(1);
        let b = circuit.create_literal(-2);
        assert_eq!(circuit.create_literal(1), a);

        let and1 = circuit.create_and([a, b]).unwrap();
        let and2 = circuit.create_and([b, a]).unwrap();
        assert_eq!(and1, and2);

        let or1 = circuit.create_or([a, b], None).unwrap();
        let or2 = circuit.create_or([b, a, b], None).unwrap();
        assert_eq!(or1, or2);
        assert_ne!(or1, and1);
    }

    #[test]
    fn test_unique_nodes_disabled() {
        let mut circuit = Circuit::new();
        circuit.set_unique_nodes(false);
        let a = circuit.create_literal(1);
        let b = circuit.create_literal(1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_inner_nodes_are_constants() {
        let mut circuit = Circuit::new();
        let t = circuit.create_and([]).unwrap();
        let f = circuit.create_or([], None).unwrap();
        assert_eq!(circuit.node(t).unwrap().data(), &NodeData::Constant(true));
        assert_eq!(circuit.node(f).unwrap().data(), &NodeData::Constant(false));
    }

    #[test]
    fn test_missing_node_and_variable() {
        let mut circuit = Circuit::new();
        let a = circuit.create_literal(1);
        let ghost = NodeId::new(42);
        assert!(matches!(circuit.create_and([a, ghost]), Err(CircuitError::NodeNotFound(id)) if id == ghost));
        assert!(matches!(circuit.set_root(ghost), Err(CircuitError::NodeNotFound(_))));
        assert!(matches!(
            circuit.create_or([a], Some(7)),
            Err(CircuitError::VariableNotInCircuit(7))
        ));
    }

    #[test]
    fn test_properties() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let nx1 = circuit.create_literal(-1);
        let x2 = circuit.create_literal(2);

        let overlapping = circuit.create_and([x1, nx1]).unwrap();
        assert!(!circuit.node(overlapping).unwrap().is_decomposable());

        let exclusive = circuit.create_or([x1, nx1], None).unwrap();
        let node = circuit.node(exclusive).unwrap();
        assert!(node.is_deterministic());
        assert!(node.is_smooth());

        let loose = circuit.create_or([x1, x2], None).unwrap();
        let node = circuit.node(loose).unwrap();
        assert!(!node.is_deterministic());
        assert!(!node.is_smooth());

        let x3 = circuit.create_literal(3);
        let parent = circuit.create_and([loose, x3]).unwrap();
        let node = circuit.node(parent).unwrap();
        assert!(node.is_decomposable());
        assert!(node.is_deterministic());
        assert!(!node.deterministic_in_circuit());

        circuit.set_root(parent).unwrap();
        assert_eq!(circuit.circuit_type(), Some(CircuitType::Bdmc));
        assert_eq!(circuit.size(), 2 + 2 + 1 + 1 + 1);
    }

    #[test]
    fn test_decision_node() {
        let mut circuit = Circuit::new();
        let x2 = circuit.create_literal(2);
        let x3 = circuit.create_literal(3);
        let root = circuit.create_decision_node(1, x2, x3).unwrap();
        circuit.set_root(root).unwrap();

        let node = circuit.node(root).unwrap();
        assert_eq!(node.decision_variable(), Some(1));
        assert_eq!(node.variables(), &BTreeSet::from([1, 2, 3]));
        assert_eq!(circuit.circuit_type(), Some(CircuitType::DBdmc));
        check_sizes(&circuit);
    }

    #[test]
    fn test_add_edge() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let x2 = circuit.create_literal(2);
        let x3 = circuit.create_literal(3);
        let inner = circuit.create_and([x1, x2]).unwrap();
        let outer = circuit.create_or([inner], None).unwrap();
        circuit.set_root(outer).unwrap();
        let before = circuit.size();

        circuit.add_edge(inner, x3).unwrap();
        assert_eq!(circuit.node(inner).unwrap().variables(), &BTreeSet::from([1, 2, 3]));
        assert_eq!(circuit.node(outer).unwrap().variables(), &BTreeSet::from([1, 2, 3]));
        assert_eq!(circuit.size(), before + 2);
        check_sizes(&circuit);

        // Existing edge is a no-op.
        circuit.add_edge(inner, x3).unwrap();
        assert_eq!(circuit.size(), before + 2);

        assert!(matches!(circuit.add_edge(x1, x2), Err(CircuitError::NotInnerNode(_))));
    }

    #[test]
    fn test_add_edge_cycle() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let x2 = circuit.create_literal(2);
        let inner = circuit.create_and([x1, x2]).unwrap();
        let outer = circuit.create_or([inner], None).unwrap();
        let edges = circuit.edge_count();

        assert!(matches!(
            circuit.add_edge(inner, outer),
            Err(CircuitError::CycleDetected { .. })
        ));
        assert!(matches!(
            circuit.add_edge(inner, inner),
            Err(CircuitError::CycleDetected { .. })
        ));
        assert_eq!(circuit.edge_count(), edges);
        assert!(circuit.node(outer).unwrap().parents().is_empty());

        let missing = NodeId::from(circuit.node_count() + 7);
        let nodes = circuit.node_count();
        assert!(matches!(
            circuit.add_edge(missing, inner),
            Err(CircuitError::NodeNotFound(id)) if id == missing
        ));
        assert!(matches!(
            circuit.add_edge(outer, missing),
            Err(CircuitError::NodeNotFound(id)) if id == missing
        ));
        assert_eq!(circuit.node_count(), nodes);
        assert_eq!(circuit.edge_count(), edges);
        assert_eq!(circuit.node(outer).unwrap().children(), &[inner]);
        assert_eq!(circuit.node(inner).unwrap().parents(), &BTreeSet::from([outer]));
    }

    #[test]
    fn test_expand_leaves() {
        let mut circuit = Circuit::new();
        let two_cnf = circuit.create_two_cnf(TwoCnfFormula::new(vec![vec![1, 2], vec![-1, 3], vec![-2, -3], vec![4, 5]]));
        let horn_clauses = vec![vec![-6, -7, 8], vec![-8, 9], vec![6, -9]];
        let renaming = crate::leaf::horn_renaming(&horn_clauses).unwrap();
        let horn = circuit.create_horn(HornFormula::new(&horn_clauses, renaming));
        let x10 = circuit.create_literal(10);
        let root = circuit.create_and([two_cnf, horn, x10]).unwrap();
        circuit.set_root(root).unwrap();
        let expected = circuit.model_counting(root, &[], true).unwrap();
        let under = circuit.model_counting(root, &[1, -6], true).unwrap();

        circuit.expand_leaves().unwrap();
        let expanded = circuit.root().unwrap();
        assert_ne!(expanded, root);
        let nodes = circuit.dominated_nodes(expanded).unwrap();
        assert!(nodes
            .iter()
            .all(|&id| !matches!(circuit.node(id).unwrap().kind(), NodeKind::TwoCnf | NodeKind::Horn)));
        assert_eq!(circuit.node(expanded).unwrap().variables(), &(1..=10).collect::<BTreeSet<u32>>());
        assert!(circuit.is_decomposable());
        assert!(circuit.is_deterministic());
        assert!(circuit.is_smooth());
        assert_eq!(circuit.model_counting(expanded, &[], true).unwrap(), expected);
        assert_eq!(circuit.model_counting(expanded, &[1, -6], true).unwrap(), under);
        assert!(circuit.to_nnf_string(expanded).is_ok());
    }

    #[test]
    fn test_expand_leaves_keeps_free_variables() {
        let mut circuit = Circuit::new();
        // Each branch on x1 leaves one variable without an occurrence.
        let leaf = circuit.create_two_cnf(TwoCnfFormula::new(vec![vec![1, 2], vec![-1, 3]]));
        circuit.set_root(leaf).unwrap();
        circuit.expand_leaves().unwrap();
        let root = circuit.root().unwrap();
        assert!(circuit.is_smooth());
        assert_eq!(circuit.model_counting(root, &[], true).unwrap(), BigUint::from(4u32));
    }

    #[test]
    fn test_add_edge_breaks_decomposability() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let nx1 = circuit.create_literal(-1);
        let x2 = circuit.create_literal(2);
        let inner = circuit.create_and([x1, x2]).unwrap();
        let outer = circuit.create_or([inner], None).unwrap();
        circuit.set_root(outer).unwrap();
        assert!(circuit.is_decomposable());

        circuit.add_edge(inner, nx1).unwrap();
        assert!(!circuit.node(inner).unwrap().is_decomposable());
        assert!(!circuit.is_decomposable());
        assert_eq!(circuit.circuit_type(), Some(CircuitType::SNnf));
    }

    #[test]
    fn test_smooth() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let nx1 = circuit.create_literal(-1);
        let x2 = circuit.create_literal(2);
        let left = circuit.create_and([x1, x2]).unwrap();
        let root = circuit.create_or([left, nx1], None).unwrap();
        circuit.set_root(root).unwrap();
        assert!(!circuit.is_smooth());
        assert!(circuit.is_deterministic());

        circuit.smooth();
        assert!(circuit.is_smooth());
        assert!(circuit.is_deterministic());
        assert!(circuit.is_decomposable());
        assert_eq!(circuit.circuit_type(), Some(CircuitType::SdBdmc));
        check_sizes(&circuit);

        let size = circuit.size();
        let nodes = circuit.node_count();
        circuit.smooth();
        assert!(circuit.is_smooth());
        assert_eq!(circuit.size(), size);
        assert_eq!(circuit.node_count(), nodes);
    }

    #[test]
    fn test_mapping_node() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let x2 = circuit.create_literal(2);
        let and = circuit.create_and([x1, x2]).unwrap();

        let mapping = VariableMapping::new(BTreeMap::from([(1, 5), (2, 6)])).unwrap();
        let mapped = circuit.create_mapping(and, mapping).unwrap();
        let node = circuit.node(mapped).unwrap();
        assert_eq!(node.variables(), &BTreeSet::from([5, 6]));
        assert_eq!(node.size(), circuit.node(and).unwrap().size() + 1);

        let incomplete = VariableMapping::new(BTreeMap::from([(1, 5)])).unwrap();
        assert!(matches!(
            circuit.create_mapping(and, incomplete),
            Err(CircuitError::IncompleteMapping { var: 2, .. })
        ));

        let identity = VariableMapping::new(BTreeMap::from([(1, 1), (2, 2)])).unwrap();
        assert_eq!(circuit.create_mapping(and, identity).unwrap(), and);
    }

    #[test]
    fn test_expand_mappings() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let nx2 = circuit.create_literal(-2);
        let and = circuit.create_and([x1, nx2]).unwrap();
        let mapping = VariableMapping::new(BTreeMap::from([(1, 3), (2, 4)])).unwrap();
        let mapped = circuit.create_mapping(and, mapping).unwrap();
        let root = circuit.create_and([and, mapped]).unwrap();
        circuit.set_root(root).unwrap();

        circuit.expand_mappings().unwrap();
        let root = circuit.root().unwrap();
        let dominated = circuit.dominated_nodes(root).unwrap();
        assert!(dominated.iter().all(|&id| circuit.node(id).unwrap().kind() != NodeKind::Mapping));
        assert_eq!(circuit.node(root).unwrap().literals(), &BTreeSet::from([-4, -2, 1, 3]));
    }

    #[test]
    fn test_topological_order() {
        let mut circuit = Circuit::new();
        let x2 = circuit.create_literal(2);
        let x3 = circuit.create_literal(3);
        let root = circuit.create_decision_node(1, x2, x3).unwrap();
        let order = circuit.topological_order(root).unwrap();
        assert_eq!(order.last(), Some(&root));
        for (i, id) in order.iter().enumerate() {
            for child in circuit.node(*id).unwrap().children() {
                assert!(order[..i].contains(child));
            }
        }
    }
}
