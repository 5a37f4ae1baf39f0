//! Recursive component decomposition.
//!
//! [`Decomposer::compile`] turns the residual formula of an
//! [`IncidenceGraph`] into a circuit node with the same models. One call
//! handles one component:
//!
//! 1. check satisfiability under the current assignment,
//! 2. probe the component cache,
//! 3. assign the implied literals,
//! 4. stop if no clause is left,
//! 5. probe the cache again on the reduced formula,
//! 6. emit a 2-CNF or renamable-Horn leaf when the formula is one,
//! 7. split into independent components and conjoin them,
//! 8. otherwise branch on a variable of a balanced cut set,
//! 9. store the results at both cache levels.
//!
//! All changes to the graph are made through guards, so the graph is
//! restored on every exit path, errors included.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::cache::{compose, CacheEntry, CacheKey, ComponentCache};
use crate::circuit::Circuit;
use crate::compiler::{CircuitMode, CompilerConfig, ImpliedLiteralMode};
use crate::error::CompileError;
use crate::heuristics::{DecisionHeuristic, PreselectionHeuristic};
use crate::incidence::IncidenceGraph;
use crate::leaf::{HornFormula, TwoCnfFormula};
use crate::node::{NodeData, VariableMapping};
use crate::partition::HypergraphPartitioning;
use crate::solver::{Propagator, SatSolver};
use crate::types::{var_of, NodeId};

type KeyWithMapping = (CacheKey, Option<BTreeMap<u32, u32>>);

/// Counters collected during one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub recursions: usize,
    pub max_depth: usize,
    /// Unsatisfiable sub-formulas encountered.
    pub unsatisfiable: usize,
    pub cache_hits_before_implied: usize,
    pub cache_hits_after_implied: usize,
    pub implied_literals: usize,
    pub two_cnf_leaves: usize,
    pub horn_leaves: usize,
    pub splits: usize,
    pub decisions: usize,
    pub cut_sets_computed: usize,
    pub cut_sets_reused: usize,
}

impl Statistics {
    pub fn cache_hits(&self) -> usize {
        self.cache_hits_before_implied + self.cache_hits_after_implied
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame<'c> {
    depth: usize,
    /// Set when the caller already knows the formula has a model.
    known_satisfiable: bool,
    /// Cut set computed by an ancestor, reused while enough of it is left.
    cut_set: Option<&'c BTreeSet<u32>>,
}

impl Frame<'_> {
    fn child<'d>(&self, known_satisfiable: bool, cut_set: Option<&'d BTreeSet<u32>>) -> Frame<'d> {
        Frame {
            depth: self.depth + 1,
            known_satisfiable,
            cut_set,
        }
    }
}

pub struct Decomposer {
    config: CompilerConfig,
    circuit: Circuit,
    solver: Option<Box<dyn SatSolver>>,
    cache: Option<Box<dyn ComponentCache>>,
    partitioning: HypergraphPartitioning,
    decision: Box<dyn DecisionHeuristic>,
    preselection: Box<dyn PreselectionHeuristic>,
    stats: Statistics,
}

impl Decomposer {
    pub fn new(config: &CompilerConfig, solver: Option<Box<dyn SatSolver>>) -> Self {
        Self {
            config: config.clone(),
            circuit: Circuit::new(),
            solver,
            cache: config.caching.map(|scheme| scheme.build()),
            partitioning: HypergraphPartitioning::new(config.partition.clone()),
            decision: config.decision.build(),
            preselection: config.preselection.build(),
            stats: Statistics::default(),
        }
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn cache(&self) -> Option<&dyn ComponentCache> {
        self.cache.as_deref()
    }

    pub fn partitioning(&self) -> &HypergraphPartitioning {
        &self.partitioning
    }

    pub fn into_parts(self) -> (Circuit, Statistics) {
        (self.circuit, self.stats)
    }

    /// Compiles the residual formula of `graph`.
    ///
    /// The returned node mentions only variables of the residual formula;
    /// variables of the formula it does not mention are unconstrained.
    pub fn compile(&mut self, graph: &mut IncidenceGraph) -> Result<NodeId, CompileError> {
        let frame = Frame {
            depth: 0,
            known_satisfiable: false,
            cut_set: None,
        };
        self.compile_component(graph, frame)
    }

    fn compile_component(&mut self, graph: &mut IncidenceGraph, frame: Frame<'_>) -> Result<NodeId, CompileError> {
        self.stats.recursions += 1;
        self.stats.max_depth = self.stats.max_depth.max(frame.depth);
        debug!(
            "depth {}: {} clauses, {} assigned",
            frame.depth,
            graph.num_clauses(),
            graph.assignment().len()
        );

        if graph.has_empty_clause() {
            return Ok(self.unsatisfiable());
        }
        if graph.is_empty() {
            return Ok(self.circuit.create_constant(true));
        }

        let mut model = None;
        if !frame.known_satisfiable {
            match self.solver.as_mut() {
                Some(solver) => {
                    model = solver.get_model(graph.assignment())?;
                    if model.is_none() {
                        return Ok(self.unsatisfiable());
                    }
                }
                None => {
                    if Propagator::new(graph.clauses()).propagate(&[]).is_none() {
                        return Ok(self.unsatisfiable());
                    }
                }
            }
        }

        let outer_key = self.cache.as_ref().map(|cache| cache.generate_key(graph));
        if let Some((key, mapping)) = &outer_key {
            if let Some(node) = self.lookup(key, mapping.as_ref())? {
                self.stats.cache_hits_before_implied += 1;
                return Ok(node);
            }
        }

        let Some(implied) = self.implied_literals(graph, frame.depth)? else {
            let node = self.unsatisfiable();
            self.store(outer_key, node);
            return Ok(node);
        };
        self.stats.implied_literals += implied.len();
        let mut conjuncts: Vec<NodeId> = implied.iter().map(|&lit| self.circuit.create_literal(lit)).collect();

        let mut reduced = graph.assign(&implied);
        let node = if reduced.has_empty_clause() {
            self.unsatisfiable()
        } else if reduced.is_empty() {
            self.circuit.create_and(conjuncts)?
        } else {
            let inner = self.compile_reduced(&mut reduced, frame, model)?;
            if self.is_false(inner) || conjuncts.is_empty() {
                inner
            } else {
                conjuncts.push(inner);
                self.circuit.create_and(conjuncts)?
            }
        };
        drop(reduced);

        self.store(outer_key, node);
        Ok(node)
    }

    /// Steps 5 to 8 on a formula without implied literals left.
    fn compile_reduced(
        &mut self,
        graph: &mut IncidenceGraph,
        frame: Frame<'_>,
        model: Option<Vec<i32>>,
    ) -> Result<NodeId, CompileError> {
        let inner_key = self.cache.as_ref().map(|cache| cache.generate_key(graph));
        if let Some((key, mapping)) = &inner_key {
            if let Some(node) = self.lookup(key, mapping.as_ref())? {
                self.stats.cache_hits_after_implied += 1;
                return Ok(node);
            }
        }

        let node = match self.base_class(graph) {
            Some(leaf) => leaf,
            None => {
                let components = graph.components();
                if components.len() > 1 {
                    self.split(graph, components, frame, model)?
                } else {
                    self.decide(graph, frame)?
                }
            }
        };

        self.store(inner_key, node);
        Ok(node)
    }

    fn implied_literals(&mut self, graph: &IncidenceGraph, depth: usize) -> Result<Option<Vec<i32>>, CompileError> {
        let variables = graph.variables();
        let assignment = graph.assignment();
        let implied = match self.config.implied_literals {
            ImpliedLiteralMode::UnitPropagation => match self.solver.as_mut() {
                Some(solver) => solver.unit_propagation(assignment)?,
                None => Propagator::new(graph.clauses()).propagate(&[]),
            },
            mode @ (ImpliedLiteralMode::ImplicitUnitPropagation
            | ImpliedLiteralMode::IterativeImplicitUnitPropagation) => {
                let iterate = mode == ImpliedLiteralMode::IterativeImplicitUnitPropagation;
                let candidates = self.preselection.preselect_variables(&variables, graph, depth);
                let probed = match self.solver.as_mut() {
                    Some(solver) => solver.implicit_unit_propagation(assignment, &candidates, iterate)?,
                    None => Propagator::new(graph.clauses()).probe(&[], &candidates, iterate),
                };
                probed.map(|implied| implied.into_values().collect())
            }
            ImpliedLiteralMode::Backbone => match self.solver.as_mut() {
                Some(solver) => solver.get_backbone_literals(assignment)?,
                None => {
                    return Err(CompileError::InvalidConfiguration(
                        "backbone computation requires the SAT solver".into(),
                    ))
                }
            },
        };

        Ok(implied.map(|literals| {
            let mut literals: Vec<i32> = literals
                .into_iter()
                .filter(|&lit| variables.contains(&var_of(lit)))
                .collect();
            literals.sort_unstable_by_key(|&lit| var_of(lit));
            literals.dedup();
            literals
        }))
    }

    fn base_class(&mut self, graph: &IncidenceGraph) -> Option<NodeId> {
        if graph.num_clauses() > self.config.base_class_max_clauses {
            return None;
        }
        if self.config.two_cnf_leaves && graph.is_two_cnf() {
            self.stats.two_cnf_leaves += 1;
            return Some(self.circuit.create_two_cnf(TwoCnfFormula::new(graph.clauses())));
        }
        if self.config.horn_leaves {
            if let Some(renaming) = graph.renamable_horn_renaming() {
                self.stats.horn_leaves += 1;
                return Some(self.circuit.create_horn(HornFormula::new(&graph.clauses(), renaming)));
            }
        }
        None
    }

    fn split(
        &mut self,
        graph: &mut IncidenceGraph,
        components: Vec<BTreeSet<u32>>,
        frame: Frame<'_>,
        model: Option<Vec<i32>>,
    ) -> Result<NodeId, CompileError> {
        self.stats.splits += 1;
        debug!("depth {}: {} components", frame.depth, components.len());

        let model = match (model, self.solver.as_mut()) {
            (Some(model), _) => Some(model),
            (None, Some(solver)) => match solver.get_model(graph.assignment())? {
                Some(model) => Some(model),
                None => return Ok(self.unsatisfiable()),
            },
            (None, None) => None,
        };
        let known_satisfiable = model.is_some();
        let materialize = graph.num_clauses() > self.config.materialize_above;
        let all: BTreeSet<u32> = components.iter().flatten().copied().collect();

        let mut children = Vec::with_capacity(components.len());
        for component in &components {
            // Sibling variables keep their value from the model, so the solver
            // sees this component alone.
            let siblings: Vec<i32> = model
                .iter()
                .flatten()
                .copied()
                .filter(|&lit| all.contains(&var_of(lit)) && !component.contains(&var_of(lit)))
                .collect();
            let next = frame.child(known_satisfiable, frame.cut_set);
            let child = if materialize {
                let mut sub = graph.subgraph(component);
                let mut fixed = sub.fix(&siblings);
                self.compile_component(&mut fixed, next)?
            } else {
                let mut restricted = graph.restrict(component);
                let mut fixed = restricted.fix(&siblings);
                self.compile_component(&mut fixed, next)?
            };
            if self.is_false(child) {
                return Ok(child);
            }
            children.push(child);
        }
        Ok(self.circuit.create_and(children)?)
    }

    fn decide(&mut self, graph: &mut IncidenceGraph, frame: Frame<'_>) -> Result<NodeId, CompileError> {
        let cut_set = self.cut_set(graph, frame.cut_set);
        let solver = self.solver.as_mut().map(|solver| solver.as_mut() as &mut dyn SatSolver);
        let view: &IncidenceGraph = graph;
        let decision = self
            .decision
            .get_decision_variable(&cut_set, view, solver, view.assignment(), frame.depth);
        let Some(var) = decision else {
            // No free variable and no empty clause: nothing left to satisfy.
            return Ok(self.circuit.create_constant(true));
        };
        self.stats.decisions += 1;
        debug!("depth {}: branching on {} (cut set of {})", frame.depth, var, cut_set.len());

        let positive = var as i32;
        let high = {
            let mut branch = graph.assign(&[positive]);
            self.compile_component(&mut branch, frame.child(false, Some(&cut_set)))?
        };
        let low = {
            let mut branch = graph.assign(&[-positive]);
            self.compile_component(&mut branch, frame.child(false, Some(&cut_set)))?
        };

        let node = match (self.is_false(high), self.is_false(low)) {
            (true, true) => high,
            (true, false) => {
                let lit = self.circuit.create_literal(-positive);
                self.circuit.create_and([lit, low])?
            }
            (false, true) => {
                let lit = self.circuit.create_literal(positive);
                self.circuit.create_and([lit, high])?
            }
            (false, false) => self.circuit.create_decision_node(var, high, low)?,
        };
        Ok(node)
    }

    /// Reuses the part of `previous` still present in the graph unless more
    /// than the configured fraction of it was eliminated.
    fn cut_set(&mut self, graph: &IncidenceGraph, previous: Option<&BTreeSet<u32>>) -> BTreeSet<u32> {
        if let Some(previous) = previous.filter(|previous| !previous.is_empty()) {
            let variables = graph.variables();
            let remaining: BTreeSet<u32> = previous.intersection(&variables).copied().collect();
            let eliminated = 1.0 - remaining.len() as f64 / previous.len() as f64;
            if !remaining.is_empty() && eliminated <= self.config.cut_set_threshold {
                self.stats.cut_sets_reused += 1;
                return remaining;
            }
        }
        self.stats.cut_sets_computed += 1;
        self.partitioning.get_cut_set(graph)
    }

    fn lookup(&mut self, key: &CacheKey, current: Option<&BTreeMap<u32, u32>>) -> Result<Option<NodeId>, CompileError> {
        let Some(entry) = self.cache.as_mut().and_then(|cache| cache.get(key)) else {
            return Ok(None);
        };
        self.reinstantiate(entry, current).map(Some)
    }

    /// Exposes a cached node over the variables of the current formula.
    fn reinstantiate(&mut self, entry: CacheEntry, current: Option<&BTreeMap<u32, u32>>) -> Result<NodeId, CompileError> {
        let Some(renaming) = compose(entry.mapping.as_ref(), current) else {
            return Ok(entry.node);
        };
        let node = match (self.config.circuit_mode, VariableMapping::new(renaming.clone())) {
            (_, Some(mapping)) if mapping.is_identity() => entry.node,
            (CircuitMode::Mapping, Some(mapping)) => self.circuit.create_mapping(entry.node, mapping)?,
            _ => self.circuit.copy_renamed(entry.node, &renaming)?,
        };
        Ok(node)
    }

    fn store(&mut self, key: Option<KeyWithMapping>, node: NodeId) {
        if let (Some(cache), Some((key, mapping))) = (self.cache.as_mut(), key) {
            cache.add(key, node, mapping);
        }
    }

    fn unsatisfiable(&mut self) -> NodeId {
        self.stats.unsatisfiable += 1;
        self.circuit.create_constant(false)
    }

    fn is_false(&self, id: NodeId) -> bool {
        matches!(
            self.circuit.node(id).map(|node| node.data()),
            Ok(NodeData::Constant(false))
        )
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;
    use crate::cache::CachingScheme;
    use crate::cnf::Cnf;
    use crate::solver::VarisatSolver;

    fn decompose(cnf: &Cnf, config: &CompilerConfig) -> (Decomposer, NodeId) {
        let solver: Option<Box<dyn SatSolver>> = if config.use_solver {
            Some(Box::new(VarisatSolver::new(cnf)))
        } else {
            None
        };
        let mut decomposer = Decomposer::new(config, solver);
        let mut graph = IncidenceGraph::new(cnf.clauses().to_vec());
        let root = decomposer.compile(&mut graph).unwrap();
        // The graph is left exactly as it was.
        assert_eq!(graph.num_clauses(), cnf.num_clauses());
        assert!(graph.assignment().is_empty());
        (decomposer, root)
    }

    fn count(cnf: &Cnf, config: &CompilerConfig) -> BigUint {
        let (decomposer, root) = decompose(cnf, config);
        let (mut circuit, _) = decomposer.into_parts();
        circuit.smooth();
        circuit.model_count_over(root, &[], cnf.num_vars()).unwrap()
    }

    fn no_leaves() -> CompilerConfig {
        CompilerConfig {
            two_cnf_leaves: false,
            horn_leaves: false,
            ..CompilerConfig::default()
        }
    }

    #[test]
    fn test_unsatisfiable() {
        let cnf = Cnf::from_clauses(2, [vec![1, 2], vec![-1, 2], vec![1, -2], vec![-1, -2]]);
        let (decomposer, root) = decompose(&cnf, &no_leaves());
        assert!(decomposer.is_false(root));
        assert!(decomposer.statistics().unsatisfiable >= 1);
    }

    #[test]
    fn test_implied_literals_only() {
        let cnf = Cnf::from_clauses(3, [vec![1], vec![-1, 2], vec![-2, -3]]);
        let (decomposer, root) = decompose(&cnf, &no_leaves());
        let node = decomposer.circuit().node(root).unwrap();
        assert_eq!(node.literals().iter().copied().collect::<Vec<_>>(), vec![-3, 1, 2]);
        assert_eq!(decomposer.statistics().decisions, 0);
    }

    #[test]
    fn test_split_components() {
        // Two independent copies of (1 ∨ 2 ∨ 3) ∧ (¬1 ∨ ¬2)
        let cnf = Cnf::from_clauses(6, [vec![1, 2, 3], vec![-1, -2], vec![4, 5, 6], vec![-4, -5]]);
        let config = no_leaves();
        assert_eq!(count(&cnf, &config), BigUint::from(25u32));

        let (decomposer, _) = decompose(&cnf, &config);
        assert!(decomposer.statistics().splits >= 1);
    }

    #[test]
    fn test_renaming_cache_hits_isomorphic_components() {
        let cnf = Cnf::from_clauses(
            8,
            [vec![1, 2, 3, 4], vec![-1, -2], vec![-3, -4], vec![5, 6, 7, 8], vec![-5, -6], vec![-7, -8]],
        );
        let config = CompilerConfig {
            caching: Some(CachingScheme::Renaming { exact_below: 0 }),
            ..no_leaves()
        };
        let (decomposer, _) = decompose(&cnf, &config);
        assert!(decomposer.statistics().cache_hits() >= 1);
        assert!(decomposer.circuit().nodes().any(|node| matches!(node.data(), NodeData::Mapping(_))));

        // 3 * 3 - 1 models per component
        assert_eq!(count(&cnf, &config), BigUint::from(64u32));
        let copy = CompilerConfig {
            circuit_mode: CircuitMode::Copy,
            ..config
        };
        assert_eq!(count(&cnf, &copy), BigUint::from(64u32));
    }

    #[test]
    fn test_base_class_leaves() {
        let two_cnf = Cnf::from_clauses(4, [vec![1, 2], vec![-2, 3], vec![3, 4], vec![-1, -4]]);
        let (decomposer, _) = decompose(&two_cnf, &CompilerConfig::default());
        assert_eq!(decomposer.statistics().two_cnf_leaves, 1);
        assert_eq!(count(&two_cnf, &CompilerConfig::default()), count(&two_cnf, &no_leaves()));

        let horn = Cnf::from_clauses(5, [vec![-1, -2, 3], vec![-3, -4, 5], vec![-5, 1, -2], vec![2, -4, -1]]);
        let config = CompilerConfig {
            two_cnf_leaves: false,
            ..CompilerConfig::default()
        };
        let (decomposer, _) = decompose(&horn, &config);
        assert_eq!(decomposer.statistics().horn_leaves, 1);
        assert_eq!(count(&horn, &config), count(&horn, &no_leaves()));
    }

    #[test]
    fn test_without_solver() {
        let cnf = Cnf::from_clauses(4, [vec![1, 2, 3], vec![-1, -2, 4], vec![2, -3, -4], vec![-1, 3]]);
        let reference = count(&cnf, &no_leaves());
        let config = CompilerConfig {
            use_solver: false,
            ..no_leaves()
        };
        assert_eq!(count(&cnf, &config), reference);
    }

    #[test]
    fn test_cut_set_reuse() {
        let cnf = Cnf::from_clauses(
            6,
            [vec![1, 2, 3], vec![-1, 4, 5], vec![-2, -4, 6], vec![3, -5, -6], vec![1, -3, 6], vec![2, 5, -6]],
        );
        let reuse = CompilerConfig {
            cut_set_threshold: 1.0,
            ..no_leaves()
        };
        let recompute = CompilerConfig {
            cut_set_threshold: 0.0,
            ..no_leaves()
        };
        assert_eq!(count(&cnf, &reuse), count(&cnf, &recompute));
    }
}
