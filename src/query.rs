//! Queries over compiled circuits.
//!
//! Every query takes the node to evaluate plus a set of restricting literals
//! and dispatches on the node kind. Inner nodes memoise their results in
//! per-node caches keyed by [`restriction_key`], which only looks at the
//! node's own variables, so a cached answer is reused whenever two calls
//! agree on them.
//!
//! | Query | Requires |
//! |-------|----------|
//! | [`is_satisfiable`][Circuit::is_satisfiable] | decomposable |
//! | [`model_counting`][Circuit::model_counting] | decomposable, deterministic, smooth |
//! | [`minimum_default_cardinality`][Circuit::minimum_default_cardinality] | decomposable, no formula leaves |

use std::collections::{BTreeSet, HashSet};

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::circuit::Circuit;
use crate::error::{CircuitError, Result};
use crate::node::{Node, NodeData, VariableMapping};
use crate::types::{var_of, NodeId};

/// Canonical cache key of a restriction relative to `variables`.
///
/// One character per variable in ascending order: `1` if the positive literal
/// is in `literals`, `0` if the negative one is, `-` otherwise; followed by one
/// character per variable telling whether it is in `marked`.
pub fn restriction_key(variables: &BTreeSet<u32>, literals: &HashSet<i32>, marked: &HashSet<u32>) -> String {
    let mut key = String::with_capacity(2 * variables.len() + 1);
    for &var in variables {
        let lit = var as i32;
        key.push(if literals.contains(&lit) {
            '1'
        } else if literals.contains(&-lit) {
            '0'
        } else {
            '-'
        });
    }
    key.push('|');
    for var in variables {
        key.push(if marked.contains(var) { '1' } else { '-' });
    }
    key
}

fn check_complementary(literals: &[i32]) -> Result<HashSet<i32>> {
    let set: HashSet<i32> = literals.iter().copied().collect();
    if let Some(&lit) = literals.iter().find(|&&lit| set.contains(&-lit)) {
        return Err(CircuitError::ComplementaryLiterals(var_of(lit)));
    }
    Ok(set)
}

fn translate_literals(mapping: &VariableMapping, literals: &HashSet<i32>) -> HashSet<i32> {
    literals.iter().filter_map(|&lit| mapping.to_local(lit)).collect()
}

fn translate_variables(mapping: &VariableMapping, variables: &HashSet<u32>) -> HashSet<u32> {
    variables
        .iter()
        .filter_map(|v| mapping.global_to_local().get(v).copied())
        .collect()
}

fn restrict(node: &Node, literals: &HashSet<i32>) -> HashSet<i32> {
    literals
        .iter()
        .copied()
        .filter(|&lit| node.variables().contains(&var_of(lit)))
        .collect()
}

impl Circuit {
    /// Checks whether the sub-circuit of `id` has a model that extends
    /// `assumption`, with the variables in `exist` existentially quantified.
    pub fn is_satisfiable(&self, id: NodeId, assumption: &[i32], exist: &[u32], use_cache: bool) -> Result<bool> {
        let assumption = check_complementary(assumption)?;
        let exist: HashSet<u32> = exist.iter().copied().collect();
        if let Some(&var) = exist
            .iter()
            .find(|&&v| assumption.contains(&(v as i32)) || assumption.contains(&-(v as i32)))
        {
            return Err(CircuitError::AssumptionNotDisjoint(var));
        }
        self.sat_rec(id, &assumption, &exist, use_cache)
    }

    fn sat_rec(&self, id: NodeId, assumption: &HashSet<i32>, exist: &HashSet<u32>, use_cache: bool) -> Result<bool> {
        let node = self.node(id)?;
        match node.data() {
            NodeData::Constant(value) => return Ok(*value),
            NodeData::Literal(lit) => return Ok(!assumption.contains(&-lit)),
            NodeData::TwoCnf(formula) => return Ok(formula.is_satisfiable(&restrict(node, assumption))),
            NodeData::Horn(formula) => return Ok(formula.is_satisfiable(&restrict(node, assumption))),
            _ => {}
        }
        if !node.decomposable_in_circuit() {
            return Err(CircuitError::NotDecomposable(id));
        }

        let key = restriction_key(node.variables(), assumption, exist);
        if use_cache {
            if let Some(&cached) = node.caches.borrow().satisfiable.get(&key) {
                return Ok(cached);
            }
        }

        let result = if let NodeData::Mapping(mapping) = node.data() {
            let local = translate_literals(mapping, assumption);
            let local_exist = translate_variables(mapping, exist);
            self.sat_rec(node.children()[0], &local, &local_exist, use_cache)?
        } else {
            // AND needs every child, OR needs one.
            let conjunction = matches!(node.data(), NodeData::And);
            let mut result = conjunction;
            for &child in node.children() {
                if self.sat_rec(child, assumption, exist, use_cache)? != conjunction {
                    result = !conjunction;
                    break;
                }
            }
            result
        };

        if use_cache {
            node.caches.borrow_mut().satisfiable.insert(key, result);
        }
        Ok(result)
    }

    /// Counts the models of the sub-circuit of `id` over its own variables
    /// that extend `assumption`.
    pub fn model_counting(&self, id: NodeId, assumption: &[i32], use_cache: bool) -> Result<BigUint> {
        let assumption = check_complementary(assumption)?;
        let node = self.node(id)?;
        if !node.decomposable_in_circuit() {
            return Err(CircuitError::NotDecomposable(id));
        }
        if !node.deterministic_in_circuit() {
            return Err(CircuitError::NotDeterministic(id));
        }
        if !node.smoothness_in_circuit() {
            return Err(CircuitError::NotSmooth(id));
        }
        self.count_rec(id, &assumption, use_cache)
    }

    fn count_rec(&self, id: NodeId, assumption: &HashSet<i32>, use_cache: bool) -> Result<BigUint> {
        let node = self.node(id)?;
        match node.data() {
            NodeData::Constant(value) => {
                return Ok(if *value { BigUint::one() } else { BigUint::zero() });
            }
            NodeData::Literal(lit) => {
                return Ok(if assumption.contains(&-lit) {
                    BigUint::zero()
                } else {
                    BigUint::one()
                });
            }
            NodeData::TwoCnf(formula) => return Ok(formula.model_count(&restrict(node, assumption))),
            NodeData::Horn(formula) => return Ok(formula.model_count(&restrict(node, assumption))),
            _ => {}
        }

        let key = restriction_key(node.variables(), assumption, &HashSet::new());
        if use_cache {
            if let Some(cached) = node.caches.borrow().model_count.get(&key) {
                return Ok(cached.clone());
            }
        }

        let result = if let NodeData::Mapping(mapping) = node.data() {
            let local = translate_literals(mapping, assumption);
            self.count_rec(node.children()[0], &local, use_cache)?
        } else if matches!(node.data(), NodeData::And) {
            let mut product = BigUint::one();
            for &child in node.children() {
                product *= self.count_rec(child, assumption, use_cache)?;
                if product.is_zero() {
                    break;
                }
            }
            product
        } else {
            let mut sum = BigUint::zero();
            for &child in node.children() {
                sum += self.count_rec(child, assumption, use_cache)?;
            }
            sum
        };

        if use_cache {
            node.caches.borrow_mut().model_count.insert(key, result.clone());
        }
        Ok(result)
    }

    /// Minimum number of default variables set to false in a model of the
    /// sub-circuit of `id` that extends `observation`.
    ///
    /// Returns `f64::INFINITY` when no such model exists.
    pub fn minimum_default_cardinality(
        &self,
        id: NodeId,
        observation: &[i32],
        default: &[u32],
        use_cache: bool,
    ) -> Result<f64> {
        let observation = check_complementary(observation)?;
        let default: HashSet<u32> = default.iter().copied().collect();
        let node = self.node(id)?;
        if !node.decomposable_in_circuit() {
            return Err(CircuitError::NotDecomposable(id));
        }
        self.cardinality_rec(id, &observation, &default, use_cache)
    }

    fn cardinality_rec(
        &self,
        id: NodeId,
        observation: &HashSet<i32>,
        default: &HashSet<u32>,
        use_cache: bool,
    ) -> Result<f64> {
        let node = self.node(id)?;
        match node.data() {
            NodeData::Constant(value) => return Ok(if *value { 0.0 } else { f64::INFINITY }),
            NodeData::Literal(lit) => {
                let lit = *lit;
                return Ok(if observation.contains(&-lit) {
                    f64::INFINITY
                } else if observation.contains(&lit) {
                    0.0
                } else if lit < 0 && default.contains(&var_of(lit)) {
                    1.0
                } else {
                    0.0
                });
            }
            NodeData::TwoCnf(_) | NodeData::Horn(_) => {
                return Err(CircuitError::MinimumCardinalityUnsupported(id));
            }
            _ => {}
        }

        let key = restriction_key(node.variables(), observation, default);
        if use_cache {
            if let Some(&cached) = node.caches.borrow().min_cardinality.get(&key) {
                return Ok(cached);
            }
        }

        let result = if let NodeData::Mapping(mapping) = node.data() {
            let local = translate_literals(mapping, observation);
            let local_default = translate_variables(mapping, default);
            self.cardinality_rec(node.children()[0], &local, &local_default, use_cache)?
        } else if matches!(node.data(), NodeData::And) {
            let mut sum = 0.0;
            for &child in node.children() {
                sum += self.cardinality_rec(child, observation, default, use_cache)?;
                if sum == f64::INFINITY {
                    break;
                }
            }
            sum
        } else {
            let mut min = f64::INFINITY;
            for &child in node.children() {
                min = min.min(self.cardinality_rec(child, observation, default, use_cache)?);
            }
            min
        };

        if use_cache {
            node.caches.borrow_mut().min_cardinality.insert(key, result);
        }
        Ok(result)
    }

    /// Checks whether every model of the sub-circuit of `id` satisfies `clause`.
    pub fn entails_clause(&self, id: NodeId, clause: &[i32]) -> Result<bool> {
        let literals: HashSet<i32> = clause.iter().copied().collect();
        if literals.iter().any(|lit| literals.contains(&-lit)) {
            return Ok(true);
        }
        let negated: Vec<i32> = literals.iter().map(|&lit| -lit).collect();
        Ok(!self.is_satisfiable(id, &negated, &[], true)?)
    }

    /// Counts the models over the variables `1..=num_vars` extending
    /// `assumption`. Variables outside the sub-circuit and the assumption
    /// are free.
    pub fn model_count_over(&self, id: NodeId, assumption: &[i32], num_vars: u32) -> Result<BigUint> {
        let count = self.model_counting(id, assumption, true)?;
        let node = self.node(id)?;
        let assumed: HashSet<u32> = assumption.iter().map(|&lit| var_of(lit)).collect();
        let free = (1..=num_vars)
            .filter(|v| !node.variables().contains(v) && !assumed.contains(v))
            .count();
        Ok(count << free)
    }
}
