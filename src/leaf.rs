//! Tractable sub-formulas stored directly as circuit leaves.
//!
//! A 2-CNF or renamable-Horn residual formula is not decomposed further by
//! the compiler. Instead it becomes a leaf that answers satisfiability in
//! linear time and model counting with a small exact counter.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::solver::Propagator;
use crate::types::{lit_of, var_of};

/// A 2-CNF formula (every clause has at most two literals).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TwoCnfFormula {
    clauses: Vec<Vec<i32>>,
    variables: BTreeSet<u32>,
}

impl TwoCnfFormula {
    pub fn new(clauses: Vec<Vec<i32>>) -> Self {
        assert!(clauses.iter().all(|c| c.len() <= 2), "2-CNF clauses have at most two literals");
        let variables = clauses.iter().flatten().map(|&lit| var_of(lit)).collect();
        Self { clauses, variables }
    }

    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.clauses
    }

    pub fn variables(&self) -> &BTreeSet<u32> {
        &self.variables
    }

    /// Number of literal occurrences.
    pub fn len(&self) -> usize {
        self.clauses.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns a copy with every variable renamed through `mapping`.
    pub fn renamed(&self, mapping: &BTreeMap<u32, u32>) -> Option<Self> {
        Some(Self::new(rename_clauses(&self.clauses, mapping)?))
    }

    /// Model existence under `assumption` via strongly connected components of
    /// the implication graph.
    pub fn is_satisfiable(&self, assumption: &HashSet<i32>) -> bool {
        let clauses = match condition(&self.clauses, assumption) {
            Some(clauses) => clauses,
            None => return false,
        };
        two_sat(&clauses).is_some()
    }

    /// Exact number of assignments to the leaf's variables that extend
    /// `assumption` and satisfy the formula.
    pub fn model_count(&self, assumption: &HashSet<i32>) -> BigUint {
        count_restricted(&self.clauses, &self.variables, assumption)
    }
}

/// A renamable-Horn formula stored in its Horn form.
///
/// `clauses` are already renamed: every variable in `renaming` has its
/// polarity flipped relative to the original formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HornFormula {
    clauses: Vec<Vec<i32>>,
    renaming: BTreeSet<u32>,
    variables: BTreeSet<u32>,
}

impl HornFormula {
    /// Builds the leaf from an original formula and a renaming that turns it
    /// into Horn form.
    pub fn new(original: &[Vec<i32>], renaming: BTreeSet<u32>) -> Self {
        let clauses: Vec<Vec<i32>> = original
            .iter()
            .map(|clause| clause.iter().map(|&lit| flip(lit, &renaming)).collect())
            .collect();
        debug_assert!(clauses.iter().all(|c| c.iter().filter(|&&l| l > 0).count() <= 1));
        let variables = clauses.iter().flatten().map(|&lit| var_of(lit)).collect();
        Self {
            clauses,
            renaming,
            variables,
        }
    }

    /// The Horn clauses (after renaming).
    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.clauses
    }

    /// The clauses in the original polarity.
    pub fn original_clauses(&self) -> Vec<Vec<i32>> {
        self.clauses
            .iter()
            .map(|clause| clause.iter().map(|&lit| flip(lit, &self.renaming)).collect())
            .collect()
    }

    pub fn renaming(&self) -> &BTreeSet<u32> {
        &self.renaming
    }

    pub fn variables(&self) -> &BTreeSet<u32> {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.clauses.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn renamed(&self, mapping: &BTreeMap<u32, u32>) -> Option<Self> {
        let original = rename_clauses(&self.original_clauses(), mapping)?;
        let renaming = self
            .renaming
            .iter()
            .map(|v| mapping.get(v).copied())
            .collect::<Option<BTreeSet<u32>>>()?;
        Some(Self::new(&original, renaming))
    }

    fn rename_assumption(&self, assumption: &HashSet<i32>) -> HashSet<i32> {
        assumption.iter().map(|&lit| flip(lit, &self.renaming)).collect()
    }

    /// Horn satisfiability: unit propagation decides it.
    pub fn is_satisfiable(&self, assumption: &HashSet<i32>) -> bool {
        let assumption: Vec<i32> = self
            .rename_assumption(assumption)
            .into_iter()
            .filter(|&lit| self.variables.contains(&var_of(lit)))
            .collect();
        Propagator::new(self.clauses.iter().cloned())
            .propagate(&assumption)
            .is_some()
    }

    pub fn model_count(&self, assumption: &HashSet<i32>) -> BigUint {
        count_restricted(&self.clauses, &self.variables, &self.rename_assumption(assumption))
    }
}

fn flip(lit: i32, renaming: &BTreeSet<u32>) -> i32 {
    if renaming.contains(&var_of(lit)) {
        -lit
    } else {
        lit
    }
}

fn rename_clauses(clauses: &[Vec<i32>], mapping: &BTreeMap<u32, u32>) -> Option<Vec<Vec<i32>>> {
    clauses
        .iter()
        .map(|clause| {
            clause
                .iter()
                .map(|&lit| mapping.get(&var_of(lit)).map(|&v| lit_of(v, lit > 0)))
                .collect()
        })
        .collect()
}

/// Conditions `clauses` on `assumption`: drops satisfied clauses and falsified
/// literals. Returns `None` if some clause becomes empty.
pub(crate) fn condition(clauses: &[Vec<i32>], assumption: &HashSet<i32>) -> Option<Vec<Vec<i32>>> {
    let mut result = Vec::with_capacity(clauses.len());
    for clause in clauses {
        if clause.iter().any(|lit| assumption.contains(lit)) {
            continue;
        }
        let rest: Vec<i32> = clause.iter().copied().filter(|lit| !assumption.contains(&-lit)).collect();
        if rest.is_empty() {
            return None;
        }
        result.push(rest);
    }
    Some(result)
}

fn count_restricted(clauses: &[Vec<i32>], variables: &BTreeSet<u32>, assumption: &HashSet<i32>) -> BigUint {
    let clauses = match condition(clauses, assumption) {
        Some(clauses) => clauses,
        None => return BigUint::zero(),
    };
    let free: BTreeSet<u32> = variables
        .iter()
        .copied()
        .filter(|&v| !assumption.contains(&(v as i32)) && !assumption.contains(&-(v as i32)))
        .collect();
    count_models(&clauses, &free)
}

/// Exact model count of `clauses` over `variables` (which must cover every
/// variable of `clauses`). DPLL with component splitting; meant for small
/// formulas only.
pub fn count_models(clauses: &[Vec<i32>], variables: &BTreeSet<u32>) -> BigUint {
    if clauses.iter().any(Vec::is_empty) {
        return BigUint::zero();
    }
    let occurring: BTreeSet<u32> = clauses.iter().flatten().map(|&lit| var_of(lit)).collect();
    let free = variables.len() - occurring.len();
    if clauses.is_empty() {
        return BigUint::one() << free;
    }

    let components = split_components(clauses);
    if components.len() > 1 {
        let mut total = BigUint::one() << free;
        for (component, vars) in components {
            total *= count_models(&component, &vars);
            if total.is_zero() {
                break;
            }
        }
        return total;
    }

    let var = match most_occurring(clauses) {
        Some(var) => var,
        None => return BigUint::one() << free,
    };

    let rest: BTreeSet<u32> = occurring.iter().copied().filter(|&v| v != var).collect();
    let mut total = BigUint::zero();
    for lit in [var as i32, -(var as i32)] {
        let assumption = HashSet::from([lit]);
        if let Some(conditioned) = condition(clauses, &assumption) {
            total += count_models(&conditioned, &rest);
        }
    }
    total << free
}

/// The variable with the most occurrences; ties go to the smaller variable.
pub(crate) fn most_occurring(clauses: &[Vec<i32>]) -> Option<u32> {
    let mut occurrences: HashMap<u32, usize> = HashMap::new();
    for &lit in clauses.iter().flatten() {
        *occurrences.entry(var_of(lit)).or_default() += 1;
    }
    occurrences
        .into_iter()
        .max_by_key(|&(v, n)| (n, Reverse(v)))
        .map(|(var, _)| var)
}

pub(crate) fn split_components(clauses: &[Vec<i32>]) -> Vec<(Vec<Vec<i32>>, BTreeSet<u32>)> {
    let mut by_var: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, clause) in clauses.iter().enumerate() {
        for &lit in clause {
            by_var.entry(var_of(lit)).or_default().push(i);
        }
    }
    let mut seen = vec![false; clauses.len()];
    let mut components = Vec::new();
    for start in 0..clauses.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut stack = vec![start];
        let mut members = Vec::new();
        let mut vars = BTreeSet::new();
        while let Some(i) = stack.pop() {
            members.push(clauses[i].clone());
            for &lit in &clauses[i] {
                if vars.insert(var_of(lit)) {
                    for &j in &by_var[&var_of(lit)] {
                        if !seen[j] {
                            seen[j] = true;
                            stack.push(j);
                        }
                    }
                }
            }
        }
        components.push((members, vars));
    }
    components
}

/// 2-SAT by Kosaraju's algorithm on the implication graph.
///
/// Returns a model over the formula's variables, or `None` if unsatisfiable.
fn two_sat(clauses: &[Vec<i32>]) -> Option<BTreeMap<u32, bool>> {
    let vars: Vec<u32> = clauses
        .iter()
        .flatten()
        .map(|&lit| var_of(lit))
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();
    let index: HashMap<u32, usize> = vars.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let node = |lit: i32| 2 * index[&var_of(lit)] + usize::from(lit < 0);
    let n = 2 * vars.len();

    let mut graph = vec![Vec::new(); n];
    let mut reverse = vec![Vec::new(); n];
    for clause in clauses {
        let (a, b) = match clause.as_slice() {
            [a] => (*a, *a),
            [a, b] => (*a, *b),
            _ => continue,
        };
        // ¬a → b, ¬b → a
        for (from, to) in [(node(-a), node(b)), (node(-b), node(a))] {
            graph[from].push(to);
            reverse[to].push(from);
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![(start, 0)];
        while let Some((u, i)) = stack.pop() {
            if i < graph[u].len() {
                stack.push((u, i + 1));
                let v = graph[u][i];
                if !visited[v] {
                    visited[v] = true;
                    stack.push((v, 0));
                }
            } else {
                order.push(u);
            }
        }
    }

    // Components come out in topological order of the implication graph.
    let mut component = vec![usize::MAX; n];
    let mut count = 0;
    for &start in order.iter().rev() {
        if component[start] != usize::MAX {
            continue;
        }
        component[start] = count;
        let mut stack = vec![start];
        while let Some(u) = stack.pop() {
            for &v in &reverse[u] {
                if component[v] == usize::MAX {
                    component[v] = count;
                    stack.push(v);
                }
            }
        }
        count += 1;
    }

    let mut model = BTreeMap::new();
    for (i, &var) in vars.iter().enumerate() {
        let (positive, negative) = (component[2 * i], component[2 * i + 1]);
        if positive == negative {
            return None;
        }
        model.insert(var, positive > negative);
    }
    Some(model)
}

/// Finds a set of variables whose flipping turns `clauses` into Horn form.
///
/// Encoded as 2-SAT over one "flip" variable per formula variable: a literal
/// `l` ends up positive iff the flip literal `-l` is true, so "at most one
/// positive literal per clause" becomes the binary clause `(a ∨ b)` for every
/// pair of literals `a`, `b` of a clause.
pub fn horn_renaming(clauses: &[Vec<i32>]) -> Option<BTreeSet<u32>> {
    let mut constraints: Vec<Vec<i32>> = Vec::new();
    for clause in clauses {
        for i in 0..clause.len() {
            for j in (i + 1)..clause.len() {
                constraints.push(vec![clause[i], clause[j]]);
            }
        }
    }
    let model = two_sat(&constraints)?;
    Some(model.into_iter().filter(|&(_, flipped)| flipped).map(|(v, _)| v).collect())
}
