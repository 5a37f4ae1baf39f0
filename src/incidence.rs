//! Live clause/variable incidence view of a residual formula.
//!
//! An [`IncidenceGraph`] holds the clauses of a (sub)formula together with
//! the partial assignment the decomposer has built so far. Mutations go
//! through scoped operations returning a [`GraphGuard`]; dropping the guard
//! undoes exactly the changes made through it, in reverse order.
//!
//! ```
//! use dnnf_rs::incidence::IncidenceGraph;
//!
//! let mut graph = IncidenceGraph::new(vec![vec![1, 2], vec![-1, 3]]);
//! {
//!     let assigned = graph.assign(&[1]);
//!     assert_eq!(assigned.clauses(), vec![vec![3]]);
//! }
//! assert_eq!(graph.num_clauses(), 2);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};

use crate::leaf::horn_renaming;
use crate::types::var_of;

#[derive(Debug, Clone, Copy)]
enum Change {
    Deactivated(usize),
    Assigned(u32),
    Fixed,
}

#[derive(Debug, Clone)]
pub struct IncidenceGraph {
    clauses: Vec<Vec<i32>>,
    watched: HashMap<u32, Vec<usize>>,
    active: BTreeSet<usize>,
    values: HashMap<u32, bool>,
    trail: Vec<i32>,
    changes: Vec<Change>,
}

impl IncidenceGraph {
    pub fn new(clauses: Vec<Vec<i32>>) -> Self {
        let mut watched: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, clause) in clauses.iter().enumerate() {
            for &lit in clause {
                watched.entry(var_of(lit)).or_default().push(i);
            }
        }
        let active = (0..clauses.len()).collect();
        Self {
            clauses,
            watched,
            active,
            values: HashMap::new(),
            trail: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// The partial assignment leading to this graph, in assignment order.
    pub fn assignment(&self) -> &[i32] {
        &self.trail
    }

    pub fn is_assigned(&self, var: u32) -> bool {
        self.values.contains_key(&var)
    }

    /// Assigns literals: clauses they satisfy become inactive and their
    /// variables disappear from the remaining clauses.
    ///
    /// Literals whose variable is already assigned are ignored.
    pub fn assign(&mut self, literals: &[i32]) -> GraphGuard<'_> {
        let mark = self.changes.len();
        for &lit in literals {
            let var = var_of(lit);
            if self.values.contains_key(&var) {
                continue;
            }
            self.values.insert(var, lit > 0);
            self.trail.push(lit);
            self.changes.push(Change::Assigned(var));
            if let Some(indices) = self.watched.get(&var) {
                for &i in indices {
                    if self.clauses[i].contains(&lit) && self.active.remove(&i) {
                        self.changes.push(Change::Deactivated(i));
                    }
                }
            }
        }
        GraphGuard { graph: self, mark }
    }

    /// Extends the recorded assignment without touching the clauses.
    ///
    /// Used for variables that do not occur in this graph, e.g. the variables
    /// of sibling components fixed to their value in a known model.
    pub fn fix(&mut self, literals: &[i32]) -> GraphGuard<'_> {
        let mark = self.changes.len();
        for &lit in literals {
            let var = var_of(lit);
            if self.values.contains_key(&var) || self.trail.iter().any(|&l| var_of(l) == var) {
                continue;
            }
            self.trail.push(lit);
            self.changes.push(Change::Fixed);
        }
        GraphGuard { graph: self, mark }
    }

    /// Deactivates every clause that has no unassigned variable in `variables`.
    ///
    /// Clauses with an empty residual stay active.
    pub fn restrict(&mut self, variables: &BTreeSet<u32>) -> GraphGuard<'_> {
        let mark = self.changes.len();
        let outside: Vec<usize> = self
            .active
            .iter()
            .copied()
            .filter(|&i| {
                let free: Vec<u32> = self.residual(i).into_iter().map(var_of).collect();
                !free.is_empty() && !free.iter().any(|v| variables.contains(v))
            })
            .collect();
        for i in outside {
            self.active.remove(&i);
            self.changes.push(Change::Deactivated(i));
        }
        GraphGuard { graph: self, mark }
    }

    fn rollback(&mut self, mark: usize) {
        while self.changes.len() > mark {
            match self.changes.pop() {
                Some(Change::Deactivated(i)) => {
                    self.active.insert(i);
                }
                Some(Change::Assigned(var)) => {
                    self.values.remove(&var);
                    self.trail.pop();
                }
                Some(Change::Fixed) => {
                    self.trail.pop();
                }
                None => break,
            }
        }
    }

    /// Materialises the part of the graph touching `variables` as a fresh
    /// graph carrying the same assignment.
    pub fn subgraph(&self, variables: &BTreeSet<u32>) -> IncidenceGraph {
        let clauses = self
            .residual_clauses()
            .filter(|clause| clause.iter().any(|&lit| variables.contains(&var_of(lit))))
            .collect();
        let mut graph = IncidenceGraph::new(clauses);
        graph.trail = self.trail.clone();
        graph
    }

    fn residual(&self, index: usize) -> Vec<i32> {
        self.clauses[index]
            .iter()
            .copied()
            .filter(|&lit| !self.values.contains_key(&var_of(lit)))
            .collect()
    }

    fn residual_clauses(&self) -> impl Iterator<Item = Vec<i32>> + '_ {
        self.active.iter().map(move |&i| self.residual(i))
    }

    /// Active clauses with assigned literals removed.
    pub fn clauses(&self) -> Vec<Vec<i32>> {
        self.residual_clauses().collect()
    }

    pub fn num_clauses(&self) -> usize {
        self.active.len()
    }

    /// Unassigned variables occurring in an active clause.
    pub fn variables(&self) -> BTreeSet<u32> {
        self.residual_clauses().flatten().map(var_of).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn has_empty_clause(&self) -> bool {
        self.active
            .iter()
            .any(|&i| self.clauses[i].iter().all(|&lit| self.values.contains_key(&var_of(lit))))
    }

    /// Number of active clauses containing the unassigned variable `var`.
    pub fn occurrences(&self, var: u32) -> usize {
        if self.values.contains_key(&var) {
            return 0;
        }
        self.watched
            .get(&var)
            .map_or(0, |indices| indices.iter().filter(|i| self.active.contains(i)).count())
    }

    /// Occurrence counts of every unassigned variable.
    pub fn occurrence_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for clause in self.residual_clauses() {
            for lit in clause {
                *counts.entry(var_of(lit)).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Connected components of the residual variable/clause incidence graph.
    pub fn components(&self) -> Vec<BTreeSet<u32>> {
        let clauses = self.clauses();
        let variables: Vec<u32> = self.variables().into_iter().collect();
        let index: HashMap<u32, usize> = variables.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        let mut parent: Vec<usize> = (0..variables.len()).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for clause in &clauses {
            let mut vars = clause.iter().map(|&lit| index[&var_of(lit)]);
            if let Some(first) = vars.next() {
                for other in vars {
                    let a = find(&mut parent, first);
                    let b = find(&mut parent, other);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, BTreeSet<u32>> = BTreeMap::new();
        for (i, &var) in variables.iter().enumerate() {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().insert(var);
        }
        groups.into_values().collect()
    }

    pub fn is_two_cnf(&self) -> bool {
        self.residual_clauses().all(|clause| clause.len() <= 2)
    }

    /// Variables to flip so the residual formula becomes Horn, if possible.
    pub fn renamable_horn_renaming(&self) -> Option<BTreeSet<u32>> {
        horn_renaming(&self.clauses())
    }
}

/// Scoped modification of an [`IncidenceGraph`], undone on drop.
pub struct GraphGuard<'a> {
    graph: &'a mut IncidenceGraph,
    mark: usize,
}

impl Deref for GraphGuard<'_> {
    type Target = IncidenceGraph;

    fn deref(&self) -> &Self::Target {
        self.graph
    }
}

impl DerefMut for GraphGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.graph
    }
}

impl Drop for GraphGuard<'_> {
    fn drop(&mut self) {
        self.graph.rollback(self.mark);
    }
}
