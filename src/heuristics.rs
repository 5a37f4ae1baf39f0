//! Decision and preselection heuristics.
//!
//! The decomposer asks a [`PreselectionHeuristic`] which variables implicit
//! unit propagation should probe, and a [`DecisionHeuristic`] which variable
//! of a cut set to branch on.

use std::collections::BTreeSet;

use crate::incidence::IncidenceGraph;
use crate::solver::SatSolver;
use crate::types::var_of;

pub trait DecisionHeuristic {
    /// Picks the branching variable, preferably from `cut_set`.
    ///
    /// Returns `None` only when the graph has no unassigned variable left.
    fn get_decision_variable(
        &self,
        cut_set: &BTreeSet<u32>,
        graph: &IncidenceGraph,
        solver: Option<&mut dyn SatSolver>,
        assignment: &[i32],
        depth: usize,
    ) -> Option<u32>;
}

pub trait PreselectionHeuristic {
    /// Selects the variables of `restriction` worth probing.
    fn preselect_variables(&self, restriction: &BTreeSet<u32>, graph: &IncidenceGraph, depth: usize) -> Vec<u32>;
}

/// Candidates for a decision: the free cut variables, or every free variable
/// of the graph when the cut set has none.
fn candidates(cut_set: &BTreeSet<u32>, graph: &IncidenceGraph) -> Vec<u32> {
    let free: Vec<u32> = cut_set
        .iter()
        .copied()
        .filter(|&var| graph.occurrences(var) > 0)
        .collect();
    if free.is_empty() {
        graph.variables().into_iter().collect()
    } else {
        free
    }
}

/// Picks the candidate with the highest score; ties go to the smaller variable.
fn best_by<S: PartialOrd>(candidates: Vec<u32>, score: impl Fn(u32) -> S) -> Option<u32> {
    let mut best: Option<(S, u32)> = None;
    for var in candidates {
        let s = score(var);
        if best.as_ref().map_or(true, |(b, _)| s > *b) {
            best = Some((s, var));
        }
    }
    best.map(|(_, var)| var)
}

/// Branches on the cut variable occurring in most residual clauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostOccurrences;

impl DecisionHeuristic for MostOccurrences {
    fn get_decision_variable(
        &self,
        cut_set: &BTreeSet<u32>,
        graph: &IncidenceGraph,
        _solver: Option<&mut dyn SatSolver>,
        _assignment: &[i32],
        _depth: usize,
    ) -> Option<u32> {
        let counts = graph.occurrence_counts();
        best_by(candidates(cut_set, graph), |var| counts.get(&var).copied().unwrap_or(0))
    }
}

/// Two-sided Jeroslow-Wang: every occurrence in a clause of length `n`
/// weighs `2^-n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JeroslowWang;

impl DecisionHeuristic for JeroslowWang {
    fn get_decision_variable(
        &self,
        cut_set: &BTreeSet<u32>,
        graph: &IncidenceGraph,
        _solver: Option<&mut dyn SatSolver>,
        _assignment: &[i32],
        _depth: usize,
    ) -> Option<u32> {
        let clauses = graph.clauses();
        best_by(candidates(cut_set, graph), |var| {
            clauses
                .iter()
                .filter(|clause| clause.iter().any(|&lit| var_of(lit) == var))
                .map(|clause| 0.5f64.powi(clause.len() as i32))
                .sum::<f64>()
        })
    }
}

/// Branches on the smallest free cut variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCutVariable;

impl DecisionHeuristic for FirstCutVariable {
    fn get_decision_variable(
        &self,
        cut_set: &BTreeSet<u32>,
        graph: &IncidenceGraph,
        _solver: Option<&mut dyn SatSolver>,
        _assignment: &[i32],
        _depth: usize,
    ) -> Option<u32> {
        candidates(cut_set, graph).first().copied()
    }
}

/// Probes every free variable of the restriction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllVariables;

impl PreselectionHeuristic for AllVariables {
    fn preselect_variables(&self, restriction: &BTreeSet<u32>, graph: &IncidenceGraph, _depth: usize) -> Vec<u32> {
        restriction.iter().copied().filter(|&var| !graph.is_assigned(var)).collect()
    }
}

/// Probes the `limit` free variables with most occurrences.
#[derive(Debug, Clone, Copy)]
pub struct MostOccurrencesPreselection {
    pub limit: usize,
}

impl PreselectionHeuristic for MostOccurrencesPreselection {
    fn preselect_variables(&self, restriction: &BTreeSet<u32>, graph: &IncidenceGraph, _depth: usize) -> Vec<u32> {
        let counts = graph.occurrence_counts();
        let mut scored: Vec<(usize, u32)> = restriction
            .iter()
            .filter_map(|var| counts.get(var).map(|&count| (count, *var)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(self.limit).map(|(_, var)| var).collect()
    }
}

/// Decision heuristic selected by [`CompilerConfig`][crate::compiler::CompilerConfig].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionScheme {
    #[default]
    MostOccurrences,
    JeroslowWang,
    FirstCutVariable,
}

impl DecisionScheme {
    pub fn build(self) -> Box<dyn DecisionHeuristic> {
        match self {
            DecisionScheme::MostOccurrences => Box::new(MostOccurrences),
            DecisionScheme::JeroslowWang => Box::new(JeroslowWang),
            DecisionScheme::FirstCutVariable => Box::new(FirstCutVariable),
        }
    }
}

/// Preselection heuristic selected by [`CompilerConfig`][crate::compiler::CompilerConfig].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreselectionScheme {
    #[default]
    AllVariables,
    MostOccurrences { limit: usize },
}

impl PreselectionScheme {
    pub fn build(self) -> Box<dyn PreselectionHeuristic> {
        match self {
            PreselectionScheme::AllVariables => Box::new(AllVariables),
            PreselectionScheme::MostOccurrences { limit } => Box::new(MostOccurrencesPreselection { limit }),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn graph() -> IncidenceGraph {
        // 2 occurs three times, 4 occurs in the only short clause
        IncidenceGraph::new(vec![vec![1, 2, 3], vec![-2, 3, 5], vec![2, -5, 1], vec![4, -1]])
    }

    #[test]
    fn test_most_occurrences() {
        let graph = graph();
        let cut = BTreeSet::from([2, 4]);
        let var = MostOccurrences.get_decision_variable(&cut, &graph, None, &[], 0);
        assert_eq!(var, Some(2));
    }

    #[test]
    fn test_jeroslow_wang() {
        let graph = graph();
        // 4 and 5 both score 1/4, the tie goes to 4
        let var = JeroslowWang.get_decision_variable(&BTreeSet::from([4, 5]), &graph, None, &[], 0);
        assert_eq!(var, Some(4));
        let var = JeroslowWang.get_decision_variable(&BTreeSet::from([1, 4]), &graph, None, &[], 0);
        assert_eq!(var, Some(1));
    }

    #[test]
    fn test_first_cut_variable() {
        let mut graph = graph();
        let cut = BTreeSet::from([3, 5]);
        assert_eq!(FirstCutVariable.get_decision_variable(&cut, &graph, None, &[], 0), Some(3));

        let assigned = graph.assign(&[3, 5]);
        // Cut set exhausted: fall back to the free variables.
        assert_eq!(
            FirstCutVariable.get_decision_variable(&cut, &assigned, None, &[], 0),
            Some(1)
        );
    }

    #[test]
    fn test_no_variables() {
        let graph = IncidenceGraph::new(vec![]);
        assert_eq!(MostOccurrences.get_decision_variable(&BTreeSet::new(), &graph, None, &[], 0), None);
    }

    #[test]
    fn test_preselection() {
        let mut graph = graph();
        let restriction = BTreeSet::from([1, 2, 3, 4, 5]);
        let assigned = graph.assign(&[-4]);
        assert_eq!(
            PreselectionScheme::AllVariables.build().preselect_variables(&restriction, &assigned, 0),
            vec![1, 2, 3, 5]
        );
        let top = PreselectionScheme::MostOccurrences { limit: 2 }
            .build()
            .preselect_variables(&restriction, &assigned, 0);
        assert_eq!(top, vec![1, 2]);
    }
}
