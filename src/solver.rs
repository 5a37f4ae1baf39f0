//! SAT solving collaborators.
//!
//! The decomposer talks to a [`SatSolver`] through five queries, each taking a
//! partial assignment as a list of DIMACS literals and returning `None` when
//! the formula is unsatisfiable under that assignment.
//!
//! [`VarisatSolver`] answers model queries with an incremental `varisat`
//! solver and propagation queries with a [`Propagator`]. The propagator alone
//! is also what the decomposer falls back to when the solver is disabled.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver};

use crate::cnf::Cnf;
use crate::error::CompileError;
use crate::types::var_of;

pub trait SatSolver {
    /// Checks whether the formula has a model extending `assignment`.
    fn is_satisfiable(&mut self, assignment: &[i32]) -> Result<bool, CompileError>;

    /// Returns a full model extending `assignment`, if any.
    fn get_model(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError>;

    /// Returns the literals implied by unit propagation (excluding `assignment` itself).
    fn unit_propagation(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError>;

    /// Failed-literal probing over `variables`.
    ///
    /// Returns every literal forced by propagation or probing, keyed by its
    /// variable. With `iterate` the probing repeats until a fixpoint.
    fn implicit_unit_propagation(
        &mut self,
        assignment: &[i32],
        variables: &[u32],
        iterate: bool,
    ) -> Result<Option<BTreeMap<u32, i32>>, CompileError>;

    /// Returns the literals true in every model extending `assignment`.
    fn get_backbone_literals(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError>;
}

/// Unit propagation over a fixed clause list.
#[derive(Debug, Clone)]
pub struct Propagator {
    clauses: Vec<Vec<i32>>,
    occurrences: HashMap<i32, Vec<usize>>,
}

impl Propagator {
    pub fn new(clauses: impl IntoIterator<Item = Vec<i32>>) -> Self {
        let clauses: Vec<Vec<i32>> = clauses.into_iter().collect();
        let mut occurrences: HashMap<i32, Vec<usize>> = HashMap::new();
        for (i, clause) in clauses.iter().enumerate() {
            for &lit in clause {
                occurrences.entry(lit).or_default().push(i);
            }
        }
        Self { clauses, occurrences }
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// Propagates `assumption` to a fixpoint.
    ///
    /// Returns the newly implied literals in propagation order, or `None` on a
    /// conflict (including a complementary pair inside `assumption`).
    pub fn propagate(&self, assumption: &[i32]) -> Option<Vec<i32>> {
        let mut values: HashMap<u32, bool> = HashMap::new();
        let mut trail: Vec<i32> = Vec::new();

        for &lit in assumption {
            match values.get(&var_of(lit)) {
                Some(&value) if value != (lit > 0) => return None,
                Some(_) => {}
                None => {
                    values.insert(var_of(lit), lit > 0);
                    trail.push(lit);
                }
            }
        }
        let assumed = trail.len();

        for i in 0..self.clauses.len() {
            self.check_clause(i, &mut values, &mut trail)?;
        }

        let mut head = 0;
        while head < trail.len() {
            let lit = trail[head];
            head += 1;
            if let Some(clauses) = self.occurrences.get(&-lit) {
                for &i in clauses {
                    self.check_clause(i, &mut values, &mut trail)?;
                }
            }
        }

        trail.drain(..assumed);
        Some(trail)
    }

    fn check_clause(&self, index: usize, values: &mut HashMap<u32, bool>, trail: &mut Vec<i32>) -> Option<()> {
        let mut unassigned = None;
        let mut count = 0;
        for &lit in &self.clauses[index] {
            match values.get(&var_of(lit)) {
                Some(&value) if value == (lit > 0) => return Some(()),
                Some(_) => {}
                None => {
                    count += 1;
                    unassigned = Some(lit);
                }
            }
        }
        match (count, unassigned) {
            (0, _) => None,
            (1, Some(lit)) => {
                values.insert(var_of(lit), lit > 0);
                trail.push(lit);
                Some(())
            }
            _ => Some(()),
        }
    }

    /// Failed-literal probing, see [`SatSolver::implicit_unit_propagation`].
    pub fn probe(&self, assumption: &[i32], variables: &[u32], iterate: bool) -> Option<BTreeMap<u32, i32>> {
        let mut implied: BTreeMap<u32, i32> = BTreeMap::new();
        let mut current: Vec<i32> = assumption.to_vec();
        for lit in self.propagate(&current)? {
            implied.insert(var_of(lit), lit);
            current.push(lit);
        }

        loop {
            let mut changed = false;
            for &var in variables {
                if current.iter().any(|&lit| var_of(lit) == var) {
                    continue;
                }
                let forced = {
                    let mut probe = current.clone();
                    probe.push(var as i32);
                    let positive = self.propagate(&probe);
                    let last = probe.len() - 1;
                    probe[last] = -(var as i32);
                    let negative = self.propagate(&probe);
                    match (positive, negative) {
                        (None, None) => return None,
                        (None, Some(_)) => Some(-(var as i32)),
                        (Some(_), None) => Some(var as i32),
                        (Some(_), Some(_)) => None,
                    }
                };
                if let Some(lit) = forced {
                    current.push(lit);
                    implied.insert(var, lit);
                    for consequence in self.propagate(&current)? {
                        implied.insert(var_of(consequence), consequence);
                        current.push(consequence);
                    }
                    changed = true;
                }
            }
            if !iterate || !changed {
                break;
            }
        }

        Some(implied)
    }
}

/// [`SatSolver`] backed by the incremental `varisat` CDCL solver.
pub struct VarisatSolver {
    solver: Solver<'static>,
    propagator: Propagator,
    num_vars: u32,
}

impl VarisatSolver {
    pub fn new(cnf: &Cnf) -> Self {
        let mut formula = CnfFormula::new();
        formula.set_var_count(cnf.num_vars() as usize);
        for clause in cnf.clauses() {
            let lits: Vec<Lit> = clause.iter().map(|&lit| Lit::from_dimacs(lit as isize)).collect();
            formula.add_clause(&lits);
        }
        let mut solver = Solver::new();
        solver.add_formula(&formula);

        Self {
            solver,
            propagator: Propagator::new(cnf.clauses().iter().cloned()),
            num_vars: cnf.num_vars(),
        }
    }

    fn solve_under(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError> {
        if assignment.iter().any(|lit| assignment.contains(&-lit)) {
            return Ok(None);
        }
        let assumptions: Vec<Lit> = assignment
            .iter()
            .filter(|&&lit| var_of(lit) <= self.num_vars)
            .map(|&lit| Lit::from_dimacs(lit as isize))
            .collect();
        self.solver.assume(&assumptions);
        let satisfiable = self
            .solver
            .solve()
            .map_err(|err| CompileError::Solver(err.to_string()))?;
        if !satisfiable {
            return Ok(None);
        }
        let model = self
            .solver
            .model()
            .ok_or_else(|| CompileError::Solver("satisfiable call produced no model".into()))?;
        Ok(Some(model.into_iter().map(|lit| lit.to_dimacs() as i32).collect()))
    }
}

impl SatSolver for VarisatSolver {
    fn is_satisfiable(&mut self, assignment: &[i32]) -> Result<bool, CompileError> {
        Ok(self.solve_under(assignment)?.is_some())
    }

    fn get_model(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError> {
        self.solve_under(assignment)
    }

    fn unit_propagation(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError> {
        Ok(self.propagator.propagate(assignment))
    }

    fn implicit_unit_propagation(
        &mut self,
        assignment: &[i32],
        variables: &[u32],
        iterate: bool,
    ) -> Result<Option<BTreeMap<u32, i32>>, CompileError> {
        Ok(self.propagator.probe(assignment, variables, iterate))
    }

    fn get_backbone_literals(&mut self, assignment: &[i32]) -> Result<Option<Vec<i32>>, CompileError> {
        let model = match self.solve_under(assignment)? {
            Some(model) => model,
            None => return Ok(None),
        };

        let mut candidates: Vec<i32> = model
            .into_iter()
            .filter(|&lit| !assignment.iter().any(|&a| var_of(a) == var_of(lit)))
            .collect();
        let mut backbone = Vec::new();
        let mut probe = assignment.to_vec();

        while let Some(lit) = candidates.pop() {
            probe.push(-lit);
            match self.solve_under(&probe)? {
                None => backbone.push(lit),
                Some(other) => {
                    let other: HashSet<i32> = other.into_iter().collect();
                    candidates.retain(|c| other.contains(c));
                }
            }
            probe.pop();
        }

        debug!("backbone under {} assumptions: {} literals", assignment.len(), backbone.len());
        Ok(Some(backbone))
    }
}
