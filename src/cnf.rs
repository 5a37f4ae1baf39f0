//! CNF formulas as compiler input.

use std::collections::BTreeSet;
use std::io;

use varisat::dimacs::DimacsParser;

use crate::error::CompileError;
use crate::types::var_of;

/// A formula in conjunctive normal form over variables `1..=num_vars`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cnf {
    num_vars: u32,
    clauses: Vec<Vec<i32>>,
}

impl Cnf {
    pub fn new(num_vars: u32) -> Self {
        Self {
            num_vars,
            clauses: Vec::new(),
        }
    }

    /// Reads a formula in DIMACS CNF format.
    pub fn from_dimacs(input: impl io::Read) -> Result<Self, CompileError> {
        let formula = DimacsParser::parse(input).map_err(|err| CompileError::Dimacs(err.to_string()))?;
        let mut cnf = Cnf::new(formula.var_count() as u32);
        for clause in formula.iter() {
            cnf.add_clause(clause.iter().map(|lit| lit.to_dimacs() as i32));
        }
        Ok(cnf)
    }

    pub fn from_clauses<C>(num_vars: u32, clauses: impl IntoIterator<Item = C>) -> Self
    where
        C: IntoIterator<Item = i32>,
    {
        let mut cnf = Cnf::new(num_vars);
        for clause in clauses {
            cnf.add_clause(clause);
        }
        cnf
    }

    /// Appends a clause.
    ///
    /// Duplicate literals are merged and tautological clauses are dropped.
    /// The variable count grows to cover the clause.
    pub fn add_clause(&mut self, literals: impl IntoIterator<Item = i32>) {
        let literals: BTreeSet<i32> = literals.into_iter().collect();
        assert!(!literals.contains(&0), "Literal 0 is not allowed");
        if literals.iter().any(|lit| literals.contains(&-lit)) {
            return;
        }
        for &lit in &literals {
            self.num_vars = self.num_vars.max(var_of(lit));
        }
        self.clauses.push(literals.into_iter().collect());
    }

    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.clauses
    }

    /// Variables that occur in at least one clause.
    pub fn occurring_variables(&self) -> BTreeSet<u32> {
        self.clauses.iter().flatten().map(|&lit| var_of(lit)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_clause_normalizes() {
        let mut cnf = Cnf::new(2);
        cnf.add_clause([2, 1, 2]);
        cnf.add_clause([3, -3]);
        cnf.add_clause([-5]);
        assert_eq!(cnf.clauses(), &[vec![1, 2], vec![-5]]);
        assert_eq!(cnf.num_vars(), 5);
        assert_eq!(cnf.occurring_variables(), BTreeSet::from([1, 2, 5]));
    }

    #[test]
    fn test_from_dimacs() {
        let input = b"c example\np cnf 4 2\n1 -2 0\n3 4 0\n";
        let cnf = Cnf::from_dimacs(&input[..]).unwrap();
        assert_eq!(cnf.num_vars(), 4);
        assert_eq!(cnf.clauses(), &[vec![-2, 1], vec![3, 4]]);
    }

    #[test]
    fn test_from_dimacs_malformed() {
        let input = b"p cnf 2 1\n1 x 0\n";
        assert!(matches!(Cnf::from_dimacs(&input[..]), Err(CompileError::Dimacs(_))));
    }
}
