//! Compilation of a whole CNF formula.
//!
//! ```
//! use dnnf_rs::cnf::Cnf;
//! use dnnf_rs::compiler::{Compiler, CompilerConfig};
//! use num_bigint::BigUint;
//!
//! // (x1 ∨ x2) ∧ (¬x1 ∨ x3) over 4 variables
//! let cnf = Cnf::from_clauses(4, [vec![1, 2], vec![-1, 3]]);
//! let compiler = Compiler::new(CompilerConfig::default()).unwrap();
//! let compilation = compiler.compile(&cnf).unwrap();
//! assert_eq!(compilation.model_count().unwrap(), BigUint::from(8u32));
//! ```

use log::info;
use num_bigint::BigUint;

use crate::cache::CachingScheme;
use crate::circuit::Circuit;
use crate::cnf::Cnf;
use crate::decomposer::{Decomposer, Statistics};
use crate::error::{CircuitError, CompileError};
use crate::heuristics::{DecisionScheme, PreselectionScheme};
use crate::incidence::IncidenceGraph;
use crate::partition::PartitionConfig;
use crate::solver::{SatSolver, VarisatSolver};
use crate::types::NodeId;

/// How implied literals are detected at each recursion level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImpliedLiteralMode {
    #[default]
    UnitPropagation,
    /// One round of failed-literal probing over the preselected variables.
    ImplicitUnitPropagation,
    /// Failed-literal probing repeated until nothing changes.
    IterativeImplicitUnitPropagation,
    /// All backbone literals. Needs the SAT solver.
    Backbone,
}

/// How a cached node is reused for an isomorphic component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitMode {
    /// Through a Mapping node over the cached node.
    #[default]
    Mapping,
    /// Through a renamed structural copy.
    Copy,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Use the SAT solver for satisfiability checks and models. Without it,
    /// unit propagation stands in for the satisfiability check.
    pub use_solver: bool,
    pub implied_literals: ImpliedLiteralMode,
    /// Component caching; `None` disables it.
    pub caching: Option<CachingScheme>,
    pub circuit_mode: CircuitMode,
    pub two_cnf_leaves: bool,
    pub horn_leaves: bool,
    /// Base classes are only recognized up to this many clauses.
    pub base_class_max_clauses: usize,
    /// Components of formulas with more clauses are copied into fresh graphs
    /// instead of being restricted in place.
    pub materialize_above: usize,
    /// Fraction of the inherited cut set that may be eliminated before a new
    /// cut set is computed.
    pub cut_set_threshold: f64,
    pub decision: DecisionScheme,
    pub preselection: PreselectionScheme,
    pub partition: PartitionConfig,
    /// Smooth the circuit after compilation.
    pub smooth: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            use_solver: true,
            implied_literals: ImpliedLiteralMode::default(),
            caching: Some(CachingScheme::default()),
            circuit_mode: CircuitMode::default(),
            two_cnf_leaves: true,
            horn_leaves: true,
            base_class_max_clauses: 64,
            materialize_above: 64,
            cut_set_threshold: 0.5,
            decision: DecisionScheme::default(),
            preselection: PreselectionScheme::default(),
            partition: PartitionConfig::default(),
            smooth: true,
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<(), CompileError> {
        if !self.use_solver && self.implied_literals == ImpliedLiteralMode::Backbone {
            return Err(CompileError::InvalidConfiguration(
                "backbone computation requires the SAT solver".into(),
            ));
        }
        let imbalance = self.partition.imbalance;
        if !(imbalance > 0.0 && imbalance < 0.5) {
            return Err(CompileError::InvalidConfiguration(format!(
                "imbalance must lie in (0, 0.5), got {}",
                imbalance
            )));
        }
        if !(0.0..=1.0).contains(&self.cut_set_threshold) {
            return Err(CompileError::InvalidConfiguration(format!(
                "cut set threshold must lie in [0, 1], got {}",
                self.cut_set_threshold
            )));
        }
        Ok(())
    }
}

/// Result of compiling one formula.
#[derive(Debug)]
pub struct Compilation {
    pub circuit: Circuit,
    pub root: NodeId,
    pub num_vars: u32,
    pub statistics: Statistics,
}

impl Compilation {
    /// Number of models over all variables of the formula.
    pub fn model_count(&self) -> Result<BigUint, CircuitError> {
        self.model_count_under(&[])
    }

    pub fn model_count_under(&self, assumption: &[i32]) -> Result<BigUint, CircuitError> {
        self.circuit.model_count_over(self.root, assumption, self.num_vars)
    }

    pub fn is_satisfiable(&self) -> Result<bool, CircuitError> {
        self.circuit.is_satisfiable(self.root, &[], &[], true)
    }
}

pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Result<Self, CompileError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(&self, cnf: &Cnf) -> Result<Compilation, CompileError> {
        let solver: Option<Box<dyn SatSolver>> = if self.config.use_solver {
            Some(Box::new(VarisatSolver::new(cnf)))
        } else {
            None
        };
        let mut decomposer = Decomposer::new(&self.config, solver);
        let mut graph = IncidenceGraph::new(cnf.clauses().to_vec());
        let root = decomposer.compile(&mut graph)?;

        let (cache_entries, cache_hits, cache_misses) = decomposer
            .cache()
            .map_or((0, 0, 0), |cache| (cache.len(), cache.hits(), cache.misses()));
        let cut_set_cache_hits = decomposer.partitioning().cache_hits();
        let (mut circuit, statistics) = decomposer.into_parts();
        if self.config.smooth {
            circuit.smooth();
        }
        circuit.set_root(root)?;

        info!(
            "compiled {} variables ({} occurring), {} clauses into {} nodes (size {}, {})",
            cnf.num_vars(),
            cnf.occurring_variables().len(),
            cnf.num_clauses(),
            circuit.node_count(),
            circuit.size(),
            circuit
                .circuit_type()
                .map_or_else(|| "untyped".to_string(), |kind| kind.to_string())
        );
        info!(
            "{} recursions, {} decisions, {} splits, {} unsatisfiable sub-formulas",
            statistics.recursions, statistics.decisions, statistics.splits, statistics.unsatisfiable
        );
        info!(
            "component cache: {} entries, {} hits, {} misses; cut set cache: {} hits",
            cache_entries, cache_hits, cache_misses, cut_set_cache_hits
        );

        Ok(Compilation {
            circuit,
            root,
            num_vars: cnf.num_vars(),
            statistics,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::types::CircuitType;

    #[test]
    fn test_validate() {
        assert!(CompilerConfig::default().validate().is_ok());

        let invalid = [
            CompilerConfig {
                use_solver: false,
                implied_literals: ImpliedLiteralMode::Backbone,
                ..CompilerConfig::default()
            },
            CompilerConfig {
                partition: PartitionConfig {
                    imbalance: 0.5,
                    ..PartitionConfig::default()
                },
                ..CompilerConfig::default()
            },
            CompilerConfig {
                cut_set_threshold: 1.5,
                ..CompilerConfig::default()
            },
        ];
        for config in invalid {
            assert!(matches!(Compiler::new(config), Err(CompileError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn test_compile() {
        let cnf = Cnf::from_clauses(3, [vec![1, 2], vec![-1, 3], vec![-2, -3]]);
        let compilation = Compiler::new(CompilerConfig::default()).unwrap().compile(&cnf).unwrap();
        assert_eq!(compilation.model_count().unwrap(), BigUint::from(2u32));
        assert_eq!(compilation.model_count_under(&[1]).unwrap(), BigUint::from(1u32));
        assert!(compilation.is_satisfiable().unwrap());
        assert_eq!(compilation.circuit.root(), Some(compilation.root));
        assert!(compilation.circuit.is_smooth());
    }

    #[test]
    fn test_compile_unsatisfiable() {
        let cnf = Cnf::from_clauses(2, [vec![1], vec![-1, 2], vec![-2]]);
        let compilation = Compiler::new(CompilerConfig::default()).unwrap().compile(&cnf).unwrap();
        assert_eq!(compilation.model_count().unwrap(), BigUint::from(0u32));
        assert!(!compilation.is_satisfiable().unwrap());
    }

    #[test]
    fn test_compile_is_sd_bdmc() {
        let cnf = Cnf::from_clauses(5, [vec![1, 2, 3], vec![-1, 4], vec![-2, 5, -4], vec![3, -5]]);
        let config = CompilerConfig {
            two_cnf_leaves: false,
            horn_leaves: false,
            ..CompilerConfig::default()
        };
        let compilation = Compiler::new(config).unwrap().compile(&cnf).unwrap();
        assert_eq!(compilation.circuit.circuit_type(), Some(CircuitType::SdBdmc));
    }
}
