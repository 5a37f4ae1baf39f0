//! # dnnf-rs: Knowledge Compilation of CNF Formulas
//!
//! **`dnnf-rs`** compiles propositional formulas in conjunctive normal form into
//! **decomposable, deterministic negation normal form circuits** (akin to d-DNNF),
//! which answer satisfiability, clausal entailment, model counting and
//! minimum-cardinality queries in time linear in the circuit size.
//!
//! ## What is a d-DNNF circuit?
//!
//! A circuit is a directed acyclic graph of AND and OR gates over literal and constant leaves.
//! It is **decomposable** when the children of every AND gate share no variable,
//! **deterministic** when no two children of an OR gate are satisfied by the same model,
//! and **smooth** when all children of an OR gate mention the same variables.
//! Together these properties make model counting a single bottom-up pass.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All nodes live in a [`Circuit`][crate::circuit::Circuit], which hash-conses
//!   structurally identical nodes and keeps the structural properties of every node up to date.
//! - **Component Decomposition**: The [`Decomposer`][crate::decomposer::Decomposer] splits formulas into independent
//!   components, branches on variables of balanced hypergraph cut sets and reuses isomorphic components through
//!   renaming-aware caching.
//! - **Tractable Leaves**: 2-CNF and renamable Horn sub-formulas become leaves instead of being decomposed further.
//! - **1-Based Variables**: Variables and literals follow the DIMACS conventions.
//!
//! ## Basic Usage
//!
//! ```rust
//! use dnnf_rs::cnf::Cnf;
//! use dnnf_rs::compiler::{Compiler, CompilerConfig};
//! use num_bigint::BigUint;
//!
//! // 1. Build (or parse) a formula: (x1 ∨ x2) ∧ (¬x2 ∨ x3)
//! let cnf = Cnf::from_clauses(3, [vec![1, 2], vec![-2, 3]]);
//!
//! // 2. Compile it
//! let compiler = Compiler::new(CompilerConfig::default()).unwrap();
//! let compilation = compiler.compile(&cnf).unwrap();
//!
//! // 3. Query the circuit
//! assert_eq!(compilation.model_count().unwrap(), BigUint::from(4u32));
//! let circuit = &compilation.circuit;
//! assert!(circuit.entails_clause(compilation.root, &[1, 3]).unwrap());
//! ```
//!
//! ## Core Components
//!
//! - **[`circuit`]**: The [`Circuit`][crate::circuit::Circuit] node store, its factories and mutations.
//! - **[`query`]**: Satisfiability, model counting and minimum default cardinality.
//! - **[`decomposer`]** and **[`compiler`]**: The compilation engine and its configuration.
//! - **[`io`]** and **[`dot`]**: The NNF text format and Graphviz export.

pub mod cache;
pub mod circuit;
pub mod cnf;
pub mod compiler;
pub mod decomposer;
pub mod dot;
pub mod error;
pub mod heuristics;
pub mod incidence;
pub mod io;
pub mod leaf;
pub mod node;
pub mod partition;
pub mod query;
pub mod solver;
pub mod types;
