//! Compiles a DIMACS CNF file and reports its model count.
//!
//! Run with:
//! ```bash
//! cargo run --release --example compile -- formula.cnf --nnf formula.nnf
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use dnnf_rs::cache::CachingScheme;
use dnnf_rs::cnf::Cnf;
use dnnf_rs::compiler::{CircuitMode, Compiler, CompilerConfig, ImpliedLiteralMode};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Implied {
    Unit,
    Implicit,
    Iterative,
    Backbone,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Caching {
    None,
    Exact,
    Renaming,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Compile a CNF formula into a d-DNNF circuit")]
struct Cli {
    /// Input formula in DIMACS CNF format
    input: PathBuf,

    /// Write the circuit in NNF format to this file
    #[arg(long)]
    nnf: Option<PathBuf>,

    /// Write the circuit in DOT format to this file
    #[arg(long)]
    dot: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "unit")]
    implied: Implied,

    #[arg(long, value_enum, default_value = "renaming")]
    caching: Caching,

    /// Reuse cached components through copies instead of mapping nodes
    #[arg(long)]
    copy: bool,

    /// Disable the SAT solver
    #[arg(long)]
    no_solver: bool,

    /// Disable 2-CNF and Horn leaves
    #[arg(long)]
    no_leaves: bool,

    #[arg(long, default_value = "info")]
    log_level: simplelog::LevelFilter,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    simplelog::TermLogger::init(
        cli.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let cnf = Cnf::from_dimacs(BufReader::new(File::open(&cli.input)?))?;
    println!("variables = {}, clauses = {}", cnf.num_vars(), cnf.num_clauses());

    let config = CompilerConfig {
        use_solver: !cli.no_solver,
        implied_literals: match cli.implied {
            Implied::Unit => ImpliedLiteralMode::UnitPropagation,
            Implied::Implicit => ImpliedLiteralMode::ImplicitUnitPropagation,
            Implied::Iterative => ImpliedLiteralMode::IterativeImplicitUnitPropagation,
            Implied::Backbone => ImpliedLiteralMode::Backbone,
        },
        caching: match cli.caching {
            Caching::None => None,
            Caching::Exact => Some(CachingScheme::Exact),
            Caching::Renaming => Some(CachingScheme::default()),
        },
        circuit_mode: if cli.copy { CircuitMode::Copy } else { CircuitMode::Mapping },
        two_cnf_leaves: !cli.no_leaves,
        horn_leaves: !cli.no_leaves,
        ..CompilerConfig::default()
    };

    let time_compile = Instant::now();
    let mut compilation = Compiler::new(config)?.compile(&cnf)?;
    println!("compiled in {:.3} s", time_compile.elapsed().as_secs_f64());
    println!("statistics = {:?}", compilation.statistics);
    println!(
        "nodes = {}, edges = {}, size = {}",
        compilation.circuit.node_count(),
        compilation.circuit.edge_count(),
        compilation.circuit.size()
    );

    let time_count = Instant::now();
    let count = compilation.model_count()?;
    println!("model count = {} ({:.3} s)", count, time_count.elapsed().as_secs_f64());

    if let Some(path) = &cli.dot {
        std::fs::write(path, compilation.circuit.to_dot(&[compilation.root])?)?;
        println!("DOT written to {}", path.display());
    }

    if let Some(path) = &cli.nnf {
        compilation.circuit.expand_mappings()?;
        compilation.circuit.expand_leaves()?;
        compilation.circuit.save(path)?;
        println!("NNF written to {}", path.display());
    }

    Ok(())
}
