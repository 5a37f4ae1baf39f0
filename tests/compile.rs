//! End-to-end compilation tests.
//!
//! Every compiled circuit is checked against brute-force enumeration.

use dnnf_rs::cache::CachingScheme;
use dnnf_rs::circuit::Circuit;
use dnnf_rs::cnf::Cnf;
use dnnf_rs::compiler::{CircuitMode, Compilation, Compiler, CompilerConfig, ImpliedLiteralMode};
use dnnf_rs::heuristics::{DecisionScheme, PreselectionScheme};
use dnnf_rs::partition::{CutSetCachePolicy, PartitionConfig};
use num_bigint::BigUint;

// ─── Helpers ───────────────────────────────────────────────────────────────────

fn brute_force(cnf: &Cnf, assumption: &[i32]) -> BigUint {
    let n = cnf.num_vars();
    let value = |bits: u64, lit: i32| (bits >> (lit.unsigned_abs() - 1)) & 1 == u64::from(lit > 0);
    let count = (0..1u64 << n)
        .filter(|&bits| assumption.iter().all(|&lit| value(bits, lit)))
        .filter(|&bits| cnf.clauses().iter().all(|clause| clause.iter().any(|&lit| value(bits, lit))))
        .count();
    BigUint::from(count)
}

/// Deterministic xorshift generator, so the corpus is stable.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_cnf(rng: &mut Rng, num_vars: u32, num_clauses: usize, width: usize) -> Cnf {
    let mut cnf = Cnf::new(num_vars);
    for _ in 0..num_clauses {
        let clause: Vec<i32> = (0..width)
            .map(|_| {
                let var = rng.below(u64::from(num_vars)) as i32 + 1;
                if rng.below(2) == 0 {
                    var
                } else {
                    -var
                }
            })
            .collect();
        cnf.add_clause(clause);
    }
    cnf
}

fn corpus() -> Vec<Cnf> {
    let mut corpus = vec![
        Cnf::from_clauses(3, [vec![1, 2], vec![-1, 3]]),
        Cnf::from_clauses(4, [vec![1, 2, 3, 4]]),
        Cnf::from_clauses(2, [vec![1, 2], vec![-1, 2], vec![1, -2], vec![-1, -2]]),
        Cnf::from_clauses(5, [vec![1], vec![-1, 2], vec![-2, 3, 4], vec![-4, 5]]),
        // Two isomorphic components
        Cnf::from_clauses(
            8,
            [vec![1, 2, 3], vec![-1, -2], vec![-3, 4], vec![5, 6, 7], vec![-5, -6], vec![-7, 8]],
        ),
        // Pigeon hole 3 into 2: unsatisfiable
        Cnf::from_clauses(
            6,
            [
                vec![1, 2],
                vec![3, 4],
                vec![5, 6],
                vec![-1, -3],
                vec![-1, -5],
                vec![-3, -5],
                vec![-2, -4],
                vec![-2, -6],
                vec![-4, -6],
            ],
        ),
        Cnf::new(3),
    ];

    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
    for num_vars in [6, 8, 10, 12] {
        for ratio in [2, 3, 4] {
            corpus.push(random_cnf(&mut rng, num_vars, ratio * num_vars as usize, 3));
        }
    }
    corpus
}

fn compile(cnf: &Cnf, config: &CompilerConfig) -> Compilation {
    Compiler::new(config.clone()).unwrap().compile(cnf).unwrap()
}

fn assert_sound(config: &CompilerConfig) {
    for (i, cnf) in corpus().iter().enumerate() {
        let compilation = compile(cnf, config);
        assert_eq!(
            compilation.model_count().unwrap(),
            brute_force(cnf, &[]),
            "formula #{} under {:?}",
            i,
            config
        );
    }
}

// ─── Soundness ─────────────────────────────────────────────────────────────────

#[test]
fn default_configuration() {
    assert_sound(&CompilerConfig::default());
}

#[test]
fn model_count_under_assumptions() {
    for cnf in corpus() {
        let compilation = compile(&cnf, &CompilerConfig::default());
        for assumption in [vec![1i32], vec![-1, 2], vec![2, -3]] {
            if assumption.iter().any(|lit| lit.unsigned_abs() > cnf.num_vars()) {
                continue;
            }
            assert_eq!(
                compilation.model_count_under(&assumption).unwrap(),
                brute_force(&cnf, &assumption)
            );
        }
    }
}

#[test]
fn without_base_classes() {
    assert_sound(&CompilerConfig {
        two_cnf_leaves: false,
        horn_leaves: false,
        ..CompilerConfig::default()
    });
}

#[test]
fn without_solver() {
    assert_sound(&CompilerConfig {
        use_solver: false,
        ..CompilerConfig::default()
    });
}

#[test]
fn implied_literal_modes() {
    for mode in [
        ImpliedLiteralMode::UnitPropagation,
        ImpliedLiteralMode::ImplicitUnitPropagation,
        ImpliedLiteralMode::IterativeImplicitUnitPropagation,
        ImpliedLiteralMode::Backbone,
    ] {
        assert_sound(&CompilerConfig {
            implied_literals: mode,
            preselection: PreselectionScheme::MostOccurrences { limit: 4 },
            ..CompilerConfig::default()
        });
    }
}

#[test]
fn decision_heuristics() {
    for decision in [
        DecisionScheme::MostOccurrences,
        DecisionScheme::JeroslowWang,
        DecisionScheme::FirstCutVariable,
    ] {
        assert_sound(&CompilerConfig {
            decision,
            ..CompilerConfig::default()
        });
    }
}

#[test]
fn materialized_components() {
    assert_sound(&CompilerConfig {
        materialize_above: 0,
        ..CompilerConfig::default()
    });
}

#[test]
fn partition_options() {
    assert_sound(&CompilerConfig {
        partition: PartitionConfig {
            merge_equivalent: false,
            remove_subsumed: false,
            cache_policy: CutSetCachePolicy::Always,
            signature_variance: true,
            ..PartitionConfig::default()
        },
        cut_set_threshold: 0.0,
        ..CompilerConfig::default()
    });
}

// ─── Caching ───────────────────────────────────────────────────────────────────

#[test]
fn cache_transparency() {
    let schemes = [
        None,
        Some(CachingScheme::Exact),
        Some(CachingScheme::Renaming { exact_below: 0 }),
        Some(CachingScheme::Renaming { exact_below: 4 }),
    ];
    for cnf in corpus() {
        let counts: Vec<BigUint> = schemes
            .iter()
            .map(|&caching| {
                let config = CompilerConfig {
                    caching,
                    ..CompilerConfig::default()
                };
                compile(&cnf, &config).model_count().unwrap()
            })
            .collect();
        assert!(counts.windows(2).all(|pair| pair[0] == pair[1]), "{:?}", counts);
    }
}

#[test]
fn circuit_modes() {
    for circuit_mode in [CircuitMode::Mapping, CircuitMode::Copy] {
        assert_sound(&CompilerConfig {
            caching: Some(CachingScheme::Renaming { exact_below: 0 }),
            circuit_mode,
            two_cnf_leaves: false,
            horn_leaves: false,
            ..CompilerConfig::default()
        });
    }
}

#[test]
fn isomorphic_components_hit_the_cache() {
    let cnf = &corpus()[4];
    let config = CompilerConfig {
        caching: Some(CachingScheme::Renaming { exact_below: 0 }),
        two_cnf_leaves: false,
        horn_leaves: false,
        ..CompilerConfig::default()
    };
    let compilation = compile(cnf, &config);
    assert!(compilation.statistics.cache_hits() >= 1);
    assert_eq!(compilation.model_count().unwrap(), brute_force(cnf, &[]));
}

// ─── Circuit Properties ────────────────────────────────────────────────────────

#[test]
fn compiled_circuits_are_decomposable_and_deterministic() {
    let config = CompilerConfig {
        two_cnf_leaves: false,
        horn_leaves: false,
        ..CompilerConfig::default()
    };
    for cnf in corpus() {
        let compilation = compile(&cnf, &config);
        let circuit = &compilation.circuit;
        assert!(circuit.is_decomposable());
        assert!(circuit.is_deterministic());
        assert!(circuit.is_smooth());
    }
}

#[test]
fn entailment_matches_enumeration() {
    let cnf = Cnf::from_clauses(4, [vec![1, 2], vec![-1, 3], vec![-3, 4]]);
    let compilation = compile(&cnf, &CompilerConfig::default());
    let entails = |clause: &[i32]| compilation.circuit.entails_clause(compilation.root, clause).unwrap();

    assert!(entails(&[2, 3]));
    assert!(entails(&[-1, 4]));
    assert!(!entails(&[1]));
    assert!(!entails(&[-4]));
}

#[test]
fn nnf_round_trip_after_expanding_mappings() {
    let config = CompilerConfig {
        caching: Some(CachingScheme::Renaming { exact_below: 0 }),
        two_cnf_leaves: false,
        horn_leaves: false,
        ..CompilerConfig::default()
    };
    for cnf in corpus() {
        let mut compilation = compile(&cnf, &config);
        compilation.circuit.expand_mappings().unwrap();
        let root = compilation.circuit.root().unwrap();

        let text = compilation.circuit.to_nnf_string(root).unwrap();
        let parsed = Circuit::from_nnf_str(&text).unwrap();
        let parsed_root = parsed.root().unwrap();
        assert_eq!(
            parsed.model_count_over(parsed_root, &[], cnf.num_vars()).unwrap(),
            brute_force(&cnf, &[])
        );
        assert_eq!(parsed.is_smooth(), compilation.circuit.is_smooth());
    }
}

#[test]
fn nnf_round_trip_with_default_configuration() {
    let mut formulas = vec![Cnf::from_clauses(4, [vec![1, 2, 3], vec![-1, 4], vec![-2, -4], vec![3, -4, 1]])];
    formulas.extend(corpus());
    for cnf in formulas {
        let mut compilation = compile(&cnf, &CompilerConfig::default());
        compilation.circuit.expand_mappings().unwrap();
        compilation.circuit.expand_leaves().unwrap();
        let root = compilation.circuit.root().unwrap();

        let text = compilation.circuit.to_nnf_string(root).unwrap();
        let parsed = Circuit::from_nnf_str(&text).unwrap();
        let parsed_root = parsed.root().unwrap();
        assert!(parsed.is_decomposable());
        assert!(parsed.is_deterministic());
        assert!(parsed.is_smooth());
        assert_eq!(
            parsed.model_count_over(parsed_root, &[], cnf.num_vars()).unwrap(),
            brute_force(&cnf, &[])
        );
        assert_eq!(
            parsed.model_count_over(parsed_root, &[1], cnf.num_vars()).unwrap(),
            brute_force(&cnf, &[1])
        );
    }
}
