use std::collections::{BTreeMap, BTreeSet};

use crate::cache::HashMapCache;
use crate::incidence::IncidenceGraph;
use crate::types::{lit_of, var_of, NodeId};

/// Canonical description of a residual formula: sorted clauses of sorted
/// literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<Vec<i32>>);

impl CacheKey {
    fn from_clauses(mut clauses: Vec<Vec<i32>>) -> Self {
        for clause in clauses.iter_mut() {
            clause.sort_unstable();
        }
        clauses.sort();
        clauses.dedup();
        CacheKey(clauses)
    }

    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.0
    }
}

/// A cached node. `mapping` renames the node's variables to the canonical
/// variables of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub node: NodeId,
    pub mapping: Option<BTreeMap<u32, u32>>,
}

pub trait ComponentCache {
    /// Computes the key of the residual formula of `graph`, together with the
    /// renaming of its variables into the key's variables, if any.
    fn generate_key(&self, graph: &IncidenceGraph) -> (CacheKey, Option<BTreeMap<u32, u32>>);

    fn get(&mut self, key: &CacheKey) -> Option<CacheEntry>;

    fn add(&mut self, key: CacheKey, node: NodeId, mapping: Option<BTreeMap<u32, u32>>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hits(&self) -> usize;

    fn misses(&self) -> usize;
}

/// Composes a stored `entry` mapping (node variables to canonical) with the
/// `current` mapping (current variables to canonical) into a mapping from the
/// node's variables to the current ones.
///
/// Returns `None` when both are absent, i.e. no renaming is needed.
pub fn compose(stored: Option<&BTreeMap<u32, u32>>, current: Option<&BTreeMap<u32, u32>>) -> Option<BTreeMap<u32, u32>> {
    match (stored, current) {
        (None, None) => None,
        (stored, current) => {
            let inverse: BTreeMap<u32, u32> = current
                .map(|m| m.iter().map(|(&real, &canon)| (canon, real)).collect())
                .unwrap_or_default();
            let stored = stored.cloned().unwrap_or_default();
            Some(
                stored
                    .into_iter()
                    .filter_map(|(node_var, canon)| inverse.get(&canon).map(|&current_var| (node_var, current_var)))
                    .collect(),
            )
        }
    }
}

/// Which component cache the compiler instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachingScheme {
    Exact,
    /// Renaming-invariant keys for components with at least `exact_below`
    /// variables, exact keys below.
    Renaming { exact_below: usize },
}

impl Default for CachingScheme {
    fn default() -> Self {
        CachingScheme::Renaming { exact_below: 4 }
    }
}

impl CachingScheme {
    pub fn build(self) -> Box<dyn ComponentCache> {
        match self {
            CachingScheme::Exact => Box::new(ExactCaching::default()),
            CachingScheme::Renaming { exact_below } => Box::new(RenamingCaching::new(exact_below)),
        }
    }
}

/// Keys on the residual clauses over the real variables.
#[derive(Debug, Default)]
pub struct ExactCaching {
    entries: HashMapCache<CacheKey, NodeId>,
}

impl ComponentCache for ExactCaching {
    fn generate_key(&self, graph: &IncidenceGraph) -> (CacheKey, Option<BTreeMap<u32, u32>>) {
        (CacheKey::from_clauses(graph.clauses()), None)
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|&node| CacheEntry { node, mapping: None })
    }

    fn add(&mut self, key: CacheKey, node: NodeId, _mapping: Option<BTreeMap<u32, u32>>) {
        self.entries.insert(key, node);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn hits(&self) -> usize {
        self.entries.hits()
    }

    fn misses(&self) -> usize {
        self.entries.misses()
    }
}

/// Keys on the residual clauses after renumbering the variables in the order
/// of a renaming-invariant signature.
///
/// Ties in the signature are broken by variable id, so isomorphic formulas do
/// not always get the same key, but equal keys always mean the formulas are
/// equal up to the returned renamings.
#[derive(Debug)]
pub struct RenamingCaching {
    exact_below: usize,
    entries: HashMapCache<CacheKey, CacheEntry>,
}

impl RenamingCaching {
    pub fn new(exact_below: usize) -> Self {
        Self {
            exact_below,
            entries: HashMapCache::new(),
        }
    }
}

/// Per-variable signature: positive and negative occurrence counts and the
/// sorted lengths of the clauses the variable occurs in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
struct Signature {
    positive: usize,
    negative: usize,
    lengths: Vec<usize>,
}

fn canonical_renaming(clauses: &[Vec<i32>]) -> BTreeMap<u32, u32> {
    let mut signatures: BTreeMap<u32, Signature> = BTreeMap::new();
    for clause in clauses {
        for &lit in clause {
            let signature = signatures.entry(var_of(lit)).or_default();
            if lit > 0 {
                signature.positive += 1;
            } else {
                signature.negative += 1;
            }
            signature.lengths.push(clause.len());
        }
    }
    let mut order: Vec<(Signature, u32)> = signatures
        .into_iter()
        .map(|(var, mut signature)| {
            signature.lengths.sort_unstable();
            (signature, var)
        })
        .collect();
    order.sort();
    order
        .into_iter()
        .enumerate()
        .map(|(i, (_, var))| (var, i as u32 + 1))
        .collect()
}

impl ComponentCache for RenamingCaching {
    fn generate_key(&self, graph: &IncidenceGraph) -> (CacheKey, Option<BTreeMap<u32, u32>>) {
        let clauses = graph.clauses();
        let variables: BTreeSet<u32> = clauses.iter().flatten().map(|&lit| var_of(lit)).collect();
        if variables.len() < self.exact_below {
            return (CacheKey::from_clauses(clauses), None);
        }
        let renaming = canonical_renaming(&clauses);
        let renamed = clauses
            .iter()
            .map(|clause| {
                clause
                    .iter()
                    .map(|&lit| lit_of(renaming[&var_of(lit)], lit > 0))
                    .collect()
            })
            .collect();
        (CacheKey::from_clauses(renamed), Some(renaming))
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn add(&mut self, key: CacheKey, node: NodeId, mapping: Option<BTreeMap<u32, u32>>) {
        self.entries.insert(key, CacheEntry { node, mapping });
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn hits(&self) -> usize {
        self.entries.hits()
    }

    fn misses(&self) -> usize {
        self.entries.misses()
    }
}
