//! Balanced hypergraph bisection and cut-set selection.
//!
//! The decomposer branches on variables that split the current component into
//! two balanced halves. The formula is viewed as a hypergraph whose nodes are
//! the clauses and whose hyperedges are the variables (each variable connects
//! the clauses it occurs in). A [`Partitioner`] bisects that hypergraph; the
//! variables spanning both halves form the cut set.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use log::debug;

use crate::incidence::IncidenceGraph;
use crate::types::var_of;

/// Hypergraph with nodes `0..num_nodes`.
#[derive(Debug, Clone, Default)]
pub struct Hypergraph {
    num_nodes: usize,
    edges: Vec<Vec<usize>>,
    incident: Vec<Vec<usize>>,
}

impl Hypergraph {
    pub fn new(num_nodes: usize, edges: Vec<Vec<usize>>) -> Self {
        let mut incident = vec![Vec::new(); num_nodes];
        for (e, pins) in edges.iter().enumerate() {
            for &v in pins {
                incident[v].push(e);
            }
        }
        Self {
            num_nodes,
            edges,
            incident,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn edges(&self) -> &[Vec<usize>] {
        &self.edges
    }

    /// Number of hyperedges with pins on both sides of `sides`.
    pub fn cut(&self, sides: &[bool]) -> usize {
        self.edges
            .iter()
            .filter(|pins| pins.iter().any(|&v| sides[v]) && pins.iter().any(|&v| !sides[v]))
            .count()
    }

    fn neighbours(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.incident[v].iter().flat_map(move |&e| self.edges[e].iter().copied())
    }
}

/// Two-way balanced partitioning.
pub trait Partitioner {
    /// Assigns every node a side. Each side holds at most
    /// `ceil(num_nodes * (0.5 + imbalance))` nodes.
    fn bisect(&self, hypergraph: &Hypergraph, imbalance: f64) -> Vec<bool>;
}

/// Fiduccia-Mattheyses style bisection.
///
/// The initial partition grows one side breadth-first from a pseudo-peripheral
/// node; refinement passes then move single nodes by best gain and keep the
/// best prefix of each pass.
#[derive(Debug, Clone)]
pub struct FiducciaMattheyses {
    pub passes: usize,
}

impl Default for FiducciaMattheyses {
    fn default() -> Self {
        Self { passes: 4 }
    }
}

impl FiducciaMattheyses {
    fn bfs_order(hypergraph: &Hypergraph, start: usize) -> Vec<usize> {
        let n = hypergraph.num_nodes();
        let mut seen = vec![false; n];
        let mut order = Vec::with_capacity(n);
        for origin in std::iter::once(start).chain(0..n) {
            if seen[origin] {
                continue;
            }
            seen[origin] = true;
            let mut queue = VecDeque::from([origin]);
            while let Some(v) = queue.pop_front() {
                order.push(v);
                for u in hypergraph.neighbours(v) {
                    if !seen[u] {
                        seen[u] = true;
                        queue.push_back(u);
                    }
                }
            }
        }
        order
    }

    fn initial(hypergraph: &Hypergraph) -> Vec<bool> {
        let n = hypergraph.num_nodes();
        // Two sweeps find a node far away from node 0.
        let far = Self::bfs_order(hypergraph, 0).last().copied().unwrap_or(0);
        let order = Self::bfs_order(hypergraph, far);
        let mut sides = vec![false; n];
        for &v in order.iter().take(n / 2) {
            sides[v] = true;
        }
        sides
    }

    fn gain(hypergraph: &Hypergraph, counts: &[[usize; 2]], sides: &[bool], v: usize) -> i64 {
        let from = sides[v] as usize;
        let to = 1 - from;
        let mut gain = 0;
        for &e in &hypergraph.incident[v] {
            if counts[e][from] == 1 && counts[e][to] > 0 {
                gain += 1;
            } else if counts[e][to] == 0 && counts[e][from] > 1 {
                gain -= 1;
            }
        }
        gain
    }

    /// One refinement pass. Returns the improvement achieved.
    fn pass(hypergraph: &Hypergraph, sides: &mut [bool], max_side: usize) -> i64 {
        let n = hypergraph.num_nodes();
        let mut counts: Vec<[usize; 2]> = hypergraph
            .edges()
            .iter()
            .map(|pins| {
                let right = pins.iter().filter(|&&v| sides[v]).count();
                [pins.len() - right, right]
            })
            .collect();
        let mut size = [sides.iter().filter(|&&s| !s).count(), 0];
        size[1] = n - size[0];

        let mut locked = vec![false; n];
        let mut moves = Vec::new();
        let mut total = 0;
        let mut best = (0, 0);

        loop {
            let mut candidate: Option<(i64, usize)> = None;
            for v in (0..n).filter(|&v| !locked[v]) {
                let to = 1 - sides[v] as usize;
                if size[to] + 1 > max_side {
                    continue;
                }
                let gain = Self::gain(hypergraph, &counts, sides, v);
                if candidate.map_or(true, |(g, _)| gain > g) {
                    candidate = Some((gain, v));
                }
            }
            let Some((gain, v)) = candidate else {
                break;
            };

            let from = sides[v] as usize;
            for &e in &hypergraph.incident[v] {
                counts[e][from] -= 1;
                counts[e][1 - from] += 1;
            }
            size[from] -= 1;
            size[1 - from] += 1;
            sides[v] = !sides[v];
            locked[v] = true;
            moves.push(v);
            total += gain;
            if total > best.0 {
                best = (total, moves.len());
            }
        }

        for &v in moves[best.1..].iter().rev() {
            sides[v] = !sides[v];
        }
        best.0
    }
}

impl Partitioner for FiducciaMattheyses {
    fn bisect(&self, hypergraph: &Hypergraph, imbalance: f64) -> Vec<bool> {
        let n = hypergraph.num_nodes();
        if n < 2 {
            return vec![false; n];
        }
        let max_side = ((n as f64) * (0.5 + imbalance)).ceil() as usize;
        let mut sides = Self::initial(hypergraph);
        for _ in 0..self.passes {
            if Self::pass(hypergraph, &mut sides, max_side.max(n - n / 2)) <= 0 {
                break;
            }
        }
        sides
    }
}

/// When cut sets are looked up in the signature cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutSetCachePolicy {
    Never,
    Always,
    /// Only for formulas with at least this many variables.
    MinVariables(usize),
}

impl CutSetCachePolicy {
    fn applies(self, num_vars: usize) -> bool {
        match self {
            CutSetCachePolicy::Never => false,
            CutSetCachePolicy::Always => true,
            CutSetCachePolicy::MinVariables(n) => num_vars >= n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Allowed deviation of each side from half of the clauses.
    pub imbalance: f64,
    /// Merge variables made equivalent by binary clauses before partitioning.
    pub merge_equivalent: bool,
    /// Drop subsumed clauses before partitioning.
    pub remove_subsumed: bool,
    pub cache_policy: CutSetCachePolicy,
    /// Include the variance of neighbourhood sizes in cache signatures.
    pub signature_variance: bool,
    /// Refinement passes of the default partitioner.
    pub passes: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            imbalance: 0.1,
            merge_equivalent: true,
            remove_subsumed: true,
            cache_policy: CutSetCachePolicy::MinVariables(8),
            signature_variance: false,
            passes: 4,
        }
    }
}

/// Signature of one variable: occurrences, and mean (optionally variance) of
/// the neighbourhood sizes of its clauses, scaled to integers.
type VariableSignature = (usize, u64, u64);

/// Computes cut sets of residual formulas.
pub struct HypergraphPartitioning {
    config: PartitionConfig,
    partitioner: Box<dyn Partitioner>,
    cache: HashMap<Vec<VariableSignature>, Vec<usize>>,
    calls: usize,
    cache_hits: usize,
}

impl HypergraphPartitioning {
    pub fn new(config: PartitionConfig) -> Self {
        let partitioner = Box::new(FiducciaMattheyses { passes: config.passes });
        Self::with_partitioner(config, partitioner)
    }

    pub fn with_partitioner(config: PartitionConfig, partitioner: Box<dyn Partitioner>) -> Self {
        Self {
            config,
            partitioner,
            cache: HashMap::new(),
            calls: 0,
            cache_hits: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    /// Returns a non-empty cut set of the residual formula of `graph`, or an
    /// empty set if the formula has no variables.
    pub fn get_cut_set(&mut self, graph: &IncidenceGraph) -> BTreeSet<u32> {
        self.calls += 1;
        let clauses = graph.clauses();
        let occurrences = graph.occurrence_counts();
        if occurrences.is_empty() {
            return BTreeSet::new();
        }

        let use_cache = self.config.cache_policy.applies(occurrences.len());
        let signed = if use_cache {
            let signed = self.signatures(&clauses, &occurrences);
            let key: Vec<VariableSignature> = signed.iter().map(|(s, _)| *s).collect();
            if let Some(positions) = self.cache.get(&key) {
                self.cache_hits += 1;
                let cut: BTreeSet<u32> = positions.iter().map(|&i| signed[i].1).collect();
                debug!("cut set of {} variables from signature cache", cut.len());
                return cut;
            }
            Some((key, signed))
        } else {
            None
        };

        let cut = self.compute_cut_set(&clauses, &occurrences);

        if let Some((key, signed)) = signed {
            let positions = signed
                .iter()
                .enumerate()
                .filter(|(_, (_, var))| cut.contains(var))
                .map(|(i, _)| i)
                .collect();
            self.cache.insert(key, positions);
        }
        cut
    }

    fn compute_cut_set(&self, clauses: &[Vec<i32>], occurrences: &BTreeMap<u32, usize>) -> BTreeSet<u32> {
        let mut clauses: Vec<Vec<i32>> = clauses.iter().filter(|c| !c.is_empty()).cloned().collect();
        if self.config.remove_subsumed {
            clauses = remove_subsumed(clauses);
        }

        let classes = if self.config.merge_equivalent {
            equivalence_classes(&clauses)
        } else {
            HashMap::new()
        };
        let representative = |var: u32| classes.get(&var).copied().unwrap_or(var);

        let mut pins: BTreeMap<u32, BTreeSet<usize>> = BTreeMap::new();
        for (i, clause) in clauses.iter().enumerate() {
            for &lit in clause {
                pins.entry(representative(var_of(lit))).or_default().insert(i);
            }
        }
        let edge_vars: Vec<u32> = pins.keys().copied().collect();
        let edges: Vec<Vec<usize>> = pins.into_values().map(|set| set.into_iter().collect()).collect();
        let hypergraph = Hypergraph::new(clauses.len(), edges);
        let sides = self.partitioner.bisect(&hypergraph, self.config.imbalance);

        let cut_representatives: BTreeSet<u32> = hypergraph
            .edges()
            .iter()
            .zip(&edge_vars)
            .filter(|(pins, _)| pins.iter().any(|&v| sides[v]) && pins.iter().any(|&v| !sides[v]))
            .map(|(_, &var)| var)
            .collect();

        let mut cut: BTreeSet<u32> = occurrences
            .keys()
            .copied()
            .filter(|&var| cut_representatives.contains(&representative(var)))
            .collect();
        if cut.is_empty() {
            if let Some((&var, _)) = occurrences
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            {
                cut.insert(var);
            }
        }
        debug!(
            "cut set of {} variables over {} clauses (hypergraph cut {})",
            cut.len(),
            clauses.len(),
            hypergraph.cut(&sides)
        );
        cut
    }

    /// Per-variable signatures sorted together with their variables.
    fn signatures(&self, clauses: &[Vec<i32>], occurrences: &BTreeMap<u32, usize>) -> Vec<(VariableSignature, u32)> {
        let mut neighbourhood: HashMap<u32, Vec<usize>> = HashMap::new();
        for clause in clauses {
            for &lit in clause {
                neighbourhood.entry(var_of(lit)).or_default().push(clause.len());
            }
        }
        let mut signed: Vec<(VariableSignature, u32)> = occurrences
            .iter()
            .map(|(&var, &count)| {
                let sizes = neighbourhood.get(&var).map(Vec::as_slice).unwrap_or(&[]);
                let mean = sizes.iter().sum::<usize>() as f64 / sizes.len().max(1) as f64;
                let variance = if self.config.signature_variance {
                    sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / sizes.len().max(1) as f64
                } else {
                    0.0
                };
                ((count, (mean * 1000.0).round() as u64, (variance * 1000.0).round() as u64), var)
            })
            .collect();
        signed.sort();
        signed
    }
}

/// Drops every clause that is a superset of another clause.
fn remove_subsumed(mut clauses: Vec<Vec<i32>>) -> Vec<Vec<i32>> {
    clauses.sort_by_key(Vec::len);
    clauses.dedup();
    let mut kept: Vec<HashSet<i32>> = Vec::new();
    let mut result = Vec::new();
    for clause in clauses {
        let set: HashSet<i32> = clause.iter().copied().collect();
        if kept.iter().any(|smaller| smaller.is_subset(&set)) {
            continue;
        }
        kept.push(set);
        result.push(clause);
    }
    result
}

/// Maps every variable made equivalent (or anti-equivalent) to another by a
/// pair of binary clauses to the smallest variable of its class.
fn equivalence_classes(clauses: &[Vec<i32>]) -> HashMap<u32, u32> {
    let binary: HashSet<(i32, i32)> = clauses
        .iter()
        .filter(|c| c.len() == 2)
        .map(|c| (c[0].min(c[1]), c[0].max(c[1])))
        .collect();

    let mut parent: HashMap<u32, u32> = HashMap::new();
    fn find(parent: &mut HashMap<u32, u32>, var: u32) -> u32 {
        let mut root = var;
        while let Some(&next) = parent.get(&root) {
            if next == root {
                break;
            }
            root = next;
        }
        parent.insert(var, root);
        root
    }

    for &(a, b) in &binary {
        let (na, nb) = (-a, -b);
        if binary.contains(&(na.min(nb), na.max(nb))) {
            let ra = find(&mut parent, var_of(a));
            let rb = find(&mut parent, var_of(b));
            if ra != rb {
                parent.insert(ra.max(rb), ra.min(rb));
            }
        }
    }

    let vars: Vec<u32> = parent.keys().copied().collect();
    vars.into_iter().map(|v| (v, find(&mut parent, v))).collect()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    /// Two triangles of clauses joined by variable 4.
    fn barbell() -> IncidenceGraph {
        IncidenceGraph::new(vec![
            vec![1, 2],
            vec![-2, 3],
            vec![-3, -1, 4],
            vec![-4, 5, 6],
            vec![-5, 7],
            vec![-7, -6],
        ])
    }

    #[test]
    fn test_bisect_balanced() {
        let hypergraph = Hypergraph::new(6, vec![vec![0, 2], vec![0, 1], vec![1, 2], vec![2, 3], vec![3, 4], vec![4, 5], vec![3, 5]]);
        let sides = FiducciaMattheyses::default().bisect(&hypergraph, 0.1);
        let right = sides.iter().filter(|&&s| s).count();
        assert!((2..=4).contains(&right));
        assert_eq!(hypergraph.cut(&sides), 1);
    }

    #[test]
    fn test_cut_set_separates() {
        let mut partitioning = HypergraphPartitioning::new(PartitionConfig {
            merge_equivalent: false,
            remove_subsumed: false,
            cache_policy: CutSetCachePolicy::Never,
            ..PartitionConfig::default()
        });
        let cut = partitioning.get_cut_set(&barbell());
        assert_eq!(cut, BTreeSet::from([4]));
    }

    #[test]
    fn test_cut_set_fallback() {
        let mut partitioning = HypergraphPartitioning::new(PartitionConfig::default());
        let graph = IncidenceGraph::new(vec![vec![1, 2, 3]]);
        let cut = partitioning.get_cut_set(&graph);
        assert_eq!(cut.len(), 1);

        let graph = IncidenceGraph::new(vec![vec![1, 2], vec![1, 3], vec![2]]);
        let mut partitioning = HypergraphPartitioning::new(PartitionConfig {
            cache_policy: CutSetCachePolicy::Never,
            ..PartitionConfig::default()
        });
        assert!(!partitioning.get_cut_set(&graph).is_empty());
    }

    #[test]
    fn test_cut_set_cache() {
        let mut partitioning = HypergraphPartitioning::new(PartitionConfig {
            cache_policy: CutSetCachePolicy::Always,
            ..PartitionConfig::default()
        });
        let first = partitioning.get_cut_set(&barbell());
        // Same shape, variables shifted by 10.
        let shifted = IncidenceGraph::new(vec![
            vec![11, 12],
            vec![-12, 13],
            vec![-13, -11, 14],
            vec![-14, 15, 16],
            vec![-15, 17],
            vec![-17, -16],
        ]);
        let second = partitioning.get_cut_set(&shifted);
        assert_eq!(partitioning.cache_hits(), 1);
        assert_eq!(second.len(), first.len());
        assert!(second.iter().all(|v| (11..=17).contains(v)));
    }

    #[test]
    fn test_equivalence_classes() {
        let classes = equivalence_classes(&[vec![-2, 1], vec![-1, 2], vec![3, 4], vec![-4, -3]]);
        assert_eq!(classes.get(&2), Some(&1));
        assert_eq!(classes.get(&4), Some(&3));
        assert_eq!(classes.get(&5), None);
    }

    #[test]
    fn test_remove_subsumed() {
        let kept = remove_subsumed(vec![vec![1, 2, 3], vec![1, 2], vec![-1, 4], vec![1, 2]]);
        assert_eq!(kept, vec![vec![1, 2], vec![-1, 4]]);
    }
}
