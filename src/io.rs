//! Reading and writing circuits in the NNF text format.
//!
//! # Format
//!
//! ```text
//! nnf <node_count> <edge_count> <variable_count>
//! L <literal>                  # literal leaf
//! A <k> <child>*               # AND with k children ("A 0" is true)
//! O <j> <k> <child>*           # OR with decision variable j (0: none)
//! ```
//!
//! Lines starting with `c` or `C` are comments. Children are referenced by
//! their 0-based position among the node lines, so every node appears after
//! its children. The last node is the root.
//!
//! Mismatches between the header counts and the actual content are reported
//! as warnings only.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use log::warn;

use crate::circuit::Circuit;
use crate::error::{CircuitError, Result};
use crate::node::NodeData;
use crate::types::{var_of, NodeId};

impl Circuit {
    /// Writes the sub-circuit of `root` in the NNF format.
    ///
    /// Mapping nodes and formula leaves have no NNF syntax; call
    /// [`expand_mappings`][Circuit::expand_mappings] and
    /// [`expand_leaves`][Circuit::expand_leaves] first to get rid of them.
    pub fn write_nnf<W: Write>(&self, root: NodeId, mut writer: W) -> Result<()> {
        let order = self.topological_order(root)?;
        let mut position: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
        let mut edges = 0;
        let mut num_vars = 0;
        for (i, &id) in order.iter().enumerate() {
            let node = self.node(id)?;
            if matches!(
                node.data(),
                NodeData::Mapping(_) | NodeData::TwoCnf(_) | NodeData::Horn(_)
            ) {
                return Err(CircuitError::NotSerializable(id));
            }
            position.insert(id, i);
            edges += node.children().len();
            num_vars = num_vars.max(node.variables().iter().next_back().copied().unwrap_or(0));
        }

        writeln!(writer, "nnf {} {} {}", order.len(), edges, num_vars)?;
        for &id in &order {
            let node = self.node(id)?;
            let children = node.children().iter().map(|c| position[c].to_string()).collect::<Vec<_>>();
            match node.data() {
                NodeData::Constant(true) => writeln!(writer, "A 0")?,
                NodeData::Constant(false) => writeln!(writer, "O 0 0")?,
                NodeData::Literal(lit) => writeln!(writer, "L {}", lit)?,
                NodeData::And => writeln!(writer, "A {} {}", children.len(), children.join(" "))?,
                NodeData::Or { decision } => writeln!(
                    writer,
                    "O {} {} {}",
                    decision.unwrap_or(0),
                    children.len(),
                    children.join(" ")
                )?,
                NodeData::Mapping(_) | NodeData::TwoCnf(_) | NodeData::Horn(_) => {
                    return Err(CircuitError::NotSerializable(id));
                }
            }
        }
        Ok(())
    }

    pub fn to_nnf_string(&self, root: NodeId) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_nnf(root, &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| CircuitError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Saves the circuit below its root to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let root = self.root().ok_or_else(|| CircuitError::parse(0, "circuit has no root"))?;
        let file = fs::File::create(path)?;
        self.write_nnf(root, io::BufWriter::new(file))
    }

    /// Reads a circuit in the NNF format. The last node becomes the root.
    ///
    /// Nodes are not hash-consed while reading, so node `i` of the file is
    /// node `i` of the circuit.
    pub fn read_nnf<R: BufRead>(reader: R) -> Result<Circuit> {
        let mut circuit = Circuit::new();
        circuit.set_unique_nodes(false);

        let mut header: Option<(usize, usize, u32)> = None;
        let mut ids: Vec<NodeId> = Vec::new();
        let mut edges = 0;
        let mut max_var = 0;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let number = index + 1;
            let parts: Vec<&str> = line.split_whitespace().collect();
            let Some(&kind) = parts.first() else {
                continue;
            };
            if kind.starts_with('c') || kind.starts_with('C') {
                continue;
            }

            if kind == "nnf" {
                if header.is_some() {
                    return Err(CircuitError::parse(number, "duplicate header"));
                }
                if parts.len() != 4 {
                    return Err(CircuitError::parse(number, format!("invalid header: {}", line)));
                }
                header = Some((
                    parse_number(number, parts[1])?,
                    parse_number(number, parts[2])?,
                    parse_number(number, parts[3])?,
                ));
                continue;
            }

            if header.is_none() {
                return Err(CircuitError::parse(number, "node before header"));
            }

            let id = match kind {
                "L" => {
                    if parts.len() != 2 {
                        return Err(CircuitError::parse(number, "expected `L <literal>`"));
                    }
                    let lit: i32 = parse_number(number, parts[1])?;
                    if lit == 0 {
                        return Err(CircuitError::parse(number, "invalid literal 0"));
                    }
                    max_var = max_var.max(var_of(lit));
                    circuit.create_literal(lit)
                }
                "A" => {
                    let children = parse_children(number, &parts, 1, &ids)?;
                    edges += children.len();
                    circuit.create_and(children)?
                }
                "O" => {
                    if parts.len() < 3 {
                        return Err(CircuitError::parse(number, "expected `O <j> <k> <child>*`"));
                    }
                    let decision: u32 = parse_number(number, parts[1])?;
                    let children = parse_children(number, &parts, 2, &ids)?;
                    edges += children.len();
                    let decision = if decision == 0 || children.is_empty() {
                        None
                    } else {
                        Some(decision)
                    };
                    circuit.create_or(children, decision)?
                }
                _ => return Err(CircuitError::parse(number, format!("unknown node type {}", kind))),
            };
            ids.push(id);
        }

        let (node_count, edge_count, num_vars) = header.ok_or_else(|| CircuitError::parse(0, "missing header"))?;
        let root = *ids.last().ok_or_else(|| CircuitError::parse(0, "no nodes"))?;

        if ids.len() != node_count {
            warn!("header declares {} nodes, found {}", node_count, ids.len());
        }
        if edges != edge_count {
            warn!("header declares {} edges, found {}", edge_count, edges);
        }
        if max_var > num_vars {
            warn!("header declares {} variables, found variable {}", num_vars, max_var);
        }

        circuit.set_unique_nodes(true);
        circuit.set_root(root)?;
        Ok(circuit)
    }

    pub fn from_nnf_str(content: &str) -> Result<Circuit> {
        Self::read_nnf(content.as_bytes())
    }

    /// Loads a circuit from a file in the NNF format.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Circuit> {
        let file = fs::File::open(path)?;
        Self::read_nnf(BufReader::new(file))
    }
}

fn parse_number<T: std::str::FromStr>(line: usize, token: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| CircuitError::parse(line, format!("invalid number {}", token)))
}

/// Parses `<k> <child>*` starting at `parts[start]`.
fn parse_children(line: usize, parts: &[&str], start: usize, ids: &[NodeId]) -> Result<Vec<NodeId>> {
    let Some(count) = parts.get(start) else {
        return Err(CircuitError::parse(line, "missing child count"));
    };
    let count: usize = parse_number(line, count)?;
    let refs = &parts[start + 1..];
    if refs.len() != count {
        return Err(CircuitError::parse(
            line,
            format!("declared {} children, found {}", count, refs.len()),
        ));
    }
    refs.iter()
        .map(|token| {
            let position: usize = parse_number(line, token)?;
            ids.get(position)
                .copied()
                .ok_or_else(|| CircuitError::parse(line, format!("child {} is not defined yet", position)))
        })
        .collect()
}
