//! Circuit to DOT (Graphviz) conversion.
//!
//! # DOT Format
//!
//! The generated DOT output follows these conventions:
//! - **Constants** are rendered as squares labeled `⊤` / `⊥`
//! - **Literals** are rendered as circles labeled `x1` / `¬x1`
//! - **AND** and **OR** nodes are rendered as ellipses labeled `∧` / `∨`;
//!   decision nodes carry their variable in the label
//! - **Mapping** nodes are rendered as diamonds, the mapping edge is dashed
//! - **2-CNF** and **Horn** leaves are rendered as boxes with their clause count
//! - **Root nodes** are rendered as rectangles at the top (source rank)
//!
//! # Examples
//!
//! ```
//! use dnnf_rs::circuit::Circuit;
//!
//! let mut circuit = Circuit::new();
//! let x1 = circuit.create_literal(1);
//! let x2 = circuit.create_literal(2);
//! let f = circuit.create_and([x1, x2]).unwrap();
//!
//! let dot = circuit.to_dot(&[f]).unwrap();
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::io;

use crate::circuit::Circuit;
use crate::error::{CircuitError, Result};
use crate::node::NodeData;
use crate::types::NodeId;

/// Configuration options for DOT output generation.
///
/// Use `DotConfig::default()` for standard settings.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for AND/OR nodes (default: "ellipse")
    pub node_shape: &'static str,
    /// Shape for literal leaves (default: "circle")
    pub literal_shape: &'static str,
    /// Shape for constants and formula leaves (default: "square")
    pub terminal_shape: &'static str,
    /// Shape for root markers (default: "rect")
    pub root_shape: &'static str,
    /// Style for the edge below a Mapping node (default: "dashed")
    pub mapping_edge_style: &'static str,
    /// Whether to use HTML labels for subscripts (default: true)
    pub use_html_labels: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "ellipse",
            literal_shape: "circle",
            terminal_shape: "square",
            root_shape: "rect",
            mapping_edge_style: "dashed",
            use_html_labels: true,
        }
    }
}

impl Circuit {
    /// Converts the sub-circuits of `roots` to DOT format.
    ///
    /// Shared nodes are displayed once.
    pub fn to_dot(&self, roots: &[NodeId]) -> Result<String> {
        self.to_dot_with_config(roots, &DotConfig::default())
    }

    /// Converts the sub-circuits of `roots` to DOT format with a custom configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use dnnf_rs::circuit::Circuit;
    /// use dnnf_rs::dot::DotConfig;
    ///
    /// let mut circuit = Circuit::new();
    /// let x = circuit.create_literal(-3);
    ///
    /// let config = DotConfig {
    ///     use_html_labels: false,
    ///     ..DotConfig::default()
    /// };
    ///
    /// let dot = circuit.to_dot_with_config(&[x], &config).unwrap();
    /// assert!(dot.contains("¬x3"));
    /// ```
    pub fn to_dot_with_config(&self, roots: &[NodeId], config: &DotConfig) -> Result<String> {
        let mut all_nodes = BTreeSet::new();
        for &root in roots {
            all_nodes.extend(self.dominated_nodes(root)?);
        }
        self.render_dot(roots, &all_nodes, config)
            .map_err(|err| CircuitError::Io(io::Error::new(io::ErrorKind::Other, err)))
    }

    fn render_dot(&self, roots: &[NodeId], all_nodes: &BTreeSet<NodeId>, config: &DotConfig) -> Result<String, fmt::Error> {
        use std::fmt::Write as _;

        let literal_label = |lit: i32| {
            let sign = if lit < 0 { "¬" } else { "" };
            if config.use_html_labels {
                format!("<{}x<SUB>{}</SUB>>", sign, lit.unsigned_abs())
            } else {
                format!("\"{}x{}\"", sign, lit.unsigned_abs())
            }
        };

        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;

        let nodes = all_nodes.iter().filter_map(|&id| self.node(id).ok());
        for node in nodes.clone() {
            let id = node.id().raw();
            match node.data() {
                NodeData::Constant(value) => {
                    let label = if *value { "⊤" } else { "⊥" };
                    writeln!(dot, "{} [shape={}, label=\"{}\"];", id, config.terminal_shape, label)?;
                }
                NodeData::Literal(lit) => {
                    writeln!(dot, "{} [shape={}, label={}];", id, config.literal_shape, literal_label(*lit))?;
                }
                NodeData::And => writeln!(dot, "{} [label=\"∧\"];", id)?,
                NodeData::Or { decision: None } => writeln!(dot, "{} [label=\"∨\"];", id)?,
                NodeData::Or { decision: Some(var) } => writeln!(dot, "{} [label=\"∨ ({})\"];", id, var)?,
                NodeData::Mapping(mapping) => {
                    let pairs: Vec<String> = mapping
                        .local_to_global()
                        .iter()
                        .map(|(l, g)| format!("{}→{}", l, g))
                        .collect();
                    writeln!(dot, "{} [shape=diamond, label=\"{}\"];", id, pairs.join(", "))?;
                }
                NodeData::TwoCnf(formula) => {
                    let count = formula.clauses().len();
                    writeln!(dot, "{} [shape={}, label=\"2-CNF ({})\"];", id, config.terminal_shape, count)?;
                }
                NodeData::Horn(formula) => {
                    let count = formula.clauses().len();
                    writeln!(dot, "{} [shape={}, label=\"Horn ({})\"];", id, config.terminal_shape, count)?;
                }
            }
        }

        for node in nodes {
            let style = match node.data() {
                NodeData::Mapping(_) => config.mapping_edge_style,
                _ => "solid",
            };
            for child in node.children() {
                writeln!(dot, "{} -> {} [style={}];", node.id().raw(), child.raw(), style)?;
            }
        }

        // Root markers at the top
        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, root)?;
        }
        writeln!(dot, "}}")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} -> {};", i, root.raw())?;
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dot_basic() {
        let mut circuit = Circuit::new();
        let x2 = circuit.create_literal(2);
        let x3 = circuit.create_literal(3);
        let f = circuit.create_decision_node(1, x2, x3).unwrap();

        let dot = circuit.to_dot(&[f]).unwrap();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("∨ (1)"));
    }

    #[test]
    fn test_to_dot_multiple_roots() {
        let mut circuit = Circuit::new();
        let x1 = circuit.create_literal(1);
        let x2 = circuit.create_literal(2);
        let f = circuit.create_and([x1, x2]).unwrap();
        let t = circuit.create_constant(true);

        let dot = circuit.to_dot(&[f, t]).unwrap();
        assert!(dot.contains("r0 ->"));
        assert!(dot.contains("r1 ->"));
        assert!(dot.contains("⊤"));
    }

    #[test]
    fn test_to_dot_missing_node() {
        let circuit = Circuit::new();
        assert!(circuit.to_dot(&[NodeId::new(3)]).is_err());
    }

    #[test]
    #[ignore]
    fn test_write_dot_file() {
        let mut circuit = Circuit::new();
        let x2 = circuit.create_literal(2);
        let x3 = circuit.create_literal(3);
        let f = circuit.create_decision_node(1, x2, x3).unwrap();

        let dot = circuit.to_dot(&[f]).unwrap();
        std::fs::write("test_output.dot", &dot).unwrap();
        println!("DOT output:\n{}", dot);
    }
}
