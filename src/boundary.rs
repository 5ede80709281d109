use std::io::Read;
use std::path::Path;

use log::debug;

use crate::{
    datatypes::NodeId,
    error::{HeatError, Result},
};

/// A prescribed value on one node, as read from the boundary file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryCondition {
    pub node: NodeId,
    pub value: f64,
}

/// Parses a boundary specification: a count `B` on the first line followed
/// by `B` lines of `<1-based node id> <value>`.
pub fn parse_boundary_str(contents: &str) -> Result<Vec<BoundaryCondition>> {
    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (line_number, count_line) = lines
        .next()
        .ok_or_else(|| HeatError::boundary(0, "missing boundary node count"))?;
    let count: usize = count_line.parse().map_err(|_| {
        HeatError::boundary(line_number, format!("invalid boundary node count '{count_line}'"))
    })?;

    let mut conditions: Vec<BoundaryCondition> = Vec::new();
    let mut last_line = line_number;

    for (line_number, line) in lines {
        last_line = line_number;

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(HeatError::boundary(
                line_number,
                format!("expected '<node id> <value>', found '{line}'"),
            ));
        }

        let id: usize = fields[0].parse().map_err(|_| {
            HeatError::boundary(line_number, format!("invalid node id '{}'", fields[0]))
        })?;
        let value: f64 = fields[1].parse().map_err(|_| {
            HeatError::boundary(line_number, format!("invalid value '{}'", fields[1]))
        })?;

        let node = NodeId::from_one_based(id).ok_or_else(|| {
            HeatError::InvalidBoundarySpec(format!(
                "node id 0 on line {line_number}; ids start at 1"
            ))
        })?;

        conditions.push(BoundaryCondition { node, value });
    }

    if conditions.len() != count {
        return Err(HeatError::boundary(
            last_line,
            format!(
                "header declares {count} boundary nodes but {} were given",
                conditions.len()
            ),
        ));
    }

    Ok(conditions)
}

/// Reads and parses a boundary specification file.
pub fn parse_boundary(boundary_file: &Path) -> Result<Vec<BoundaryCondition>> {
    let mut boundary_fs =
        std::fs::File::open(boundary_file).map_err(|source| HeatError::FileNotFound {
            path: boundary_file.to_path_buf(),
            source,
        })?;

    let mut contents = String::new();
    boundary_fs
        .read_to_string(&mut contents)
        .map_err(|err| HeatError::boundary(0, format!("failed to read boundary file: {err}")))?;

    parse_boundary_str(&contents)
}

/// Partition of the nodes of a mesh into prescribed boundary nodes and the
/// interior nodes left to solve for.
///
/// `boundary_values[i]` belongs to `boundary_nodes[i]`, both in the order of
/// the boundary file. `interior_nodes` is strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    boundary_nodes: Vec<NodeId>,
    boundary_values: Vec<f64>,
    interior_nodes: Vec<NodeId>,
}

impl Classification {
    /// Classifies the nodes `0..total_node_count`.
    ///
    /// The interior set is found by sorting a copy of the boundary ids and
    /// collecting every index in the gaps: before the first boundary node,
    /// between consecutive ones and after the last up to `total_node_count`.
    pub fn classify(conditions: &[BoundaryCondition], total_node_count: usize) -> Result<Self> {
        let boundary_nodes: Vec<NodeId> = conditions.iter().map(|c| c.node).collect();
        let boundary_values: Vec<f64> = conditions.iter().map(|c| c.value).collect();

        let mut sorted = boundary_nodes.clone();
        sorted.sort_unstable();

        if let Some(last) = sorted.last() {
            if last.index() >= total_node_count {
                return Err(HeatError::InvalidBoundarySpec(format!(
                    "node id {} is outside the mesh of {total_node_count} nodes",
                    last.index() + 1
                )));
            }
        }
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(HeatError::InvalidBoundarySpec(format!(
                "node id {} is prescribed more than once",
                pair[0].index() + 1
            )));
        }

        let mut interior_nodes: Vec<NodeId> =
            Vec::with_capacity(total_node_count - boundary_nodes.len());
        let mut start: usize = 0;
        for end in sorted.iter().map(|id| id.index()) {
            interior_nodes.extend((start..end).map(NodeId::new));
            start = end + 1;
        }
        interior_nodes.extend((start..total_node_count).map(NodeId::new));

        debug!(
            "boundary nodes {:?}, interior nodes {:?}",
            boundary_nodes.iter().map(|id| id.index()).collect::<Vec<_>>(),
            interior_nodes.iter().map(|id| id.index()).collect::<Vec<_>>()
        );

        Ok(Classification {
            boundary_nodes,
            boundary_values,
            interior_nodes,
        })
    }

    pub fn boundary_nodes(&self) -> &[NodeId] {
        &self.boundary_nodes
    }

    pub fn boundary_values(&self) -> &[f64] {
        &self.boundary_values
    }

    pub fn interior_nodes(&self) -> &[NodeId] {
        &self.interior_nodes
    }

    /// `(node, prescribed value)` pairs in boundary file order.
    pub fn boundary(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.boundary_nodes
            .iter()
            .copied()
            .zip(self.boundary_values.iter().copied())
    }

    pub fn boundary_len(&self) -> usize {
        self.boundary_nodes.len()
    }

    pub fn interior_len(&self) -> usize {
        self.interior_nodes.len()
    }

    pub fn node_count(&self) -> usize {
        self.boundary_len() + self.interior_len()
    }
}
