use std::io::Read;
use std::path::Path;

use log::{debug, info};

use crate::{
    boundary::{self, Classification},
    datatypes::{Element, ElementKind, Mesh, Node, NodeId, Vertex},
    error::{HeatError, Result},
};

enum MeshParseState {
    Limbo,
    /// Inside a section the solver does not need, e.g. `$Entities`.
    Skipping(String),
}

/// Line cursor over a mesh file that remembers the current line number for
/// error reporting. Blank lines are skipped.
struct MeshLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    line: usize,
}

impl<'a> MeshLines<'a> {
    fn new(contents: &'a str) -> MeshLines<'a> {
        MeshLines {
            lines: contents.lines().enumerate(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        for (i, line) in self.lines.by_ref() {
            let line = line.trim();
            if !line.is_empty() {
                self.line = i + 1;
                return Some(line);
            }
        }
        None
    }

    fn expect_line(&mut self, section: &str) -> Result<&'a str> {
        match self.next_line() {
            Some(line) => Ok(line),
            None => Err(HeatError::mesh(
                self.line,
                format!("unexpected end of file in {section}"),
            )),
        }
    }

    fn expect_end(&mut self, end: &str) -> Result<()> {
        let line = self.expect_line(end)?;
        if line != end {
            return Err(HeatError::mesh(
                self.line,
                format!("expected {end}, found '{line}'"),
            ));
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> HeatError {
        HeatError::mesh(self.line, message)
    }
}

fn parse_fields<T: std::str::FromStr>(
    line: &str,
    min_fields: usize,
    lines: &MeshLines,
) -> Result<Vec<T>> {
    let fields: Vec<T> = line
        .split_whitespace()
        .map(|f| {
            f.parse()
                .map_err(|_| lines.error(format!("unexpected value '{f}' in '{line}'")))
        })
        .collect::<Result<_>>()?;

    if fields.len() < min_fields {
        return Err(lines.error(format!(
            "expected at least {min_fields} fields, found {} in '{line}'",
            fields.len()
        )));
    }

    Ok(fields)
}

/// Checks the `$MeshFormat` section declares a mesh in the 4.1 layout.
fn parse_format(lines: &mut MeshLines) -> Result<()> {
    let line = lines.expect_line("$MeshFormat")?;
    let fields: Vec<f64> = parse_fields(line, 1, lines)?;
    let version = fields[0];

    // 4.0 lays out node and element blocks differently
    if !(4.1..5.0).contains(&version) {
        return Err(lines.error(format!(
            "unsupported mesh format version {version}, expected 4.1 or a later 4.x"
        )));
    }

    lines.expect_end("$EndMeshFormat")
}

/// Parses the `$Nodes` section, placing every node at its 0-based index.
fn parse_nodes(lines: &mut MeshLines) -> Result<Vec<Node>> {
    let header: Vec<usize> = parse_fields(lines.expect_line("$Nodes")?, 2, lines)?;
    let num_blocks = header[0];
    let num_nodes = header[1];

    let mut placed: Vec<(NodeId, Node)> = Vec::new();
    let mut parsed: usize = 0;

    for _ in 0..num_blocks {
        let block: Vec<usize> = parse_fields(lines.expect_line("$Nodes")?, 4, lines)?;
        let num_nodes_local = block[3];

        let mut node_ids: Vec<NodeId> = Vec::new();
        for _ in 0..num_nodes_local {
            let tag: Vec<usize> = parse_fields(lines.expect_line("$Nodes")?, 1, lines)?;
            let id = NodeId::from_one_based(tag[0])
                .filter(|id| id.index() < num_nodes)
                .ok_or_else(|| {
                    lines.error(format!("node tag {} outside 1..={num_nodes}", tag[0]))
                })?;
            node_ids.push(id);
        }

        for id in node_ids {
            let coords: Vec<f64> = parse_fields(lines.expect_line("$Nodes")?, 2, lines)?;
            placed.push((
                id,
                Node {
                    vertex: Vertex {
                        x: coords[0],
                        y: coords[1],
                    },
                },
            ));
        }

        parsed += num_nodes_local;
    }

    lines.expect_end("$EndNodes")?;

    if parsed != num_nodes {
        return Err(lines.error(format!(
            "$Nodes declares {num_nodes} nodes but contains {parsed}"
        )));
    }

    // the header count is only trusted once that many records were read
    let mut slots: Vec<Option<Node>> = vec![None; num_nodes];
    for (id, node) in placed {
        let slot = &mut slots[id.index()];
        if slot.is_some() {
            return Err(lines.error(format!(
                "node tag {} appears more than once",
                id.index() + 1
            )));
        }
        *slot = Some(node);
    }

    // tags are unique and in range and there are num_nodes of them, so every slot is filled
    Ok(slots.into_iter().flatten().collect())
}

/// Parses the `$Elements` section. Only surface elements are kept; points,
/// edges and unknown element types are read past.
fn parse_elements(lines: &mut MeshLines, node_count: usize) -> Result<Vec<Element>> {
    let header: Vec<usize> = parse_fields(lines.expect_line("$Elements")?, 2, lines)?;
    let num_blocks = header[0];
    let num_elements = header[1];

    let mut elements: Vec<Element> = Vec::new();
    let mut parsed: usize = 0;
    let mut skipped: usize = 0;

    for _ in 0..num_blocks {
        let block: Vec<u32> = parse_fields(lines.expect_line("$Elements")?, 4, lines)?;
        let kind = ElementKind::from_gmsh_code(block[2]);
        let num_elements_local = block[3] as usize;

        for _ in 0..num_elements_local {
            let line = lines.expect_line("$Elements")?;

            let kind = match kind {
                Some(kind) if kind.is_surface() => kind,
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            // element tag followed by the node tags
            let record: Vec<usize> = parse_fields(line, kind.node_count() + 1, lines)?;
            let nodes = record[1..=kind.node_count()]
                .iter()
                .map(|&tag| {
                    NodeId::from_one_based(tag)
                        .filter(|id| id.index() < node_count)
                        .ok_or_else(|| {
                            lines.error(format!(
                                "element {} references node {tag} outside 1..={node_count}",
                                record[0]
                            ))
                        })
                })
                .collect::<Result<Vec<NodeId>>>()?;

            elements.push(Element { nodes, kind });
        }

        parsed += num_elements_local;
    }

    lines.expect_end("$EndElements")?;

    if parsed != num_elements {
        return Err(lines.error(format!(
            "$Elements declares {num_elements} elements but contains {parsed}"
        )));
    }

    debug!("skipped {skipped} point, edge or unsupported element records");

    Ok(elements)
}

/// Parses the contents of a Gmsh 4.x `.msh` file into a [`Mesh`].
///
/// Node tags are converted to 0-based [`NodeId`]s here; nothing downstream
/// sees a 1-based id.
pub fn parse_mesh_str(contents: &str) -> Result<Mesh> {
    let mut lines = MeshLines::new(contents);
    let mut parser_state = MeshParseState::Limbo;

    let mut nodes: Option<Vec<Node>> = None;
    let mut elements: Option<Vec<Element>> = None;

    while let Some(line) = lines.next_line() {
        match parser_state {
            MeshParseState::Skipping(ref end) => {
                if line == end.as_str() {
                    parser_state = MeshParseState::Limbo;
                }
            }
            MeshParseState::Limbo => match line {
                "$MeshFormat" => parse_format(&mut lines)?,
                "$Nodes" => nodes = Some(parse_nodes(&mut lines)?),
                "$Elements" => {
                    let node_count = match &nodes {
                        Some(nodes) => nodes.len(),
                        None => return Err(lines.error("$Elements found before $Nodes")),
                    };
                    elements = Some(parse_elements(&mut lines, node_count)?);
                }
                section if section.starts_with('$') => {
                    parser_state = MeshParseState::Skipping(format!("$End{}", &section[1..]));
                }
                other => {
                    return Err(lines.error(format!("unexpected line '{other}' outside a section")))
                }
            },
        }
    }

    if let MeshParseState::Skipping(end) = parser_state {
        return Err(lines.error(format!("missing {end}")));
    }

    let nodes = nodes.ok_or_else(|| lines.error("missing $Nodes section"))?;
    let elements = elements.ok_or_else(|| lines.error("missing $Elements section"))?;

    Ok(Mesh { nodes, elements })
}

/// Parses a `.msh` file into a [`Mesh`]
///
/// # Arguments
/// * `mesh_file` - The path to the mesh file
pub fn parse_mesh(mesh_file: &Path) -> Result<Mesh> {
    let mut mesh_fs = std::fs::File::open(mesh_file).map_err(|source| HeatError::FileNotFound {
        path: mesh_file.to_path_buf(),
        source,
    })?;

    let mut mesh_contents = String::new();
    mesh_fs
        .read_to_string(&mut mesh_contents)
        .map_err(|err| HeatError::mesh(0, format!("failed to read mesh contents: {err}")))?;

    let mesh = parse_mesh_str(&mesh_contents)?;

    info!(
        "loaded {} nodes and {} elements from {}",
        mesh.nodes.len(),
        mesh.elements.len(),
        mesh_file.display()
    );

    Ok(mesh)
}

/// Runs the mesher
///
/// # Arguments
/// * `mesh_file` - The Gmsh mesh of the domain
/// * `boundary_file` - The file prescribing values on boundary nodes
///
/// # Returns
/// The mesh and the classification of its nodes
pub fn run(mesh_file: &Path, boundary_file: &Path) -> Result<(Mesh, Classification)> {
    let mesh = parse_mesh(mesh_file)?;

    let conditions = boundary::parse_boundary(boundary_file)?;
    let classification = Classification::classify(&conditions, mesh.node_count())?;

    info!(
        "classified {} boundary and {} interior nodes",
        classification.boundary_len(),
        classification.interior_len()
    );

    Ok((mesh, classification))
}
