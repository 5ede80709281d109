use std::path::PathBuf;

/// 0-based index of a node in [`Mesh::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> NodeId {
        NodeId(index)
    }

    /// Converts a 1-based id as written in mesh and boundary files. Returns
    /// `None` for 0.
    pub fn from_one_based(id: usize) -> Option<NodeId> {
        id.checked_sub(1).map(NodeId)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Position of an element in [`Mesh::elements`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(usize);

impl ElementId {
    pub fn new(index: usize) -> ElementId {
        ElementId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub vertex: Vertex,
}

/// Geometric element types recognized in a Gmsh mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Point,
    Edge,
    Triangle,
    Quadrilateral,
    Triangle2ndOrder,
    Quadrilateral2ndOrder,
}

impl ElementKind {
    /// Maps a Gmsh element type code to a kind, `None` if unsupported.
    pub fn from_gmsh_code(code: u32) -> Option<ElementKind> {
        match code {
            15 => Some(ElementKind::Point),
            1 => Some(ElementKind::Edge),
            2 => Some(ElementKind::Triangle),
            3 => Some(ElementKind::Quadrilateral),
            9 => Some(ElementKind::Triangle2ndOrder),
            16 => Some(ElementKind::Quadrilateral2ndOrder),
            _ => None,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            ElementKind::Point => 1,
            ElementKind::Edge => 2,
            ElementKind::Triangle => 3,
            ElementKind::Quadrilateral => 4,
            ElementKind::Triangle2ndOrder => 6,
            ElementKind::Quadrilateral2ndOrder => 8,
        }
    }

    /// Points and edges only bound the domain and never become elements.
    pub fn is_surface(self) -> bool {
        !matches!(self, ElementKind::Point | ElementKind::Edge)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub nodes: Vec<NodeId>,
    pub kind: ElementKind,
}

impl Element {
    /// The three vertices of a linear triangle, `None` for any other kind.
    pub fn triangle(&self) -> Option<[NodeId; 3]> {
        match (self.kind, self.nodes.as_slice()) {
            (ElementKind::Triangle, &[n0, n1, n2]) => Some([n0, n1, n2]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
}

impl Mesh {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangles(&self) -> impl Iterator<Item = (ElementId, [NodeId; 3])> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(i, element)| element.triangle().map(|t| (ElementId::new(i), t)))
    }
}

/// Heat source evaluated at each node to build the load vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceTerm {
    Constant(f64),
    /// `a * x^2 + b * y^2`
    Quadratic { a: f64, b: f64 },
}

impl Default for SourceTerm {
    fn default() -> Self {
        SourceTerm::Constant(0.0)
    }
}

impl SourceTerm {
    pub fn evaluate(&self, node: &Node) -> f64 {
        match *self {
            SourceTerm::Constant(c) => c,
            SourceTerm::Quadratic { a, b } => {
                let Vertex { x, y } = node.vertex;
                a * x * x + b * y * y
            }
        }
    }
}

/// Settings for one run of the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub source: SourceTerm,
    pub output: Option<PathBuf>,
}
