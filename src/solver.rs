use crate::{
    boundary::Classification,
    datatypes::{ElementId, Mesh, ModelMetadata, NodeId, SourceTerm, Vertex},
    error::{HeatError, Result},
};
use indicatif::ProgressBar;
use log::{info, warn};
use nalgebra::{DMatrix, DVector, SMatrix};

/// Jacobians below this fraction of the squared element size are treated as
/// zero.
pub const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Stiffness matrix and load vector of the whole mesh, indexed by node.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem {
    pub stiffness: DMatrix<f64>,
    pub load: DVector<f64>,
}

/// The system left after eliminating boundary nodes, indexed by position in
/// the interior node list.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedSystem {
    pub stiffness: DMatrix<f64>,
    pub load: DVector<f64>,
}

/// Calculates the stiffness matrix of a linear triangle
///
/// # Arguments
/// * `vertices` - The corners of the triangle, in element order
///
/// # Returns
/// A 3x3 local stiffness matrix, or `None` when the corners are collinear or
/// coincident
pub fn compute_element_stiffness_matrix(vertices: [&Vertex; 3]) -> Option<SMatrix<f64, 3, 3>> {
    let [v0, v1, v2] = vertices;

    let a = [v1.x - v2.x, v2.x - v0.x, v0.x - v1.x];
    let b = [v1.y - v2.y, v2.y - v0.y, v0.y - v1.y];

    // twice the signed area; the sign depends on winding and is dropped
    let jacobian = (a[1] * b[2] - a[2] * b[1]).abs();

    let size = a
        .iter()
        .chain(b.iter())
        .fold(0.0_f64, |acc, d| acc.max(d.abs()));
    if !(jacobian > DEGENERATE_TOLERANCE * size * size) {
        return None;
    }

    Some(SMatrix::from_fn(|p, q| {
        (a[p] * a[q] + b[p] * b[q]) / (2.0 * jacobian)
    }))
}

/// Adds the stiffness of one linear triangle into the global matrix.
///
/// # Arguments
/// * `mesh` - The mesh owning the nodes
/// * `element` - The triangle's position in the mesh, used for error reporting
/// * `nodes` - The corners of the triangle
/// * `stiffness` - The global stiffness matrix; entries are accumulated
pub fn accumulate_triangle(
    mesh: &Mesh,
    element: ElementId,
    nodes: [NodeId; 3],
    stiffness: &mut DMatrix<f64>,
) -> Result<()> {
    let vertices = nodes.map(|id| &mesh.node(id).vertex);
    let element_stiffness = compute_element_stiffness_matrix(vertices)
        .ok_or(HeatError::DegenerateElement { element, nodes })?;

    for (local_row, node_row) in nodes.iter().enumerate() {
        for (local_col, node_col) in nodes.iter().enumerate() {
            stiffness[(node_row.index(), node_col.index())] +=
                element_stiffness[(local_row, local_col)];
        }
    }

    Ok(())
}

/// Compiles element stiffness matrices into a total stiffness matrix. Only
/// linear triangles contribute; other element kinds are reported and skipped.
///
/// # Arguments
/// * `mesh` - The mesh to assemble
///
/// # Returns
/// A dynamically sized N x N matrix
pub fn build_total_stiffness_matrix(mesh: &Mesh) -> Result<DMatrix<f64>> {
    let mut total_stiffness_matrix: DMatrix<f64> =
        DMatrix::zeros(mesh.node_count(), mesh.node_count());

    let triangle_count = mesh.triangles().count();
    let skipped = mesh.elements.len() - triangle_count;

    let bar = ProgressBar::new(triangle_count as u64);
    for (element, nodes) in mesh.triangles() {
        bar.inc(1);
        accumulate_triangle(mesh, element, nodes, &mut total_stiffness_matrix)?;
    }
    bar.finish_and_clear();

    if skipped > 0 {
        warn!("skipped {skipped} elements that are not linear triangles");
    }
    info!("built total stiffness matrix from {triangle_count} triangles");

    Ok(total_stiffness_matrix)
}

/// Evaluates the source term at every node.
pub fn build_load_vector(mesh: &Mesh, source: &SourceTerm) -> DVector<f64> {
    DVector::from_iterator(
        mesh.node_count(),
        mesh.nodes.iter().map(|node| source.evaluate(node)),
    )
}

pub fn assemble(mesh: &Mesh, source: &SourceTerm) -> Result<GlobalSystem> {
    Ok(GlobalSystem {
        stiffness: build_total_stiffness_matrix(mesh)?,
        load: build_load_vector(mesh, source),
    })
}

/// Eliminates the boundary nodes, moving their prescribed values to the
/// right-hand side
///
/// # Arguments
/// * `system` - The assembled global system
/// * `classification` - The boundary/interior split of the nodes
///
/// # Returns
/// An M x M system over the interior nodes
pub fn reduce(system: &GlobalSystem, classification: &Classification) -> ReducedSystem {
    let interior = classification.interior_nodes();
    let size = interior.len();

    let mut stiffness: DMatrix<f64> = DMatrix::zeros(size, size);
    let mut load: DVector<f64> = DVector::zeros(size);

    for (row, node_row) in interior.iter().enumerate() {
        let mut known = system.load[node_row.index()];
        for (node_col, value) in classification.boundary() {
            known -= system.stiffness[(node_row.index(), node_col.index())] * value;
        }
        load[row] = known;

        for (col, node_col) in interior.iter().enumerate() {
            stiffness[(row, col)] = system.stiffness[(node_row.index(), node_col.index())];
        }
    }

    ReducedSystem { stiffness, load }
}

/// Solves the reduced system with a dense LU decomposition.
pub fn solve_reduced(reduced: &ReducedSystem) -> Result<DVector<f64>> {
    let size = reduced.load.len();
    if size == 0 {
        return Ok(DVector::zeros(0));
    }

    let lu = reduced.stiffness.clone().lu();

    // an exact zero pivot makes `solve` fail; a pivot vanishing against the
    // largest one is rounding noise on a singular matrix
    let pivots = lu.u().diagonal().map(f64::abs);
    if pivots.min() <= pivots.max() * f64::EPSILON * size as f64 {
        return Err(HeatError::SingularSystem { size });
    }

    lu.solve(&reduced.load)
        .filter(|u| u.iter().all(|v| v.is_finite()))
        .ok_or(HeatError::SingularSystem { size })
}

/// Merges prescribed boundary values and the interior solution into the
/// full field, indexed by node.
pub fn back_substitute(u_interior: &DVector<f64>, classification: &Classification) -> DVector<f64> {
    let mut solution: DVector<f64> = DVector::zeros(classification.node_count());

    for (node, value) in classification.boundary() {
        solution[node.index()] = value;
    }
    for (i, node) in classification.interior_nodes().iter().enumerate() {
        solution[node.index()] = u_interior[i];
    }

    solution
}

/// Runs the solver
///
/// # Arguments
/// * `mesh` - The mesh of the domain
/// * `classification` - The boundary/interior split of the mesh nodes
/// * `model_metadata` - The run settings
///
/// # Returns
/// The temperature at every node
pub fn run(
    mesh: &Mesh,
    classification: &Classification,
    model_metadata: &ModelMetadata,
) -> Result<DVector<f64>> {
    info!("assembling system with source {:?}...", model_metadata.source);
    let system = assemble(mesh, &model_metadata.source)?;

    let reduced = reduce(&system, classification);

    let start = std::time::Instant::now();
    info!("solving {0}x{0} reduced system...", reduced.load.len());
    let u_interior = solve_reduced(&reduced)?;

    let elapsed = start.elapsed().as_secs_f32();
    info!("solved system in {:.3} seconds", elapsed);

    Ok(back_substitute(&u_interior, classification))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    use super::*;
    use crate::boundary::BoundaryCondition;
    use crate::datatypes::{Element, ElementKind, Node};

    fn vertex(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }

    fn ids(indices: [usize; 3]) -> [NodeId; 3] {
        indices.map(NodeId::new)
    }

    fn triangle_mesh(points: &[(f64, f64)], triangles: &[[usize; 3]]) -> Mesh {
        Mesh {
            nodes: points
                .iter()
                .map(|&(x, y)| Node {
                    vertex: vertex(x, y),
                })
                .collect(),
            elements: triangles
                .iter()
                .map(|t| Element {
                    nodes: ids(*t).to_vec(),
                    kind: ElementKind::Triangle,
                })
                .collect(),
        }
    }

    /// `n x n` grid of nodes on the unit square, two triangles per cell.
    fn grid_mesh(n: usize) -> Mesh {
        let h = 1.0 / (n - 1) as f64;
        let points: Vec<(f64, f64)> = (0..n * n)
            .map(|i| ((i % n) as f64 * h, (i / n) as f64 * h))
            .collect();
        let mut triangles = Vec::new();
        for row in 0..n - 1 {
            for col in 0..n - 1 {
                let p = row * n + col;
                triangles.push([p, p + 1, p + n + 1]);
                triangles.push([p, p + n + 1, p + n]);
            }
        }
        triangle_mesh(&points, &triangles)
    }

    fn classify(prescribed: &[(usize, f64)], total: usize) -> Classification {
        let conditions: Vec<BoundaryCondition> = prescribed
            .iter()
            .map(|&(index, value)| BoundaryCondition {
                node: NodeId::new(index),
                value,
            })
            .collect();
        Classification::classify(&conditions, total).unwrap()
    }

    #[test]
    fn right_triangle_stiffness() {
        let (v0, v1, v2) = (vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0));
        let k = compute_element_stiffness_matrix([&v0, &v1, &v2]).unwrap();

        let expected = Matrix3::new(
            1.0, -0.5, -0.5, //
            -0.5, 0.5, 0.0, //
            -0.5, 0.0, 0.5,
        );
        assert_relative_eq!(k, expected, epsilon = 1e-15);
    }

    #[test]
    fn stiffness_rows_sum_to_zero() {
        let triangles = [
            [vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0)],
            [vertex(0.3, -1.2), vertex(4.0, 0.5), vertex(-2.0, 3.3)],
            // clockwise winding
            [vertex(0.0, 0.0), vertex(0.0, 2.0), vertex(5.0, 0.1)],
            [vertex(1e3, 1e3), vertex(1e3 + 0.01, 1e3), vertex(1e3, 1e3 + 0.02)],
        ];
        for [v0, v1, v2] in &triangles {
            let k = compute_element_stiffness_matrix([v0, v1, v2]).unwrap();
            let scale = k.abs().max();
            for row in 0..3 {
                assert_relative_eq!(k.row(row).sum(), 0.0, epsilon = 1e-12 * scale);
            }
            assert_relative_eq!(k, k.transpose(), epsilon = 1e-12 * scale);
        }
    }

    #[test]
    fn winding_does_not_change_stiffness() {
        let (v0, v1, v2) = (vertex(0.0, 0.0), vertex(2.0, 0.5), vertex(0.5, 1.5));
        let ccw = compute_element_stiffness_matrix([&v0, &v1, &v2]).unwrap();
        let cw = compute_element_stiffness_matrix([&v0, &v2, &v1]).unwrap();
        assert_relative_eq!(ccw[(1, 1)], cw[(2, 2)], epsilon = 1e-15);
        assert_relative_eq!(ccw[(0, 1)], cw[(0, 2)], epsilon = 1e-15);
    }

    #[test]
    fn collinear_triangle_is_degenerate() {
        let mesh = triangle_mesh(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)], &[[0, 1, 2]]);
        let mut k = DMatrix::zeros(3, 3);
        let err =
            accumulate_triangle(&mesh, ElementId::new(0), ids([0, 1, 2]), &mut k).unwrap_err();
        assert!(matches!(
            err,
            HeatError::DegenerateElement { nodes, .. } if nodes == ids([0, 1, 2])
        ));
        assert!(k.iter().all(|v| *v == 0.0));

        let coincident = triangle_mesh(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)], &[[0, 1, 2]]);
        assert!(matches!(
            build_total_stiffness_matrix(&coincident),
            Err(HeatError::DegenerateElement { .. })
        ));
    }

    #[test]
    fn degenerate_error_names_the_element() {
        let mut mesh = triangle_mesh(
            &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (2.0, 0.0)],
            &[[0, 1, 2], [0, 1, 3]],
        );
        mesh.elements.insert(
            1,
            Element {
                nodes: vec![NodeId::new(0), NodeId::new(1)],
                kind: ElementKind::Edge,
            },
        );

        let err = build_total_stiffness_matrix(&mesh).unwrap_err();
        assert!(err.to_string().contains("element 2"), "{err}");
        match err {
            HeatError::DegenerateElement { element, nodes } => {
                assert_eq!(element, ElementId::new(2));
                assert_eq!(nodes, ids([0, 1, 3]));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn accumulation_adds_shared_entries() {
        let mesh = triangle_mesh(
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
            &[[0, 1, 2], [0, 2, 3]],
        );
        let k = build_total_stiffness_matrix(&mesh).unwrap();

        // the diagonal edge 0-2 is shared and cancels out for a square
        assert_relative_eq!(k[(0, 2)], 0.0, epsilon = 1e-15);
        assert_relative_eq!(k[(0, 0)], 1.0, epsilon = 1e-15);
        assert_relative_eq!(k[(1, 1)], 1.0, epsilon = 1e-15);
        assert_relative_eq!(k[(0, 1)], -0.5, epsilon = 1e-15);
        assert_eq!(k[(1, 3)], 0.0);
    }

    #[test]
    fn assembly_is_order_independent() {
        let mesh = grid_mesh(4);
        let forward = build_total_stiffness_matrix(&mesh).unwrap();

        let mut shuffled = mesh.clone();
        shuffled.elements.reverse();
        shuffled.elements.rotate_left(5);
        for element in shuffled.elements.iter_mut() {
            element.nodes.rotate_left(1);
        }
        let permuted = build_total_stiffness_matrix(&shuffled).unwrap();

        assert_relative_eq!(forward, permuted, epsilon = 1e-14);
    }

    #[test]
    fn non_triangles_are_not_assembled() {
        let mut mesh = triangle_mesh(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)], &[]);
        mesh.elements.push(Element {
            nodes: (0..4).map(NodeId::new).collect(),
            kind: ElementKind::Quadrilateral,
        });
        let k = build_total_stiffness_matrix(&mesh).unwrap();
        assert!(k.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn load_vector_samples_source_at_nodes() {
        let mesh = triangle_mesh(&[(0.0, 0.0), (1.0, 2.0), (3.0, 1.0)], &[[0, 1, 2]]);

        let constant = build_load_vector(&mesh, &SourceTerm::Constant(2.5));
        assert_eq!(constant.as_slice(), &[2.5, 2.5, 2.5]);

        let quadratic = build_load_vector(&mesh, &SourceTerm::Quadratic { a: 3.0, b: 1.0 });
        assert_eq!(quadratic.as_slice(), &[0.0, 7.0, 28.0]);
    }

    #[test]
    fn reduction_moves_boundary_values_to_load() {
        let stiffness = DMatrix::from_row_slice(
            4,
            4,
            &[
                4.0, -1.0, -2.0, 0.5, //
                -1.0, 3.0, -0.5, -1.5, //
                -2.0, -0.5, 5.0, -2.5, //
                0.5, -1.5, -2.5, 6.0,
            ],
        );
        let system = GlobalSystem {
            stiffness,
            load: DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]),
        };
        // nodes 3 then 1 are prescribed
        let classification = classify(&[(3, 10.0), (1, 20.0)], 4);
        let reduced = reduce(&system, &classification);

        assert_eq!(
            reduced.stiffness,
            DMatrix::from_row_slice(2, 2, &[4.0, -2.0, -2.0, 5.0])
        );
        // f0 - K03*10 - K01*20, f2 - K23*10 - K21*20
        assert_relative_eq!(reduced.load[0], 1.0 - 0.5 * 10.0 + 1.0 * 20.0);
        assert_relative_eq!(reduced.load[1], 3.0 + 2.5 * 10.0 + 0.5 * 20.0);
    }

    #[test]
    fn back_substitution_places_values_by_node() {
        let classification = classify(&[(3, 10.0), (0, 20.0)], 5);
        let u = back_substitute(&DVector::from_vec(vec![1.0, 2.0, 3.0]), &classification);
        assert_eq!(u.as_slice(), &[20.0, 1.0, 2.0, 10.0, 3.0]);
    }

    #[test]
    fn single_triangle_interior_value() {
        // hand computed: K00 = 1.25, K01 = -0.25, K02 = -1
        // u0 = (0.25 * 10 + 1 * 20) / 1.25
        let mesh = triangle_mesh(&[(0.0, 0.0), (2.0, 0.0), (0.0, 1.0)], &[[0, 1, 2]]);
        let classification = classify(&[(1, 10.0), (2, 20.0)], 3);
        let metadata = ModelMetadata {
            source: SourceTerm::Constant(0.0),
            output: None,
        };

        let u = run(&mesh, &classification, &metadata).unwrap();
        assert_relative_eq!(u[0], 18.0, epsilon = 1e-12);
        assert_eq!(u[1], 10.0);
        assert_eq!(u[2], 20.0);
    }

    #[test]
    fn reproduces_linear_field() {
        let n = 5;
        let mesh = grid_mesh(n);
        let exact = |v: &Vertex| 1.0 + 2.0 * v.x + 3.0 * v.y;

        let prescribed: Vec<(usize, f64)> = mesh
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let (row, col) = (i / n, i % n);
                row == 0 || col == 0 || row == n - 1 || col == n - 1
            })
            .map(|(i, node)| (i, exact(&node.vertex)))
            .collect();
        let classification = classify(&prescribed, mesh.node_count());
        assert_eq!(classification.interior_len(), 9);

        let metadata = ModelMetadata {
            source: SourceTerm::Constant(0.0),
            output: None,
        };
        let u = run(&mesh, &classification, &metadata).unwrap();

        for (i, node) in mesh.nodes.iter().enumerate() {
            assert_relative_eq!(u[i], exact(&node.vertex), epsilon = 1e-10);
        }
    }

    #[test]
    fn isolated_interior_node_is_singular() {
        let mut mesh = triangle_mesh(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)], &[[0, 1, 2]]);
        mesh.nodes.push(Node {
            vertex: vertex(5.0, 5.0),
        });
        let classification = classify(&[(0, 1.0), (1, 2.0)], 4);
        let metadata = ModelMetadata {
            source: SourceTerm::Constant(1.0),
            output: None,
        };

        let err = run(&mesh, &classification, &metadata).unwrap_err();
        assert!(matches!(err, HeatError::SingularSystem { size: 2 }));
    }

    #[test]
    fn floating_patch_is_singular() {
        // no boundary node at all: pure Neumann problem
        let mesh = grid_mesh(3);
        let classification = classify(&[], mesh.node_count());
        let system = assemble(&mesh, &SourceTerm::Constant(0.0)).unwrap();
        let reduced = reduce(&system, &classification);
        assert!(matches!(
            solve_reduced(&reduced),
            Err(HeatError::SingularSystem { size: 9 })
        ));
    }

    #[test]
    fn fully_prescribed_mesh_needs_no_solve() {
        let mesh = triangle_mesh(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)], &[[0, 1, 2]]);
        let classification = classify(&[(0, 1.0), (1, 2.0), (2, 3.0)], 3);
        let metadata = ModelMetadata {
            source: SourceTerm::Constant(0.0),
            output: None,
        };
        let u = run(&mesh, &classification, &metadata).unwrap();
        assert_eq!(u.as_slice(), &[1.0, 2.0, 3.0]);
    }
}
