use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use nalgebra::DVector;

use crate::{
    datatypes::Mesh,
    error::{HeatError, Result},
};

/// Temperature `u` sampled at a point `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub u: f64,
}

/// Closed outline of every triangle in element order: vertices 0, 1, 2 and
/// vertex 0 again.
pub fn element_outlines(mesh: &Mesh, solution: &DVector<f64>) -> Vec<[Sample; 4]> {
    mesh.triangles()
        .map(|(_, [n0, n1, n2])| {
            [n0, n1, n2, n0].map(|id| {
                let vertex = &mesh.node(id).vertex;
                Sample {
                    x: vertex.x,
                    y: vertex.y,
                    u: solution[id.index()],
                }
            })
        })
        .collect()
}

fn write_gnuplot<W: Write>(
    out: &mut W,
    outlines: &[[Sample; 4]],
    plot_name: &str,
) -> std::io::Result<()> {
    writeln!(out, "$map << EOD")?;
    for outline in outlines {
        for sample in outline {
            writeln!(out, "{:.2} {:.2} {:.2}", sample.x, sample.y, sample.u)?;
        }
        write!(out, "\n\n")?;
    }
    writeln!(out, "EOD")?;

    write!(
        out,
        r#"

set term epslatex size 5.5,4
set output "{plot_name}.tex"

unset key
set xlabel "$x$"
set ylabel "$y$"
set zlabel "heat ($u$)" rotate by 90
set title "Result of Heat Problem"

splot $map with lines

unset output
"#
    )?;

    out.flush()
}

fn create(path: &Path) -> Result<BufWriter<std::fs::File>> {
    std::fs::File::create(path)
        .map(BufWriter::new)
        .map_err(|err| {
            HeatError::PostProcessor(format!("failed to create {}: {err}", path.display()))
        })
}

/// Writes the solution as a gnuplot script that draws every triangle
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `solution` - The temperature at every node
/// * `mesh_file` - The mesh file; its stem names the `.tex` plot
/// * `results_output` - The path of the gnuplot script to write
pub fn write_results(
    mesh: &Mesh,
    solution: &DVector<f64>,
    mesh_file: &Path,
    results_output: &Path,
) -> Result<()> {
    let plot_name = mesh_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_owned());

    let mut results_file = create(results_output)?;
    write_gnuplot(
        &mut results_file,
        &element_outlines(mesh, solution),
        &plot_name,
    )
    .map_err(|err| {
        HeatError::PostProcessor(format!(
            "failed to write {}: {err}",
            results_output.display()
        ))
    })?;

    info!("wrote results to {}", results_output.display());

    Ok(())
}

/// Writes the temperature at every node to a CSV file
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `solution` - The temperature at every node
/// * `nodes_output` - The filename of the output nodes csv
pub fn csv_output(mesh: &Mesh, solution: &DVector<f64>, nodes_output: &Path) -> Result<()> {
    let mut nodes_file = create(nodes_output)?;

    let write = |nodes_file: &mut BufWriter<std::fs::File>| -> std::io::Result<()> {
        writeln!(nodes_file, "x,y,u")?;
        for (node, u) in mesh.nodes.iter().zip(solution.iter()) {
            writeln!(nodes_file, "{},{},{}", node.vertex.x, node.vertex.y, u)?;
        }
        nodes_file.flush()
    };

    write(&mut nodes_file).map_err(|err| {
        HeatError::PostProcessor(format!("failed to write {}: {err}", nodes_output.display()))
    })?;

    info!("wrote node values to {}", nodes_output.display());

    Ok(())
}
