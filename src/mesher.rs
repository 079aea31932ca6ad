use tracing::debug;

use crate::datatypes::{Quad, Triangle, Vertex};

/// Builds a structured grid of nodes, numbered along x first
///
/// # Arguments
/// * `x_count` - Nodes along x
/// * `y_count` - Nodes along y
/// * `x_origin` - x of the lower-left corner
/// * `y_origin` - y of the lower-left corner
/// * `width` - Extent along x
/// * `height` - Extent along y
fn grid_nodes(
    x_count: usize,
    y_count: usize,
    x_origin: f64,
    y_origin: f64,
    width: f64,
    height: f64,
) -> Vec<Vertex> {
    let dx = width / (x_count.max(2) - 1) as f64;
    let dy = height / (y_count.max(2) - 1) as f64;

    let mut nodes = Vec::with_capacity(x_count * y_count);
    for j in 0..y_count {
        for i in 0..x_count {
            nodes.push(Vertex {
                x: x_origin + i as f64 * dx,
                y: y_origin + j as f64 * dy,
            });
        }
    }

    nodes
}

/// Corner node indices `[lower-left, lower-right, upper-right, upper-left]`
/// of every grid cell
fn grid_cells(x_count: usize, y_count: usize) -> Vec<[usize; 4]> {
    let mut cells = Vec::with_capacity(x_count.saturating_sub(1) * y_count.saturating_sub(1));
    for j in 0..y_count.saturating_sub(1) {
        for i in 0..x_count.saturating_sub(1) {
            let n0 = j * x_count + i;
            let n3 = n0 + x_count;
            cells.push([n0, n0 + 1, n3 + 1, n3]);
        }
    }
    cells
}

/// Meshes a rectangle with counter-clockwise quads
///
/// # Returns
/// A tuple of the nodes and the quads, in that order
pub fn rectangular_quads(
    x_count: usize,
    y_count: usize,
    x_origin: f64,
    y_origin: f64,
    width: f64,
    height: f64,
) -> (Vec<Vertex>, Vec<Quad>) {
    let nodes = grid_nodes(x_count, y_count, x_origin, y_origin, width, height);
    let elements: Vec<Quad> = grid_cells(x_count, y_count)
        .into_iter()
        .map(|nodes| Quad { nodes })
        .collect();

    debug!(
        "meshed rectangle with {} nodes and {} quads",
        nodes.len(),
        elements.len()
    );

    (nodes, elements)
}

/// Meshes a rectangle with counter-clockwise triangles, two per grid cell
///
/// # Returns
/// A tuple of the nodes and the triangles, in that order
pub fn rectangular_triangles(
    x_count: usize,
    y_count: usize,
    x_origin: f64,
    y_origin: f64,
    width: f64,
    height: f64,
) -> (Vec<Vertex>, Vec<Triangle>) {
    let nodes = grid_nodes(x_count, y_count, x_origin, y_origin, width, height);
    let elements: Vec<Triangle> = grid_cells(x_count, y_count)
        .into_iter()
        .flat_map(|[n0, n1, n2, n3]| {
            [
                Triangle {
                    nodes: [n0, n1, n2],
                },
                Triangle {
                    nodes: [n0, n2, n3],
                },
            ]
        })
        .collect();

    debug!(
        "meshed rectangle with {} nodes and {} triangles",
        nodes.len(),
        elements.len()
    );

    (nodes, elements)
}
