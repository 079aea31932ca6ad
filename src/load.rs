//! Consistent nodal load vectors.

use std::collections::HashMap;

use nalgebra::DVector;
use tracing::{debug, info};

use crate::{
    assembly::{check_connectivity, in_element},
    datatypes::{Dof, Element, Vertex},
    error::{LaminaError, Result},
    quadrature::legendre_line,
    shape::ElementShape,
};

/// A prescribed point load on one degree of freedom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodalLoad {
    pub dof: Dof,
    pub value: f64,
}

fn check_load(values: &[f64], freedom: usize, at: &Vertex) -> Result<()> {
    if values.len() != freedom {
        return Err(LaminaError::DimensionMismatch(format!(
            "Load function returned {} components at ({}, {}), expected {freedom}",
            values.len(),
            at.x,
            at.y
        )));
    }
    Ok(())
}

/// Integrates a body force over every element
///
/// The load function is evaluated at each integration point and
/// distributed with the element's shape functions.
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - Quads or triangles
/// * `thickness` - Multiplies the area integral
/// * `freedom` - Degrees of freedom per node
/// * `force` - Force per unit volume at a point, one value per component
/// * `gauss_order` - Quadrature order
///
/// # Returns
/// The global force vector of length `nodes * freedom`
pub fn volume_force<S, const N: usize, F>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    thickness: f64,
    freedom: usize,
    force: F,
    gauss_order: usize,
) -> Result<DVector<f64>>
where
    S: ElementShape<N>,
    F: Fn(&Vertex) -> Vec<f64>,
{
    check_connectivity(nodes, elements)?;
    let rule = S::quadrature(gauss_order)?;

    let mut vector = DVector::zeros(nodes.len() * freedom);
    for (index, element) in elements.iter().enumerate() {
        let vertices = element.vertices(nodes);
        let xs = vertices.map(|v| v.x);
        let ys = vertices.map(|v| v.y);

        for point in &rule {
            let sample = in_element(index, S::evaluate(&vertices, point.xi, point.eta))?;
            let at = Vertex::new(sample.interpolate(&xs), sample.interpolate(&ys));
            let values = force(&at);
            check_load(&values, freedom, &at)?;

            let scale = thickness * point.weight * sample.jacobian;
            for (&node, &n) in element.nodes.iter().zip(sample.n.iter()) {
                for (component, value) in values.iter().enumerate() {
                    vector[Dof { node, component }.global(freedom)] += scale * n * value;
                }
            }
        }
    }

    info!("integrated volume force over {} elements", elements.len());

    Ok(vector)
}

fn element_edges<const N: usize>(element: &Element<N>) -> impl Iterator<Item = (usize, usize)> {
    let nodes = element.nodes;
    (0..N).map(move |i| (nodes[i], nodes[(i + 1) % N]))
}

/// Edges that belong to exactly one element, as `(first, second)` node
/// pairs oriented like their element
pub fn boundary_edges<const N: usize>(elements: &[Element<N>]) -> Vec<(usize, usize)> {
    let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
    for element in elements {
        for (a, b) in element_edges(element) {
            *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }

    elements
        .iter()
        .flat_map(element_edges)
        .filter(|&(a, b)| counts.get(&(a.min(b), a.max(b))) == Some(&1))
        .collect()
}

/// Integrates a traction along the mesh boundary
///
/// Each boundary edge is integrated with a 1D Gauss rule and linear
/// interpolation between its end nodes. Return zeros from `traction` for
/// points where the boundary is free.
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - Quads or triangles
/// * `freedom` - Degrees of freedom per node
/// * `traction` - Force per unit length at a boundary point
/// * `gauss_order` - Points on each edge (1 to 4)
pub fn edge_force<const N: usize, F>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    freedom: usize,
    traction: F,
    gauss_order: usize,
) -> Result<DVector<f64>>
where
    F: Fn(&Vertex) -> Vec<f64>,
{
    check_connectivity(nodes, elements)?;
    let rule = legendre_line(gauss_order)?;
    let edges = boundary_edges(elements);

    let mut vector = DVector::zeros(nodes.len() * freedom);
    for &(a, b) in &edges {
        let (start, end) = (nodes[a], nodes[b]);
        let half_length = f64::hypot(end.x - start.x, end.y - start.y) / 2.0;

        for &(s, weight) in &rule {
            let shape = [(1.0 - s) / 2.0, (1.0 + s) / 2.0];
            let at = Vertex::new(
                shape[0] * start.x + shape[1] * end.x,
                shape[0] * start.y + shape[1] * end.y,
            );
            let values = traction(&at);
            check_load(&values, freedom, &at)?;

            for (node, n) in [(a, shape[0]), (b, shape[1])] {
                for (component, value) in values.iter().enumerate() {
                    vector[Dof { node, component }.global(freedom)] +=
                        weight * half_length * n * value;
                }
            }
        }
    }

    debug!("integrated traction over {} boundary edges", edges.len());

    Ok(vector)
}

/// Builds a force vector from point loads
pub fn nodal_force(
    nodes_count: usize,
    freedom: usize,
    loads: &[NodalLoad],
) -> Result<DVector<f64>> {
    let mut vector = DVector::zeros(nodes_count * freedom);
    for load in loads {
        if load.dof.node >= nodes_count || load.dof.component >= freedom {
            return Err(LaminaError::DimensionMismatch(format!(
                "Point load on node {} component {} is outside {nodes_count} nodes x {freedom}",
                load.dof.node, load.dof.component
            )));
        }
        vector[load.dof.global(freedom)] += load.value;
    }

    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesher::{rectangular_quads, rectangular_triangles},
        shape::{Quad4, Tri3},
    };
    use approx::assert_relative_eq;

    #[test]
    fn uniform_volume_force_sums_to_total() {
        let (nodes, elements) = rectangular_quads(5, 4, 0.0, 0.0, 2.0, 3.0);
        let force =
            volume_force::<Quad4, 4, _>(&nodes, &elements, 0.5, 3, |_| vec![2.0, 0.0, 0.0], 3)
                .unwrap();

        let total_w: f64 = force.iter().step_by(3).sum();
        assert_relative_eq!(total_w, 2.0 * 0.5 * 6.0, epsilon = 1e-10);
        assert_relative_eq!(force.iter().skip(1).step_by(3).sum::<f64>(), 0.0);
    }

    #[test]
    fn single_quad_splits_load_evenly() {
        let (nodes, elements) = rectangular_quads(2, 2, 0.0, 0.0, 1.0, 1.0);
        let force =
            volume_force::<Quad4, 4, _>(&nodes, &elements, 1.0, 1, |_| vec![4.0], 2).unwrap();
        for value in force.iter() {
            assert_relative_eq!(*value, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn triangle_volume_force_sums_to_total() {
        let (nodes, elements) = rectangular_triangles(4, 3, -1.0, -1.0, 2.0, 2.0);
        let force =
            volume_force::<Tri3, 3, _>(&nodes, &elements, 1.0, 2, |_| vec![0.0, -1.5], 2).unwrap();
        assert_relative_eq!(force.iter().skip(1).step_by(2).sum::<f64>(), -6.0, epsilon = 1e-10);
    }

    #[test]
    fn load_function_arity_is_checked() {
        let (nodes, elements) = rectangular_quads(2, 2, 0.0, 0.0, 1.0, 1.0);
        let result = volume_force::<Quad4, 4, _>(&nodes, &elements, 1.0, 2, |_| vec![1.0], 2);
        assert!(matches!(result, Err(LaminaError::DimensionMismatch(_))));
    }

    #[test]
    fn interior_edges_are_not_boundary() {
        let (_, elements) = rectangular_quads(3, 3, 0.0, 0.0, 1.0, 1.0);
        let edges = boundary_edges(&elements);
        assert_eq!(edges.len(), 8);
        assert!(!edges.iter().any(|&(a, b)| (a, b) == (1, 4) || (a, b) == (4, 1)));
    }

    #[test]
    fn top_edge_traction_sums_to_total() {
        let (nodes, elements) = rectangular_triangles(11, 3, -5.0, -1.0, 10.0, 2.0);
        let force = edge_force(
            &nodes,
            &elements,
            2,
            |at| {
                if (at.y - 1.0).abs() < 1e-9 {
                    vec![0.0, -3.0]
                } else {
                    vec![0.0, 0.0]
                }
            },
            2,
        )
        .unwrap();

        assert_relative_eq!(force.iter().skip(1).step_by(2).sum::<f64>(), -30.0, epsilon = 1e-10);
        // Interior top nodes carry a full segment, corners half of one
        let top_left = 2 * 11;
        assert_relative_eq!(force[2 * top_left + 1], -1.5, epsilon = 1e-12);
        assert_relative_eq!(force[2 * (top_left + 1) + 1], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn nodal_loads_accumulate() {
        let loads = [
            NodalLoad {
                dof: Dof { node: 1, component: 0 },
                value: 2.0,
            },
            NodalLoad {
                dof: Dof { node: 1, component: 0 },
                value: 0.5,
            },
        ];
        let force = nodal_force(2, 3, &loads).unwrap();
        assert_eq!(force[3], 2.5);
        assert_eq!(force.sum(), 2.5);

        let outside = NodalLoad {
            dof: Dof { node: 0, component: 3 },
            value: 1.0,
        };
        assert!(nodal_force(2, 3, &[outside]).is_err());
    }
}
