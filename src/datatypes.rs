use nalgebra::DVector;

use crate::error::{LaminaError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }
}

/// A fixed-arity element. Node order is counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<const N: usize> {
    pub nodes: [usize; N],
}

impl<const N: usize> Element<N> {
    pub fn new(nodes: [usize; N]) -> Element<N> {
        Element { nodes }
    }

    /// Gathers the coordinates of the element's nodes
    ///
    /// # Panics
    /// If a node index is out of range for `nodes`; assembly routines
    /// run `check_connectivity` before calling this.
    pub fn vertices(&self, nodes: &[Vertex]) -> [Vertex; N] {
        self.nodes.map(|i| nodes[i])
    }
}

pub type Quad = Element<4>;
pub type Triangle = Element<3>;

/// A degree of freedom, addressed by the node that owns it and the
/// component at that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dof {
    pub node: usize,
    pub component: usize,
}

impl Dof {
    pub fn global(&self, freedom: usize) -> usize {
        self.node * freedom + self.component
    }
}

/// Nodal stress quantities averaged over adjacent elements
#[derive(Debug, Clone, PartialEq)]
pub struct StressField {
    pub sigma_x: DVector<f64>,
    pub sigma_y: DVector<f64>,
    pub tau_xy: DVector<f64>,
    pub tau_xz: DVector<f64>,
    pub tau_yz: DVector<f64>,
    pub von_mises: DVector<f64>,
}

impl StressField {
    pub fn zeros(nodes_count: usize) -> StressField {
        StressField {
            sigma_x: DVector::zeros(nodes_count),
            sigma_y: DVector::zeros(nodes_count),
            tau_xy: DVector::zeros(nodes_count),
            tau_xz: DVector::zeros(nodes_count),
            tau_yz: DVector::zeros(nodes_count),
            von_mises: DVector::zeros(nodes_count),
        }
    }

    pub fn len(&self) -> usize {
        self.sigma_x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigma_x.is_empty()
    }

    /// Checks that the in-plane components (sigma_x, sigma_y, tau_xy)
    /// each hold one value per node
    pub fn check_in_plane(&self, nodes_count: usize) -> Result<()> {
        for (name, values) in [
            ("sigma_x", &self.sigma_x),
            ("sigma_y", &self.sigma_y),
            ("tau_xy", &self.tau_xy),
        ] {
            if values.len() != nodes_count {
                return Err(LaminaError::DimensionMismatch(format!(
                    "Prestress {name} has {} nodal values but the mesh has {nodes_count} nodes",
                    values.len()
                )));
            }
        }
        Ok(())
    }
}
