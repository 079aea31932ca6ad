use indicatif::ProgressBar;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    datatypes::{Dof, Element, Quad, StressField, Triangle, Vertex},
    error::{LaminaError, Result},
    kernel::{
        geometric_stiffness, laminate_stiffness, mindlin_stiffness, plane_stiffness,
        ElementPrestress,
    },
    material::{
        validate_elasticity, validate_thickness, ElasticityMatrix, Laminate, DEFAULT_KAPPA,
    },
    shape::{ElementShape, Quad4, Tri3},
};

/// Quadrature and shear settings of the plate assembly routines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    pub gauss_order: usize,
    pub kappa: f64,
}

impl AssemblyOptions {
    /// Defaults for plate meshes: order 3, kappa 5/6
    pub fn plate() -> AssemblyOptions {
        AssemblyOptions {
            gauss_order: 3,
            kappa: DEFAULT_KAPPA,
        }
    }
}

/// Sparse accumulator for a global system matrix. Open for scatter-add
/// during the element loop, then consumed once into CSR.
pub struct GlobalAccumulator {
    freedom: usize,
    matrix: CooMatrix<f64>,
}

impl GlobalAccumulator {
    pub fn new(nodes_count: usize, freedom: usize) -> GlobalAccumulator {
        let dimension = nodes_count * freedom;
        GlobalAccumulator {
            freedom,
            matrix: CooMatrix::new(dimension, dimension),
        }
    }

    pub fn freedom(&self) -> usize {
        self.freedom
    }

    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    /// Lists the element's DOFs in local order (node, then component)
    pub fn element_dofs<const N: usize>(&self, element: &Element<N>) -> Vec<Dof> {
        let mut dofs = Vec::with_capacity(N * self.freedom);
        for &node in element.nodes.iter() {
            for component in 0..self.freedom {
                dofs.push(Dof { node, component });
            }
        }
        dofs
    }

    /// Adds a local element matrix into the global matrix
    ///
    /// Only the upper triangle of `local` is read; every off-diagonal
    /// value is written to both `(ii, jj)` and `(jj, ii)`.
    ///
    /// # Arguments
    /// * `element` - The element the local matrix belongs to
    /// * `local` - A `(freedom * N)` square element matrix
    pub fn scatter<const N: usize>(
        &mut self,
        element: &Element<N>,
        local: &DMatrix<f64>,
    ) -> Result<()> {
        let element_dimension = self.freedom * N;
        if local.shape() != (element_dimension, element_dimension) {
            return Err(LaminaError::DimensionMismatch(format!(
                "Local matrix is {:?}, expected {element_dimension}x{element_dimension}",
                local.shape()
            )));
        }

        let global: Vec<usize> = self
            .element_dofs(element)
            .iter()
            .map(|dof| dof.global(self.freedom))
            .collect();
        if let Some(&out_of_range) = global.iter().find(|&&g| g >= self.dimension()) {
            return Err(LaminaError::DimensionMismatch(format!(
                "Global DOF {out_of_range} exceeds system dimension {}",
                self.dimension()
            )));
        }

        for (i, &ii) in global.iter().enumerate() {
            for (j, &jj) in global.iter().enumerate().skip(i) {
                let value = local[(i, j)];
                self.matrix.push(ii, jj, value);
                if i != j {
                    self.matrix.push(jj, ii, value);
                }
            }
        }

        Ok(())
    }

    /// Freezes the accumulator into compressed sparse row form, summing
    /// duplicate entries
    pub fn finish(self) -> CsrMatrix<f64> {
        CsrMatrix::from(&self.matrix)
    }

    /// Surrenders the raw coordinate matrix without compressing it
    pub fn into_coordinates(self) -> CooMatrix<f64> {
        self.matrix
    }
}

/// Checks that every element references an existing node
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The element connectivity
pub fn check_connectivity<const N: usize>(nodes: &[Vertex], elements: &[Element<N>]) -> Result<()> {
    for (index, element) in elements.iter().enumerate() {
        if let Some(node) = element.nodes.iter().find(|&&n| n >= nodes.len()) {
            return Err(LaminaError::DimensionMismatch(format!(
                "Element {index} references node {node} but only {} nodes exist",
                nodes.len()
            )));
        }
    }
    Ok(())
}

/// Computes every element's local matrix in parallel, then scatters them
/// into a global matrix in element order
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The element connectivity
/// * `freedom` - DOFs per node of the formulation
/// * `kernel` - Computes the local matrix of one element
///
/// # Returns
/// The assembled matrix in compressed sparse row form
pub fn assemble<const N: usize, K>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    freedom: usize,
    kernel: K,
) -> Result<CsrMatrix<f64>>
where
    K: Fn(usize, &Element<N>) -> Result<DMatrix<f64>> + Sync,
{
    check_connectivity(nodes, elements)?;

    info!(
        "assembling {} elements over {} nodes ({} DOFs per node)",
        elements.len(),
        nodes.len(),
        freedom
    );

    let local_matrices: Vec<DMatrix<f64>> = elements
        .par_iter()
        .enumerate()
        .map(|(index, element)| kernel(index, element))
        .collect::<Result<Vec<_>>>()?;

    let mut accumulator = GlobalAccumulator::new(nodes.len(), freedom);
    let bar = ProgressBar::new(elements.len() as u64);
    for (element, local) in std::iter::zip(elements, &local_matrices) {
        accumulator.scatter(element, local)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    let matrix = accumulator.finish();
    debug!(
        "assembled {}x{} matrix with {} stored entries",
        matrix.nrows(),
        matrix.ncols(),
        matrix.nnz()
    );

    Ok(matrix)
}

/// Tags degenerate geometry errors with the offending element
pub(crate) fn in_element<T>(index: usize, result: Result<T>) -> Result<T> {
    result.map_err(|err| match err {
        LaminaError::DegenerateGeometry(msg) => {
            LaminaError::DegenerateGeometry(format!("element {index}: {msg}"))
        }
        other => other,
    })
}

fn plane_stress_strain<S: ElementShape<N>, const N: usize>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    thickness: f64,
    elasticity: &ElasticityMatrix,
    gauss_order: usize,
) -> Result<CsrMatrix<f64>> {
    validate_elasticity(elasticity)?;
    let rule = S::quadrature(gauss_order)?;

    assemble(nodes, elements, 2, |index, element| {
        in_element(
            index,
            plane_stiffness::<S, N>(&element.vertices(nodes), thickness, elasticity, &rule),
        )
    })
}

/// Assembles the plane stress/strain stiffness matrix of a quad mesh
///
/// DOF order: u_0, v_0, u_1, v_1, ...
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The quads
/// * `thickness` - The thickness of the body
/// * `elasticity` - The 3x3 stress-strain matrix
/// * `gauss_order` - Gauss points per direction (2 by default)
pub fn assemble_quads_stress_strain(
    nodes: &[Vertex],
    elements: &[Quad],
    thickness: f64,
    elasticity: &ElasticityMatrix,
    gauss_order: usize,
) -> Result<CsrMatrix<f64>> {
    validate_thickness(thickness)?;
    plane_stress_strain::<Quad4, 4>(nodes, elements, thickness, elasticity, gauss_order)
}

/// Assembles the plane stress/strain stiffness matrix of a triangle mesh
///
/// Triangles carry no thickness factor. DOF order: u_0, v_0, u_1, v_1, ...
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The triangles
/// * `elasticity` - The 3x3 stress-strain matrix
/// * `gauss_order` - Triangle quadrature order (2 by default)
pub fn assemble_triangles_stress_strain(
    nodes: &[Vertex],
    elements: &[Triangle],
    elasticity: &ElasticityMatrix,
    gauss_order: usize,
) -> Result<CsrMatrix<f64>> {
    plane_stress_strain::<Tri3, 3>(nodes, elements, 1.0, elasticity, gauss_order)
}

/// Assembles the Mindlin plate stiffness matrix of a quad mesh
///
/// DOF order: w_0, theta_x_0, theta_y_0, w_1, ...
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The quads
/// * `thickness` - The plate thickness
/// * `elasticity` - The 3x3 stress-strain matrix
/// * `options` - Gauss order (3 by default) and shear correction factor
pub fn assemble_quads_mindlin_plate(
    nodes: &[Vertex],
    elements: &[Quad],
    thickness: f64,
    elasticity: &ElasticityMatrix,
    options: AssemblyOptions,
) -> Result<CsrMatrix<f64>> {
    validate_thickness(thickness)?;
    validate_elasticity(elasticity)?;
    let rule = Quad4::quadrature(options.gauss_order)?;

    assemble(nodes, elements, 3, |index, element| {
        in_element(
            index,
            mindlin_stiffness::<Quad4, 4>(
                &element.vertices(nodes),
                thickness,
                elasticity,
                options.kappa,
                &rule,
            ),
        )
    })
}

/// Assembles the laminated Mindlin plate stiffness matrix of a quad mesh
///
/// DOF order: u_0, v_0, w_0, theta_x_0, theta_y_0, u_1, ...
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The quads
/// * `laminate` - The layer stack, bottom first
/// * `options` - Gauss order (3 by default) and shear correction factor
pub fn assemble_quads_mindlin_plate_laminated(
    nodes: &[Vertex],
    elements: &[Quad],
    laminate: &Laminate,
    options: AssemblyOptions,
) -> Result<CsrMatrix<f64>> {
    let rule = Quad4::quadrature(options.gauss_order)?;

    assemble(nodes, elements, 5, |index, element| {
        in_element(
            index,
            laminate_stiffness::<Quad4, 4>(
                &element.vertices(nodes),
                laminate,
                options.kappa,
                &rule,
            ),
        )
    })
}

/// Assembles the geometric (stability) stiffness matrix of a quad plate
/// mesh under a nodal in-plane prestress
///
/// DOF order: w_0, theta_x_0, theta_y_0, w_1, ...
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - The quads
/// * `thickness` - The plate thickness
/// * `prestress` - Nodal stresses; only sigma_x, sigma_y and tau_xy are read
/// * `gauss_order` - Gauss points per direction (3 by default)
pub fn assemble_quads_mindlin_plate_geometric(
    nodes: &[Vertex],
    elements: &[Quad],
    thickness: f64,
    prestress: &StressField,
    gauss_order: usize,
) -> Result<CsrMatrix<f64>> {
    validate_thickness(thickness)?;
    prestress.check_in_plane(nodes.len())?;
    let rule = Quad4::quadrature(gauss_order)?;

    assemble(nodes, elements, 3, |index, element| {
        let element_prestress: ElementPrestress<4> = [
            element.nodes.map(|n| prestress.sigma_x[n]),
            element.nodes.map(|n| prestress.sigma_y[n]),
            element.nodes.map(|n| prestress.tau_xy[n]),
        ];
        in_element(
            index,
            geometric_stiffness::<Quad4, 4>(
                &element.vertices(nodes),
                thickness,
                &element_prestress,
                &rule,
            ),
        )
    })
}
