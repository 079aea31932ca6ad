use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    assembly::{check_connectivity, in_element},
    datatypes::{Dof, Element, StressField, Vertex},
    error::{LaminaError, Result},
    material::{shear_block, validate_elasticity, ElasticityMatrix},
    shape::{ElementShape, ShapeSample},
    strain::{strain_displacement, Formulation},
};

/// Stress components at one element corner:
/// `[sigma_x, sigma_y, tau_xy, tau_xz, tau_yz]`
type CornerStress = [f64; 5];

/// Equivalent von Mises stress of a plate stress state
pub fn von_mises(stress: &CornerStress) -> f64 {
    let [sx, sy, txy, txz, tyz] = *stress;
    f64::sqrt(
        0.5 * (f64::powi(sx - sy, 2)
            + f64::powi(sy, 2)
            + f64::powi(sx, 2)
            + 6.0 * (f64::powi(txy, 2) + f64::powi(txz, 2) + f64::powi(tyz, 2))),
    )
}

/// Per-node sums of corner stresses and the number of contributing
/// elements
struct StressAccumulator {
    field: StressField,
    adjacent: Vec<usize>,
}

impl StressAccumulator {
    fn new(nodes_count: usize) -> StressAccumulator {
        StressAccumulator {
            field: StressField::zeros(nodes_count),
            adjacent: vec![0; nodes_count],
        }
    }

    fn add(&mut self, node: usize, stress: &CornerStress) {
        self.field.sigma_x[node] += stress[0];
        self.field.sigma_y[node] += stress[1];
        self.field.tau_xy[node] += stress[2];
        self.field.tau_xz[node] += stress[3];
        self.field.tau_yz[node] += stress[4];
        self.field.von_mises[node] += von_mises(stress);
        self.adjacent[node] += 1;
    }

    /// Averages every accumulator by its node's adjacency count. Nodes
    /// touched by no element keep zero stresses.
    fn finish(mut self) -> StressField {
        let orphans = self.adjacent.iter().filter(|&&count| count == 0).count();
        if orphans > 0 {
            warn!("{orphans} nodes belong to no element; their stresses are left at zero");
        }

        let field = &mut self.field;
        for (node, &count) in self.adjacent.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let count = count as f64;
            field.sigma_x[node] /= count;
            field.sigma_y[node] /= count;
            field.tau_xy[node] /= count;
            field.tau_xz[node] /= count;
            field.tau_yz[node] /= count;
            field.von_mises[node] /= count;
        }

        self.field
    }
}

/// Gathers an element's nodal displacements ordered by node, then component
fn element_displacement<const N: usize>(
    element: &Element<N>,
    displacement: &DVector<f64>,
    freedom: usize,
) -> DVector<f64> {
    let mut local = DVector::zeros(N * freedom);
    let mut local_index = 0;
    for &node in element.nodes.iter() {
        for component in 0..freedom {
            local[local_index] = displacement[Dof { node, component }.global(freedom)];
            local_index += 1;
        }
    }
    local
}

/// Evaluates corner stresses of every element in parallel and averages
/// them at the nodes
fn recover<S, const N: usize, F>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    displacement: &DVector<f64>,
    freedom: usize,
    corner_stress: F,
) -> Result<StressField>
where
    S: ElementShape<N>,
    F: Fn(&ShapeSample<N>, &DVector<f64>) -> CornerStress + Sync,
{
    check_connectivity(nodes, elements)?;
    if displacement.len() != nodes.len() * freedom {
        return Err(LaminaError::DimensionMismatch(format!(
            "Displacement has {} entries, expected {} ({} nodes x {freedom})",
            displacement.len(),
            nodes.len() * freedom,
            nodes.len()
        )));
    }

    let corners = S::corners();
    let element_stresses: Vec<[CornerStress; N]> = elements
        .par_iter()
        .enumerate()
        .map(|(index, element)| -> Result<[CornerStress; N]> {
            let vertices = element.vertices(nodes);
            let local = element_displacement(element, displacement, freedom);

            let mut stresses = [[0.0; 5]; N];
            for (stress, &(xi, eta)) in stresses.iter_mut().zip(corners.iter()) {
                let sample = in_element(index, S::evaluate(&vertices, xi, eta))?;
                *stress = corner_stress(&sample, &local);
            }
            Ok(stresses)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut accumulator = StressAccumulator::new(nodes.len());
    for (element, stresses) in std::iter::zip(elements, &element_stresses) {
        for (&node, stress) in element.nodes.iter().zip(stresses.iter()) {
            accumulator.add(node, stress);
        }
    }

    Ok(accumulator.finish())
}

/// Recovers averaged nodal stresses of a Mindlin plate at fiber `z`
///
/// Bending stresses are `z * Df * Bf * u`, transverse shear stresses
/// `Dc * Bc * u`, both evaluated at element corners.
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - Quads or triangles
/// * `elasticity` - The 3x3 stress-strain matrix
/// * `displacement` - Solved DOFs (w, theta_x, theta_y) per node
/// * `z` - Distance of the fiber from the midplane
pub fn plate_stresses<S: ElementShape<N>, const N: usize>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    elasticity: &ElasticityMatrix,
    displacement: &DVector<f64>,
    z: f64,
) -> Result<StressField> {
    validate_elasticity(elasticity)?;
    info!("recovering plate stresses at z = {z}");

    let df = DMatrix::from_column_slice(3, 3, elasticity.as_slice());
    let dc = DMatrix::from_column_slice(2, 2, shear_block(elasticity).as_slice());

    recover::<S, N, _>(nodes, elements, displacement, 3, |sample, local| {
        let bf = strain_displacement(Formulation::PlateBending, sample);
        let bc = strain_displacement(Formulation::PlateShear, sample);
        let sigma = &df * (&bf * local) * z;
        let tau = &dc * (&bc * local);
        [sigma[0], sigma[1], sigma[2], tau[0], tau[1]]
    })
}

/// Recovers averaged nodal stresses of a plane stress/strain mesh
///
/// Transverse shear components are zero. The in-plane components can be
/// fed back as prestress for geometric stiffness assembly.
///
/// # Arguments
/// * `nodes` - The node set
/// * `elements` - Quads or triangles
/// * `elasticity` - The 3x3 stress-strain matrix
/// * `displacement` - Solved DOFs (u, v) per node
pub fn plane_stresses<S: ElementShape<N>, const N: usize>(
    nodes: &[Vertex],
    elements: &[Element<N>],
    elasticity: &ElasticityMatrix,
    displacement: &DVector<f64>,
) -> Result<StressField> {
    validate_elasticity(elasticity)?;
    info!("recovering plane stresses");

    let d = DMatrix::from_column_slice(3, 3, elasticity.as_slice());

    recover::<S, N, _>(nodes, elements, displacement, 2, |sample, local| {
        let b = strain_displacement(Formulation::Plane, sample);
        let sigma = &d * (&b * local);
        [sigma[0], sigma[1], sigma[2], 0.0, 0.0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        material::plane_stress_isotropic,
        mesher::{rectangular_quads, rectangular_triangles},
        shape::{Quad4, Tri3},
    };
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn von_mises_of_uniaxial_stress_is_the_stress() {
        assert_relative_eq!(von_mises(&[3.0, 0.0, 0.0, 0.0, 0.0]), 3.0, epsilon = 1e-14);
        assert_relative_eq!(
            von_mises(&[0.0, 0.0, 1.0, 0.0, 0.0]),
            3.0_f64.sqrt(),
            epsilon = 1e-14
        );
    }

    #[test]
    fn constant_strain_field_reproduces_plane_stress() {
        let (nodes, elements) = rectangular_quads(5, 4, -1.0, 0.5, 3.0, 2.0);
        let d = plane_stress_isotropic(210.0, 0.3);
        let (exx, eyy, gxy) = (1e-3, -4e-4, 2e-4);

        // u = exx x + gxy y, v = eyy y
        let displacement = DVector::from_fn(nodes.len() * 2, |i, _| {
            let node = nodes[i / 2];
            if i % 2 == 0 {
                exx * node.x + gxy * node.y
            } else {
                eyy * node.y
            }
        });
        let expected = d * Vector3::new(exx, eyy, gxy);

        let field = plane_stresses::<Quad4, 4>(&nodes, &elements, &d, &displacement).unwrap();
        for node in 0..nodes.len() {
            assert_relative_eq!(field.sigma_x[node], expected[0], epsilon = 1e-10);
            assert_relative_eq!(field.sigma_y[node], expected[1], epsilon = 1e-10);
            assert_relative_eq!(field.tau_xy[node], expected[2], epsilon = 1e-10);
            assert_eq!(field.tau_xz[node], 0.0);
        }
    }

    #[test]
    fn constant_curvature_reproduces_bending_stress() {
        let (nodes, elements) = rectangular_triangles(4, 4, 0.0, 0.0, 1.0, 1.0);
        let d = plane_stress_isotropic(1000.0, 0.25);
        let (kx, ky) = (0.02, -0.01);
        let z = 0.05;

        // w = 0, theta_x = kx x, theta_y = ky y
        let displacement = DVector::from_fn(nodes.len() * 3, |i, _| {
            let node = nodes[i / 3];
            match i % 3 {
                1 => kx * node.x,
                2 => ky * node.y,
                _ => 0.0,
            }
        });

        let bending = d * Vector3::new(kx, ky, 0.0) * z;
        let g = d[(2, 2)];

        let field = plate_stresses::<Tri3, 3>(&nodes, &elements, &d, &displacement, z).unwrap();
        for (i, node) in nodes.iter().enumerate() {
            assert_relative_eq!(field.sigma_x[i], bending[0], epsilon = 1e-12);
            assert_relative_eq!(field.sigma_y[i], bending[1], epsilon = 1e-12);
            assert_relative_eq!(field.tau_xy[i], 0.0, epsilon = 1e-12);
            // Rotations are interpolated exactly at the corners
            assert_relative_eq!(field.tau_xz[i], g * kx * node.x, epsilon = 1e-12);
            assert_relative_eq!(field.tau_yz[i], g * ky * node.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn midplane_has_no_bending_stress() {
        let (nodes, elements) = rectangular_quads(3, 3, 0.0, 0.0, 1.0, 1.0);
        let d = plane_stress_isotropic(1.0, 0.3);
        let displacement = DVector::from_fn(nodes.len() * 3, |i, _| (i as f64).sin());
        let field = plate_stresses::<Quad4, 4>(&nodes, &elements, &d, &displacement, 0.0).unwrap();
        assert_eq!(field.sigma_x.amax(), 0.0);
        assert_eq!(field.sigma_y.amax(), 0.0);
    }

    #[test]
    fn orphan_nodes_keep_zero_stress() {
        let (mut nodes, elements) = rectangular_quads(2, 2, 0.0, 0.0, 1.0, 1.0);
        nodes.push(Vertex::new(5.0, 5.0));
        let d = plane_stress_isotropic(1.0, 0.3);
        let displacement = DVector::from_fn(nodes.len() * 2, |i, _| i as f64 * 0.1);
        let field = plane_stresses::<Quad4, 4>(&nodes, &elements, &d, &displacement).unwrap();
        assert_eq!(field.von_mises[4], 0.0);
        assert!(field.von_mises[0] > 0.0);
    }

    #[test]
    fn displacement_length_is_checked() {
        let (nodes, elements) = rectangular_quads(3, 3, 0.0, 0.0, 1.0, 1.0);
        let d = plane_stress_isotropic(1.0, 0.3);
        let displacement = DVector::zeros(nodes.len() * 2);
        let result = plate_stresses::<Quad4, 4>(&nodes, &elements, &d, &displacement, 0.0);
        assert!(matches!(result, Err(LaminaError::DimensionMismatch(_))));
    }
}
