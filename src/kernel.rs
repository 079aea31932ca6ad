//! Element kernels. Each integrates `B^T D B` terms over the quadrature
//! points of one element and returns a dense local matrix whose DOFs are
//! ordered by node, then component.

use nalgebra::{DMatrix, Matrix2, Matrix3};

use crate::{
    datatypes::Vertex,
    error::Result,
    material::{shear_block, ElasticityMatrix, Laminate},
    quadrature::QuadraturePoint,
    shape::ElementShape,
    strain::{strain_displacement, Formulation},
};

/// Nodal in-plane prestress of one element: `[sigma_x, sigma_y, tau_xy]`
pub type ElementPrestress<const N: usize> = [[f64; N]; 3];

fn dynamic3(m: &Matrix3<f64>) -> DMatrix<f64> {
    DMatrix::from_column_slice(3, 3, m.as_slice())
}

fn dynamic2(m: &Matrix2<f64>) -> DMatrix<f64> {
    DMatrix::from_column_slice(2, 2, m.as_slice())
}

/// `left^T * d * right`
fn congruence(left: &DMatrix<f64>, d: &DMatrix<f64>, right: &DMatrix<f64>) -> DMatrix<f64> {
    left.transpose() * d * right
}

/// Computes the plane stress/strain stiffness matrix of an element
///
/// # Arguments
/// * `vertices` - The element's node coordinates
/// * `thickness` - The out-of-plane thickness factor
/// * `elasticity` - The 3x3 stress-strain matrix
/// * `rule` - Quadrature points over the reference element
///
/// # Returns
/// A `2N x 2N` stiffness matrix
pub fn plane_stiffness<S: ElementShape<N>, const N: usize>(
    vertices: &[Vertex; N],
    thickness: f64,
    elasticity: &ElasticityMatrix,
    rule: &[QuadraturePoint],
) -> Result<DMatrix<f64>> {
    let d = dynamic3(elasticity);
    let dimension = Formulation::Plane.freedom() * N;
    let mut local = DMatrix::zeros(dimension, dimension);

    for point in rule {
        let sample = S::evaluate(vertices, point.xi, point.eta)?;
        let b = strain_displacement(Formulation::Plane, &sample);
        local += congruence(&b, &d, &b) * (thickness * sample.jacobian * point.weight);
    }

    Ok(local)
}

/// Computes the Mindlin plate stiffness matrix of an element, with DOFs
/// (w, theta_x, theta_y) per node
///
/// # Arguments
/// * `vertices` - The element's node coordinates
/// * `thickness` - The plate thickness
/// * `elasticity` - The 3x3 bending stress-strain matrix
/// * `kappa` - The shear correction factor
/// * `rule` - Quadrature points over the reference element
///
/// # Returns
/// A `3N x 3N` stiffness matrix
pub fn mindlin_stiffness<S: ElementShape<N>, const N: usize>(
    vertices: &[Vertex; N],
    thickness: f64,
    elasticity: &ElasticityMatrix,
    kappa: f64,
    rule: &[QuadraturePoint],
) -> Result<DMatrix<f64>> {
    let df = dynamic3(elasticity);
    let dc = dynamic2(&shear_block(elasticity));
    let bending_factor = thickness.powi(3) / 12.0;
    let shear_factor = kappa * thickness;

    let dimension = Formulation::PlateBending.freedom() * N;
    let mut local = DMatrix::zeros(dimension, dimension);

    for point in rule {
        let sample = S::evaluate(vertices, point.xi, point.eta)?;
        let bf = strain_displacement(Formulation::PlateBending, &sample);
        let bc = strain_displacement(Formulation::PlateShear, &sample);

        let weight = sample.jacobian * point.weight;
        local += congruence(&bf, &df, &bf) * (bending_factor * weight);
        local += congruence(&bc, &dc, &bc) * (shear_factor * weight);
    }

    Ok(local)
}

/// Computes the laminated Mindlin plate stiffness matrix of an element,
/// with DOFs (u, v, w, theta_x, theta_y) per node
///
/// Layers are integrated exactly through the thickness: each contributes
/// its membrane, membrane-bending coupling, bending and shear terms
/// weighted by the moments of its `[z0, z1]` interval.
///
/// # Arguments
/// * `vertices` - The element's node coordinates
/// * `laminate` - The layer stack
/// * `kappa` - The shear correction factor
/// * `rule` - Quadrature points over the reference element
///
/// # Returns
/// A `5N x 5N` stiffness matrix
pub fn laminate_stiffness<S: ElementShape<N>, const N: usize>(
    vertices: &[Vertex; N],
    laminate: &Laminate,
    kappa: f64,
    rule: &[QuadraturePoint],
) -> Result<DMatrix<f64>> {
    let plies: Vec<(f64, f64, DMatrix<f64>, DMatrix<f64>)> = laminate
        .bounds()
        .into_iter()
        .map(|(z0, z1, layer)| {
            (
                z0,
                z1,
                dynamic3(&layer.elasticity),
                dynamic2(&shear_block(&layer.elasticity)),
            )
        })
        .collect();

    let dimension = Formulation::LaminateMembrane.freedom() * N;
    let mut local = DMatrix::zeros(dimension, dimension);

    for point in rule {
        let sample = S::evaluate(vertices, point.xi, point.eta)?;
        let bm = strain_displacement(Formulation::LaminateMembrane, &sample);
        let bf = strain_displacement(Formulation::LaminateBending, &sample);
        let bc = strain_displacement(Formulation::LaminateShear, &sample);
        let weight = sample.jacobian * point.weight;

        for (z0, z1, df, dc) in &plies {
            let membrane = z1 - z0;
            let coupling = (z1.powi(2) - z0.powi(2)) / 2.0;
            let bending = (z1.powi(3) - z0.powi(3)) / 3.0;

            local += congruence(&bm, df, &bm) * (membrane * weight);
            local += congruence(&bm, df, &bf) * (coupling * weight);
            local += congruence(&bf, df, &bm) * (coupling * weight);
            local += congruence(&bf, df, &bf) * (bending * weight);
            local += congruence(&bc, dc, &bc) * (kappa * membrane * weight);
        }
    }

    Ok(local)
}

/// Computes the geometric (stability) stiffness matrix of a plate element
/// under an in-plane prestress, with DOFs (w, theta_x, theta_y) per node
///
/// # Arguments
/// * `vertices` - The element's node coordinates
/// * `thickness` - The plate thickness
/// * `prestress` - Nodal `[sigma_x, sigma_y, tau_xy]` of the element
/// * `rule` - Quadrature points over the reference element
///
/// # Returns
/// A `3N x 3N` geometric stiffness matrix
pub fn geometric_stiffness<S: ElementShape<N>, const N: usize>(
    vertices: &[Vertex; N],
    thickness: f64,
    prestress: &ElementPrestress<N>,
    rule: &[QuadraturePoint],
) -> Result<DMatrix<f64>> {
    let rotation_factor = thickness.powi(3) / 12.0;
    let dimension = Formulation::GeometricDeflection.freedom() * N;
    let mut local = DMatrix::zeros(dimension, dimension);

    for point in rule {
        let sample = S::evaluate(vertices, point.xi, point.eta)?;

        let sx = sample.interpolate(&prestress[0]);
        let sy = sample.interpolate(&prestress[1]);
        let txy = sample.interpolate(&prestress[2]);
        let s0 = DMatrix::from_row_slice(2, 2, &[sx, txy, txy, sy]);

        let bb = strain_displacement(Formulation::GeometricDeflection, &sample);
        let bs1 = strain_displacement(Formulation::GeometricRotationX, &sample);
        let bs2 = strain_displacement(Formulation::GeometricRotationY, &sample);
        let weight = sample.jacobian * point.weight;

        local += congruence(&bb, &s0, &bb) * (thickness * weight);
        local += (congruence(&bs1, &s0, &bs1) + congruence(&bs2, &s0, &bs2))
            * (rotation_factor * weight);
    }

    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        material::{plane_stress_isotropic, Layer, DEFAULT_KAPPA},
        shape::{Quad4, Tri3},
    };
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn unit_square() -> [Vertex; 4] {
        [
            Vertex::new(0.0, 0.0),
            Vertex::new(1.0, 0.0),
            Vertex::new(1.0, 1.0),
            Vertex::new(0.0, 1.0),
        ]
    }

    fn skewed_quad() -> [Vertex; 4] {
        [
            Vertex::new(0.0, 0.0),
            Vertex::new(2.0, 0.2),
            Vertex::new(2.3, 1.7),
            Vertex::new(0.1, 1.2),
        ]
    }

    /// Closed-form bilinear square stiffness for unit thickness
    fn unit_square_reference(e: f64, nu: f64) -> DMatrix<f64> {
        let k = [
            0.5 - nu / 6.0,
            0.125 + nu / 8.0,
            -0.25 - nu / 12.0,
            -0.125 + 3.0 * nu / 8.0,
            -0.25 + nu / 12.0,
            -0.125 - nu / 8.0,
            nu / 6.0,
            0.125 - 3.0 * nu / 8.0,
        ];
        let pattern: [[usize; 8]; 8] = [
            [0, 1, 2, 3, 4, 5, 6, 7],
            [1, 0, 7, 6, 5, 4, 3, 2],
            [2, 7, 0, 5, 6, 3, 4, 1],
            [3, 6, 5, 0, 7, 2, 1, 4],
            [4, 5, 6, 7, 0, 1, 2, 3],
            [5, 4, 3, 2, 1, 0, 7, 6],
            [6, 3, 4, 1, 2, 7, 0, 5],
            [7, 2, 1, 4, 3, 6, 5, 0],
        ];
        DMatrix::from_fn(8, 8, |i, j| e / (1.0 - nu * nu) * k[pattern[i][j]])
    }

    #[test]
    fn unit_square_plane_stress_matches_closed_form() {
        let (e, nu) = (1000.0, 0.3);
        let d = plane_stress_isotropic(e, nu);
        let rule = Quad4::quadrature(2).unwrap();

        let local = plane_stiffness::<Quad4, 4>(&unit_square(), 1.0, &d, &rule).unwrap();
        let reference = unit_square_reference(e, nu);

        assert_relative_eq!(local, reference, epsilon = 1e-9);
    }

    #[test]
    fn plane_stiffness_scales_with_thickness() {
        let d = plane_stress_isotropic(1.0, 0.25);
        let rule = Quad4::quadrature(2).unwrap();
        let thin = plane_stiffness::<Quad4, 4>(&skewed_quad(), 1.0, &d, &rule).unwrap();
        let thick = plane_stiffness::<Quad4, 4>(&skewed_quad(), 2.5, &d, &rule).unwrap();
        assert_relative_eq!(thick, thin * 2.5, epsilon = 1e-12);
    }

    #[test]
    fn plane_stiffness_annihilates_rigid_body_modes() {
        let d = plane_stress_isotropic(1e6, 0.3);
        let rule = Quad4::quadrature(2).unwrap();
        let vertices = skewed_quad();
        let k = plane_stiffness::<Quad4, 4>(&vertices, 1.0, &d, &rule).unwrap();

        let translation_x = DVector::from_fn(8, |i, _| if i % 2 == 0 { 1.0 } else { 0.0 });
        let translation_y = DVector::from_fn(8, |i, _| if i % 2 == 1 { 1.0 } else { 0.0 });
        let rotation = DVector::from_fn(8, |i, _| {
            let v = vertices[i / 2];
            if i % 2 == 0 {
                -v.y
            } else {
                v.x
            }
        });

        for mode in [translation_x, translation_y, rotation] {
            assert!((&k * mode).norm() < 1e-6);
        }
    }

    #[test]
    fn triangle_stiffness_is_symmetric_and_constant_strain() {
        let d = plane_stress_isotropic(10.0, 0.2);
        let vertices = [
            Vertex::new(0.0, 0.0),
            Vertex::new(1.5, 0.1),
            Vertex::new(0.4, 1.0),
        ];
        let one_point =
            plane_stiffness::<Tri3, 3>(&vertices, 1.0, &d, &Tri3::quadrature(1).unwrap()).unwrap();
        let three_point =
            plane_stiffness::<Tri3, 3>(&vertices, 1.0, &d, &Tri3::quadrature(2).unwrap()).unwrap();

        assert_relative_eq!(one_point, one_point.transpose(), epsilon = 1e-12);
        assert_relative_eq!(one_point, three_point, epsilon = 1e-12);
    }

    #[test]
    fn mindlin_stiffness_is_symmetric_with_rigid_deflection() {
        let d = plane_stress_isotropic(10920.0, 0.3);
        let rule = Quad4::quadrature(3).unwrap();
        let k =
            mindlin_stiffness::<Quad4, 4>(&skewed_quad(), 0.1, &d, DEFAULT_KAPPA, &rule).unwrap();

        assert_relative_eq!(k, k.transpose(), epsilon = 1e-9);

        // Uniform w with zero rotations stores no energy
        let rigid = DVector::from_fn(12, |i, _| if i % 3 == 0 { 1.0 } else { 0.0 });
        assert!((&k * rigid).norm() < 1e-9);
    }

    #[test]
    fn single_layer_laminate_reproduces_mindlin() {
        let d = plane_stress_isotropic(10920.0, 0.3);
        let thickness = 0.1;
        let rule = Quad4::quadrature(3).unwrap();
        let vertices = skewed_quad();

        let plate = mindlin_stiffness::<Quad4, 4>(&vertices, thickness, &d, DEFAULT_KAPPA, &rule)
            .unwrap();
        let laminate = Laminate::new(vec![Layer {
            thickness,
            elasticity: d,
        }])
        .unwrap();
        let layered = laminate_stiffness::<Quad4, 4>(&vertices, &laminate, DEFAULT_KAPPA, &rule)
            .unwrap();

        let scale = plate.amax();
        for a in 0..4 {
            for b in 0..4 {
                for i in 0..3 {
                    for j in 0..3 {
                        assert_relative_eq!(
                            layered[(a * 5 + i + 2, b * 5 + j + 2)],
                            plate[(a * 3 + i, b * 3 + j)],
                            epsilon = 1e-12 * scale
                        );
                    }
                    // Membrane DOFs decouple from bending for a symmetric stack
                    for m in 0..2 {
                        assert!(layered[(a * 5 + m, b * 5 + i + 2)].abs() < 1e-12 * scale);
                    }
                }
            }
        }
    }

    #[test]
    fn unsymmetric_laminate_couples_membrane_and_bending() {
        let soft = plane_stress_isotropic(1.0, 0.3);
        let stiff = plane_stress_isotropic(100.0, 0.3);
        let laminate = Laminate::from_parts(&[0.05, 0.05], &[soft, stiff]).unwrap();
        let rule = Quad4::quadrature(2).unwrap();
        let k = laminate_stiffness::<Quad4, 4>(&unit_square(), &laminate, DEFAULT_KAPPA, &rule)
            .unwrap();

        assert_relative_eq!(k, k.transpose(), epsilon = 1e-12);
        // u of node 0 against theta_x of node 0
        assert!(k[(0, 3)].abs() > 1e-6);
    }

    #[test]
    fn geometric_stiffness_under_uniaxial_prestress() {
        let rule = Quad4::quadrature(3).unwrap();
        let prestress = [[-1.0; 4], [0.0; 4], [0.0; 4]];
        let kg = geometric_stiffness::<Quad4, 4>(&unit_square(), 0.1, &prestress, &rule).unwrap();

        assert_relative_eq!(kg, kg.transpose(), epsilon = 1e-14);

        // w = x gives a unit slope in x: energy is t * sigma_x * area
        let slope = DVector::from_fn(12, |i, _| {
            if i % 3 == 0 {
                unit_square()[i / 3].x
            } else {
                0.0
            }
        });
        let energy = slope.dot(&(&kg * &slope));
        assert_relative_eq!(energy, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_element_fails_the_kernel() {
        let d = plane_stress_isotropic(1.0, 0.3);
        let collapsed = [
            Vertex::new(0.0, 0.0),
            Vertex::new(1.0, 0.0),
            Vertex::new(1.0, 0.0),
            Vertex::new(0.0, 0.0),
        ];
        let rule = Quad4::quadrature(2).unwrap();
        let result = plane_stiffness::<Quad4, 4>(&collapsed, 1.0, &d, &rule);
        assert!(matches!(
            result,
            Err(crate::error::LaminaError::DegenerateGeometry(_))
        ));
    }
}
