use nalgebra::{matrix, Matrix2, Matrix3};

use crate::error::{LaminaError, Result};

/// 3x3 stress-strain (elasticity) matrix
pub type ElasticityMatrix = Matrix3<f64>;

pub const DEFAULT_KAPPA: f64 = 5.0 / 6.0;

const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// Calculates the isotropic plane stress elasticity matrix
///
/// # Arguments
/// * `youngs_modulus` - The modulus of elasticity of the material
/// * `poisson_ratio` - The poisson ratio of the material
///
/// # Returns
/// A 3x3 stress-strain matrix
pub fn plane_stress_isotropic(youngs_modulus: f64, poisson_ratio: f64) -> ElasticityMatrix {
    let mut stress_strain_mat: Matrix3<f64> = matrix![
        1.0, poisson_ratio, 0.0;
        poisson_ratio, 1.0, 0.0;
        0.0, 0.0, (1.0 - poisson_ratio) / 2.0;
    ];

    stress_strain_mat *= youngs_modulus / (1.0 - f64::powi(poisson_ratio, 2));

    stress_strain_mat
}

/// Calculates the isotropic plane strain elasticity matrix
///
/// # Arguments
/// * `youngs_modulus` - The modulus of elasticity of the material
/// * `poisson_ratio` - The poisson ratio of the material
///
/// # Returns
/// A 3x3 stress-strain matrix
pub fn plane_strain_isotropic(youngs_modulus: f64, poisson_ratio: f64) -> ElasticityMatrix {
    let mut stress_strain_mat: Matrix3<f64> = matrix![
        1.0 - poisson_ratio, poisson_ratio, 0.0;
        poisson_ratio, 1.0 - poisson_ratio, 0.0;
        0.0, 0.0, (1.0 - 2.0 * poisson_ratio) / 2.0;
    ];

    stress_strain_mat *=
        youngs_modulus / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio));

    stress_strain_mat
}

/// Transverse shear block of an elasticity matrix, `diag(D[2,2], D[2,2])`
pub fn shear_block(elasticity: &ElasticityMatrix) -> Matrix2<f64> {
    let g = elasticity[(2, 2)];
    matrix![
        g, 0.0;
        0.0, g;
    ]
}

/// Rejects elasticity matrices that are not symmetric
pub fn validate_elasticity(elasticity: &ElasticityMatrix) -> Result<()> {
    let scale = elasticity.amax().max(1.0);
    for i in 0..3 {
        for j in (i + 1)..3 {
            if (elasticity[(i, j)] - elasticity[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(LaminaError::Input(format!(
                    "Elasticity matrix is not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    if elasticity.iter().any(|v| !v.is_finite()) {
        return Err(LaminaError::Input(
            "Elasticity matrix has non-finite entries".to_owned(),
        ));
    }

    Ok(())
}

/// Rejects non-positive or non-finite thicknesses
pub fn validate_thickness(thickness: f64) -> Result<()> {
    if !thickness.is_finite() || thickness <= 0.0 {
        return Err(LaminaError::Input(format!(
            "Thickness must be positive, got {thickness}"
        )));
    }
    Ok(())
}

/// One ply of a laminate
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub thickness: f64,
    pub elasticity: ElasticityMatrix,
}

/// An ordered stack of layers, bottom (z = -h/2) first
#[derive(Debug, Clone, PartialEq)]
pub struct Laminate {
    layers: Vec<Layer>,
}

impl Laminate {
    pub fn new(layers: Vec<Layer>) -> Result<Laminate> {
        if layers.is_empty() {
            return Err(LaminaError::DimensionMismatch(
                "Laminate requires at least one layer".to_owned(),
            ));
        }
        for layer in &layers {
            validate_thickness(layer.thickness)?;
            validate_elasticity(&layer.elasticity)?;
        }

        Ok(Laminate { layers })
    }

    /// Builds a laminate from parallel thickness and elasticity sequences
    pub fn from_parts(thicknesses: &[f64], elasticities: &[ElasticityMatrix]) -> Result<Laminate> {
        if thicknesses.len() != elasticities.len() {
            return Err(LaminaError::DimensionMismatch(format!(
                "Laminate has {} thicknesses but {} elasticity matrices",
                thicknesses.len(),
                elasticities.len()
            )));
        }

        Laminate::new(
            thicknesses
                .iter()
                .zip(elasticities.iter())
                .map(|(&thickness, &elasticity)| Layer {
                    thickness,
                    elasticity,
                })
                .collect(),
        )
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn total_thickness(&self) -> f64 {
        self.layers.iter().map(|l| l.thickness).sum()
    }

    /// Through-thickness bounds `(z0, z1, layer)` of each layer, with the
    /// stack centered on the midplane
    pub fn bounds(&self) -> Vec<(f64, f64, &Layer)> {
        let mut z0 = -self.total_thickness() / 2.0;
        self.layers
            .iter()
            .map(|layer| {
                let z1 = z0 + layer.thickness;
                let bound = (z0, z1, layer);
                z0 = z1;
                bound
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_stress_matches_closed_form() {
        let d = plane_stress_isotropic(200.0, 0.25);
        let factor = 200.0 / (1.0 - 0.0625);
        assert_relative_eq!(d[(0, 0)], factor, epsilon = 1e-12);
        assert_relative_eq!(d[(0, 1)], 0.25 * factor, epsilon = 1e-12);
        assert_relative_eq!(d[(2, 2)], 0.375 * factor, epsilon = 1e-12);
        assert!(validate_elasticity(&d).is_ok());
    }

    #[test]
    fn plane_strain_shear_modulus() {
        let e = 203200.0;
        let nu = 0.27;
        let d = plane_strain_isotropic(e, nu);
        assert_relative_eq!(d[(2, 2)], e / (2.0 * (1.0 + nu)), max_relative = 1e-12);
    }

    #[test]
    fn asymmetric_matrix_is_rejected() {
        let mut d = plane_stress_isotropic(1.0, 0.3);
        d[(0, 1)] += 0.5;
        assert!(matches!(validate_elasticity(&d), Err(LaminaError::Input(_))));
    }

    #[test]
    fn laminate_bounds_are_centered() {
        let d = plane_stress_isotropic(1.0, 0.3);
        let laminate = Laminate::from_parts(&[0.1, 0.2, 0.1], &[d, d, d]).unwrap();
        let bounds = laminate.bounds();

        assert_relative_eq!(laminate.total_thickness(), 0.4, epsilon = 1e-15);
        assert_relative_eq!(bounds[0].0, -0.2, epsilon = 1e-15);
        assert_relative_eq!(bounds[1].0, -0.1, epsilon = 1e-15);
        assert_relative_eq!(bounds[2].1, 0.2, epsilon = 1e-15);
    }

    #[test]
    fn empty_or_mismatched_laminate_is_rejected() {
        let d = plane_stress_isotropic(1.0, 0.3);
        assert!(matches!(
            Laminate::new(Vec::new()),
            Err(LaminaError::DimensionMismatch(_))
        ));
        assert!(matches!(
            Laminate::from_parts(&[0.1, 0.1], &[d]),
            Err(LaminaError::DimensionMismatch(_))
        ));
    }
}
