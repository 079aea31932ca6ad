//! Strain-displacement (B) matrices.
//!
//! Every formulation is a table of rows; each row lists which nodal
//! component contributes to that strain measure and through which shape
//! quantity. One builder turns a table and a shape sample into a dense
//! `rows x (freedom * N)` matrix, with columns ordered by node, then
//! component.

use nalgebra::DMatrix;

use crate::shape::ShapeSample;

/// Shape quantity multiplying a nodal component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term {
    /// `N`
    Value,
    /// `dN/dx`
    Dx,
    /// `dN/dy`
    Dy,
}

type Row = &'static [(usize, Term)];

const PLANE: &[Row] = &[
    &[(0, Term::Dx)],
    &[(1, Term::Dy)],
    &[(0, Term::Dy), (1, Term::Dx)],
];

const PLATE_BENDING: &[Row] = &[
    &[(1, Term::Dx)],
    &[(2, Term::Dy)],
    &[(1, Term::Dy), (2, Term::Dx)],
];

const PLATE_SHEAR: &[Row] = &[
    &[(0, Term::Dx), (1, Term::Value)],
    &[(0, Term::Dy), (2, Term::Value)],
];

const LAMINATE_MEMBRANE: &[Row] = &[
    &[(0, Term::Dx)],
    &[(1, Term::Dy)],
    &[(0, Term::Dy), (1, Term::Dx)],
];

const LAMINATE_BENDING: &[Row] = &[
    &[(3, Term::Dx)],
    &[(4, Term::Dy)],
    &[(3, Term::Dy), (4, Term::Dx)],
];

const LAMINATE_SHEAR: &[Row] = &[
    &[(2, Term::Dx), (3, Term::Value)],
    &[(2, Term::Dy), (4, Term::Value)],
];

const GEOMETRIC_DEFLECTION: &[Row] = &[&[(0, Term::Dx)], &[(0, Term::Dy)]];
const GEOMETRIC_ROTATION_X: &[Row] = &[&[(1, Term::Dx)], &[(1, Term::Dy)]];
const GEOMETRIC_ROTATION_Y: &[Row] = &[&[(2, Term::Dx)], &[(2, Term::Dy)]];

/// Strain measure a B-matrix maps nodal DOFs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    /// In-plane strains (eps_xx, eps_yy, gamma_xy) from (u, v)
    Plane,
    /// Curvatures from (theta_x, theta_y) of a (w, theta_x, theta_y) plate
    PlateBending,
    /// Transverse shear strains of a (w, theta_x, theta_y) plate
    PlateShear,
    /// In-plane strains of a (u, v, w, theta_x, theta_y) laminate
    LaminateMembrane,
    LaminateBending,
    LaminateShear,
    /// Gradient of w, for geometric stiffness
    GeometricDeflection,
    /// Gradient of theta_x, for geometric stiffness
    GeometricRotationX,
    /// Gradient of theta_y, for geometric stiffness
    GeometricRotationY,
}

impl Formulation {
    /// DOFs per node
    pub fn freedom(&self) -> usize {
        match self {
            Formulation::Plane => 2,
            Formulation::PlateBending
            | Formulation::PlateShear
            | Formulation::GeometricDeflection
            | Formulation::GeometricRotationX
            | Formulation::GeometricRotationY => 3,
            Formulation::LaminateMembrane
            | Formulation::LaminateBending
            | Formulation::LaminateShear => 5,
        }
    }

    /// Number of strain components (rows of B)
    pub fn strains(&self) -> usize {
        self.rows().len()
    }

    fn rows(&self) -> &'static [Row] {
        match self {
            Formulation::Plane => PLANE,
            Formulation::PlateBending => PLATE_BENDING,
            Formulation::PlateShear => PLATE_SHEAR,
            Formulation::LaminateMembrane => LAMINATE_MEMBRANE,
            Formulation::LaminateBending => LAMINATE_BENDING,
            Formulation::LaminateShear => LAMINATE_SHEAR,
            Formulation::GeometricDeflection => GEOMETRIC_DEFLECTION,
            Formulation::GeometricRotationX => GEOMETRIC_ROTATION_X,
            Formulation::GeometricRotationY => GEOMETRIC_ROTATION_Y,
        }
    }
}

/// Builds the strain-displacement matrix of a formulation at a shape sample
///
/// # Arguments
/// * `formulation` - The strain measure to build
/// * `sample` - Shape functions and physical derivatives at the point
///
/// # Returns
/// A `strains x (freedom * N)` matrix
pub fn strain_displacement<const N: usize>(
    formulation: Formulation,
    sample: &ShapeSample<N>,
) -> DMatrix<f64> {
    let freedom = formulation.freedom();
    let rows = formulation.rows();
    let mut b = DMatrix::zeros(rows.len(), freedom * N);

    for (row, terms) in rows.iter().enumerate() {
        for local_node in 0..N {
            for &(component, term) in terms.iter() {
                b[(row, local_node * freedom + component)] = match term {
                    Term::Value => sample.n[local_node],
                    Term::Dx => sample.dx[local_node],
                    Term::Dy => sample.dy[local_node],
                };
            }
        }
    }

    b
}
