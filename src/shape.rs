use nalgebra::{Matrix2, Vector2};

use crate::{
    datatypes::Vertex,
    error::{LaminaError, Result},
    quadrature::{legendre_quad, legendre_triangle, QuadraturePoint},
};

/// Shape function values and physical derivatives at one reference point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSample<const N: usize> {
    /// Determinant of the isoparametric mapping
    pub jacobian: f64,
    pub n: [f64; N],
    pub dx: [f64; N],
    pub dy: [f64; N],
}

impl<const N: usize> ShapeSample<N> {
    /// Interpolates nodal values at the sample point
    pub fn interpolate(&self, values: &[f64; N]) -> f64 {
        self.n.iter().zip(values.iter()).map(|(n, v)| n * v).sum()
    }
}

/// An isoparametric element family with `N` nodes
pub trait ElementShape<const N: usize> {
    /// Reference coordinates of the element corners, in node order
    fn corners() -> [(f64, f64); N];

    /// Shape functions at `(xi, eta)`
    fn functions(xi: f64, eta: f64) -> [f64; N];

    /// Shape function derivatives with respect to `(xi, eta)`
    fn derivatives(xi: f64, eta: f64) -> [(f64, f64); N];

    /// Quadrature rule over the reference domain
    fn quadrature(order: usize) -> Result<Vec<QuadraturePoint>>;

    /// Evaluates shape functions, their physical derivatives and the
    /// Jacobian determinant for a physical element at `(xi, eta)`
    ///
    /// # Arguments
    /// * `vertices` - The element's node coordinates, in node order
    /// * `xi` - First reference coordinate
    /// * `eta` - Second reference coordinate
    ///
    /// # Returns
    /// A ShapeSample, or a DegenerateGeometry error if the mapping is
    /// inverted or singular at this point
    fn evaluate(vertices: &[Vertex; N], xi: f64, eta: f64) -> Result<ShapeSample<N>> {
        let n = Self::functions(xi, eta);
        let d_ref = Self::derivatives(xi, eta);

        // J = [[dx/dxi, dy/dxi], [dx/deta, dy/deta]]
        let mut j: Matrix2<f64> = Matrix2::zeros();
        for (d, v) in d_ref.iter().zip(vertices.iter()) {
            j[(0, 0)] += d.0 * v.x;
            j[(0, 1)] += d.0 * v.y;
            j[(1, 0)] += d.1 * v.x;
            j[(1, 1)] += d.1 * v.y;
        }

        let jacobian = j.determinant();
        if !jacobian.is_finite() || jacobian <= 0.0 {
            return Err(LaminaError::DegenerateGeometry(format!(
                "Jacobian determinant {jacobian} at ({xi}, {eta}) for vertices {vertices:?}"
            )));
        }

        let j_inv = match j.try_inverse() {
            Some(inv) => inv,
            None => {
                return Err(LaminaError::DegenerateGeometry(format!(
                    "Singular Jacobian at ({xi}, {eta}) for vertices {vertices:?}"
                )))
            }
        };

        let mut dx = [0.0; N];
        let mut dy = [0.0; N];
        for (i, d) in d_ref.iter().enumerate() {
            let physical = j_inv * Vector2::new(d.0, d.1);
            dx[i] = physical[0];
            dy[i] = physical[1];
        }

        Ok(ShapeSample {
            jacobian,
            n,
            dx,
            dy,
        })
    }
}

/// Bilinear 4-node quadrilateral
#[derive(Debug, Clone, Copy)]
pub struct Quad4;

impl ElementShape<4> for Quad4 {
    fn corners() -> [(f64, f64); 4] {
        [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
    }

    fn functions(xi: f64, eta: f64) -> [f64; 4] {
        [
            0.25 * (1.0 - xi) * (1.0 - eta),
            0.25 * (1.0 + xi) * (1.0 - eta),
            0.25 * (1.0 + xi) * (1.0 + eta),
            0.25 * (1.0 - xi) * (1.0 + eta),
        ]
    }

    fn derivatives(xi: f64, eta: f64) -> [(f64, f64); 4] {
        [
            (-0.25 * (1.0 - eta), -0.25 * (1.0 - xi)),
            (0.25 * (1.0 - eta), -0.25 * (1.0 + xi)),
            (0.25 * (1.0 + eta), 0.25 * (1.0 + xi)),
            (-0.25 * (1.0 + eta), 0.25 * (1.0 - xi)),
        ]
    }

    fn quadrature(order: usize) -> Result<Vec<QuadraturePoint>> {
        legendre_quad(order)
    }
}

/// Linear 3-node triangle
#[derive(Debug, Clone, Copy)]
pub struct Tri3;

impl ElementShape<3> for Tri3 {
    fn corners() -> [(f64, f64); 3] {
        [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]
    }

    fn functions(xi: f64, eta: f64) -> [f64; 3] {
        [1.0 - xi - eta, xi, eta]
    }

    fn derivatives(_xi: f64, _eta: f64) -> [(f64, f64); 3] {
        [(-1.0, -1.0), (1.0, 0.0), (0.0, 1.0)]
    }

    fn quadrature(order: usize) -> Result<Vec<QuadraturePoint>> {
        legendre_triangle(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> [Vertex; 4] {
        [
            Vertex::new(0.0, 0.0),
            Vertex::new(1.0, 0.0),
            Vertex::new(1.0, 1.0),
            Vertex::new(0.0, 1.0),
        ]
    }

    #[test]
    fn quad_functions_partition_unity() {
        for &(xi, eta) in &[(0.0, 0.0), (0.3, -0.7), (-1.0, 1.0)] {
            let sum: f64 = Quad4::functions(xi, eta).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn quad_functions_are_nodal() {
        for (i, &(xi, eta)) in Quad4::corners().iter().enumerate() {
            let n = Quad4::functions(xi, eta);
            for (j, value) in n.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(*value, expected, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn unit_square_maps_with_quarter_jacobian() {
        let sample = Quad4::evaluate(&unit_square(), 0.2, -0.4).unwrap();
        assert_relative_eq!(sample.jacobian, 0.25, epsilon = 1e-15);

        // Derivatives of a partition of unity sum to zero
        assert_relative_eq!(sample.dx.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(sample.dy.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn derivatives_reproduce_linear_field() {
        // f = 2x - 3y + 1 has df/dx = 2, df/dy = -3 on any element
        let vertices = [
            Vertex::new(0.0, 0.0),
            Vertex::new(2.0, 0.3),
            Vertex::new(2.5, 1.8),
            Vertex::new(-0.2, 1.1),
        ];
        let f = vertices.map(|v| 2.0 * v.x - 3.0 * v.y + 1.0);
        let sample = Quad4::evaluate(&vertices, 0.1, 0.6).unwrap();

        let dfdx: f64 = sample.dx.iter().zip(f.iter()).map(|(d, f)| d * f).sum();
        let dfdy: f64 = sample.dy.iter().zip(f.iter()).map(|(d, f)| d * f).sum();
        assert_relative_eq!(dfdx, 2.0, epsilon = 1e-12);
        assert_relative_eq!(dfdy, -3.0, epsilon = 1e-12);
    }

    #[test]
    fn triangle_jacobian_is_twice_the_area() {
        let vertices = [
            Vertex::new(0.0, 0.0),
            Vertex::new(2.0, 0.0),
            Vertex::new(0.0, 1.0),
        ];
        let sample = Tri3::evaluate(&vertices, 1.0 / 3.0, 1.0 / 3.0).unwrap();
        assert_relative_eq!(sample.jacobian, 2.0, epsilon = 1e-15);
        assert_relative_eq!(sample.dx[1], 0.5, epsilon = 1e-15);
        assert_relative_eq!(sample.dy[2], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn clockwise_element_is_degenerate() {
        let mut vertices = unit_square();
        vertices.swap(1, 3);
        let result = Quad4::evaluate(&vertices, 0.0, 0.0);
        assert!(matches!(result, Err(LaminaError::DegenerateGeometry(_))));
    }

    #[test]
    fn collapsed_triangle_is_degenerate() {
        let vertices = [
            Vertex::new(0.0, 0.0),
            Vertex::new(1.0, 1.0),
            Vertex::new(2.0, 2.0),
        ];
        let result = Tri3::evaluate(&vertices, 0.2, 0.2);
        assert!(matches!(result, Err(LaminaError::DegenerateGeometry(_))));
    }
}
