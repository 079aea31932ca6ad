//! Gauss quadrature rules on the reference domains.
//!
//! - Quadrilateral: `[-1, 1] x [-1, 1]`, tensor-product Gauss-Legendre
//! - Triangle: vertices `(0, 0)`, `(1, 0)`, `(0, 1)`, weights sum to 1/2
//! - Line: `[-1, 1]`, used for edge integrals

use crate::error::{LaminaError, Result};

/// An integration point in reference coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint {
    pub xi: f64,
    pub eta: f64,
    pub weight: f64,
}

/// 1D Gauss-Legendre points and weights on `[-1, 1]`
///
/// # Arguments
/// * `order` - Number of points (1 to 4)
///
/// # Returns
/// `(point, weight)` pairs
pub fn legendre_line(order: usize) -> Result<Vec<(f64, f64)>> {
    let rule = match order {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        4 => {
            let sqrt_6_5 = (6.0 / 5.0_f64).sqrt();
            let p1 = ((3.0 - 2.0 * sqrt_6_5) / 7.0).sqrt();
            let p2 = ((3.0 + 2.0 * sqrt_6_5) / 7.0).sqrt();
            let sqrt_30 = 30.0_f64.sqrt();
            let w1 = (18.0 + sqrt_30) / 36.0;
            let w2 = (18.0 - sqrt_30) / 36.0;
            vec![(-p2, w2), (-p1, w1), (p1, w1), (p2, w2)]
        }
        _ => {
            return Err(LaminaError::Input(format!(
                "Unsupported Gauss-Legendre order {order}, expected 1 to 4"
            )))
        }
    };

    Ok(rule)
}

/// Tensor-product Gauss-Legendre rule on the reference quadrilateral
///
/// # Arguments
/// * `order` - Number of points in each direction (1 to 4)
pub fn legendre_quad(order: usize) -> Result<Vec<QuadraturePoint>> {
    let line = legendre_line(order)?;

    let mut points = Vec::with_capacity(line.len() * line.len());
    for &(eta, w_eta) in &line {
        for &(xi, w_xi) in &line {
            points.push(QuadraturePoint {
                xi,
                eta,
                weight: w_xi * w_eta,
            });
        }
    }

    Ok(points)
}

/// Symmetric Gauss rule on the reference triangle
///
/// # Arguments
/// * `order` - 1 (centroid), 2 (three points) or 3 (four points, Strang-Fix)
pub fn legendre_triangle(order: usize) -> Result<Vec<QuadraturePoint>> {
    let point = |xi: f64, eta: f64, weight: f64| QuadraturePoint { xi, eta, weight };

    let rule = match order {
        1 => vec![point(1.0 / 3.0, 1.0 / 3.0, 0.5)],
        2 => vec![
            point(1.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0),
            point(2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0),
            point(1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0),
        ],
        3 => vec![
            point(1.0 / 3.0, 1.0 / 3.0, -27.0 / 96.0),
            point(0.2, 0.2, 25.0 / 96.0),
            point(0.6, 0.2, 25.0 / 96.0),
            point(0.2, 0.6, 25.0 / 96.0),
        ],
        _ => {
            return Err(LaminaError::Input(format!(
                "Unsupported triangle quadrature order {order}, expected 1 to 3"
            )))
        }
    };

    Ok(rule)
}
