//! Essential (Dirichlet) boundary conditions on an assembled system.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use tracing::debug;

use crate::error::{LaminaError, Result};

/// A global system matrix in one of its two storage states
#[derive(Debug, Clone)]
pub enum SystemMatrix {
    /// Coordinate triplets, as accumulated during assembly
    Coordinate(CooMatrix<f64>),
    /// Compressed sparse rows, as consumed by solvers
    CompressedRow(CsrMatrix<f64>),
}

impl SystemMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            SystemMatrix::Coordinate(m) => m.nrows(),
            SystemMatrix::CompressedRow(m) => m.nrows(),
        }
    }

    /// Converts coordinate storage to compressed rows; compressed matrices
    /// are returned unchanged
    pub fn compress(self) -> SystemMatrix {
        match self {
            SystemMatrix::Coordinate(m) => SystemMatrix::CompressedRow(CsrMatrix::from(&m)),
            compressed => compressed,
        }
    }

    pub fn as_csr(&self) -> Result<&CsrMatrix<f64>> {
        match self {
            SystemMatrix::CompressedRow(m) => Ok(m),
            SystemMatrix::Coordinate(_) => Err(LaminaError::Format(
                "Stiffness matrix given must be in compressed sparse row format".to_owned(),
            )),
        }
    }

    pub fn as_csr_mut(&mut self) -> Result<&mut CsrMatrix<f64>> {
        match self {
            SystemMatrix::CompressedRow(m) => Ok(m),
            SystemMatrix::Coordinate(_) => Err(LaminaError::Format(
                "Stiffness matrix given must be in compressed sparse row format".to_owned(),
            )),
        }
    }

    pub fn into_csr(self) -> Result<CsrMatrix<f64>> {
        match self {
            SystemMatrix::CompressedRow(m) => Ok(m),
            SystemMatrix::Coordinate(_) => Err(LaminaError::Format(
                "Stiffness matrix given must be in compressed sparse row format".to_owned(),
            )),
        }
    }
}

impl From<CsrMatrix<f64>> for SystemMatrix {
    fn from(matrix: CsrMatrix<f64>) -> SystemMatrix {
        SystemMatrix::CompressedRow(matrix)
    }
}

impl From<CooMatrix<f64>> for SystemMatrix {
    fn from(matrix: CooMatrix<f64>) -> SystemMatrix {
        SystemMatrix::Coordinate(matrix)
    }
}

/// How a prescribed value is imposed on the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    /// Zero the row, unit diagonal, prescribed right-hand side. The column
    /// is left in place, so the matrix loses symmetry and other equations
    /// only see the constraint when the value is zero.
    RowOnly,
    /// Move the column times the value to the right-hand side, zero the
    /// column, then apply the row-only step. Preserves symmetry.
    Symmetric,
}

fn check_position(matrix: &CsrMatrix<f64>, force: &DVector<f64>, position: usize) -> Result<()> {
    if force.len() != matrix.nrows() {
        return Err(LaminaError::DimensionMismatch(format!(
            "Force vector has {} entries but the matrix has {} rows",
            force.len(),
            matrix.nrows()
        )));
    }
    if position >= matrix.nrows() {
        return Err(LaminaError::DimensionMismatch(format!(
            "Position {position} is outside the {}x{} system",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    Ok(())
}

/// Inserts an explicit entry at `(position, position)` into a CSR matrix
/// whose sparsity pattern lacks it
fn insert_diagonal(matrix: &mut CsrMatrix<f64>, position: usize, value: f64) -> Result<()> {
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
    let taken = std::mem::replace(matrix, CsrMatrix::zeros(nrows, ncols));
    let (mut row_offsets, mut col_indices, mut values) = taken.disassemble();

    let (start, end) = (row_offsets[position], row_offsets[position + 1]);
    let insert_at = start
        + col_indices[start..end]
            .iter()
            .position(|&c| c > position)
            .unwrap_or(end - start);
    col_indices.insert(insert_at, position);
    values.insert(insert_at, value);
    for offset in row_offsets.iter_mut().skip(position + 1) {
        *offset += 1;
    }

    *matrix = match CsrMatrix::try_from_csr_data(nrows, ncols, row_offsets, col_indices, values) {
        Ok(m) => m,
        Err(err) => {
            return Err(LaminaError::Format(format!(
                "Failed to insert diagonal entry {position}: {err}"
            )))
        }
    };

    Ok(())
}

fn constrain_row(matrix: &mut CsrMatrix<f64>, position: usize) -> Result<()> {
    let mut has_diagonal = false;
    {
        let mut row = matrix.row_mut(position);
        let (cols, values) = row.cols_and_values_mut();
        for (col, value) in cols.iter().zip(values.iter_mut()) {
            *value = if *col == position {
                has_diagonal = true;
                1.0
            } else {
                0.0
            };
        }
    }

    if !has_diagonal {
        insert_diagonal(matrix, position, 1.0)?;
    }

    Ok(())
}

/// Forces the unknown at `position` to equal `value`
///
/// Zeroes every entry of the row, sets the diagonal to one and the
/// right-hand side to `value`. The column is not touched.
///
/// # Arguments
/// * `matrix` - The global matrix, which must be in compressed row form
/// * `force` - The right-hand side vector
/// * `position` - Index of the constrained unknown
/// * `value` - The prescribed value
pub fn assembly_initial_value(
    matrix: &mut SystemMatrix,
    force: &mut DVector<f64>,
    position: usize,
    value: f64,
) -> Result<()> {
    let csr = matrix.as_csr_mut()?;
    check_position(csr, force, position)?;

    constrain_row(csr, position)?;
    force[position] = value;

    Ok(())
}

/// Forces the unknown at `position` to equal `value` by symmetric
/// elimination
///
/// Every other equation moves its coefficient on `position` times `value`
/// to the right-hand side, the column is zeroed, and then the row is
/// constrained as in [`assembly_initial_value`].
pub fn assembly_initial_value_symmetric(
    matrix: &mut SystemMatrix,
    force: &mut DVector<f64>,
    position: usize,
    value: f64,
) -> Result<()> {
    let csr = matrix.as_csr_mut()?;
    check_position(csr, force, position)?;

    for (k, mut row) in csr.row_iter_mut().enumerate() {
        if k == position {
            continue;
        }
        let (cols, values) = row.cols_and_values_mut();
        if let Ok(idx) = cols.binary_search(&position) {
            force[k] -= values[idx] * value;
            values[idx] = 0.0;
        }
    }

    constrain_row(csr, position)?;
    force[position] = value;

    Ok(())
}

/// Applies a set of prescribed values
///
/// # Arguments
/// * `matrix` - The global matrix, which must be in compressed row form
/// * `force` - The right-hand side vector
/// * `constraints` - `(position, value)` pairs
/// * `enforcement` - Row-only or symmetric elimination
pub fn apply_initial_values(
    matrix: &mut SystemMatrix,
    force: &mut DVector<f64>,
    constraints: &[(usize, f64)],
    enforcement: Enforcement,
) -> Result<()> {
    for &(position, value) in constraints {
        match enforcement {
            Enforcement::RowOnly => assembly_initial_value(matrix, force, position, value)?,
            Enforcement::Symmetric => {
                assembly_initial_value_symmetric(matrix, force, position, value)?
            }
        }
    }

    debug!(
        "applied {} prescribed values ({:?})",
        constraints.len(),
        enforcement
    );

    Ok(())
}
