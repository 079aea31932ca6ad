use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, TerminationReason, TerminationStatus, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};
use indicatif::ProgressBar;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use tracing::{debug, info, warn};

use crate::error::{LaminaError, Result};

pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Settings of the conjugate gradient solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Target residual norm relative to the norm of the right-hand side
    pub tolerance: f64,
    /// Iteration cap; `None` uses ten times the system dimension
    pub max_iterations: Option<u64>,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: None,
        }
    }
}

/// Sparse matrix-vector product for the conjugate gradient solver
struct CsrOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for CsrOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let product = self.a * &DVector::from_column_slice(x);
        Ok(product.as_slice().to_vec())
    }
}

/// Progress bar driven by the residual's decay from its initial value
/// toward the target, in orders of magnitude
///
/// argmin's conjugate gradient reports `r·r` as its cost, so both the
/// cost and the target seen here are squared residual norms.
struct ResidualObserverBar {
    bar: ProgressBar,
    initial_mag: Option<f64>,
    final_mag: f64,
}

impl ResidualObserverBar {
    fn new(target: f64) -> ResidualObserverBar {
        ResidualObserverBar {
            bar: ProgressBar::new(1000),
            initial_mag: None,
            final_mag: target.log10(),
        }
    }
}

impl<I> Observe<I> for ResidualObserverBar
where
    I: State<Float = f64>,
{
    fn observe_init(
        &mut self,
        _name: &str,
        _state: &I,
        _kv: &KV,
    ) -> std::result::Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        let cost = state.get_cost();
        if !cost.is_finite() || cost <= 0.0 {
            return Ok(());
        }

        let cost_mag = cost.log10();
        let initial_mag = *self.initial_mag.get_or_insert(cost_mag);
        let span = initial_mag - self.final_mag;
        if span > 0.0 {
            let progress = ((initial_mag - cost_mag) / span).clamp(0.0, 1.0);
            self.bar.set_position((1000.0 * progress) as u64);
        }
        debug!("cg iteration {}: residual {:e}", state.get_iter(), cost.sqrt());

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> std::result::Result<(), Error> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

/// Solves `Ax = b` with the conjugate gradient method
///
/// # Arguments
/// * `a` - A symmetric positive definite matrix in compressed row form
/// * `b` - The right-hand side
/// * `options` - Tolerance and iteration cap
///
/// # Returns
/// The approximation of `x`. Hitting the iteration cap before the
/// tolerance is logged as a warning and the best iterate is returned.
pub fn conjugate_gradient(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    options: &SolverOptions,
) -> Result<DVector<f64>> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return Err(LaminaError::DimensionMismatch(format!(
            "Cannot solve a {}x{} system with a right-hand side of {} entries",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }
    if !(options.tolerance > 0.0) {
        return Err(LaminaError::Input(format!(
            "Solver tolerance must be positive, got {}",
            options.tolerance
        )));
    }

    let b_norm = b.norm();
    if b_norm == 0.0 {
        info!("right-hand side is zero, solution is trivial");
        return Ok(DVector::zeros(b.len()));
    }

    let residual_target = options.tolerance * b_norm;
    // The solver's cost is the squared residual norm
    let target = residual_target.powi(2);
    let max_iterations = options
        .max_iterations
        .unwrap_or(10 * b.len() as u64)
        .max(1);

    let solver: ConjugateGradient<Vec<f64>, f64> =
        ConjugateGradient::new(b.as_slice().to_vec());
    let initial_guess: Vec<f64> = vec![0.0; b.len()];

    let start = std::time::Instant::now();
    info!("solving {} unknowns with conjugate gradient", b.len());

    let res = match Executor::new(CsrOperator { a }, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(max_iterations)
                .target_cost(target)
        })
        .add_observer(ResidualObserverBar::new(target), ObserverMode::Always)
        .run()
    {
        Ok(r) => r,
        Err(err) => {
            return Err(LaminaError::Solver(format!(
                "Conjugate Gradient error: {err}"
            )))
        }
    };

    let state = res.state();
    let solution = match state.get_best_param().or(state.get_param()) {
        Some(vec) => DVector::from_vec(vec.clone()),
        None => {
            return Err(LaminaError::Solver(
                "Conjugate Gradient could not produce a solution".to_owned(),
            ))
        }
    };

    let elapsed = start.elapsed().as_secs_f32();
    match state.get_termination_status() {
        TerminationStatus::Terminated(TerminationReason::TargetCostReached) => info!(
            "converged in {} iterations ({elapsed:.3} s)",
            state.get_iter()
        ),
        status => warn!(
            "conjugate gradient stopped after {} iterations with residual {:e} > {:e} ({status:?})",
            state.get_iter(),
            state.get_best_cost().sqrt(),
            residual_target
        ),
    }

    Ok(solution)
}
