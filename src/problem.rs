//! Performance estimation problems and their solution.
//!
//! A [`Pep`] collects functions, initial conditions and performance metrics,
//! then lowers everything to one SDP over the Gram matrix of the leaf Points:
//!
//! ```ignore
//! let mut pep = Pep::new();
//! let f = pep.declare_function(FunctionClass::SmoothStronglyConvex { l: 1.0, mu: 0.1 })?;
//! let xs = f.stationary_point();
//! let x0 = pep.set_initial_point()?;
//! pep.set_initial_condition((&x0 - &xs).square().leq(1.0))?;
//! let x1 = &x0 - f.gradient(&x0);
//! pep.set_performance_metric((&x1 - &xs).square())?;
//! let outcome = pep.solve()?;
//! ```

use std::collections::BTreeSet;
use std::rc::Rc;

use nalgebra::{DMatrix, DVector};

use crate::constraints::Constraint;
use crate::context::{AtomId, Context, LeafId, ScopeId};
use crate::error::{PepError, Result};
use crate::expr::{Expression, Point};
use crate::functions::{Function, InterpolationRule};
use crate::gram::{logdet_weights, spectrum, Realization};
use crate::solver::{
    self, stuff_problem, DimensionReduction, Objective, Settings, SolveStatus, VariableMap,
};

/// Lifecycle of a [`Pep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PepState {
    /// Accepting functions, conditions and metrics.
    Open,
    /// Solved; values and duals are available.
    Solved,
    /// The backend did not return a usable solution.
    Failed(SolveStatus),
}

/// One re-solve of the dimension-reduction heuristic.
#[derive(Debug, Clone)]
pub struct ReductionStep {
    pub status: SolveStatus,
    /// Eigenvalues of the re-solved Gram matrix, decreasing.
    pub eigenvalues: Vec<f64>,
    /// Number of significant eigenvalues.
    pub rank: usize,
}

/// Summary of the dimension-reduction heuristic.
#[derive(Debug, Clone)]
pub struct ReductionReport {
    /// Significant eigenvalues of the worst-case Gram matrix before reduction.
    pub initial_rank: usize,
    pub steps: Vec<ReductionStep>,
    /// Rank of the solution kept for values and realization.
    pub rank: usize,
    /// `false` when the iteration cap was hit or a re-solve failed.
    pub converged: bool,
}

/// Result of [`Pep::solve`].
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Worst-case value of the performance metric; `None` unless the solve succeeded.
    pub tau: Option<f64>,
    pub iterations: Option<usize>,
    /// Solve time of the main SDP in seconds.
    pub solve_time: f64,
    /// Order of the Gram matrix.
    pub gram_size: usize,
    /// Number of scalar function values.
    pub num_values: usize,
    /// Number of constraints, initial conditions included.
    pub num_constraints: usize,
    pub reduction: Option<ReductionReport>,
}

#[derive(Debug)]
struct Solution {
    var_map: VariableMap,
    tau: f64,
    values: Vec<f64>,
    gram: DMatrix<f64>,
    realization: Realization,
}

/// A performance estimation problem.
#[derive(Debug)]
pub struct Pep {
    ctx: Context,
    settings: Settings,
    functions: Vec<Function>,
    initial_points: Vec<Point>,
    list_of_conditions: Vec<Constraint>,
    performance_metrics: Vec<Expression>,
    state: PepState,
    solution: Option<Solution>,
}

impl Default for Pep {
    fn default() -> Self {
        Self::new()
    }
}

impl Pep {
    /// Create a problem with a fresh context and default settings.
    pub fn new() -> Self {
        Pep {
            ctx: Context::new(),
            settings: Settings::default(),
            functions: Vec::new(),
            initial_points: Vec::new(),
            list_of_conditions: Vec::new(),
            performance_metrics: Vec::new(),
            state: PepState::Open,
            solution: None,
        }
    }

    /// Create a problem with custom settings.
    ///
    /// Fails with [`PepError::SolverUnavailable`] if the backend is not
    /// compiled in, and [`PepError::InvalidParameter`] on bad settings.
    pub fn with_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Pep {
            settings,
            ..Self::new()
        })
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> PepState {
        self.state
    }

    /// Declared functions, in declaration order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn initial_points(&self) -> &[Point] {
        &self.initial_points
    }

    pub fn list_of_conditions(&self) -> &[Constraint] {
        &self.list_of_conditions
    }

    pub fn performance_metrics(&self) -> &[Expression] {
        &self.performance_metrics
    }

    fn ensure_open(&self, what: &str) -> Result<()> {
        match self.state {
            PepState::Open => Ok(()),
            _ => Err(PepError::InvalidProblem(format!(
                "cannot {} after solve",
                what
            ))),
        }
    }

    fn ensure_scope(&self, scope: Option<ScopeId>, what: &str) -> Result<()> {
        match scope {
            Some(s) if s != self.ctx.scope() => Err(PepError::ScopeMismatch(format!(
                "{} was built in scope {}, problem is in scope {}",
                what,
                s.raw(),
                self.ctx.scope().raw()
            ))),
            _ => Ok(()),
        }
    }

    /// Declare a function of the given class.
    pub fn declare_function<R: InterpolationRule + 'static>(&mut self, rule: R) -> Result<Function> {
        self.ensure_open("declare a function")?;
        rule.validate()?;
        let f = Function::atomic(&self.ctx, Rc::new(rule));
        self.functions.push(f.clone());
        Ok(f)
    }

    /// Create a new leaf Point, typically the starting point of a method.
    pub fn set_initial_point(&mut self) -> Result<Point> {
        self.ensure_open("add an initial point")?;
        let x = self.ctx.leaf_point();
        self.initial_points.push(x.clone());
        Ok(x)
    }

    /// Add an initial condition; it is indexed immediately.
    pub fn set_initial_condition(&mut self, mut condition: Constraint) -> Result<()> {
        self.ensure_open("add an initial condition")?;
        self.ensure_scope(condition.expression().scope(), "initial condition")?;
        condition.set_counter(self.ctx.next_constraint());
        self.list_of_conditions.push(condition);
        Ok(())
    }

    /// Add a performance metric. The problem maximizes the minimum of all metrics.
    pub fn set_performance_metric(&mut self, metric: impl Into<Expression>) -> Result<()> {
        self.ensure_open("add a performance metric")?;
        let metric = metric.into();
        self.ensure_scope(metric.scope(), "performance metric")?;
        self.performance_metrics.push(metric);
        Ok(())
    }

    /// Every constraint of the problem, initial conditions first.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut all = self.list_of_conditions.clone();
        for f in &self.functions {
            all.extend(f.list_of_constraints());
        }
        all
    }

    fn basis(&self, constraints: &[Constraint]) -> VariableMap {
        let mut leaves: BTreeSet<LeafId> = BTreeSet::new();
        let mut atoms: BTreeSet<AtomId> = BTreeSet::new();

        let mut add_expr = |e: &Expression, leaves: &mut BTreeSet<LeafId>| {
            leaves.extend(e.leaves());
            atoms.extend(e.atoms());
        };
        for c in constraints {
            add_expr(c.expression(), &mut leaves);
        }
        for m in &self.performance_metrics {
            add_expr(m, &mut leaves);
        }
        for f in &self.functions {
            for call in f.oracle_calls() {
                leaves.extend(call.point.leaves());
                leaves.extend(call.gradient.leaves());
                add_expr(&call.value, &mut leaves);
            }
        }
        for x in &self.initial_points {
            leaves.extend(x.leaves());
        }

        VariableMap::new(leaves, atoms)
    }

    /// Build and solve the SDP.
    ///
    /// Infeasible or failed solves are reported through
    /// [`SolveOutcome::status`]; only setup problems are errors.
    pub fn solve(&mut self) -> Result<SolveOutcome> {
        if self.state != PepState::Open {
            return Err(PepError::AlreadySolved);
        }
        if self.performance_metrics.is_empty() {
            return Err(PepError::InvalidProblem(
                "no performance metric was set".into(),
            ));
        }

        let level = self.settings.setup_level();
        let counts: Vec<usize> = self
            .functions
            .iter()
            .map(|f| f.generate_constraints())
            .collect();
        let constraints = self.constraints();
        let var_map = self.basis(&constraints);

        log::log!(
            level,
            "setup: Gram matrix is {}x{}, {} function value(s)",
            var_map.gram_size(),
            var_map.gram_size(),
            var_map.atoms().len()
        );
        log::log!(
            level,
            "setup: {} performance metric(s), {} initial condition(s)",
            self.performance_metrics.len(),
            self.list_of_conditions.len()
        );
        for (f, n) in self.functions.iter().zip(&counts) {
            log::log!(
                level,
                "setup: function {} ({}) has {} interpolation constraint(s)",
                f.counter().unwrap_or_default(),
                f.tag(),
                n
            );
        }

        let stuffed = stuff_problem(
            &constraints,
            &self.performance_metrics,
            var_map,
            &Objective::MaximizeTau,
        )?;
        log::log!(level, "solve: calling {} backend", self.settings.solver);
        let raw = solver::solve(&stuffed, &self.settings)?;
        log::log!(level, "solve: status {}", raw.status);

        let mut outcome = SolveOutcome {
            status: raw.status,
            tau: None,
            iterations: raw.iterations,
            solve_time: raw.solve_time,
            gram_size: stuffed.var_map.gram_size(),
            num_values: stuffed.var_map.atoms().len(),
            num_constraints: constraints.len(),
            reduction: None,
        };

        let (x, z) = match (raw.status.is_success(), raw.x, raw.z) {
            (true, Some(x), Some(z)) => (x, z),
            _ => {
                self.state = PepState::Failed(raw.status);
                return Ok(outcome);
            }
        };
        if x.iter().chain(&z).any(|v| !v.is_finite()) {
            self.state = PepState::Failed(SolveStatus::SolverError);
            return Err(PepError::NumericalError(
                "backend returned a non-finite solution".into(),
            ));
        }

        let duals: Vec<f64> = stuffed.constraint_rows.iter().map(|&r| z[r]).collect();
        let n_conditions = self.list_of_conditions.len();
        for (c, dual) in self.list_of_conditions.iter_mut().zip(&duals) {
            c.set_dual(*dual);
        }
        let mut offset = n_conditions;
        for (f, n) in self.functions.iter().zip(&counts) {
            f.set_constraint_duals(&duals[offset..offset + n]);
            offset += n;
        }

        let (tau, mut values, mut gram) = stuffed.var_map.unpack(&x);
        log::log!(level, "solve: worst-case value {:.6e}", tau);

        if let Some(reduction) = self.settings.dimension_reduction {
            let (report, reduced) =
                self.reduce_dimension(reduction, &constraints, &stuffed.var_map, tau, &gram)?;
            if let Some((v, g)) = reduced {
                values = v;
                gram = g;
            }
            outcome.reduction = Some(report);
        }

        let realization = Realization::new(&gram, self.settings.eig_tolerance);
        log::log!(
            level,
            "solve: worst-case instance lives in dimension {}",
            realization.dimension()
        );

        self.solution = Some(Solution {
            var_map: stuffed.var_map,
            tau,
            values,
            gram,
            realization,
        });
        self.state = PepState::Solved;
        outcome.tau = Some(tau);
        Ok(outcome)
    }

    /// Re-solve with a Gram objective to find a lower-rank worst case.
    ///
    /// Returns the report and, if a re-solve beat the original rank (or tied
    /// it), its function values and Gram matrix.
    #[allow(clippy::type_complexity)]
    fn reduce_dimension(
        &self,
        reduction: DimensionReduction,
        constraints: &[Constraint],
        var_map: &VariableMap,
        tau: f64,
        gram: &DMatrix<f64>,
    ) -> Result<(ReductionReport, Option<(Vec<f64>, DMatrix<f64>)>)> {
        let level = self.settings.setup_level();
        let eig_tolerance = self.settings.eig_tolerance;
        let delta = self.settings.eig_regularization;
        let tau_floor = self.settings.reduction_floor(tau);

        let initial_rank = spectrum(gram, eig_tolerance).rank;
        log::log!(
            level,
            "reduction: starting from {} significant eigenvalue(s)",
            initial_rank
        );

        let (cap, mut weights) = match reduction {
            DimensionReduction::Trace => (1, DMatrix::identity(gram.nrows(), gram.ncols())),
            DimensionReduction::LogDet { iterations } => (iterations, logdet_weights(gram, delta)),
        };

        let mut report = ReductionReport {
            initial_rank,
            steps: Vec::new(),
            rank: initial_rank,
            converged: false,
        };
        let mut best = None;
        let mut previous = initial_rank;

        for step in 0..cap {
            // Unit-scaled weights; the minimizer is unchanged.
            let scale = weights.amax();
            let objective = Objective::MinimizeGram {
                weights: if scale > 0.0 {
                    weights.unscale(scale)
                } else {
                    weights.clone()
                },
                tau_floor,
            };
            let stuffed = stuff_problem(
                constraints,
                &self.performance_metrics,
                var_map.clone(),
                &objective,
            )?;
            let raw = solver::solve(&stuffed, &self.settings)?;

            let x = match (raw.status.is_success(), raw.x) {
                (true, Some(x)) if x.iter().all(|v| v.is_finite()) => x,
                _ => {
                    log::warn!(
                        "reduction: step {} stopped with status {}, keeping rank {}",
                        step + 1,
                        raw.status,
                        report.rank
                    );
                    report.steps.push(ReductionStep {
                        status: raw.status,
                        eigenvalues: Vec::new(),
                        rank: previous,
                    });
                    return Ok((report, best));
                }
            };

            let (_, values, g) = stuffed.var_map.unpack(&x);
            let eig = spectrum(&g, eig_tolerance);
            log::log!(
                level,
                "reduction: step {} has {} significant eigenvalue(s)",
                step + 1,
                eig.rank
            );

            let rank = eig.rank;
            report.steps.push(ReductionStep {
                status: raw.status,
                eigenvalues: eig.eigenvalues,
                rank,
            });
            weights = logdet_weights(&g, delta);
            if rank <= report.rank {
                report.rank = rank;
                best = Some((values, g));
            }

            if matches!(reduction, DimensionReduction::Trace) || rank == previous {
                report.converged = true;
                break;
            }
            previous = rank;
        }

        if !report.converged {
            log::warn!("reduction: iteration cap reached at rank {}", report.rank);
        }
        Ok((report, best))
    }

    fn solution(&self) -> Result<&Solution> {
        self.solution
            .as_ref()
            .ok_or_else(|| PepError::InvalidProblem("problem has not been solved".into()))
    }

    /// Worst-case value of the metric, once solved.
    pub fn tau(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.tau)
    }

    /// Gram matrix of the worst-case instance, in leaf creation order.
    pub fn gram(&self) -> Option<&DMatrix<f64>> {
        self.solution.as_ref().map(|s| &s.gram)
    }

    /// Significant eigenvalue count of the worst-case Gram matrix.
    pub fn dimension(&self) -> Option<usize> {
        self.solution.as_ref().map(|s| s.realization.dimension())
    }

    /// Coordinates of a Point in the worst-case instance.
    pub fn point_value(&self, point: &Point) -> Result<DVector<f64>> {
        let sol = self.solution()?;
        self.ensure_scope(point.scope(), "point")?;

        let mut value = DVector::zeros(sol.realization.dimension());
        for (leaf, c) in point.decomposition() {
            let idx = sol.var_map.leaf_index(*leaf).ok_or_else(|| {
                PepError::InvalidProblem(format!("point {} is not part of the problem", leaf))
            })?;
            value += sol.realization.leaf(idx) * *c;
        }
        Ok(value)
    }

    /// Value of an Expression in the worst-case instance.
    pub fn expression_value(&self, expr: &Expression) -> Result<f64> {
        let sol = self.solution()?;
        self.ensure_scope(expr.scope(), "expression")?;

        for leaf in expr.leaves() {
            if sol.var_map.leaf_index(leaf).is_none() {
                return Err(PepError::InvalidProblem(format!(
                    "point {} is not part of the problem",
                    leaf
                )));
            }
        }
        for atom in expr.atoms() {
            if sol.var_map.atom_index(atom).is_none() {
                return Err(PepError::InvalidProblem(format!(
                    "function value {} is not part of the problem",
                    atom
                )));
            }
        }

        let leaf = |l: LeafId| sol.var_map.leaf_index(l).unwrap_or_default();
        Ok(expr.evaluate(
            |a, b| sol.gram[(leaf(a), leaf(b))],
            |atom| {
                sol.var_map
                    .atom_index(atom)
                    .map(|k| sol.values[k])
                    .unwrap_or_default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionClass;
    use float_eq::assert_float_eq;

    /// One gradient step on an L-smooth convex function from `|x0 - xs|^2 <= 1`.
    fn gradient_step_pep(gamma: f64) -> (Pep, Point, Point, Function) {
        let mut pep = Pep::new();
        let f = pep
            .declare_function(FunctionClass::SmoothConvex { l: 1.0 })
            .unwrap();
        let xs = f.stationary_point();
        let x0 = pep.set_initial_point().unwrap();
        pep.set_initial_condition((&x0 - &xs).square().leq(1.0))
            .unwrap();
        let x1 = &x0 - gamma * f.gradient(&x0);
        pep.set_performance_metric(f.value(&x1) - f.value(&xs))
            .unwrap();
        (pep, x1, xs, f)
    }

    #[test]
    fn test_solve_without_metric_fails() {
        let mut pep = Pep::new();
        let _ = pep.set_initial_point().unwrap();
        assert!(matches!(pep.solve(), Err(PepError::InvalidProblem(_))));
        assert_eq!(pep.state(), PepState::Open);
    }

    #[test]
    fn test_invalid_class_is_rejected() {
        let mut pep = Pep::new();
        let res = pep.declare_function(FunctionClass::SmoothStronglyConvex { l: 1.0, mu: 2.0 });
        assert!(matches!(res, Err(PepError::InvalidParameter(_))));
        assert!(pep.functions().is_empty());
    }

    #[test]
    fn test_foreign_condition_is_rejected() {
        let mut pep = Pep::new();
        let other = Context::new();
        let y = other.leaf_point();
        let res = pep.set_initial_condition(y.square().leq(1.0));
        assert!(matches!(res, Err(PepError::ScopeMismatch(_))));
        let res = pep.set_performance_metric(y.square());
        assert!(matches!(res, Err(PepError::ScopeMismatch(_))));
    }

    #[test]
    fn test_condition_counters() {
        let mut pep = Pep::new();
        let x = pep.set_initial_point().unwrap();
        pep.set_initial_condition(x.square().leq(1.0)).unwrap();
        pep.set_initial_condition(x.square().geq(0.0)).unwrap();
        let counters: Vec<_> = pep
            .list_of_conditions()
            .iter()
            .map(|c| c.counter())
            .collect();
        assert_eq!(counters, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_single_gradient_step() {
        let _ = env_logger::builder().is_test(true).try_init();

        // f(x1) - f* <= L |x0 - xs|^2 / (4 N + 2) with N = 1
        let (mut pep, x1, xs, f) = gradient_step_pep(1.0);
        let outcome = pep.solve().unwrap();
        assert!(outcome.status.is_success());
        let tau = outcome.tau.unwrap();
        assert_float_eq!(tau, 1.0 / 6.0, abs <= 1e-3);
        assert_eq!(pep.tau(), Some(tau));
        assert_eq!(pep.state(), PepState::Solved);

        // Gram size: xs, x0, g0, g1 (the stationary gradient is zero).
        assert_eq!(outcome.gram_size, 4);
        assert_eq!(outcome.num_constraints, 1 + 6);

        let gap = pep
            .expression_value(&(f.value(&x1) - f.value(&xs)))
            .unwrap();
        assert_float_eq!(gap, tau, abs <= 1e-3);

        let condition = &pep.list_of_conditions()[0];
        let dual = condition.dual_variable_value().unwrap();
        assert!(dual.is_finite() && dual > 0.0);
        for c in f.list_of_constraints() {
            assert!(c.dual_variable_value().unwrap().is_finite());
        }

        let d = pep.point_value(&(&x1 - &xs)).unwrap();
        assert_eq!(d.len(), pep.dimension().unwrap());
    }

    #[test]
    fn test_lifecycle_after_solve() {
        let (mut pep, _, _, _) = gradient_step_pep(1.0);
        pep.solve().unwrap();
        assert!(matches!(pep.solve(), Err(PepError::AlreadySolved)));
        assert!(matches!(
            pep.set_initial_point(),
            Err(PepError::InvalidProblem(_))
        ));
        assert!(matches!(
            pep.declare_function(FunctionClass::Convex),
            Err(PepError::InvalidProblem(_))
        ));
    }

    #[test]
    fn test_values_unavailable_before_solve() {
        let (pep, x1, _, _) = gradient_step_pep(1.0);
        assert!(pep.tau().is_none());
        assert!(matches!(
            pep.point_value(&x1),
            Err(PepError::InvalidProblem(_))
        ));
        assert!(pep.list_of_conditions()[0].dual_variable_value().is_none());
    }

    #[test]
    fn test_unbounded_problem_reports_status() {
        // Without an initial condition the gap is unbounded.
        let settings = Settings {
            max_iter: Some(20_000),
            ..Settings::default()
        };
        let mut pep = Pep::with_settings(settings).unwrap();
        let f = pep
            .declare_function(FunctionClass::SmoothConvex { l: 1.0 })
            .unwrap();
        let xs = f.stationary_point();
        let x0 = pep.set_initial_point().unwrap();
        pep.set_performance_metric(f.value(&x0) - f.value(&xs))
            .unwrap();

        let outcome = pep.solve().unwrap();
        assert!(!outcome.status.is_success());
        assert!(outcome.tau.is_none());
        assert!(matches!(pep.state(), PepState::Failed(_)));
        assert!(f
            .list_of_constraints()
            .iter()
            .all(|c| c.dual_variable_value().is_none()));
    }

    #[test]
    fn test_trace_reduction_keeps_tau() {
        let settings = Settings {
            dimension_reduction: Some(DimensionReduction::Trace),
            ..Settings::default()
        };
        let mut pep = Pep::with_settings(settings).unwrap();
        let f = pep
            .declare_function(FunctionClass::SmoothConvex { l: 1.0 })
            .unwrap();
        let xs = f.stationary_point();
        let x0 = pep.set_initial_point().unwrap();
        pep.set_initial_condition((&x0 - &xs).square().leq(1.0))
            .unwrap();
        let x1 = &x0 - f.gradient(&x0);
        pep.set_performance_metric(f.value(&x1) - f.value(&xs))
            .unwrap();

        let outcome = pep.solve().unwrap();
        let report = outcome.reduction.unwrap();
        assert_eq!(report.steps.len(), 1);
        assert!(report.steps[0].status.is_success());
        assert!(report.rank <= report.initial_rank);
        assert!(report.converged);
        assert_float_eq!(outcome.tau.unwrap(), 1.0 / 6.0, abs <= 1e-3);

        // Values come from the reduced solution, which keeps tau up to the slack.
        let gap = pep
            .expression_value(&(f.value(&x1) - f.value(&xs)))
            .unwrap();
        assert_float_eq!(gap, 1.0 / 6.0, abs <= 3e-3);
    }
}
