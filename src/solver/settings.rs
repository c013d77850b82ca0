//! Solver configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::{PepError, Result};

/// SDP backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// First-order conic solver from `totsu_core`. Always available.
    #[default]
    Totsu,
    /// Interior-point solver from `clarabel`. Requires the `clarabel` feature.
    Clarabel,
}

impl SolverKind {
    /// Whether this backend is compiled into the current build.
    pub fn is_available(&self) -> bool {
        match self {
            SolverKind::Totsu => true,
            SolverKind::Clarabel => cfg!(feature = "clarabel"),
        }
    }

    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(PepError::SolverUnavailable(format!(
                "{} backend is not compiled in; enable the `{}` cargo feature",
                self, self
            )))
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Totsu => f.write_str("totsu"),
            SolverKind::Clarabel => f.write_str("clarabel"),
        }
    }
}

impl FromStr for SolverKind {
    type Err = PepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "totsu" => Ok(SolverKind::Totsu),
            "clarabel" => Ok(SolverKind::Clarabel),
            other => Err(PepError::SolverUnavailable(format!(
                "unknown solver '{}'",
                other
            ))),
        }
    }
}

/// How much the problem reports through `log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Silent,
    /// Results only.
    #[default]
    Example,
    /// Problem setup messages at `info`.
    Setup,
    /// Setup messages plus the backend's own output.
    Solver,
}

impl From<i32> for Verbosity {
    fn from(level: i32) -> Self {
        match level {
            i32::MIN..=-1 => Verbosity::Silent,
            0 => Verbosity::Example,
            1 => Verbosity::Setup,
            _ => Verbosity::Solver,
        }
    }
}

/// Rank-reducing re-solves run after the main solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionReduction {
    /// Minimize `trace(G)` once.
    Trace,
    /// Minimize `<W, G>` with log-det reweighting, at most `iterations` times.
    LogDet { iterations: usize },
}

/// Solver settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SDP backend.
    pub solver: SolverKind,
    pub verbosity: Verbosity,
    /// Accuracy requested from the backend. The default suits first-order
    /// solvers; interior-point backends can be asked for more.
    pub tolerance: f64,
    /// Maximum iterations; `None` picks the backend default.
    pub max_iter: Option<usize>,
    /// Time limit in seconds (Clarabel only).
    pub time_limit: f64,
    /// Eigenvalues above `eig_tolerance * max eigenvalue` are significant.
    pub eig_tolerance: f64,
    /// Optional rank-reducing heuristic.
    pub dimension_reduction: Option<DimensionReduction>,
    /// Relative slack allowed on tau during dimension reduction.
    pub reduction_tolerance: f64,
    /// Regularization `delta` of the log-det weights `1 / (lambda + delta)`.
    pub eig_regularization: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            solver: SolverKind::default(),
            verbosity: Verbosity::default(),
            tolerance: 1e-4,
            max_iter: None,
            time_limit: f64::INFINITY,
            eig_tolerance: 1e-3,
            dimension_reduction: None,
            reduction_tolerance: 1e-4,
            eig_regularization: 1e-3,
        }
    }
}

impl Settings {
    /// Check the settings and the availability of the backend.
    pub fn validate(&self) -> Result<()> {
        self.solver.ensure_available()?;

        let positive = [
            ("tolerance", self.tolerance),
            ("eig_tolerance", self.eig_tolerance),
            ("eig_regularization", self.eig_regularization),
            ("time_limit", self.time_limit),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(PepError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.reduction_tolerance.is_nan() || self.reduction_tolerance < 0.0 {
            return Err(PepError::InvalidParameter(format!(
                "reduction_tolerance must be nonnegative, got {}",
                self.reduction_tolerance
            )));
        }
        if self.max_iter == Some(0) {
            return Err(PepError::InvalidParameter(
                "max_iter must be at least 1".into(),
            ));
        }
        if let Some(DimensionReduction::LogDet { iterations: 0 }) = self.dimension_reduction {
            return Err(PepError::InvalidParameter(
                "log-det reduction needs at least one iteration".into(),
            ));
        }
        Ok(())
    }

    /// Lower bound kept on tau while re-solving for a lower-rank worst case.
    ///
    /// The slack is at least ten times the backend accuracy, relative to
    /// `max(|tau|, 1)`.
    pub(crate) fn reduction_floor(&self, tau: f64) -> f64 {
        let slack = self.reduction_tolerance.max(10.0 * self.tolerance);
        tau - slack * tau.abs().max(1.0)
    }

    /// Log level for problem setup messages.
    pub(crate) fn setup_level(&self) -> log::Level {
        if self.verbosity >= Verbosity::Setup {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.solver, SolverKind::Totsu);
        assert!(settings.dimension_reduction.is_none());
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tolerance, 1e-4);
    }

    #[test]
    fn test_reduction_floor_follows_accuracy() {
        let settings = Settings::default();
        let floor = settings.reduction_floor(0.1);
        assert!(floor < 0.1 - 5.0 * settings.tolerance);
        assert!(floor > 0.09);

        // Large values get a relative slack.
        let floor = settings.reduction_floor(100.0);
        assert!((100.0 - floor - 0.1).abs() < 1e-9);

        let tight = Settings {
            tolerance: 1e-9,
            reduction_tolerance: 1e-6,
            ..Settings::default()
        };
        assert!((0.5 - tight.reduction_floor(0.5) - 1e-6).abs() < 1e-12);
    }

    #[test]
    fn test_solver_kind_parse() {
        assert_eq!("totsu".parse::<SolverKind>().unwrap(), SolverKind::Totsu);
        assert_eq!(
            "Clarabel".parse::<SolverKind>().unwrap(),
            SolverKind::Clarabel
        );
        assert!(matches!(
            "mosek".parse::<SolverKind>(),
            Err(PepError::SolverUnavailable(_))
        ));
    }

    #[cfg(not(feature = "clarabel"))]
    #[test]
    fn test_clarabel_unavailable() {
        let settings = Settings {
            solver: SolverKind::Clarabel,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(PepError::SolverUnavailable(_))
        ));
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::from(-3), Verbosity::Silent);
        assert_eq!(Verbosity::from(0), Verbosity::Example);
        assert_eq!(Verbosity::from(1), Verbosity::Setup);
        assert_eq!(Verbosity::from(7), Verbosity::Solver);
        assert!(Verbosity::Solver > Verbosity::Setup);
    }

    #[test]
    fn test_invalid_settings() {
        let settings = Settings {
            tolerance: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            dimension_reduction: Some(DimensionReduction::LogDet { iterations: 0 }),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
