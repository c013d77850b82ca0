//! # pepcert
//!
//! Worst-case performance certificates for first-order optimization methods.
//!
//! A performance estimation problem (PEP) asks for the worst value of a
//! performance metric after a fixed number of steps of a method, over all
//! functions of a given class. pepcert writes the method symbolically, lowers
//! the question to a semidefinite program over the Gram matrix of the iterates
//! and gradients, and solves it.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pepcert::prelude::*;
//!
//! let mut pep = Pep::new();
//! let f = pep.declare_function(FunctionClass::SmoothStronglyConvex { l: 1.0, mu: 0.1 })?;
//! let xs = f.stationary_point();
//! let x0 = pep.set_initial_point()?;
//! pep.set_initial_condition((&x0 - &xs).square().leq(1.0))?;
//!
//! let x1 = &x0 - f.gradient(&x0);
//! pep.set_performance_metric((&x1 - &xs).square())?;
//!
//! let outcome = pep.solve()?;
//! println!("worst case: {:?}", outcome.tau); // ~0.81
//! ```
//!
//! ## Function classes
//!
//! - `Convex`, `StronglyConvex`, `SmoothConvex`, `SmoothStronglyConvex`
//! - `Smooth` (nonconvex)
//! - `ConvexLipschitz`, `ConvexIndicator`
//!
//! Custom classes implement [`InterpolationRule`](functions::InterpolationRule).
//!
//! ## Architecture
//!
//! - **Points** are flat linear combinations of leaf Points
//! - **Expressions** are affine in function values and leaf inner products
//! - **Functions** record oracle calls and emit interpolation constraints
//! - **Stuffing** lowers everything to `A x + s = b` over `[tau, F, svec(G)]`
//! - **Totsu** (default) or **Clarabel** (`clarabel` feature) solve the SDP

pub mod constraints;
pub mod context;
pub mod error;
pub mod expr;
pub mod functions;
pub mod gram;
pub mod problem;
pub mod solver;
pub mod sparse;
pub mod steps;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use pepcert::prelude::*;
/// ```
pub mod prelude {
    // Symbolic objects
    pub use crate::context::Context;
    pub use crate::expr::{Expression, Point};

    // Constraints
    pub use crate::constraint;
    pub use crate::constraints::{Constraint, Relation};

    // Functions
    pub use crate::functions::{Function, FunctionClass, InterpolationRule, OracleCall};
    pub use crate::steps::{
        bregman_gradient_step, bregman_proximal_step, epsilon_subgradient_step,
        exact_linesearch_step, inexact_gradient_step, linear_optimization_step, proximal_step,
        GradientAccuracy,
    };

    // Problem
    pub use crate::problem::{Pep, PepState, ReductionReport, SolveOutcome};

    // Solver
    pub use crate::solver::{DimensionReduction, Settings, SolveStatus, SolverKind, Verbosity};

    // Errors
    pub use crate::error::{PepError, Result};
}

// Re-export main types at crate root
pub use error::{PepError, Result};
pub use problem::{Pep, SolveOutcome};
pub use solver::{Settings, SolveStatus};
