//! Constraints on symbolic scalars.

mod constraint;

pub use constraint::{Constraint, Relation};

/// Build a constraint with comparison syntax.
///
/// The left-hand side must be a single token tree, so parenthesize compound
/// expressions.
///
/// ```ignore
/// let c = constraint!((&f1 - &f0) <= 0.0);
/// let d = constraint!(dist == 1.0);
/// ```
#[macro_export]
macro_rules! constraint {
    ($lhs:tt <= $rhs:expr) => {
        $crate::expr::Expression::leq(&$crate::expr::Expression::from($lhs), $rhs)
    };
    ($lhs:tt >= $rhs:expr) => {
        $crate::expr::Expression::geq(&$crate::expr::Expression::from($lhs), $rhs)
    };
    ($lhs:tt == $rhs:expr) => {
        $crate::expr::Expression::equals(&$crate::expr::Expression::from($lhs), $rhs)
    };
}
