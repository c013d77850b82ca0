//! Function classes and their interpolation conditions.
//!
//! A class turns the ordered list of oracle calls recorded on a function into
//! the finite family of constraints that makes the calls interpolable by some
//! member of the class.

use std::fmt;

use crate::constraints::Constraint;
use crate::error::{PepError, Result};
use crate::expr::{Expression, Point};

/// One recorded oracle call `(x_i, g_i, f_i)`.
#[derive(Debug, Clone)]
pub struct OracleCall {
    pub point: Point,
    pub gradient: Point,
    pub value: Expression,
}

/// Interpolation conditions of a function class.
///
/// Implement this trait to plug a custom class into
/// [`Pep::declare_function`](crate::problem::Pep::declare_function).
pub trait InterpolationRule: fmt::Debug {
    /// Short class name used in logs.
    fn tag(&self) -> &'static str;

    /// Whether repeated oracle calls at one point may reuse the recorded gradient.
    fn is_differentiable(&self) -> bool;

    /// Check the class parameters.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Constraints certifying that `calls` are interpolable within the class.
    fn constraints_for(&self, calls: &[OracleCall]) -> Vec<Constraint>;
}

/// Built-in function classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionClass {
    /// Closed proper convex functions.
    Convex,
    /// `mu`-strongly convex functions, not necessarily smooth.
    StronglyConvex { mu: f64 },
    /// `L`-smooth convex functions.
    SmoothConvex { l: f64 },
    /// `L`-smooth `mu`-strongly convex functions, `mu < L`. `L` may be infinite.
    SmoothStronglyConvex { l: f64, mu: f64 },
    /// `L`-smooth, possibly nonconvex functions.
    Smooth { l: f64 },
    /// Convex functions with subgradients bounded by `M`.
    ConvexLipschitz { m: f64 },
    /// Indicator of a closed convex set of diameter `D` (`D` may be infinite).
    ConvexIndicator { d: f64 },
}

impl FunctionClass {
    fn params(&self) -> Vec<(&'static str, f64)> {
        match *self {
            FunctionClass::Convex => vec![],
            FunctionClass::StronglyConvex { mu } => vec![("mu", mu)],
            FunctionClass::SmoothConvex { l } => vec![("L", l)],
            FunctionClass::SmoothStronglyConvex { l, mu } => vec![("L", l), ("mu", mu)],
            FunctionClass::Smooth { l } => vec![("L", l)],
            FunctionClass::ConvexLipschitz { m } => vec![("M", m)],
            FunctionClass::ConvexIndicator { d } => vec![("D", d)],
        }
    }
}

impl InterpolationRule for FunctionClass {
    fn tag(&self) -> &'static str {
        match self {
            FunctionClass::Convex => "convex",
            FunctionClass::StronglyConvex { .. } => "strongly_convex",
            FunctionClass::SmoothConvex { .. } => "smooth_convex",
            FunctionClass::SmoothStronglyConvex { .. } => "smooth_strongly_convex",
            FunctionClass::Smooth { .. } => "smooth",
            FunctionClass::ConvexLipschitz { .. } => "convex_lipschitz",
            FunctionClass::ConvexIndicator { .. } => "convex_indicator",
        }
    }

    fn is_differentiable(&self) -> bool {
        match *self {
            FunctionClass::SmoothConvex { l } | FunctionClass::Smooth { l } => l.is_finite(),
            FunctionClass::SmoothStronglyConvex { l, .. } => l.is_finite(),
            _ => false,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in self.params() {
            if value.is_nan() || value < 0.0 {
                return Err(PepError::InvalidParameter(format!(
                    "{}: {} must be nonnegative, got {}",
                    self.tag(),
                    name,
                    value
                )));
            }
        }

        match *self {
            FunctionClass::SmoothConvex { l } if l == 0.0 => Err(PepError::InvalidParameter(
                format!("{}: L must be positive", self.tag()),
            )),
            FunctionClass::Smooth { l } if l == 0.0 || l.is_infinite() => {
                Err(PepError::InvalidParameter(format!(
                    "{}: L must be positive and finite, got {}",
                    self.tag(),
                    l
                )))
            }
            FunctionClass::SmoothStronglyConvex { l, mu } if mu >= l => {
                Err(PepError::InvalidParameter(format!(
                    "{}: mu must be smaller than L (mu = {}, L = {})",
                    self.tag(),
                    mu,
                    l
                )))
            }
            FunctionClass::StronglyConvex { mu }
            | FunctionClass::SmoothStronglyConvex { mu, .. }
                if mu.is_infinite() =>
            {
                Err(PepError::InvalidParameter(format!(
                    "{}: mu must be finite",
                    self.tag()
                )))
            }
            FunctionClass::ConvexLipschitz { m } if m.is_infinite() => Err(
                PepError::InvalidParameter(format!("{}: M must be finite", self.tag())),
            ),
            _ => Ok(()),
        }
    }

    fn constraints_for(&self, calls: &[OracleCall]) -> Vec<Constraint> {
        let mut constraints = Vec::new();

        match *self {
            FunctionClass::Convex => {
                for_each_pair(calls, |i, j| constraints.push(convex_pair(i, j).leq(0.0)));
            }
            FunctionClass::StronglyConvex { mu } => {
                for_each_pair(calls, |i, j| {
                    let dx = &i.point - &j.point;
                    let expr = &convex_pair(i, j) + &(dx.square() * (mu / 2.0));
                    constraints.push(expr.leq(0.0));
                });
            }
            FunctionClass::SmoothConvex { l } => {
                for_each_pair(calls, |i, j| {
                    let dg = &i.gradient - &j.gradient;
                    let expr = &convex_pair(i, j) + &(dg.square() * (1.0 / (2.0 * l)));
                    constraints.push(expr.leq(0.0));
                });
            }
            FunctionClass::SmoothStronglyConvex { l, mu } => {
                for_each_pair(calls, |i, j| {
                    constraints.push(smooth_strongly_convex_pair(i, j, l, mu).leq(0.0));
                });
            }
            FunctionClass::Smooth { l } => {
                for_each_pair(calls, |i, j| {
                    constraints.push(smooth_strongly_convex_pair(i, j, l, -l).leq(0.0));
                });
            }
            FunctionClass::ConvexLipschitz { m } => {
                for (a, i) in calls.iter().enumerate() {
                    constraints.push(i.gradient.square().leq(m * m));
                    for (b, j) in calls.iter().enumerate() {
                        if a != b {
                            constraints.push(convex_pair(i, j).leq(0.0));
                        }
                    }
                }
            }
            FunctionClass::ConvexIndicator { d } => {
                for call in calls {
                    constraints.push(call.value.equals(0.0));
                }
                for_each_pair(calls, |i, j| {
                    let dx = &j.point - &i.point;
                    constraints.push(i.gradient.inner(&dx).leq(0.0));
                    if d.is_finite() {
                        constraints.push(dx.square().leq(d * d));
                    }
                });
            }
        }

        constraints
    }
}

/// Run `body` on every ordered pair of distinct calls.
fn for_each_pair(calls: &[OracleCall], mut body: impl FnMut(&OracleCall, &OracleCall)) {
    for (a, i) in calls.iter().enumerate() {
        for (b, j) in calls.iter().enumerate() {
            if a != b {
                body(i, j);
            }
        }
    }
}

/// `f_j - f_i + <g_j, x_i - x_j>`.
fn convex_pair(i: &OracleCall, j: &OracleCall) -> Expression {
    let dx = &i.point - &j.point;
    &(&j.value - &i.value) + &j.gradient.inner(&dx)
}

/// `f_j - f_i + <g_j, dx> + c (|dg|^2 / L + mu |dx|^2 - 2 mu / L <dg, dx>)`
/// with `dx = x_i - x_j`, `dg = g_i - g_j` and `c = 1 / (2 (1 - mu / L))`.
fn smooth_strongly_convex_pair(i: &OracleCall, j: &OracleCall, l: f64, mu: f64) -> Expression {
    let dx = &i.point - &j.point;
    let dg = &i.gradient - &j.gradient;
    let c = 1.0 / (2.0 * (1.0 - mu / l));

    let curvature = &(&(dg.square() * (1.0 / l)) + &(dx.square() * mu))
        - &(dg.inner(&dx) * (2.0 * mu / l));
    &convex_pair(i, j) + &(curvature * c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Relation;
    use crate::context::{Context, LeafId};

    fn calls(ctx: &Context, n: usize) -> Vec<OracleCall> {
        (0..n)
            .map(|_| OracleCall {
                point: ctx.leaf_point(),
                gradient: ctx.leaf_point(),
                value: ctx.leaf_expression(),
            })
            .collect()
    }

    #[test]
    fn test_validation() {
        assert!(FunctionClass::Convex.validate().is_ok());
        assert!(FunctionClass::SmoothStronglyConvex { l: 1.0, mu: 0.1 }
            .validate()
            .is_ok());
        assert!(FunctionClass::SmoothStronglyConvex {
            l: f64::INFINITY,
            mu: 1.0
        }
        .validate()
        .is_ok());
        assert!(FunctionClass::SmoothStronglyConvex { l: 1.0, mu: 1.0 }
            .validate()
            .is_err());
        assert!(FunctionClass::SmoothConvex { l: -1.0 }.validate().is_err());
        assert!(FunctionClass::SmoothConvex { l: 0.0 }.validate().is_err());
        assert!(FunctionClass::Smooth { l: f64::INFINITY }.validate().is_err());
        assert!(FunctionClass::ConvexLipschitz { m: f64::NAN }
            .validate()
            .is_err());
        assert!(FunctionClass::ConvexIndicator { d: f64::INFINITY }
            .validate()
            .is_ok());
    }

    #[test]
    fn test_differentiability() {
        assert!(FunctionClass::SmoothConvex { l: 1.0 }.is_differentiable());
        assert!(!FunctionClass::SmoothStronglyConvex {
            l: f64::INFINITY,
            mu: 1.0
        }
        .is_differentiable());
        assert!(!FunctionClass::ConvexLipschitz { m: 1.0 }.is_differentiable());
        assert!(!FunctionClass::ConvexIndicator { d: 1.0 }.is_differentiable());
    }

    #[test]
    fn test_pair_counts() {
        let ctx = Context::new();
        let history = calls(&ctx, 4);

        let smooth = FunctionClass::SmoothConvex { l: 1.0 }.constraints_for(&history);
        assert_eq!(smooth.len(), 12);
        assert!(smooth.iter().all(|c| c.relation() == Relation::Inequality));

        let lipschitz = FunctionClass::ConvexLipschitz { m: 2.0 }.constraints_for(&history);
        assert_eq!(lipschitz.len(), 4 + 12);
        assert_eq!(lipschitz[0].expression().constant_term(), -4.0);

        let bounded = FunctionClass::ConvexIndicator { d: 1.0 }.constraints_for(&history);
        assert_eq!(bounded.len(), 4 + 12 + 12);
        assert!(bounded[..4].iter().all(|c| c.relation() == Relation::Equality));

        let unbounded =
            FunctionClass::ConvexIndicator { d: f64::INFINITY }.constraints_for(&history);
        assert_eq!(unbounded.len(), 4 + 12);
    }

    #[test]
    fn test_single_call_has_no_pairs() {
        let ctx = Context::new();
        let history = calls(&ctx, 1);
        assert!(FunctionClass::Convex.constraints_for(&history).is_empty());
    }

    #[test]
    fn test_smooth_convex_coefficients() {
        let ctx = Context::new();
        let history = calls(&ctx, 2);
        let (i, j) = (&history[0], &history[1]);
        let c = &FunctionClass::SmoothConvex { l: 2.0 }.constraints_for(&history)[0];
        let e = c.expression();

        // f_j - f_i
        assert_eq!(e.linear()[&j.value.atom_id().unwrap()], 1.0);
        assert_eq!(e.linear()[&i.value.atom_id().unwrap()], -1.0);
        // 1/(2L) |g_i - g_j|^2 on the diagonal
        let gi = i.gradient.leaf_id().unwrap();
        assert_eq!(e.quadratic()[&(gi, gi)], 0.25);
    }

    #[test]
    fn test_quadratic_function_is_tight() {
        // f(x) = x^2 / 2 in one dimension with L = 1, mu = 0.1, at x_i = 1, x_j = 0.
        let ctx = Context::new();
        let history = calls(&ctx, 2);
        let leaves: Vec<_> = history
            .iter()
            .flat_map(|c| [c.point.leaf_id().unwrap(), c.gradient.leaf_id().unwrap()])
            .collect();
        // Coordinates of x_0, g_0, x_1, g_1 in R^1.
        let coords = [1.0, 1.0, 0.0, 0.0];
        let values = [0.5, 0.0];
        let pos = |id: LeafId| leaves.iter().position(|l| *l == id).unwrap();
        let gram = |a: LeafId, b: LeafId| coords[pos(a)] * coords[pos(b)];

        for class in [
            FunctionClass::SmoothStronglyConvex { l: 1.0, mu: 0.1 },
            FunctionClass::SmoothConvex { l: 1.0 },
            FunctionClass::Smooth { l: 1.0 },
            FunctionClass::Convex,
        ] {
            for c in class.constraints_for(&history) {
                let v = c.evaluate(gram, |a| values[a.raw()]);
                assert!(v <= 1e-12, "{:?} violated: {}", class, v);
            }
        }
    }
}
