//! Primitive steps that cannot be written with gradients alone.
//!
//! Each step introduces the unknown output as a fresh leaf and records an
//! oracle triple on the function, so that the optimality condition of the
//! step is enforced by the function's interpolation constraints. Conditions
//! the class cannot express are attached with [`Function::add_constraint`].

use crate::expr::{Expression, Point};
use crate::functions::Function;

/// `x = prox_{gamma f}(x0)`.
///
/// Returns `(x, g, fx)` with `g` a subgradient of `f` at `x` and
/// `x = x0 - gamma * g`.
pub fn proximal_step(x0: &Point, f: &Function, gamma: f64) -> (Point, Point, Expression) {
    let ctx = f.context();
    let g = ctx.leaf_point();
    let fx = ctx.leaf_expression();
    let x = x0 - gamma * &g;
    f.add_point(&x, &g, &fx);
    (x, g, fx)
}

/// `x` in `argmin_{x in C} <dir, x>`, with `C` the domain of the indicator `ind`.
///
/// Returns `(x, g, fx)` with `g = -dir` in the normal cone of `C` at `x`.
pub fn linear_optimization_step(dir: &Point, ind: &Function) -> (Point, Point, Expression) {
    let ctx = ind.context();
    let g = -dir;
    let x = ctx.leaf_point();
    let fx = ctx.leaf_expression();
    ind.add_point(&x, &g, &fx);
    (x, g, fx)
}

/// Mirror step `grad h(x) = grad h(x0) - gamma * gx0`.
///
/// `gx0` is the step direction and `sx0` a (sub)gradient of `mirror` at the
/// previous iterate. Returns `(x, gx, hx)` with `gx = sx0 - gamma * gx0` a
/// (sub)gradient of `mirror` at the new iterate `x`.
pub fn bregman_gradient_step(
    gx0: &Point,
    sx0: &Point,
    mirror: &Function,
    gamma: f64,
) -> (Point, Point, Expression) {
    let ctx = mirror.context();
    let gx = sx0 - gamma * gx0;
    let x = ctx.leaf_point();
    let hx = ctx.leaf_expression();
    mirror.add_point(&x, &gx, &hx);
    (x, gx, hx)
}

/// Bregman proximal step `grad h(x) = sx0 - gamma * gx`, `gx` in `df(x)`.
///
/// Returns `(x, sx, hx, gx, fx)`: the new point, a (sub)gradient and value of
/// `mirror` there, and a subgradient and value of `f` there.
pub fn bregman_proximal_step(
    sx0: &Point,
    mirror: &Function,
    f: &Function,
    gamma: f64,
) -> (Point, Point, Expression, Point, Expression) {
    let ctx = mirror.context();
    let x = ctx.leaf_point();
    let gx = ctx.leaf_point();
    let hx = ctx.leaf_expression();
    let fx = ctx.leaf_expression();
    let sx = sx0 - gamma * &gx;
    mirror.add_point(&x, &sx, &hx);
    f.add_point(&x, &gx, &fx);
    (x, sx, hx, gx, fx)
}

/// Exact line search from `x0` over the span of `directions`.
///
/// The new point `x` is a fresh leaf whose gradient is orthogonal to
/// `x - x0` and to every direction. Returns `(x, gx, fx)`.
pub fn exact_linesearch_step(
    x0: &Point,
    f: &Function,
    directions: &[Point],
) -> (Point, Point, Expression) {
    let ctx = f.context();
    let x = ctx.leaf_point();
    let gx = ctx.leaf_point();
    let fx = ctx.leaf_expression();
    f.add_point(&x, &gx, &fx);

    f.add_constraint(gx.inner(&(&x - x0)).equals(0.0));
    for d in directions {
        f.add_constraint(gx.inner(d).equals(0.0));
    }
    (x, gx, fx)
}

/// How the error of an inexact gradient is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientAccuracy {
    /// `|d - grad f(x0)| <= epsilon`
    Absolute,
    /// `|d - grad f(x0)| <= epsilon |grad f(x0)|`
    Relative,
}

/// Gradient step `x = x0 - gamma * d` along an approximate gradient `d`.
///
/// Returns `(x, d, fx0)`.
pub fn inexact_gradient_step(
    x0: &Point,
    f: &Function,
    gamma: f64,
    epsilon: f64,
    accuracy: GradientAccuracy,
) -> (Point, Point, Expression) {
    let ctx = f.context();
    let d = ctx.leaf_point();
    let (gx0, fx0) = f.oracle(x0);
    let x = x0 - gamma * &d;

    let error = (&gx0 - &d).square();
    let bound = match accuracy {
        GradientAccuracy::Absolute => Expression::constant(epsilon * epsilon),
        GradientAccuracy::Relative => gx0.square() * (epsilon * epsilon),
    };
    f.add_constraint(error.leq(bound));
    (x, d, fx0)
}

/// Step `x = x0 - gamma * g` along an epsilon-subgradient `g` of `f` at `x0`.
///
/// `g` is an exact subgradient at a fresh auxiliary point `u`, which makes
/// it an epsilon-subgradient at `x0` with
/// `epsilon = f(x0) - f(u) - <g, x0 - u>`. Returns `(x, g, fx0, epsilon)`.
pub fn epsilon_subgradient_step(
    x0: &Point,
    f: &Function,
    gamma: f64,
) -> (Point, Point, Expression, Expression) {
    let ctx = f.context();
    let u = ctx.leaf_point();
    let g = ctx.leaf_point();
    let fu = ctx.leaf_expression();
    f.add_point(&u, &g, &fu);

    let fx0 = f.value(x0);
    let epsilon = &fx0 - &fu - g.inner(&(x0 - &u));
    let x = x0 - gamma * &g;
    (x, g, fx0, epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionClass;
    use crate::problem::Pep;

    #[test]
    fn test_proximal_step_records_call() {
        let mut pep = Pep::new();
        let f = pep.declare_function(FunctionClass::Convex).unwrap();
        let x0 = pep.set_initial_point().unwrap();

        let (x, g, fx) = proximal_step(&x0, &f, 0.5);
        let calls = f.oracle_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].point.same_as(&x));
        assert!(calls[0].gradient.same_as(&g));
        assert!(calls[0].value.same_as(&fx));

        // x = x0 - 0.5 g
        let g_id = g.leaf_id().unwrap();
        assert_eq!(x.decomposition().get(&g_id), Some(&-0.5));
        // A later oracle call at x returns the recorded value.
        assert!(f.value(&x).same_as(&fx));
    }

    #[test]
    fn test_linear_optimization_step() {
        let mut pep = Pep::new();
        let ind = pep
            .declare_function(FunctionClass::ConvexIndicator { d: 1.0 })
            .unwrap();
        let d = pep.set_initial_point().unwrap();

        let (x, g, _) = linear_optimization_step(&d, &ind);
        assert!(x.is_leaf());
        let d_id = d.leaf_id().unwrap();
        assert_eq!(g.decomposition().get(&d_id), Some(&-1.0));
        assert_eq!(ind.oracle_calls().len(), 1);
    }

    #[test]
    fn test_bregman_step_on_sum() {
        let mut pep = Pep::new();
        let h = pep
            .declare_function(FunctionClass::StronglyConvex { mu: 1.0 })
            .unwrap();
        let ind = pep
            .declare_function(FunctionClass::ConvexIndicator { d: f64::INFINITY })
            .unwrap();
        let mirror = &h + &ind;
        let x0 = pep.set_initial_point().unwrap();
        let g0 = pep.set_initial_point().unwrap();
        let s0 = h.gradient(&x0);

        let (x, gx, _) = bregman_gradient_step(&g0, &s0, &mirror, 2.0);
        assert!(x.is_leaf());
        assert_eq!(gx.decomposition().get(&g0.leaf_id().unwrap()), Some(&-2.0));
        // Both components see the new point.
        assert!(h.oracle_calls().iter().any(|c| c.point.same_as(&x)));
        assert!(ind.oracle_calls().iter().any(|c| c.point.same_as(&x)));
    }

    #[test]
    fn test_bregman_proximal_step() {
        let mut pep = Pep::new();
        let h = pep
            .declare_function(FunctionClass::StronglyConvex { mu: 1.0 })
            .unwrap();
        let f = pep.declare_function(FunctionClass::Convex).unwrap();
        let x0 = pep.set_initial_point().unwrap();
        let s0 = h.gradient(&x0);

        let (x, sx, _, gx, fx) = bregman_proximal_step(&s0, &h, &f, 0.5);
        assert!(x.is_leaf());
        assert_eq!(sx.decomposition().get(&gx.leaf_id().unwrap()), Some(&-0.5));
        assert!(h.oracle_calls().last().unwrap().gradient.same_as(&sx));
        assert!(f.value(&x).same_as(&fx));
    }

    #[test]
    fn test_exact_linesearch_adds_orthogonality() {
        let mut pep = Pep::new();
        let f = pep
            .declare_function(FunctionClass::SmoothConvex { l: 1.0 })
            .unwrap();
        let x0 = pep.set_initial_point().unwrap();
        let g0 = f.gradient(&x0);

        let (x, gx, _) = exact_linesearch_step(&x0, &f, &[g0]);
        assert!(f.gradient(&x).same_as(&gx));

        // Two calls give two class constraints, then the two conditions.
        assert_eq!(f.generate_constraints(), 2 + 2);
        let all = f.list_of_constraints();
        let attached = &all[2..];
        assert!(attached
            .iter()
            .all(|c| c.relation() == crate::constraints::Relation::Equality));
    }

    #[test]
    fn test_inexact_gradient_step() {
        let mut pep = Pep::new();
        let f = pep
            .declare_function(FunctionClass::SmoothConvex { l: 1.0 })
            .unwrap();
        let x0 = pep.set_initial_point().unwrap();

        let (x, d, fx0) = inexact_gradient_step(&x0, &f, 1.0, 0.1, GradientAccuracy::Relative);
        assert!(f.value(&x0).same_as(&fx0));
        assert_eq!(x.decomposition().get(&d.leaf_id().unwrap()), Some(&-1.0));

        let (_, _, _) = inexact_gradient_step(&x, &f, 1.0, 0.1, GradientAccuracy::Absolute);
        let n = f.generate_constraints();
        let all = f.list_of_constraints();
        let attached = &all[n - 2..];
        // |g - d|^2 - eps^2 |g|^2 <= 0 has no constant; the absolute form does.
        assert_eq!(attached[0].expression().constant_term(), 0.0);
        assert!((attached[1].expression().constant_term() + 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_epsilon_subgradient_step() {
        let mut pep = Pep::new();
        let f = pep.declare_function(FunctionClass::Convex).unwrap();
        let x0 = pep.set_initial_point().unwrap();

        let (x, g, fx0, epsilon) = epsilon_subgradient_step(&x0, &f, 2.0);
        assert_eq!(f.oracle_calls().len(), 2);
        assert!(f.value(&x0).same_as(&fx0));
        assert_eq!(x.decomposition().get(&g.leaf_id().unwrap()), Some(&-2.0));
        assert_eq!(epsilon.linear().get(&fx0.atom_id().unwrap()), Some(&1.0));
    }
}
