//! Function handles and their oracle histories.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Mul};
use std::rc::Rc;

use super::classes::{InterpolationRule, OracleCall};
use crate::constraints::Constraint;
use crate::context::{merge_scopes, Context};
use crate::expr::{Expression, Point};

/// Atomic class or weighted sum of functions.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    /// A function of one class.
    Atomic(Rc<dyn InterpolationRule>),
    /// `sum_k w_k f_k` over atomic components.
    Sum(Vec<(Function, f64)>),
}

#[derive(Debug)]
struct FunctionData {
    counter: Option<usize>,
    kind: FunctionKind,
    reuse_gradient: Option<bool>,
    calls: Vec<OracleCall>,
    /// Constraints attached by steps, indexed after the class constraints.
    extra: Vec<Constraint>,
    constraints: Vec<Constraint>,
}

/// Shared handle on a function and its oracle history.
///
/// Clones share the history. Atomic functions are created through
/// [`Pep::declare_function`](crate::problem::Pep::declare_function);
/// sums through `&f + &g` or [`Function::scaled`].
#[derive(Clone)]
pub struct Function {
    ctx: Context,
    inner: Rc<RefCell<FunctionData>>,
}

impl Function {
    pub(crate) fn atomic(ctx: &Context, rule: Rc<dyn InterpolationRule>) -> Self {
        Function {
            ctx: ctx.clone(),
            inner: Rc::new(RefCell::new(FunctionData {
                counter: Some(ctx.next_function()),
                kind: FunctionKind::Atomic(rule),
                reuse_gradient: None,
                calls: Vec::new(),
                extra: Vec::new(),
                constraints: Vec::new(),
            })),
        }
    }

    fn sum(ctx: &Context, components: Vec<(Function, f64)>) -> Self {
        Function {
            ctx: ctx.clone(),
            inner: Rc::new(RefCell::new(FunctionData {
                counter: None,
                kind: FunctionKind::Sum(components),
                reuse_gradient: None,
                calls: Vec::new(),
                extra: Vec::new(),
                constraints: Vec::new(),
            })),
        }
    }

    /// Creation index; `None` for sums.
    pub fn counter(&self) -> Option<usize> {
        self.inner.borrow().counter
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn kind(&self) -> FunctionKind {
        self.inner.borrow().kind.clone()
    }

    pub fn is_sum(&self) -> bool {
        matches!(self.inner.borrow().kind, FunctionKind::Sum(_))
    }

    /// Class tag, or `"sum"`.
    pub fn tag(&self) -> &'static str {
        match &self.inner.borrow().kind {
            FunctionKind::Atomic(rule) => rule.tag(),
            FunctionKind::Sum(_) => "sum",
        }
    }

    /// Weighted atomic components (`[(self, 1.0)]` for an atomic function).
    pub fn decomposition(&self) -> Vec<(Function, f64)> {
        match &self.inner.borrow().kind {
            FunctionKind::Atomic(_) => vec![(self.clone(), 1.0)],
            FunctionKind::Sum(components) => components.clone(),
        }
    }

    /// Whether repeated oracle calls at one Point reuse the recorded gradient.
    ///
    /// Defaults to the class's differentiability; a sum reuses only if all its
    /// components do.
    pub fn reuse_gradient(&self) -> bool {
        let data = self.inner.borrow();
        if let Some(reuse) = data.reuse_gradient {
            return reuse;
        }
        match &data.kind {
            FunctionKind::Atomic(rule) => rule.is_differentiable(),
            FunctionKind::Sum(components) => components.iter().all(|(f, _)| f.reuse_gradient()),
        }
    }

    /// Override the gradient reuse policy.
    pub fn set_reuse_gradient(&self, reuse: bool) {
        self.inner.borrow_mut().reuse_gradient = Some(reuse);
    }

    /// Recorded oracle calls, in call order.
    pub fn oracle_calls(&self) -> Vec<OracleCall> {
        self.inner.borrow().calls.clone()
    }

    fn recorded(&self, point: &Point) -> Option<OracleCall> {
        self.inner
            .borrow()
            .calls
            .iter()
            .find(|call| call.point.same_as(point))
            .cloned()
    }

    fn record(&self, point: &Point, gradient: &Point, value: &Expression) {
        self.inner.borrow_mut().calls.push(OracleCall {
            point: point.clone(),
            gradient: gradient.clone(),
            value: value.clone(),
        });
    }

    fn check_scope(&self, point: &Point) {
        merge_scopes(Some(self.ctx.scope()), point.scope());
    }

    /// Query the oracle at `point`, returning `(gradient, value)`.
    ///
    /// # Panics
    ///
    /// Panics if `point` belongs to another problem.
    pub fn oracle(&self, point: &Point) -> (Point, Expression) {
        self.check_scope(point);
        let previous = self.recorded(point);

        if let Some(call) = &previous {
            if self.reuse_gradient() {
                return (call.gradient.clone(), call.value.clone());
            }
        }

        let (gradient, value) = match self.kind() {
            FunctionKind::Atomic(_) => {
                let gradient = self.ctx.leaf_point();
                let value = match previous {
                    Some(call) => call.value,
                    None => self.ctx.leaf_expression(),
                };
                (gradient, value)
            }
            FunctionKind::Sum(components) => {
                let mut gradients = Vec::with_capacity(components.len());
                let mut value = Expression::constant(0.0);
                for (f, w) in &components {
                    let (g, v) = f.oracle(point);
                    value = &value + &(v * *w);
                    gradients.push((g, *w));
                }
                let gradient = Point::combination(gradients.iter().map(|(g, w)| (g, *w)));
                (gradient, value)
            }
        };

        self.record(point, &gradient, &value);
        (gradient, value)
    }

    /// Gradient at `point`.
    pub fn gradient(&self, point: &Point) -> Point {
        self.oracle(point).0
    }

    /// A subgradient at `point`.
    pub fn subgradient(&self, point: &Point) -> Point {
        self.oracle(point).0
    }

    /// Function value at `point`, reusing a recorded value when one exists.
    pub fn value(&self, point: &Point) -> Expression {
        self.check_scope(point);
        match self.recorded(point) {
            Some(call) => call.value,
            None => self.oracle(point).1,
        }
    }

    /// A minimizer `x*`: a fresh leaf with zero gradient and a fresh value.
    pub fn stationary_point(&self) -> Point {
        let point = self.ctx.leaf_point();
        let value = self.ctx.leaf_expression();
        self.add_point(&point, &Point::zero(), &value);
        point
    }

    /// Record an externally built oracle triple.
    ///
    /// On a sum, every component but the last receives a fresh gradient and
    /// value, and the last one receives the weighted remainder.
    pub fn add_point(&self, point: &Point, gradient: &Point, value: &Expression) {
        self.check_scope(point);
        self.check_scope(gradient);
        merge_scopes(Some(self.ctx.scope()), value.scope());

        if let FunctionKind::Sum(components) = self.kind() {
            let mut gradient_rest = gradient.clone();
            let mut value_rest = value.clone();
            // The last component with a nonzero weight takes the remainder.
            let absorber = components.iter().rposition(|(_, w)| *w != 0.0);

            for (k, (f, w)) in components.iter().enumerate() {
                if Some(k) == absorber {
                    continue;
                }
                let g = self.ctx.leaf_point();
                let v = self.ctx.leaf_expression();
                f.add_point(point, &g, &v);
                gradient_rest = &gradient_rest - &(&g * *w);
                value_rest = &value_rest - &(&v * *w);
            }
            if let Some((f, w)) = absorber.map(|k| &components[k]) {
                f.add_point(point, &(&gradient_rest / *w), &(&value_rest / *w));
            }
        }

        self.record(point, gradient, value);
    }

    /// Attach a constraint that is not implied by the class, such as the
    /// optimality condition of an exact line search.
    ///
    /// A sum hands the constraint to its first component.
    ///
    /// # Panics
    ///
    /// Panics if the constraint belongs to a different problem.
    pub fn add_constraint(&self, constraint: Constraint) {
        merge_scopes(Some(self.ctx.scope()), constraint.expression().scope());
        match self.kind() {
            FunctionKind::Atomic(_) => self.inner.borrow_mut().extra.push(constraint),
            FunctionKind::Sum(components) => {
                if let Some((f, _)) = components.first() {
                    f.add_constraint(constraint);
                }
            }
        }
    }

    /// Class constraints followed by attached ones: generated at solve for
    /// atomic functions, the union of the components' constraints for sums.
    pub fn list_of_constraints(&self) -> Vec<Constraint> {
        match self.kind() {
            FunctionKind::Atomic(_) => self.inner.borrow().constraints.clone(),
            FunctionKind::Sum(components) => components
                .iter()
                .flat_map(|(f, _)| f.list_of_constraints())
                .collect(),
        }
    }

    /// Generate and index the class constraints of an atomic function.
    pub(crate) fn generate_constraints(&self) -> usize {
        let mut data = self.inner.borrow_mut();
        let mut constraints = match &data.kind {
            FunctionKind::Atomic(rule) => rule.constraints_for(&data.calls),
            FunctionKind::Sum(_) => return 0,
        };
        constraints.extend(data.extra.iter().cloned());
        data.constraints = constraints
            .into_iter()
            .map(|mut c| {
                c.set_counter(self.ctx.next_constraint());
                c
            })
            .collect();
        data.constraints.len()
    }

    pub(crate) fn set_constraint_duals(&self, duals: &[f64]) {
        let mut data = self.inner.borrow_mut();
        for (c, dual) in data.constraints.iter_mut().zip(duals) {
            c.set_dual(*dual);
        }
    }

    /// `weight * self`.
    pub fn scaled(&self, weight: f64) -> Function {
        let components = self
            .decomposition()
            .into_iter()
            .map(|(f, w)| (f, w * weight))
            .collect();
        Function::sum(&self.ctx, components)
    }

    /// `self + other`. Components shared by both operands have their weights merged.
    ///
    /// # Panics
    ///
    /// Panics if the functions belong to different problems.
    pub fn plus(&self, other: &Function) -> Function {
        merge_scopes(Some(self.ctx.scope()), Some(other.ctx.scope()));

        let mut components = self.decomposition();
        for (f, w) in other.decomposition() {
            match components.iter_mut().find(|(g, _)| g.same_as(&f)) {
                Some((_, existing)) => *existing += w,
                None => components.push((f, w)),
            }
        }
        Function::sum(&self.ctx, components)
    }

    /// Handle identity.
    pub fn same_as(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("Function")
            .field("counter", &data.counter)
            .field("kind", &data.kind)
            .field("calls", &data.calls.len())
            .finish()
    }
}

impl Add for &Function {
    type Output = Function;

    fn add(self, rhs: &Function) -> Function {
        self.plus(rhs)
    }
}

impl Add for Function {
    type Output = Function;

    fn add(self, rhs: Function) -> Function {
        self.plus(&rhs)
    }
}

impl Mul<&Function> for f64 {
    type Output = Function;

    fn mul(self, rhs: &Function) -> Function {
        rhs.scaled(self)
    }
}

impl Mul<Function> for f64 {
    type Output = Function;

    fn mul(self, rhs: Function) -> Function {
        rhs.scaled(self)
    }
}
