//! Symbolic scalars.
//!
//! An `Expression` is affine in function-value atoms and in Gram entries:
//! `constant + sum_a c_a F[a] + sum_(i<=j) q_ij <e_i, e_j>`.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::constraints::{Constraint, Relation};
use crate::context::{merge_scopes, AtomId, LeafId, ScopeId};
use crate::error::{PepError, Result};

/// A symbolic scalar quantity.
#[derive(Debug, Clone, Default)]
pub struct Expression {
    scope: Option<ScopeId>,
    atom: Option<AtomId>,
    constant: f64,
    linear: BTreeMap<AtomId, f64>,
    quadratic: BTreeMap<(LeafId, LeafId), f64>,
}

impl Expression {
    /// A constant scalar.
    pub fn constant(value: f64) -> Self {
        Expression {
            constant: value,
            ..Default::default()
        }
    }

    pub(crate) fn atom(scope: ScopeId, id: AtomId) -> Self {
        let mut linear = BTreeMap::new();
        linear.insert(id, 1.0);
        Expression {
            scope: Some(scope),
            atom: Some(id),
            constant: 0.0,
            linear,
            quadratic: BTreeMap::new(),
        }
    }

    /// Build from an already symmetrized quadratic part (keys ordered `i <= j`).
    pub(crate) fn from_quadratic(
        scope: Option<ScopeId>,
        quadratic: BTreeMap<(LeafId, LeafId), f64>,
    ) -> Self {
        Expression {
            scope,
            quadratic,
            ..Default::default()
        }
    }

    /// Whether this Expression is a function-value atom.
    pub fn is_leaf(&self) -> bool {
        self.atom.is_some()
    }

    /// Atom identity, if this Expression is a function-value atom.
    pub fn atom_id(&self) -> Option<AtomId> {
        self.atom
    }

    /// Creation index of an atom; `None` for composite Expressions.
    pub fn counter(&self) -> Option<usize> {
        self.atom.map(|id| id.raw())
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    pub fn linear(&self) -> &BTreeMap<AtomId, f64> {
        &self.linear
    }

    pub fn quadratic(&self) -> &BTreeMap<(LeafId, LeafId), f64> {
        &self.quadratic
    }

    /// Leaves referenced by the quadratic part.
    pub fn leaves(&self) -> impl Iterator<Item = LeafId> + '_ {
        self.quadratic.keys().flat_map(|&(i, j)| [i, j])
    }

    /// Atoms referenced by the linear part.
    pub fn atoms(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.linear.keys().copied()
    }

    /// Atom identity check: two atoms are the same if they share their id and scope.
    pub fn same_as(&self, other: &Expression) -> bool {
        match (self.atom, other.atom) {
            (Some(a), Some(b)) => a == b && self.scope == other.scope,
            _ => false,
        }
    }

    /// `a * self + b * other`, with exact zeros dropped.
    fn combine(&self, a: f64, other: &Expression, b: f64) -> Expression {
        let scope = merge_scopes(self.scope, other.scope);

        let mut linear = BTreeMap::new();
        for (k, c) in &self.linear {
            *linear.entry(*k).or_insert(0.0) += a * c;
        }
        for (k, c) in &other.linear {
            *linear.entry(*k).or_insert(0.0) += b * c;
        }
        linear.retain(|_, c: &mut f64| *c != 0.0);

        let mut quadratic = BTreeMap::new();
        for (k, c) in &self.quadratic {
            *quadratic.entry(*k).or_insert(0.0) += a * c;
        }
        for (k, c) in &other.quadratic {
            *quadratic.entry(*k).or_insert(0.0) += b * c;
        }
        quadratic.retain(|_, c: &mut f64| *c != 0.0);

        Expression {
            scope,
            atom: None,
            constant: a * self.constant + b * other.constant,
            linear,
            quadratic,
        }
    }

    /// `self + other`.
    pub fn add(&self, other: &Expression) -> Expression {
        self.combine(1.0, other, 1.0)
    }

    /// `self - other`.
    pub fn sub(&self, other: &Expression) -> Expression {
        self.combine(1.0, other, -1.0)
    }

    /// `scalar * self`.
    pub fn scale(&self, scalar: f64) -> Expression {
        self.combine(scalar, &Expression::default(), 0.0)
    }

    /// `-self`.
    pub fn neg(&self) -> Expression {
        self.scale(-1.0)
    }

    /// `self + value`.
    pub fn add_constant(&self, value: f64) -> Expression {
        self.combine(1.0, &Expression::constant(value), 1.0)
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// `self <= rhs`, stored as `self - rhs <= 0`.
    pub fn leq(&self, rhs: impl Into<Expression>) -> Constraint {
        Constraint::leq(self, &rhs.into())
    }

    /// `self >= rhs`, stored as `rhs - self <= 0`.
    pub fn geq(&self, rhs: impl Into<Expression>) -> Constraint {
        Constraint::geq(self, &rhs.into())
    }

    /// `self == rhs`, stored as `self - rhs == 0`.
    pub fn equals(&self, rhs: impl Into<Expression>) -> Constraint {
        Constraint::eq(self, &rhs.into())
    }

    /// Build a constraint from a textual operator (`"<="`, `">="`, `"=="` or `"="`).
    pub fn compare(&self, op: &str, rhs: impl Into<Expression>) -> Result<Constraint> {
        let rhs = rhs.into();
        match op.trim() {
            "<=" => Ok(Constraint::leq(self, &rhs)),
            ">=" => Ok(Constraint::geq(self, &rhs)),
            "==" | "=" => Ok(Constraint::eq(self, &rhs)),
            other => Err(PepError::InvalidRelation(format!(
                "unsupported operator '{}', expected one of <=, >=, ==",
                other
            ))),
        }
    }

    /// Build a constraint with an explicit relation (`self` against zero).
    pub fn relation(&self, relation: Relation) -> Constraint {
        Constraint::new(self.clone(), relation)
    }

    /// Evaluate against a Gram lookup and an atom lookup.
    pub fn evaluate(
        &self,
        gram: impl Fn(LeafId, LeafId) -> f64,
        values: impl Fn(AtomId) -> f64,
    ) -> f64 {
        let lin: f64 = self.linear.iter().map(|(a, c)| c * values(*a)).sum();
        let quad: f64 = self
            .quadratic
            .iter()
            .map(|(&(i, j), c)| c * gram(i, j))
            .sum();
        self.constant + lin + quad
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::constant(value)
    }
}

impl From<&Expression> for Expression {
    fn from(expr: &Expression) -> Self {
        expr.clone()
    }
}

// ============================================================================
// Operator sugar
// ============================================================================

macro_rules! expr_binop {
    ($trait:ident, $method:ident, $builder:ident) => {
        impl $trait for Expression {
            type Output = Expression;

            fn $method(self, rhs: Expression) -> Expression {
                Expression::$builder(&self, &rhs)
            }
        }

        impl $trait for &Expression {
            type Output = Expression;

            fn $method(self, rhs: &Expression) -> Expression {
                Expression::$builder(self, rhs)
            }
        }

        impl $trait<&Expression> for Expression {
            type Output = Expression;

            fn $method(self, rhs: &Expression) -> Expression {
                Expression::$builder(&self, rhs)
            }
        }

        impl $trait<Expression> for &Expression {
            type Output = Expression;

            fn $method(self, rhs: Expression) -> Expression {
                Expression::$builder(self, &rhs)
            }
        }

        impl $trait<f64> for Expression {
            type Output = Expression;

            fn $method(self, rhs: f64) -> Expression {
                Expression::$builder(&self, &Expression::constant(rhs))
            }
        }

        impl $trait<f64> for &Expression {
            type Output = Expression;

            fn $method(self, rhs: f64) -> Expression {
                Expression::$builder(self, &Expression::constant(rhs))
            }
        }

        impl $trait<Expression> for f64 {
            type Output = Expression;

            fn $method(self, rhs: Expression) -> Expression {
                Expression::$builder(&Expression::constant(self), &rhs)
            }
        }

        impl $trait<&Expression> for f64 {
            type Output = Expression;

            fn $method(self, rhs: &Expression) -> Expression {
                Expression::$builder(&Expression::constant(self), rhs)
            }
        }
    };
}

expr_binop!(Add, add, add);
expr_binop!(Sub, sub, sub);

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        Expression::neg(&self)
    }
}

impl Neg for &Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        Expression::neg(self)
    }
}

impl Mul<f64> for Expression {
    type Output = Expression;

    fn mul(self, rhs: f64) -> Expression {
        self.scale(rhs)
    }
}

impl Mul<f64> for &Expression {
    type Output = Expression;

    fn mul(self, rhs: f64) -> Expression {
        self.scale(rhs)
    }
}

impl Mul<Expression> for f64 {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        rhs.scale(self)
    }
}

impl Mul<&Expression> for f64 {
    type Output = Expression;

    fn mul(self, rhs: &Expression) -> Expression {
        rhs.scale(self)
    }
}

impl Div<f64> for Expression {
    type Output = Expression;

    fn div(self, rhs: f64) -> Expression {
        self.scale(1.0 / rhs)
    }
}

impl Div<f64> for &Expression {
    type Output = Expression;

    fn div(self, rhs: f64) -> Expression {
        self.scale(1.0 / rhs)
    }
}
