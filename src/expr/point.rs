//! Symbolic vectors.
//!
//! A `Point` is always stored as a flat linear combination of leaf Points.
//! Leaves are the basis vectors of the Gram matrix (initial points, gradients,
//! subgradients); every other Point is a combination over them.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use super::expression::Expression;
use crate::context::{merge_scopes, LeafId, ScopeId};

/// A symbolic vector.
///
/// Cloning a `Point` yields the same object: clones share their
/// decomposition, which is what oracle caching compares against.
#[derive(Debug, Clone)]
pub struct Point {
    scope: Option<ScopeId>,
    leaf: Option<LeafId>,
    terms: Rc<BTreeMap<LeafId, f64>>,
}

impl Point {
    pub(crate) fn leaf(scope: ScopeId, id: LeafId) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(id, 1.0);
        Point {
            scope: Some(scope),
            leaf: Some(id),
            terms: Rc::new(terms),
        }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Point {
            scope: None,
            leaf: None,
            terms: Rc::new(BTreeMap::new()),
        }
    }

    /// Build `sum_k c_k * p_k`, flattening every operand onto its leaves.
    ///
    /// # Panics
    ///
    /// Panics if the operands come from different problems.
    pub fn combination<'a>(coeffs: impl IntoIterator<Item = (&'a Point, f64)>) -> Point {
        let mut scope = None;
        let mut terms: BTreeMap<LeafId, f64> = BTreeMap::new();

        for (point, weight) in coeffs {
            scope = merge_scopes(scope, point.scope);
            for (leaf, coeff) in point.terms.iter() {
                *terms.entry(*leaf).or_insert(0.0) += weight * coeff;
            }
        }
        terms.retain(|_, c| *c != 0.0);

        Point {
            scope,
            leaf: None,
            terms: Rc::new(terms),
        }
    }

    /// `self + other`.
    pub fn add(&self, other: &Point) -> Point {
        Point::combination([(self, 1.0), (other, 1.0)])
    }

    /// `self - other`.
    pub fn sub(&self, other: &Point) -> Point {
        Point::combination([(self, 1.0), (other, -1.0)])
    }

    /// `scalar * self`.
    pub fn scale(&self, scalar: f64) -> Point {
        Point::combination([(self, scalar)])
    }

    /// `-self`.
    pub fn neg(&self) -> Point {
        self.scale(-1.0)
    }

    /// Inner product `<self, other>`, distributed bilinearly over the leaves.
    ///
    /// # Panics
    ///
    /// Panics if the operands come from different problems.
    pub fn inner(&self, other: &Point) -> Expression {
        let scope = merge_scopes(self.scope, other.scope);
        let mut quadratic: BTreeMap<(LeafId, LeafId), f64> = BTreeMap::new();

        for (i, a) in self.terms.iter() {
            for (j, b) in other.terms.iter() {
                let key = if i <= j { (*i, *j) } else { (*j, *i) };
                *quadratic.entry(key).or_insert(0.0) += a * b;
            }
        }
        quadratic.retain(|_, c| *c != 0.0);

        Expression::from_quadratic(scope, quadratic)
    }

    /// Squared norm `<self, self>`.
    pub fn square(&self) -> Expression {
        self.inner(self)
    }

    /// Whether this Point is a basis vector.
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    /// Leaf identity, if this Point is a leaf.
    pub fn leaf_id(&self) -> Option<LeafId> {
        self.leaf
    }

    /// Creation index of a leaf; `None` for composites.
    pub fn counter(&self) -> Option<usize> {
        self.leaf.map(|id| id.raw())
    }

    /// Scope of the problem this Point belongs to (`None` for the zero Point).
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// Flat decomposition over leaves.
    pub fn decomposition(&self) -> &BTreeMap<LeafId, f64> {
        &self.terms
    }

    /// Leaves this Point depends on, in creation order.
    pub fn leaves(&self) -> impl Iterator<Item = LeafId> + '_ {
        self.terms.keys().copied()
    }

    /// Whether this Point has no leaf component.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Object identity: same leaf, or same composite handle.
    pub fn same_as(&self, other: &Point) -> bool {
        match (self.leaf, other.leaf) {
            (Some(a), Some(b)) => a == b && self.scope == other.scope,
            (None, None) => Rc::ptr_eq(&self.terms, &other.terms),
            _ => false,
        }
    }
}

// ============================================================================
// Operator sugar over the named builders
// ============================================================================

macro_rules! point_binop {
    ($trait:ident, $method:ident, $builder:ident) => {
        impl $trait for Point {
            type Output = Point;

            fn $method(self, rhs: Point) -> Point {
                Point::$builder(&self, &rhs)
            }
        }

        impl $trait for &Point {
            type Output = Point;

            fn $method(self, rhs: &Point) -> Point {
                Point::$builder(self, rhs)
            }
        }

        impl $trait<&Point> for Point {
            type Output = Point;

            fn $method(self, rhs: &Point) -> Point {
                Point::$builder(&self, rhs)
            }
        }

        impl $trait<Point> for &Point {
            type Output = Point;

            fn $method(self, rhs: Point) -> Point {
                Point::$builder(self, &rhs)
            }
        }
    };
}

point_binop!(Add, add, add);
point_binop!(Sub, sub, sub);

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::neg(&self)
    }
}

impl Neg for &Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::neg(self)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        self.scale(rhs)
    }
}

impl Mul<f64> for &Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        self.scale(rhs)
    }
}

impl Mul<Point> for f64 {
    type Output = Point;

    fn mul(self, rhs: Point) -> Point {
        rhs.scale(self)
    }
}

impl Mul<&Point> for f64 {
    type Output = Point;

    fn mul(self, rhs: &Point) -> Point {
        rhs.scale(self)
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        self.scale(1.0 / rhs)
    }
}

impl Div<f64> for &Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        self.scale(1.0 / rhs)
    }
}

// Point * Point is the inner product.
impl Mul for &Point {
    type Output = Expression;

    fn mul(self, rhs: &Point) -> Expression {
        self.inner(rhs)
    }
}

impl Mul for Point {
    type Output = Expression;

    fn mul(self, rhs: Point) -> Expression {
        self.inner(&rhs)
    }
}

impl Mul<&Point> for Point {
    type Output = Expression;

    fn mul(self, rhs: &Point) -> Expression {
        self.inner(rhs)
    }
}

impl Mul<Point> for &Point {
    type Output = Expression;

    fn mul(self, rhs: Point) -> Expression {
        self.inner(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn test_leaves_are_distinct() {
        let ctx = Context::new();
        let a = ctx.leaf_point();
        let b = ctx.leaf_point();
        assert!(a.is_leaf());
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
        assert_eq!(b.counter(), Some(1));
    }

    #[test]
    fn test_combination_flattens() {
        let ctx = Context::new();
        let a = ctx.leaf_point();
        let b = ctx.leaf_point();
        let c = &a + &(2.0 * &b);
        let d = &c - &a; // 2b
        let e = Point::combination([(&c, 3.0), (&d, -1.0)]); // 3a + 4b

        assert!(!e.is_leaf());
        assert_eq!(e.counter(), None);
        let dec = e.decomposition();
        assert_eq!(dec.len(), 2);
        assert_eq!(dec[&a.leaf_id().unwrap()], 3.0);
        assert_eq!(dec[&b.leaf_id().unwrap()], 4.0);
    }

    #[test]
    fn test_cancellation_drops_leaves() {
        let ctx = Context::new();
        let a = ctx.leaf_point();
        let z = &a - &a;
        assert!(z.is_zero());
        assert_eq!(z.scope(), Some(ctx.scope()));
    }

    #[test]
    fn test_inner_product_is_bilinear() {
        let ctx = Context::new();
        let e1 = ctx.leaf_point();
        let e2 = ctx.leaf_point();
        let a = &e1 + &(2.0 * &e2);
        let b = &(3.0 * &e1) - &e2;
        let ip = &a * &b;
        // (e1 + 2 e2).(3 e1 - e2) = 3 e1.e1 + (-1 + 6) e1.e2 - 2 e2.e2
        let (i, j) = (e1.leaf_id().unwrap(), e2.leaf_id().unwrap());
        assert_eq!(ip.quadratic()[&(i, i)], 3.0);
        assert_eq!(ip.quadratic()[&(i, j)], 5.0);
        assert_eq!(ip.quadratic()[&(j, j)], -2.0);
        assert!(ip.linear().is_empty());
    }

    #[test]
    fn test_square_symmetrizes() {
        let ctx = Context::new();
        let e1 = ctx.leaf_point();
        let e2 = ctx.leaf_point();
        let d = &e2 - &e1;
        let sq = d.square();
        let (i, j) = (e1.leaf_id().unwrap(), e2.leaf_id().unwrap());
        assert_eq!(sq.quadratic().len(), 3);
        assert_eq!(sq.quadratic()[&(i, j)], -2.0);
        assert!(!sq.quadratic().contains_key(&(j, i)));
    }

    #[test]
    fn test_zero_point_adopts_scope() {
        let ctx = Context::new();
        let a = ctx.leaf_point();
        let s = &Point::zero() + &a;
        assert_eq!(s.scope(), Some(ctx.scope()));
    }

    #[test]
    #[should_panic(expected = "different problems")]
    fn test_mixing_problems_panics() {
        let a = Context::new().leaf_point();
        let b = Context::new().leaf_point();
        let _ = &a + &b;
    }
}
