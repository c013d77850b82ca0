//! Per-problem identity counters.
//!
//! Every leaf Point, function-value atom, Function and Constraint gets a
//! creation index from the `Context` of the problem it belongs to. Contexts
//! also carry a process-unique scope so that objects from two problems can
//! never be mixed silently.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::expr::{Expression, Point};

/// Process-unique identifier of a problem scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope.
    fn new() -> Self {
        static NEXT_SCOPE: AtomicU64 = AtomicU64::new(0);
        ScopeId(NEXT_SCOPE.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Creation index of a leaf Point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(pub(crate) usize);

impl LeafId {
    /// Get the raw creation index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Creation index of a function-value atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub(crate) usize);

impl AtomId {
    /// Get the raw creation index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Snapshot of the next creation index of each entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub points: usize,
    pub expressions: usize,
    pub functions: usize,
    pub constraints: usize,
}

#[derive(Debug)]
struct ContextInner {
    scope: Cell<ScopeId>,
    points: Cell<usize>,
    expressions: Cell<usize>,
    functions: Cell<usize>,
    constraints: Cell<usize>,
}

/// Shared handle on the counters of one problem.
///
/// Cloning the handle shares the counters. A fresh `Pep` owns a fresh context,
/// so two independently built problems get identical indices.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// Create a context with all counters at zero.
    pub fn new() -> Self {
        Context {
            inner: Rc::new(ContextInner {
                scope: Cell::new(ScopeId::new()),
                points: Cell::new(0),
                expressions: Cell::new(0),
                functions: Cell::new(0),
                constraints: Cell::new(0),
            }),
        }
    }

    /// Current scope of this context.
    pub fn scope(&self) -> ScopeId {
        self.inner.scope.get()
    }

    /// Allocate a new leaf Point (a fresh basis vector).
    pub fn leaf_point(&self) -> Point {
        let id = LeafId(bump(&self.inner.points));
        Point::leaf(self.scope(), id)
    }

    /// Allocate a new function-value atom.
    pub fn leaf_expression(&self) -> Expression {
        let id = AtomId(bump(&self.inner.expressions));
        Expression::atom(self.scope(), id)
    }

    pub(crate) fn next_function(&self) -> usize {
        bump(&self.inner.functions)
    }

    pub(crate) fn next_constraint(&self) -> usize {
        bump(&self.inner.constraints)
    }

    /// Next creation index of each entity kind.
    pub fn counters(&self) -> Counters {
        Counters {
            points: self.inner.points.get(),
            expressions: self.inner.expressions.get(),
            functions: self.inner.functions.get(),
            constraints: self.inner.constraints.get(),
        }
    }

    /// Zero every counter and move to a new scope.
    ///
    /// Objects created before the reset belong to the old scope afterwards and
    /// can no longer be combined with new ones.
    pub fn reset(&self) {
        self.inner.scope.set(ScopeId::new());
        self.inner.points.set(0);
        self.inner.expressions.set(0);
        self.inner.functions.set(0);
        self.inner.constraints.set(0);
    }

    /// Check whether two handles share the same counters.
    pub fn same_as(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &Cell<usize>) -> usize {
    let id = counter.get();
    counter.set(id + 1);
    id
}

/// Merge the scopes of two operands.
///
/// Scope-free operands (constants, the zero Point) adopt the other scope.
///
/// # Panics
///
/// Panics if both operands carry different scopes: combining objects from two
/// problems is a usage error.
pub(crate) fn merge_scopes(a: Option<ScopeId>, b: Option<ScopeId>) -> Option<ScopeId> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => panic!(
            "cannot combine objects from different problems (scope {} vs {})",
            x.raw(),
            y.raw()
        ),
        (Some(x), _) => Some(x),
        (None, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let ctx = Context::new();
        assert_eq!(ctx.counters(), Counters::default());
        let x = ctx.leaf_point();
        let f = ctx.leaf_expression();
        assert_eq!(x.counter(), Some(0));
        assert_eq!(f.counter(), Some(0));
        assert_eq!(ctx.counters().points, 1);
        assert_eq!(ctx.counters().expressions, 1);
    }

    #[test]
    fn test_reset_changes_scope() {
        let ctx = Context::new();
        let before = ctx.scope();
        let _ = ctx.leaf_point();
        ctx.reset();
        assert_ne!(ctx.scope(), before);
        assert_eq!(ctx.counters(), Counters::default());
        assert_eq!(ctx.leaf_point().counter(), Some(0));
    }

    #[test]
    fn test_independent_contexts() {
        let a = Context::new();
        let b = Context::new();
        assert_ne!(a.scope(), b.scope());
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    #[should_panic(expected = "different problems")]
    fn test_merge_foreign_scopes_panics() {
        let a = Context::new();
        let b = Context::new();
        merge_scopes(Some(a.scope()), Some(b.scope()));
    }
}
