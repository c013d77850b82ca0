//! Constraint types for performance estimation problems.
//!
//! Constraints map to cone constraints in the solver:
//! - Equality: expr == 0 (zero cone)
//! - Inequality: expr <= 0 (nonnegative orthant after negation)

use std::fmt;
use std::str::FromStr;

use crate::error::{PepError, Result};
use crate::expr::Expression;

/// Relation of a constraint expression against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `expression == 0`.
    Equality,
    /// `expression <= 0`.
    Inequality,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Equality => "equality",
            Relation::Inequality => "inequality",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = PepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equality" => Ok(Relation::Equality),
            "inequality" => Ok(Relation::Inequality),
            other => Err(PepError::InvalidRelation(format!(
                "'{}' is neither 'equality' nor 'inequality'",
                other
            ))),
        }
    }
}

/// A constraint in a performance estimation problem.
///
/// The counter is assigned when the constraint is registered with a problem,
/// the dual value after a successful solve.
#[derive(Debug, Clone)]
pub struct Constraint {
    expression: Expression,
    relation: Relation,
    counter: Option<usize>,
    dual_variable_value: Option<f64>,
}

impl Constraint {
    /// Wrap an expression compared against zero.
    pub fn new(expression: Expression, relation: Relation) -> Self {
        Constraint {
            expression,
            relation,
            counter: None,
            dual_variable_value: None,
        }
    }

    /// Build from a textual relation tag (`"equality"` or `"inequality"`).
    pub fn from_tag(expression: Expression, tag: &str) -> Result<Self> {
        Ok(Constraint::new(expression, tag.parse()?))
    }

    /// Create an equality constraint: lhs == rhs.
    pub fn eq(lhs: &Expression, rhs: &Expression) -> Self {
        Constraint::new(lhs - rhs, Relation::Equality)
    }

    /// Create an inequality constraint: lhs <= rhs.
    pub fn leq(lhs: &Expression, rhs: &Expression) -> Self {
        Constraint::new(lhs - rhs, Relation::Inequality)
    }

    /// Create an inequality constraint: lhs >= rhs.
    pub fn geq(lhs: &Expression, rhs: &Expression) -> Self {
        // lhs >= rhs  <=>  rhs - lhs <= 0
        Constraint::new(rhs - lhs, Relation::Inequality)
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    /// Relation tag, `"equality"` or `"inequality"`.
    pub fn equality_or_inequality(&self) -> &'static str {
        self.relation.as_str()
    }

    /// Creation index, assigned at registration.
    pub fn counter(&self) -> Option<usize> {
        self.counter
    }

    /// Dual multiplier, available after a successful solve.
    pub fn dual_variable_value(&self) -> Option<f64> {
        self.dual_variable_value
    }

    pub(crate) fn set_counter(&mut self, counter: usize) {
        self.counter = Some(counter);
    }

    pub(crate) fn set_dual(&mut self, dual: f64) {
        self.dual_variable_value = Some(dual);
    }

    /// Evaluate the constraint expression; see [`Expression::evaluate`].
    pub fn evaluate(
        &self,
        gram: impl Fn(crate::context::LeafId, crate::context::LeafId) -> f64,
        values: impl Fn(crate::context::AtomId) -> f64,
    ) -> f64 {
        self.expression.evaluate(gram, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn test_equality_constraint() {
        let ctx = Context::new();
        let f = ctx.leaf_expression();
        let constr = Constraint::eq(&f, &Expression::constant(1.0));

        assert_eq!(constr.relation(), Relation::Equality);
        assert_eq!(constr.equality_or_inequality(), "equality");
        assert_eq!(constr.expression().constant_term(), -1.0);
        assert_eq!(constr.counter(), None);
        assert_eq!(constr.dual_variable_value(), None);
    }

    #[test]
    fn test_geq_negates_difference() {
        let ctx = Context::new();
        let f = ctx.leaf_expression();
        let constr = Constraint::geq(&f, &Expression::constant(2.0));
        let a = f.atom_id().unwrap();

        assert_eq!(constr.relation(), Relation::Inequality);
        assert_eq!(constr.expression().linear()[&a], -1.0);
        assert_eq!(constr.expression().constant_term(), 2.0);
    }

    #[test]
    fn test_relation_tags() {
        assert_eq!("equality".parse::<Relation>().unwrap(), Relation::Equality);
        assert_eq!(
            "inequality".parse::<Relation>().unwrap(),
            Relation::Inequality
        );
        assert!(matches!(
            "Equality".parse::<Relation>(),
            Err(PepError::InvalidRelation(_))
        ));

        let e = Expression::constant(0.0);
        assert!(Constraint::from_tag(e.clone(), "inequality").is_ok());
        assert!(Constraint::from_tag(e, "lower").is_err());
    }

    #[test]
    fn test_back_fill() {
        let mut constr = Constraint::new(Expression::constant(-1.0), Relation::Inequality);
        constr.set_counter(3);
        constr.set_dual(0.25);
        assert_eq!(constr.counter(), Some(3));
        assert_eq!(constr.dual_variable_value(), Some(0.25));
        assert_eq!(constr.evaluate(|_, _| 0.0, |_| 0.0), -1.0);
    }
}
