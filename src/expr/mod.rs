//! Symbolic vectors and scalars.
//!
//! - `Point` - a flat linear combination of leaf Points
//! - `Expression` - affine in function-value atoms and leaf inner products

pub mod expression;
pub mod point;

pub use expression::Expression;
pub use point::Point;
