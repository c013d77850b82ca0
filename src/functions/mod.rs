//! Functions, oracle histories and interpolation conditions.

mod classes;
mod function;

pub use classes::{FunctionClass, InterpolationRule, OracleCall};
pub use function::{Function, FunctionKind};
