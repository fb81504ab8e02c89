//! The type unifier (§4.6): frontends emit [`Invariant`]s over [`ExprId`]s as they build a
//! function graph, and [`solver::Solver`] reduces them to a total `ExprId -> Type` mapping
//! before the graph is scheduled.

mod invariant;
mod solver;
mod types;

pub use invariant::{ExprId, Generator, Invariant};
pub use solver::{PartialSolution, Solver, UnifyError};
pub use types::{value_literal_type, Type};
