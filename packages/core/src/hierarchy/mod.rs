//! Nested-Set Hierarchy
//!
//! Pure, storage independent page tree arithmetic. The store loads a
//! tenant's intervals into a [`NestedSet`] arena, applies one operation and
//! writes back the resulting [`Renumbering`]. Every operation validates the
//! whole arena before it takes effect, so a failed operation leaves the
//! arena untouched.

mod error;
mod nested_set;

pub use error::HierarchyError;
pub use nested_set::{Interval, NestedSet, Position, Renumbering};
