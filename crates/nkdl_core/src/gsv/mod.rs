//! Graph scope variables (GSVs).
//!
//! A GSV request names variables and the values to render them with. The
//! resolver turns a request into an ordered list of [`GsvCombination`]s;
//! each combination becomes one independent submission pass.
//!
//! Two request shapes are supported:
//!
//! - **Flat**: `["shot:A,B", "res:lo,hi"]` is one cross product, first key
//!   outermost: `(A,lo) (A,hi) (B,lo) (B,hi)`.
//! - **Nested**: `[["shot:A"], ["shot:B", "res:hi"]]` expands each inner list
//!   on its own, so this yields exactly two combinations.
//!
//! A key given without values (`"shot:"` or `"shot"`) expands to every value
//! the project enumerates for it.

mod combination;
mod resolver;

pub use combination::GsvCombination;
pub use resolver::{GsvError, GsvRequest, GsvResult, ScopedVariableResolver};
