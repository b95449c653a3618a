//! Semantic analysis for on-the-fly compiled fragments.
//!
//! The [`env::Environment`] owns every type, value, function and namespace
//! record in arenas, addressed by generational handles. Fragments are
//! checked inside a [`context::Context`] whose additions are committed
//! when the fragment checks cleanly and rolled back otherwise.
//!
//! - `scope`: frame-stacked symbol tables with pending commits
//! - `types`, `symbols`, `namespace`: the records themselves
//! - `algebra`: equality, subtyping and array types
//! - `depends`: forward-use detection across functions and classes
//! - `import`: the builder native extensions use to add classes
//! - `type_checker`: the two-pass checker over the tree

pub mod algebra;
pub mod annotations;
pub mod apropos;
pub mod arena;
pub mod builtins;
pub mod context;
pub mod depends;
pub mod env;
pub mod import;
pub mod namespace;
pub mod reserved;
pub mod scope;
pub mod symbols;
pub mod type_checker;
pub mod types;

#[cfg(test)]
mod tests;
