//! Error types and error handling for the type engine.
//!
//! This module defines the error types reported while checking a
//! fragment or importing a native extension. It includes:
//!
//! - Error structures with source position information
//! - Specific error variants for each class of semantic failure
//! - Error tips for user-facing suggestions
//! - The diagnostics sink shared by an environment

pub mod diagnostics;
pub mod errors;

#[cfg(test)]
mod tests;
