//! Utility macros for the type engine.
//!
//! This module defines helper macros used throughout the crate:
//!
//! - `MK_HANDLE!` - Declares a checked arena handle type
//! - `MK_ERROR!` - Builds an `Err(Error)` from an error variant and a position
//!
//! These macros reduce boilerplate in the symbol tables and the checker.

/// Declares a generational handle type for an [`Arena`](crate::type_checker::arena::Arena).
///
/// The generated type is `Copy`, hashable, and implements
/// [`Handle`](crate::type_checker::arena::Handle) so the arena can mint and
/// validate it.
///
/// # Example
///
/// ```ignore
/// MK_HANDLE!(
///     /// Handle to a type record.
///     TypeId
/// );
/// ```
#[macro_export]
macro_rules! MK_HANDLE {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $crate::type_checker::arena::Handle for $name {
            fn from_parts(index: u32, generation: u32) -> Self {
                $name { index, generation }
            }
            fn index(self) -> u32 {
                self.index
            }
            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

/// Creates an `Err(Error)` at the given position.
///
/// # Arguments
///
/// * `$kind` - The ErrorImpl variant
/// * `$position` - Anything convertible to a `Position` via `clone()`
///
/// # Example
///
/// ```ignore
/// return MK_ERROR!(ErrorImpl::UndeclaredIdentifier { name }, span.start);
/// ```
#[macro_export]
macro_rules! MK_ERROR {
    ($kind:expr, $position:expr) => {
        Err($crate::errors::errors::Error::new($kind, $position.clone()))
    };
}
