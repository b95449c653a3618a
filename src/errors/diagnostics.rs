//! The shared error-reporting sink.
//!
//! Checking entry points return `Result`, and whoever sits at a context
//! boundary hands the failure to [`Diagnostics::report`] so it is both
//! logged and kept for later inspection. Only the most recent
//! [`MAX_KEPT`] errors and warnings are kept, so a long session does not
//! grow without bound; hosts that want everything read them out and call
//! [`Diagnostics::clear`] between fragments.

use tracing::{error, warn};

use super::errors::Error;
use crate::Position;

/// How many errors, and separately warnings, a sink retains.
pub const MAX_KEPT: usize = 256;

fn push_bounded<T>(list: &mut Vec<T>, item: T) {
    if list.len() == MAX_KEPT {
        list.remove(0);
    }
    list.push(item);
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub position: Position,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Error>,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, err: Error) {
        error!(
            file = %err.get_position().1,
            pos = err.get_position().0,
            kind = err.get_error_name(),
            "{}",
            err
        );
        push_bounded(&mut self.errors, err);
    }

    pub fn warn(&mut self, message: impl Into<String>, position: Position) {
        let message = message.into();
        warn!(file = %position.1, pos = position.0, "{}", message);
        push_bounded(&mut self.warnings, Warning { message, position });
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.errors.last()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }
}
