//! Unit tests for error handling.
//!
//! This module contains tests for error types, tips and the diagnostics sink.

use crate::errors::diagnostics::{Diagnostics, MAX_KEPT};
use crate::errors::errors::{Error, ErrorImpl, ErrorTip};
use crate::Position;
use std::rc::Rc;

#[test]
fn test_error_creation() {
    let error = Error::new(
        ErrorImpl::UndeclaredIdentifier {
            name: "foo".to_string(),
        },
        Position(10, Rc::new("test.ck".to_string())),
    );

    assert_eq!(error.get_error_name(), "UndeclaredIdentifier");
}

#[test]
fn test_error_position() {
    let pos = Position(42, Rc::new("test.ck".to_string()));
    let error = Error::new(
        ErrorImpl::DuplicateDeclaration {
            name: "x".to_string(),
        },
        pos.clone(),
    );

    assert_eq!(error.get_position().0, 42);
    assert_eq!(error.get_position(), &pos);
}

#[test]
fn test_type_mismatch_error() {
    let error = Error::new(
        ErrorImpl::TypeMismatch {
            expected: "int".to_string(),
            received: "string".to_string(),
        },
        Position(0, Rc::new("test.ck".to_string())),
    );

    assert_eq!(error.get_error_name(), "TypeMismatch");
    assert_eq!(
        error.get_tip().to_string(),
        "Expected type `int`, received `string`"
    );
}

#[test]
fn test_illegal_forward_use_error() {
    let error = Error::new(
        ErrorImpl::IllegalForwardUse {
            function: "f".to_string(),
            variable: "x".to_string(),
        },
        Position(0, Rc::new("test.ck".to_string())),
    );

    assert_eq!(error.get_error_name(), "IllegalForwardUse");
    assert!(error.to_string().contains("skips initialization"));
}

#[test]
fn test_reserved_word_error() {
    let error = Error::new(
        ErrorImpl::ReservedWordViolation {
            name: "now".to_string(),
        },
        Position(0, Rc::new("test.ck".to_string())),
    );

    assert_eq!(error.get_error_name(), "ReservedWordViolation");
}

#[test]
fn test_incomplete_type_error() {
    let error = Error::new(
        ErrorImpl::IncompleteType {
            type_: "Foo".to_string(),
        },
        Position(0, Rc::new("test.ck".to_string())),
    );

    assert_eq!(error.get_error_name(), "IncompleteType");
}

#[test]
fn test_error_tip_none() {
    let error = Error::new(
        ErrorImpl::ImportContractViolation {
            message: "no class in progress".to_string(),
        },
        Position(0, Rc::new("test.ck".to_string())),
    );

    assert!(matches!(error.get_tip(), ErrorTip::None));
}

#[test]
fn test_error_tip_display() {
    let tip = ErrorTip::Suggestion("Try this instead".to_string());
    assert_eq!(tip.to_string(), "Try this instead");

    let tip = ErrorTip::None;
    assert_eq!(tip.to_string(), "");
}

#[test]
fn test_error_display_includes_file_and_offset() {
    let error = Error::new(
        ErrorImpl::MisplacedControl {
            keyword: "break".to_string(),
        },
        Position(7, Rc::new("loop.ck".to_string())),
    );

    assert_eq!(error.to_string(), "[loop.ck:7] \"break\" is not valid here");
}

#[test]
fn test_diagnostics_collects_errors_and_warnings() {
    let mut diagnostics = Diagnostics::new();
    assert!(!diagnostics.has_errors());

    diagnostics.report(Error::new(
        ErrorImpl::UndeclaredIdentifier {
            name: "y".to_string(),
        },
        Position(3, Rc::new("a.ck".to_string())),
    ));
    diagnostics.warn("`Foo` is deprecated", Position(4, Rc::new("a.ck".to_string())));

    assert!(diagnostics.has_errors());
    assert_eq!(diagnostics.errors().len(), 1);
    assert_eq!(diagnostics.warnings().len(), 1);
    assert_eq!(
        diagnostics.last_error().map(|e| e.get_error_name()),
        Some("UndeclaredIdentifier")
    );

    diagnostics.clear();
    assert!(!diagnostics.has_errors());
    assert!(diagnostics.warnings().is_empty());
}

#[test]
fn test_diagnostics_keep_only_recent_entries() {
    let mut diagnostics = Diagnostics::new();
    let file = Rc::new("long.ck".to_string());

    for offset in 0..(MAX_KEPT as u32 + 10) {
        diagnostics.report(Error::new(
            ErrorImpl::UndeclaredIdentifier {
                name: format!("v{}", offset),
            },
            Position(offset, file.clone()),
        ));
        diagnostics.warn("old name", Position(offset, file.clone()));
    }

    assert_eq!(diagnostics.errors().len(), MAX_KEPT);
    assert_eq!(diagnostics.warnings().len(), MAX_KEPT);
    assert_eq!(diagnostics.errors()[0].get_position().0, 10);
    assert_eq!(
        diagnostics.last_error().map(|e| e.get_position().0),
        Some(MAX_KEPT as u32 + 9)
    );
}
