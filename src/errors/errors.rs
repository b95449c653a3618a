use std::fmt::Display;

use thiserror::Error;

use crate::Position;

#[derive(Debug, Clone)]
pub struct Error {
    internal_error: ErrorImpl,
    position: Position,
}

impl Error {
    pub fn new(error_impl: ErrorImpl, position: Position) -> Self {
        Error {
            internal_error: error_impl,
            position,
        }
    }

    pub fn get_position(&self) -> &Position {
        &self.position
    }

    pub fn get_impl(&self) -> &ErrorImpl {
        &self.internal_error
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorImpl::TypeMismatch { .. } => "TypeMismatch",
            ErrorImpl::UndeclaredIdentifier { .. } => "UndeclaredIdentifier",
            ErrorImpl::ReservedWordViolation { .. } => "ReservedWordViolation",
            ErrorImpl::DuplicateDeclaration { .. } => "DuplicateDeclaration",
            ErrorImpl::IllegalForwardUse { .. } => "IllegalForwardUse",
            ErrorImpl::IncompleteType { .. } => "IncompleteType",
            ErrorImpl::ImportContractViolation { .. } => "ImportContractViolation",
            ErrorImpl::ExpectedExplicitValue { .. } => "ExpectedExplicitValue",
            ErrorImpl::DeprecatedName { .. } => "DeprecatedName",
            ErrorImpl::NoSuchOperator { .. } => "NoSuchOperator",
            ErrorImpl::NoMatchingOverload { .. } => "NoMatchingOverload",
            ErrorImpl::ConstAssignment { .. } => "ConstAssignment",
            ErrorImpl::AccessViolation { .. } => "AccessViolation",
            ErrorImpl::InvalidReturn { .. } => "InvalidReturn",
            ErrorImpl::MisplacedControl { .. } => "MisplacedControl",
            ErrorImpl::CyclicInheritance { .. } => "CyclicInheritance",
            ErrorImpl::MultiplePublicClasses { .. } => "MultiplePublicClasses",
            ErrorImpl::SporkRestriction { .. } => "SporkRestriction",
            ErrorImpl::InvalidContextState { .. } => "InvalidContextState",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match &self.internal_error {
            ErrorImpl::TypeMismatch { expected, received } => ErrorTip::Suggestion(format!(
                "Expected type `{}`, received `{}`",
                expected, received
            )),
            ErrorImpl::UndeclaredIdentifier { name } => {
                ErrorTip::Suggestion(format!("`{}` is not declared at this point", name))
            }
            ErrorImpl::ReservedWordViolation { name } => {
                ErrorTip::Suggestion(format!("`{}` is a reserved word", name))
            }
            ErrorImpl::DuplicateDeclaration { name } => {
                ErrorTip::Suggestion(format!("`{}` is already declared in this scope", name))
            }
            ErrorImpl::IllegalForwardUse { function, variable } => ErrorTip::Suggestion(format!(
                "calling `{}` here skips the initialization of `{}`; move the call after its declaration",
                function, variable
            )),
            ErrorImpl::IncompleteType { type_ } => ErrorTip::Suggestion(format!(
                "`{}` is not fully defined yet; declare a reference with `@` instead",
                type_
            )),
            ErrorImpl::ImportContractViolation { .. } => ErrorTip::None,
            ErrorImpl::ExpectedExplicitValue { name } => ErrorTip::Suggestion(format!(
                "`auto {}` must be initialized where it is declared",
                name
            )),
            ErrorImpl::DeprecatedName { former, latter } => {
                ErrorTip::Suggestion(format!("use `{}` instead of `{}`", latter, former))
            }
            ErrorImpl::NoSuchOperator { .. } => ErrorTip::None,
            ErrorImpl::NoMatchingOverload { name, arguments } => ErrorTip::Suggestion(format!(
                "no overload of `{}` accepts `({})`",
                name, arguments
            )),
            ErrorImpl::ConstAssignment { name } => {
                ErrorTip::Suggestion(format!("`{}` is constant and cannot be assigned", name))
            }
            ErrorImpl::AccessViolation { name, access } => {
                ErrorTip::Suggestion(format!("`{}` is {} here", name, access))
            }
            ErrorImpl::InvalidReturn { .. } => ErrorTip::None,
            ErrorImpl::MisplacedControl { .. } => ErrorTip::None,
            ErrorImpl::CyclicInheritance { class } => {
                ErrorTip::Suggestion(format!("`{}` eventually extends itself", class))
            }
            ErrorImpl::MultiplePublicClasses { .. } => ErrorTip::Suggestion(String::from(
                "only one public class may be declared per file",
            )),
            ErrorImpl::SporkRestriction { .. } => ErrorTip::None,
            ErrorImpl::InvalidContextState { .. } => ErrorTip::None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {}",
            self.position.1, self.position.0, self.internal_error
        )
    }
}

impl std::error::Error for Error {}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorImpl {
    #[error("types do not match: expected {expected:?}, received {received:?}")]
    TypeMismatch { expected: String, received: String },
    #[error("undefined identifier {name:?}")]
    UndeclaredIdentifier { name: String },
    #[error("cannot use reserved word {name:?} as an identifier")]
    ReservedWordViolation { name: String },
    #[error("{name:?} has already been declared")]
    DuplicateDeclaration { name: String },
    #[error("calling {function:?} at this point skips initialization of needed variable {variable:?}")]
    IllegalForwardUse { function: String, variable: String },
    #[error("type {type_:?} is incomplete at this point")]
    IncompleteType { type_: String },
    #[error("import error: {message}")]
    ImportContractViolation { message: String },
    #[error("'auto' declaration of {name:?} requires an initializer")]
    ExpectedExplicitValue { name: String },
    #[error("{former:?} is deprecated, use {latter:?}")]
    DeprecatedName { former: String, latter: String },
    #[error("no suitable resolution for operator {op:?} on types {lhs:?} and {rhs:?}")]
    NoSuchOperator { op: String, lhs: String, rhs: String },
    #[error("argument type(s) ({arguments}) do not match any overload of {name:?}")]
    NoMatchingOverload { name: String, arguments: String },
    #[error("cannot assign to constant {name:?}")]
    ConstAssignment { name: String },
    #[error("cannot access {access} member {name:?}")]
    AccessViolation { name: String, access: String },
    #[error("invalid return: {message}")]
    InvalidReturn { message: String },
    #[error("{keyword:?} is not valid here")]
    MisplacedControl { keyword: String },
    #[error("class {class:?} has a cyclic inheritance chain")]
    CyclicInheritance { class: String },
    #[error("more than one public class defined ({first:?} and {second:?})")]
    MultiplePublicClasses { first: String, second: String },
    #[error("invalid spork: {message}")]
    SporkRestriction { message: String },
    #[error("context {filename:?} is in the wrong state: {message}")]
    InvalidContextState { filename: String, message: String },
}
