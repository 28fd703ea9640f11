use std::fmt::{self, Display};

use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::Ast;

/// Result type alias for operations that can produce a runtime error.
pub type RtResult<T> = Result<T, RtError>;

/// Runtime error kinds raised by the interpreter.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `TypeError` -> "TypeError").
///
/// Every kind is recoverable: the interpreter logs the error through the
/// [`DiagSink`] and continues with a well-defined fallback value. Runtime
/// errors never stop a walker; only `skip` or a host request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum RtErrorKind {
    /// A name could not be resolved in any scope, context, or action table.
    UndefinedName,
    /// An operand or argument had a type outside the operation's domain.
    TypeError,
    /// A list index was out of range.
    IndexError,
    /// An assignment targeted a Place with no binding.
    NotAssignable,
    /// A call supplied the wrong number of arguments.
    ArityError,
    /// Copy-assign between entities of different architype names.
    ArchetypeMismatch,
    /// The operation is not defined for the given situation (e.g. spawn on a
    /// non-node location, division by zero).
    UnsupportedOperation,
    /// A loop ran for more iterations than the machine's loop limit allows.
    LoopLimitExceeded,
    /// A report value could not be deep-serialized to JSON.
    NotSerializable,
    /// An ability or builtin action was referenced but not found.
    MissingAbility,
    /// A construct appeared in a position where it is not allowed (reserved
    /// names, filter/spawn contexts in the wrong slot).
    ForbiddenContext,
}

/// A runtime error: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtError {
    pub kind: RtErrorKind,
    pub msg: String,
}

impl RtError {
    pub fn new(kind: RtErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, msg: msg.into() }
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::new(RtErrorKind::TypeError, msg)
    }

    pub fn undefined(name: &str) -> Self {
        Self::new(RtErrorKind::UndefinedName, format!("name '{name}' is not defined"))
    }

    pub fn not_serializable(msg: impl Into<String>) -> Self {
        Self::new(RtErrorKind::NotSerializable, msg)
    }
}

impl Display for RtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

/// Destination for runtime diagnostics.
///
/// The interpreter reports every recoverable error and warning here and then
/// continues with a fallback value. Hosts choose where diagnostics go by
/// picking an implementation: [`CollectDiags`] gathers them for inspection
/// (the common choice in tests), [`StderrDiags`] writes them out directly.
pub trait DiagSink {
    fn error(&mut self, err: &RtError, at: &Ast);
    fn warn(&mut self, msg: &str, at: &Ast);
}

/// Collects diagnostics into vectors for later inspection.
#[derive(Debug, Default)]
pub struct CollectDiags {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CollectDiags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl DiagSink for CollectDiags {
    fn error(&mut self, err: &RtError, at: &Ast) {
        self.errors.push(format!("{err} (in {})", at.kind));
    }

    fn warn(&mut self, msg: &str, at: &Ast) {
        self.warnings.push(format!("{msg} (in {})", at.kind));
    }
}

/// Writes diagnostics straight to stderr.
#[derive(Debug, Default)]
pub struct StderrDiags;

impl DiagSink for StderrDiags {
    fn error(&mut self, err: &RtError, at: &Ast) {
        eprintln!("rove: {err} (in {})", at.kind);
    }

    fn warn(&mut self, msg: &str, at: &Ast) {
        eprintln!("rove: warning: {msg} (in {})", at.kind);
    }
}
