use std::path::PathBuf;
use std::time::Duration;

use crate::action::{Arguments, ParamType, RiskLevel};

/// Argument does not satisfy the action's parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required parameter '{parameter}'")]
    MissingParameter { parameter: String },

    #[error("parameter '{parameter}' expects {expected}, got {actual}")]
    WrongType {
        parameter: String,
        expected: ParamType,
        actual: ParamType,
    },

    #[error("parameter '{parameter}' must be one of {allowed:?}, got '{value}'")]
    NotInEnum {
        parameter: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("malformed arguments: {message}")]
    MalformedArguments { message: String },
}

/// Why the shield refused an invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("blocked due to {level} risk level")]
    RiskLevel { level: RiskLevel },

    #[error("protected path detected in '{argument}': {} is under {}", .path.display(), .prefix.display())]
    ProtectedPath {
        argument: String,
        path: PathBuf,
        prefix: PathBuf,
    },

    #[error("forbidden command pattern '{pattern}' in '{argument}'")]
    ForbiddenCommand { argument: String, pattern: String },

    #[error("{level} action requires confirmation but no confirmation handler is configured")]
    NoConfirmationHandler { level: RiskLevel },

    #[error("confirmation declined")]
    ConfirmationDeclined,
}

/// Template could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("no value for placeholder '{placeholder}'")]
    MissingValue { placeholder: String },

    #[error("unknown filter '{filter}'")]
    UnknownFilter { filter: String },

    #[error("malformed template at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },
}

/// Exit code and stderr of a failed script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFailure {
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub script: String,
}

impl ProcessFailure {
    fn code_label(&self) -> String {
        self.exit_code
            .map_or_else(|| "signal".to_owned(), |c| c.to_string())
    }
}

/// Subprocess could not be started or did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start interpreter '{program}': {source}")]
    Spawn {
        program: String,
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration, script: String },

    #[error("script exited with {}: {}", .0.code_label(), .0.stderr)]
    NonZeroExit(ProcessFailure),

    #[error("interpreter reported a permission error ({}): {}", .0.code_label(), .0.stderr)]
    PermissionDenied(ProcessFailure),

    #[error("interpreter reported a syntax error ({}): {}", .0.code_label(), .0.stderr)]
    Syntax(ProcessFailure),

    #[error("interpreter reported a timeout ({}): {}", .0.code_label(), .0.stderr)]
    InterpreterTimeout(ProcessFailure),

    #[error("failed to start blocking runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ExecutionError {
    /// Classify a non-zero exit by sniffing the interpreter's stderr.
    #[must_use]
    pub fn classify(exit_code: Option<i32>, stderr: &str, script: &str) -> Self {
        let failure = ProcessFailure {
            exit_code,
            stderr: stderr.trim().to_owned(),
            script: script.to_owned(),
        };
        let lower = stderr.to_lowercase();
        if lower.contains("syntax error") {
            Self::Syntax(failure)
        } else if ["permission", "not allowed", "not authorized"]
            .iter()
            .any(|p| lower.contains(p))
        {
            Self::PermissionDenied(failure)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::InterpreterTimeout(failure)
        } else {
            Self::NonZeroExit(failure)
        }
    }

    /// Rendered script that was running, when known.
    #[must_use]
    pub fn script(&self) -> Option<&str> {
        match self {
            Self::Timeout { script, .. } | Self::Spawn { script, .. } => Some(script),
            Self::NonZeroExit(f)
            | Self::PermissionDenied(f)
            | Self::Syntax(f)
            | Self::InterpreterTimeout(f) => Some(&f.script),
            Self::Runtime(_) => None,
        }
    }

    /// Raw stderr reported by the interpreter, when the process exited.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit(f)
            | Self::PermissionDenied(f)
            | Self::Syntax(f)
            | Self::InterpreterTimeout(f) => Some(&f.stderr),
            _ => None,
        }
    }
}

/// Script output did not have the shape the parser expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{parser} parser failed: {message} (raw output: {raw:?})")]
pub struct ParseError {
    pub parser: String,
    pub message: String,
    pub raw: String,
}

impl ParseError {
    #[must_use]
    pub fn new(parser: &str, message: impl Into<String>, raw: &str) -> Self {
        Self {
            parser: parser.to_owned(),
            message: message.into(),
            raw: raw.to_owned(),
        }
    }
}

/// Fieldless discriminant of [`OrbitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Catalog,
    Validation,
    Policy,
    Template,
    Execution,
    Parse,
}

/// Every failure the dispatch pipeline can surface.
#[derive(Debug, thiserror::Error)]
pub enum OrbitError {
    #[error("action '{name}' is already registered")]
    DuplicateAction { name: String },

    #[error("action '{name}' not found")]
    ActionNotFound { name: String },

    #[error("invalid action '{name}': {message}")]
    InvalidDescriptor { name: String, message: String },

    #[error("invalid arguments for '{action}': {source}")]
    Validation {
        action: String,
        args: Arguments,
        #[source]
        source: ValidationError,
    },

    #[error("action '{action}' denied by policy: {reason}")]
    Policy {
        action: String,
        args: Arguments,
        reason: DenyReason,
    },

    #[error("template rendering failed for '{action}': {source}")]
    Template {
        action: String,
        args: Arguments,
        #[source]
        source: TemplateError,
    },

    #[error("execution of '{action}' failed after {attempts} attempt(s): {source}")]
    Execution {
        action: String,
        args: Arguments,
        attempts: u32,
        #[source]
        source: ExecutionError,
    },

    #[error("output of '{action}' could not be parsed: {source}")]
    Parse {
        action: String,
        args: Arguments,
        #[source]
        source: ParseError,
    },
}

impl OrbitError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateAction { .. }
            | Self::ActionNotFound { .. }
            | Self::InvalidDescriptor { .. } => ErrorKind::Catalog,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Policy { .. } => ErrorKind::Policy,
            Self::Template { .. } => ErrorKind::Template,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Only execution failures may change on a second attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }

    /// Name of the action the error concerns.
    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::DuplicateAction { name }
            | Self::ActionNotFound { name }
            | Self::InvalidDescriptor { name, .. } => name,
            Self::Validation { action, .. }
            | Self::Policy { action, .. }
            | Self::Template { action, .. }
            | Self::Execution { action, .. }
            | Self::Parse { action, .. } => action,
        }
    }

    /// Arguments the failing invocation was called with.
    #[must_use]
    pub fn arguments(&self) -> Option<&Arguments> {
        match self {
            Self::Validation { args, .. }
            | Self::Policy { args, .. }
            | Self::Template { args, .. }
            | Self::Execution { args, .. }
            | Self::Parse { args, .. } => Some(args),
            _ => None,
        }
    }

    #[must_use]
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Policy { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrbitError>;
