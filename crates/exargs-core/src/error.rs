//! Error types for exargs
//!
//! Structured errors with context, path information, and actionable
//! help messages.

use std::fmt;

/// Result type alias for exargs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for exargs operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Flat key in the config where the error occurred (e.g., "database.port")
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source document could not be loaded or parsed
    Load,
    /// One or more dependency cycles were found between variables
    Cycle { chains: Vec<String> },
    /// An identifier could not be resolved from any lookup source,
    /// or substitution made no progress
    UnresolvedVariable { name: String },
    /// An expression block failed to parse or evaluate
    Expression { expr: String },
    /// An argument to a public API call was invalid
    InvalidArgument,
}

impl Error {
    /// Create a load error (unsupported extension, I/O, or parse failure)
    pub fn load(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Load,
            path: None,
            help: None,
            cause: Some(message.into()),
        }
    }

    /// Create a cycle error from the detected reference chains.
    ///
    /// Each chain is rendered as an arrow-joined list of identifiers,
    /// one line per cycle.
    pub fn cycles(chains: Vec<Vec<String>>) -> Self {
        let chains: Vec<String> = chains.iter().map(|c| c.join(" -> ")).collect();
        Self {
            kind: ErrorKind::Cycle { chains },
            path: None,
            help: Some("Break the cycle by removing one of the references".into()),
            cause: None,
        }
    }

    /// Create an unresolved variable error
    pub fn unresolved_variable(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ErrorKind::UnresolvedVariable { name: name.clone() },
            path: None,
            help: Some(format!(
                "Define '{}' in the document or set it as an environment variable",
                name
            )),
            cause: None,
        }
    }

    /// Create a substitution stall error: a resolution pass over `value`
    /// produced no textual change, so the remaining placeholders can
    /// never resolve.
    pub fn stalled(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            kind: ErrorKind::UnresolvedVariable {
                name: value.clone(),
            },
            path: None,
            help: None,
            cause: Some(format!("Unresolved variables remain in value: {}", value)),
        }
    }

    /// Create an expression evaluation error
    pub fn expression(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Expression { expr: expr.into() },
            path: None,
            help: None,
            cause: Some(message.into()),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            path: None,
            help: None,
            cause: Some(message.into()),
        }
    }

    /// Add flat-key context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Main error message
        match &self.kind {
            ErrorKind::Load => write!(f, "Failed to load configuration")?,
            ErrorKind::Cycle { chains } => {
                write!(f, "Cycle(s) detected in variable references:")?;
                for chain in chains {
                    write!(f, "\n  {}", chain)?;
                }
            }
            ErrorKind::UnresolvedVariable { name } => {
                write!(f, "Unresolved variable: {}", name)?
            }
            ErrorKind::Expression { expr } => {
                write!(f, "Failed to evaluate expression '{}'", expr)?
            }
            ErrorKind::InvalidArgument => write!(f, "Invalid argument")?,
        }

        // Path context
        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        // Cause
        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        // Help
        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display() {
        let err = Error::load("unsupported extension: .toml");
        let display = format!("{}", err);

        assert!(display.contains("Failed to load configuration"));
        assert!(display.contains("unsupported extension: .toml"));
    }

    #[test]
    fn test_cycle_error_display() {
        let err = Error::cycles(vec![
            vec!["a".into(), "b".into(), "c".into(), "a".into()],
            vec!["x".into(), "x".into()],
        ]);
        let display = format!("{}", err);

        assert!(display.contains("Cycle(s) detected"));
        assert!(display.contains("a -> b -> c -> a"));
        assert!(display.contains("x -> x"));
        assert!(display.contains("Help:"));
    }

    #[test]
    fn test_unresolved_variable_error() {
        let err = Error::unresolved_variable("base.dir").with_path("log.path");
        let display = format!("{}", err);

        assert!(display.contains("Unresolved variable: base.dir"));
        assert!(display.contains("Path: log.path"));
        assert!(display.contains("Help:"));
        assert!(matches!(err.kind, ErrorKind::UnresolvedVariable { .. }));
    }

    #[test]
    fn test_stalled_error() {
        let err = Error::stalled("${never}/log");
        let display = format!("{}", err);

        assert!(display.contains("Unresolved variables remain in value: ${never}/log"));
        assert!(matches!(err.kind, ErrorKind::UnresolvedVariable { .. }));
    }

    #[test]
    fn test_expression_error_display() {
        let err = Error::expression("a +", "unexpected end of expression").with_path("c");
        let display = format!("{}", err);

        assert!(display.contains("Failed to evaluate expression 'a +'"));
        assert!(display.contains("unexpected end of expression"));
        assert!(display.contains("Path: c"));
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = Error::invalid_argument("variable key must not be empty");
        let display = format!("{}", err);

        assert!(display.contains("Invalid argument"));
        assert!(display.contains("variable key must not be empty"));
    }

    #[test]
    fn test_with_help() {
        let err = Error::load("bad input").with_help("Try fixing the syntax");
        let display = format!("{}", err);

        assert!(display.contains("Help: Try fixing the syntax"));
    }
}
