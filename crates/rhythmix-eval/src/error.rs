//! Compilation and evaluation error types.

use rhythmix_parser::{RhythmixParserError, Token, format_error};
use thiserror::Error;

/// Errors that can occur while compiling or running a Rhythmix condition.
///
/// Everything except [`EvalError::Script`] and [`EvalError::Runtime`] is a
/// compile-time error. Malformed event data never produces an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A lexical or parse error propagated from the front end.
    #[error(transparent)]
    Parser(#[from] RhythmixParserError),

    /// Wrong arity, wrong literal type for a parameter, unsupported time unit,
    /// unknown function or UDF, or an undefined variable.
    #[error("Translation error: {message}")]
    Translation {
        message: String,
        position: usize,
        line: usize,
        column: usize,
    },

    /// Operand types that can never work together.
    #[error("Type inference error: {message}")]
    TypeInference {
        message: String,
        position: usize,
        line: usize,
        column: usize,
    },

    /// A compiled program could not be parsed by the script evaluator.
    #[error("script error: {0}")]
    Script(String),

    /// The script evaluator hit an unknown function or variable.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl EvalError {
    pub fn translation(message: impl Into<String>, at: &Token) -> Self {
        EvalError::Translation {
            message: message.into(),
            position: at.position,
            line: at.line,
            column: at.column,
        }
    }

    pub fn type_inference(message: impl Into<String>, at: &Token) -> Self {
        EvalError::TypeInference {
            message: message.into(),
            position: at.position,
            line: at.line,
            column: at.column,
        }
    }

    /// `(line, column)` for errors tied to the source text.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            EvalError::Parser(e) => Some(e.location()),
            EvalError::Translation { line, column, .. }
            | EvalError::TypeInference { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }

    /// The message without its kind prefix.
    pub fn detail(&self) -> String {
        match self {
            EvalError::Parser(e) => e.detail(),
            EvalError::Translation { message, .. } | EvalError::TypeInference { message, .. } => {
                message.clone()
            }
            EvalError::Script(m) | EvalError::Runtime(m) => m.clone(),
        }
    }

    /// Render against `source` with a caret under the offending column.
    pub fn render(&self, source: &str) -> String {
        match self.location() {
            Some((line, column)) => format_error(source, &self.detail(), line, column),
            None => format!("error: {self}\n"),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EvalError>;
