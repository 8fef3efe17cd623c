use thiserror::Error;

use crate::token::Token;

/// Errors that can occur while lexing or parsing a Rhythmix expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RhythmixParserError {
    /// No token rule matches the character at `position`.
    #[error("Lexical error: unexpected character '{ch}' at position {position}")]
    Lexical {
        ch: char,
        position: usize,
        line: usize,
        column: usize,
    },

    /// A number carries a suffix outside the time unit table.
    #[error("Lexical error: unsupported time unit '{unit}' at position {position}")]
    UnknownUnit {
        unit: String,
        position: usize,
        line: usize,
        column: usize,
    },

    /// Structural error: unexpected token, unbalanced brackets, malformed
    /// argument list or an illegal chain transition.
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        position: usize,
        line: usize,
        column: usize,
    },
}

impl RhythmixParserError {
    pub fn parse_at(message: impl Into<String>, token: &Token) -> Self {
        RhythmixParserError::Parse {
            message: message.into(),
            position: token.position,
            line: token.line,
            column: token.column,
        }
    }

    /// `(line, column)` of the offending input.
    pub fn location(&self) -> (usize, usize) {
        match self {
            RhythmixParserError::Lexical { line, column, .. }
            | RhythmixParserError::UnknownUnit { line, column, .. }
            | RhythmixParserError::Parse { line, column, .. } => (*line, *column),
        }
    }

    /// The message without the error-kind prefix.
    pub fn detail(&self) -> String {
        match self {
            RhythmixParserError::Lexical { ch, .. } => format!("unexpected character '{ch}'"),
            RhythmixParserError::UnknownUnit { unit, .. } => {
                format!("unsupported time unit '{unit}'")
            }
            RhythmixParserError::Parse { message, .. } => message.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RhythmixParserError>;

/// Render an error against its source with a caret under the offending column.
///
/// ```text
/// error: unexpected character '#'
///   --> <source>:1:9
///   |
/// 1 | count(>4#, 3)
///   |         ^
/// ```
pub fn format_error(source: &str, message: &str, line: usize, column: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = format!("error: {message}\n  --> <source>:{line}:{}\n", column + 1);
    let Some(text) = line.checked_sub(1).and_then(|i| lines.get(i)) else {
        return out;
    };
    let width = line.to_string().len();
    out.push_str(&format!("{:width$} |\n", ""));
    out.push_str(&format!("{line:width$} | {text}\n"));
    out.push_str(&format!("{:width$} | {}^\n", "", " ".repeat(column)));
    out
}
