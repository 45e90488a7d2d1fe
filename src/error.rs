//! Centralised error hierarchy for the **survey compiler front end**.
//!
//! The lexer, the parser, the semantic checker and the symbol-table builder all
//! report failures through [`SurveyError`].  Compilation is fail-fast: the first
//! error aborts the pipeline and nothing partial is handed back to the caller.
//!
//! The module **does not** print diagnostics itself

use thiserror::Error;

use log::info;

/// Canonical error type used throughout the front end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SurveyError {
    /// Lexical or grammatical error (lexer and parser).
    #[error("[line {line}, column {column}] Syntax error: {message}")]
    Syntax {
        /// Human‑readable description.
        message: String,

        /// 1‑based line of the offending token.
        line: usize,

        /// 1‑based column of the offending token.
        column: usize,
    },

    /// Structural legality violation found after parsing.
    #[error("[line {line}, column {column}] Semantic error: {message}")]
    Semantic {
        message: String,
        line: usize,
        column: usize,
    },
}

impl SurveyError {
    /// Helper constructor for the **lexer** and the **parser**.
    pub fn syntax<S: Into<String>>(line: usize, column: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!(
            "Creating Syntax error: line={}, column={}, msg={}",
            line, column, message
        );

        SurveyError::Syntax {
            message,
            line,
            column,
        }
    }

    /// Helper constructor for the **checker** and the **symbol table**.
    pub fn semantic<S: Into<String>>(line: usize, column: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!(
            "Creating Semantic error: line={}, column={}, msg={}",
            line, column, message
        );

        SurveyError::Semantic {
            message,
            line,
            column,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SurveyError::Syntax { message, .. } | SurveyError::Semantic { message, .. } => message,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            SurveyError::Syntax { line, .. } | SurveyError::Semantic { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            SurveyError::Syntax { column, .. } | SurveyError::Semantic { column, .. } => *column,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, SurveyError::Syntax { .. })
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self, SurveyError::Semantic { .. })
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, SurveyError>;
