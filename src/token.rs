use log::debug;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// The different kinds of tokens produced by the survey lexer.
///
/// The set is partitioned by the sub‑grammar that emits them: shared
/// terminals, AL (logic language) terminals and text/attribute terminals.
/// The token's text carries the payload (identifier name, literal value,
/// operator symbol…).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// A quoted string literal (text is the decoded contents)
    String,

    /// A user‑defined name
    Identifier,

    /// A numeric literal
    Number,

    /// One of `{ } ( ) , | : ; . =`
    Punctuation,

    /// A binary operator, `!`, or `=` inside logic code
    Operator,

    /// End‑of‑input marker
    EndOfInput,

    /// `def`, `rule`, `action`, `conditions`, `answer`, `for`, `end`
    Keyword,

    /// Built‑in command such as `hide`, `go_to` or `evaluate`
    CallKeyword,

    /// `true`, `false`, `undefined`
    ValueKeyword,

    /// Trimmed free‑form text between blocks
    TextRun,

    /// `@word` inside an attribute block (text is `word`)
    AttributeKeyword,

    /// '<<'
    QuestionAttrStart,

    /// '>>'
    QuestionAttrEnd,

    /// '['
    OptionAttrStart,

    /// ']'
    OptionAttrEnd,

    /// '${'
    EmbeddedExprStart,

    /// '}' closing an embedded expression
    EmbeddedExprEnd,

    /// '<%'
    LogicBlockStart,

    /// '%>'
    LogicBlockEnd,
}

impl TokenKind {
    /// What a diagnostic says when this kind was expected but not found.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::QuestionAttrStart => "<<",
            TokenKind::QuestionAttrEnd => ">>",
            TokenKind::OptionAttrStart => "[",
            TokenKind::OptionAttrEnd => "]",
            TokenKind::EmbeddedExprStart => "${",
            TokenKind::EmbeddedExprEnd => "}",
            TokenKind::LogicBlockStart => "<%",
            TokenKind::LogicBlockEnd => "%>",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Operator => "operator",
            TokenKind::TextRun => "text",
            TokenKind::Identifier => "identifier / name",
            TokenKind::EndOfInput => "end of input",
            TokenKind::Keyword => "keyword",
            TokenKind::CallKeyword => "command",
            TokenKind::ValueKeyword => "value",
            TokenKind::AttributeKeyword => "attribute",
            TokenKind::Punctuation => "punctuation",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 1‑based line and column of a token's first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A scanned token.  The lifetime `'a` ties borrowed text back to the source
/// buffer; only decoded string literals own their text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token<'a> {
    /// The category of this token.
    pub kind: TokenKind,

    /// Lexeme, or decoded value for string literals and trimmed text runs.
    pub text: Cow<'a, str>,

    pub position: Position,
}

impl<'a> Token<'a> {
    /// Create a new token.
    pub fn new(kind: TokenKind, text: impl Into<Cow<'a, str>>, position: Position) -> Self {
        let text = text.into();

        debug!(
            "Creating new token: kind={:?}, text={}, at={}",
            kind, text, position
        );

        Self {
            kind,
            text,
            position,
        }
    }

    /// Does this token have the given kind and, if `value` is set, that text?
    #[inline]
    pub fn is(&self, kind: TokenKind, value: Option<&str>) -> bool {
        self.kind == kind && value.map_or(true, |v| self.text == v)
    }

    #[inline]
    pub fn line(&self) -> usize {
        self.position.line
    }

    #[inline]
    pub fn column(&self) -> usize {
        self.position.column
    }

    /// How the token reads in a diagnostic ("but found …").
    pub fn found(&self) -> &str {
        match self.kind {
            TokenKind::EndOfInput => "end of input",
            _ => &self.text,
        }
    }
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {}", self.kind, self.text, self.position)
    }
}
