//! Module `lexer` implements the one‑pass, pull‑based mode automaton that turns a
//! survey document into [`Token`]s.
//!
//! Four sub‑grammars share one character stream and the active *mode* decides
//! which one is scanned:
//!
//! | Mode                 | Entered by | Left by | Scans                                   |
//! |----------------------|------------|---------|-----------------------------------------|
//! | `Text`               | start, `>>`, `]`, `%>` | – | trimmed text runs                 |
//! | `QuestionAttribute`  | `<<`       | `>>`    | names, `@attributes`, `=`, strings      |
//! | `OptionAttribute`    | `[`        | `]`     | same as above                           |
//! | `Embedded(resume)`   | `${`       | `}`     | AL expressions, then back to `resume`   |
//! | `LogicBlock`         | `<%`       | `%>`    | AL statements                           |
//!
//! # Public API
//!
//! - `Lexer::new(src: &'a str) -> Lexer<'a>`
//! - `impl Iterator for Lexer<'a>` yielding `Result<Token<'a>>`.  Exactly one
//!   `EndOfInput` token is produced; after it, or after the first error, the
//!   iterator is exhausted.
//! - `tokenize(src)` collects the whole stream.
//!
//! # Core Phases
//!
//! 1. **Primitive Helpers** – `advance()`, `peek()`, `peek_at()`, `starts_with()`
//!    keep the line/column counters in sync with the byte cursor.
//! 2. **Mode dispatch** (`next_token`) – one scanner per mode.
//! 3. **AL scanner** – shared by logic blocks and embedded expressions:
//!    comments, strings, numbers, punctuation, greedy operators and keyword
//!    classification through perfect‑hash tables.
//!
//! Text runs and comments are skipped in bulk with `memchr`.  Tokens borrow
//! their text from the source; only string literals containing escapes own it.

use crate::error::{Result, SurveyError};
use crate::token::{Position, Token, TokenKind};
use log::{debug, info};
use memchr::{memchr, memchr3};
use phf::{phf_map, phf_set};
use std::borrow::Cow;
use std::iter::FusedIterator;

// ─────────────────────────────────────────────────────────────────────────────
// Static keyword tables (compile‑time perfect hash)
// ─────────────────────────────────────────────────────────────────────────────

/// Reserved words of the logic language.  Each word appears once, so the
/// classification priority (value keyword > operator word > call keyword >
/// general keyword) is encoded by the kind it maps to.
static AL_WORDS: phf::Map<&'static str, TokenKind> = phf_map! {
    "true"      => TokenKind::ValueKeyword,
    "false"     => TokenKind::ValueKeyword,
    "undefined" => TokenKind::ValueKeyword,

    "and" => TokenKind::Operator,

    "has"                   => TokenKind::CallKeyword,
    "has_not"               => TokenKind::CallKeyword,
    "only_has"              => TokenKind::CallKeyword,
    "go_to"                 => TokenKind::CallKeyword,
    "hide"                  => TokenKind::CallKeyword,
    "terminate"             => TokenKind::CallKeyword,
    "show_error"            => TokenKind::CallKeyword,
    "randomize_rows"        => TokenKind::CallKeyword,
    "rotate_rows"           => TokenKind::CallKeyword,
    "randomize_columns"     => TokenKind::CallKeyword,
    "rotate_columns"        => TokenKind::CallKeyword,
    "resume_row_order"      => TokenKind::CallKeyword,
    "resume_column_order"   => TokenKind::CallKeyword,
    "rotate_questions"      => TokenKind::CallKeyword,
    "randomize_questions"   => TokenKind::CallKeyword,
    "resume_question_order" => TokenKind::CallKeyword,
    "query"                 => TokenKind::CallKeyword,
    "evaluate"              => TokenKind::CallKeyword,
    "do"                    => TokenKind::CallKeyword,

    "def"        => TokenKind::Keyword,
    "rule"       => TokenKind::Keyword,
    "action"     => TokenKind::Keyword,
    "conditions" => TokenKind::Keyword,
    "answer"     => TokenKind::Keyword,
    "for"        => TokenKind::Keyword,
    "end"        => TokenKind::Keyword,
};

/// Built‑in attribute names of the attribute language.
pub static AT_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "name", "hide", "can_skip", "fixed", "after", "before",
    "rotate_rows", "randomize_rows", "rotate_columns", "randomize_columns",
    "minimal_selections", "maximum_selections",
    "single_choice", "multiple_choice", "single_choice_matrix", "multi_choice_matrix",
    "text", "number", "minimal_value", "maximum_value",
    "rotate_questions", "randomize_questions",
    "data", "xor", "all", "default", "type",
};

/// Every operator the AL scanner may grow into.
static OPERATORS: phf::Set<&'static str> = phf_set! {
    "==", "!=", "<", "<=", ">", ">=", "+", "-", "*", "/", "%", "!", "=",
};

const OPERATOR_START: &[u8] = b"+-*/%=<>!";

const AL_PUNCTUATION: &[u8] = b"{}(),|:;";

/// Is `word` a built‑in attribute name?
pub fn is_attribute_keyword(word: &str) -> bool {
    AT_KEYWORDS.contains(word)
}

/// Mode to return to when an embedded expression closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Text,
    QuestionAttribute,
    OptionAttribute,
}

/// Active sub‑grammar.  The embedded mode remembers a single resume point,
/// which is why embedded expressions cannot nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    QuestionAttribute,
    OptionAttribute,
    Embedded(Resume),
    LogicBlock,
}

impl From<Resume> for Mode {
    fn from(resume: Resume) -> Self {
        match resume {
            Resume::Text => Mode::Text,
            Resume::QuestionAttribute => Mode::QuestionAttribute,
            Resume::OptionAttribute => Mode::OptionAttribute,
        }
    }
}

/// A pull‑based **lexer** over a survey document.  The lifetime `'a` ties every
/// borrowed token text back to the source.
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    curr: usize,     // index of the next byte to examine
    line: usize,     // 1‑based, at `curr`
    column: usize,   // 1‑based, at `curr`
    start: Position, // position of the token being scanned
    mode: Mode,
    done: bool, // EndOfInput or an error has been yielded
}

impl<'a> Lexer<'a> {
    /// Create a new lexer over `src`, starting in text mode.
    pub fn new(src: &'a str) -> Self {
        info!("Lexer created over {} bytes", src.len());

        Self {
            src,
            bytes: src.as_bytes(),
            curr: 0,
            line: 1,
            column: 1,
            start: Position::new(1, 1),
            mode: Mode::Text,
            done: false,
        }
    }

    /// Currently active mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    // ───────────────────────────── primitive helpers ────────────────────────

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        self.curr >= self.bytes.len()
    }

    /// Current byte, `0` past the end.
    #[inline(always)]
    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    #[inline(always)]
    fn peek_at(&self, ahead: usize) -> u8 {
        self.bytes.get(self.curr + ahead).copied().unwrap_or(0)
    }

    #[inline(always)]
    fn starts_with(&self, pattern: &[u8]) -> bool {
        self.bytes[self.curr..].starts_with(pattern)
    }

    /// Consume one byte, keeping line and column in step.  UTF‑8 continuation
    /// bytes do not count as columns.
    #[inline(always)]
    fn advance(&mut self) -> u8 {
        let b = self.bytes[self.curr];
        self.curr += 1;

        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if b & 0xC0 != 0x80 {
            self.column += 1;
        }

        b
    }

    fn bump(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn advance_to(&mut self, end: usize) {
        while self.curr < end {
            self.advance();
        }
    }

    /// Consume one whole character.
    fn advance_char(&mut self) -> Option<char> {
        let c = self.src.get(self.curr..)?.chars().next()?;
        self.bump(c.len_utf8());
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_ascii_whitespace() {
            self.advance();
        }
    }

    /// Text runs are trimmed by Unicode rules, so their leading whitespace is
    /// skipped by the same rules.
    fn skip_text_whitespace(&mut self) {
        while let Some(c) = self.src.get(self.curr..).and_then(|rest| rest.chars().next()) {
            if !c.is_whitespace() {
                break;
            }

            self.bump(c.len_utf8());
        }
    }

    /// Borrow a piece of the source for the full lifetime `'a`.
    #[inline(always)]
    fn slice(&self, begin: usize, end: usize) -> &'a str {
        let src: &'a str = self.src;
        &src[begin..end]
    }

    #[inline]
    fn mark(&mut self) {
        self.start = Position::new(self.line, self.column);
    }

    #[inline]
    fn emit(&self, kind: TokenKind, text: impl Into<Cow<'a, str>>) -> Token<'a> {
        Token::new(kind, text, self.start)
    }

    fn error(&self, msg: impl Into<String>) -> SurveyError {
        SurveyError::syntax(self.start.line, self.start.column, msg)
    }

    fn unexpected_char(&self) -> SurveyError {
        let ch = self
            .src
            .get(self.curr..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or('?');

        self.error(format!("Unexpected character '{}'", ch))
    }

    /// Where an embedded expression opened here should return to.
    fn resume_point(&self) -> Resume {
        match self.mode {
            Mode::QuestionAttribute => Resume::QuestionAttribute,
            Mode::OptionAttribute => Resume::OptionAttribute,
            _ => Resume::Text,
        }
    }

    fn enter_embedded(&mut self) -> Token<'a> {
        self.bump(2);
        self.mode = Mode::Embedded(self.resume_point());
        self.emit(TokenKind::EmbeddedExprStart, "${")
    }

    // ───────────────────────────── mode dispatch ───────────────────────────

    /// Scan exactly one token in the active mode.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        match self.mode {
            Mode::Text => self.scan_text(),
            Mode::QuestionAttribute => {
                self.scan_attribute(b">>", TokenKind::QuestionAttrEnd)
            }
            Mode::OptionAttribute => self.scan_attribute(b"]", TokenKind::OptionAttrEnd),
            Mode::Embedded(resume) => self.scan_logic(Some(resume)),
            Mode::LogicBlock => self.scan_logic(None),
        }
    }

    // ───────────────────────────── text mode ───────────────────────────────

    fn scan_text(&mut self) -> Result<Token<'a>> {
        // Leading whitespace never belongs to a run, so a run that starts
        // here is non‑empty after trimming.
        self.skip_text_whitespace();
        self.mark();

        if self.is_at_end() {
            return Ok(self.emit(TokenKind::EndOfInput, ""));
        }

        if self.starts_with(b"<<") {
            self.bump(2);
            self.mode = Mode::QuestionAttribute;
            return Ok(self.emit(TokenKind::QuestionAttrStart, "<<"));
        }

        if self.starts_with(b"[") {
            self.advance();
            self.mode = Mode::OptionAttribute;
            return Ok(self.emit(TokenKind::OptionAttrStart, "["));
        }

        if self.starts_with(b"${") {
            return Ok(self.enter_embedded());
        }

        if self.starts_with(b"<%") {
            self.bump(2);
            self.mode = Mode::LogicBlock;
            return Ok(self.emit(TokenKind::LogicBlockStart, "<%"));
        }

        let begin = self.curr;
        let end = self.find_text_end();
        self.advance_to(end);

        let text: &'a str = self.slice(begin, end).trim_end();

        Ok(self.emit(TokenKind::TextRun, text))
    }

    /// Index of the next delimiter opener (or the end of input).
    fn find_text_end(&self) -> usize {
        let mut pos = self.curr;

        while let Some(i) = memchr3(b'<', b'[', b'$', &self.bytes[pos..]) {
            let at = pos + i;
            let next = self.bytes.get(at + 1).copied().unwrap_or(0);

            let opens = match self.bytes[at] {
                b'[' => true,
                b'<' => next == b'<' || next == b'%',
                _ => next == b'{',
            };

            if opens {
                return at;
            }

            pos = at + 1;
        }

        self.bytes.len()
    }

    // ───────────────────────────── attribute modes ─────────────────────────

    fn scan_attribute(&mut self, close: &'static [u8], close_kind: TokenKind) -> Result<Token<'a>> {
        self.skip_whitespace();
        self.mark();

        if self.is_at_end() {
            return Ok(self.emit(TokenKind::EndOfInput, ""));
        }

        if self.starts_with(close) {
            self.bump(close.len());
            self.mode = Mode::Text;
            return Ok(self.emit(close_kind, close_kind.describe()));
        }

        if self.starts_with(b"${") {
            return Ok(self.enter_embedded());
        }

        match self.peek() {
            b'"' | b'\'' => self.scan_string(),

            b'=' => {
                self.advance();
                Ok(self.emit(TokenKind::Punctuation, "="))
            }

            b'@' => {
                self.advance();

                if !is_identifier_start(self.peek()) {
                    return Err(self.error("expecting attribute name after '@'"));
                }

                let word = self.read_word();
                Ok(self.emit(TokenKind::AttributeKeyword, word))
            }

            c if is_identifier_start(c) => {
                let word = self.read_word();
                Ok(self.emit(TokenKind::Identifier, word))
            }

            _ => Err(self.unexpected_char()),
        }
    }

    // ───────────────────────────── AL scanner ──────────────────────────────

    /// Logic code scanner.  `resume` is set inside an embedded expression,
    /// where `}` closes the expression; otherwise `%>` closes the block.
    fn scan_logic(&mut self, resume: Option<Resume>) -> Result<Token<'a>> {
        loop {
            self.skip_whitespace();
            self.mark();

            if self.is_at_end() {
                return Ok(self.emit(TokenKind::EndOfInput, ""));
            }

            match resume {
                Some(resume) if self.peek() == b'}' => {
                    self.advance();
                    self.mode = resume.into();
                    return Ok(self.emit(TokenKind::EmbeddedExprEnd, "}"));
                }

                None if self.starts_with(b"%>") => {
                    self.bump(2);
                    self.mode = Mode::Text;
                    return Ok(self.emit(TokenKind::LogicBlockEnd, "%>"));
                }

                _ => {}
            }

            if self.starts_with(b"${") {
                return Err(match resume {
                    Some(_) => self.error("nested embedded expressions are not supported"),
                    None => self.error("embedded expressions are not allowed inside logic blocks"),
                });
            }

            match self.peek() {
                b'"' | b'\'' => return self.scan_string(),

                b'.' => {
                    if self.peek_at(1).is_ascii_digit() {
                        return self.scan_number();
                    }

                    self.advance();
                    return Ok(self.emit(TokenKind::Punctuation, "."));
                }

                b'/' if self.peek_at(1) == b'/' => {
                    self.skip_line_comment();
                    continue;
                }

                b'0'..=b'9' => return self.scan_number(),

                c if AL_PUNCTUATION.contains(&c) => {
                    let begin = self.curr;
                    self.advance();
                    return Ok(self.emit(TokenKind::Punctuation, self.slice(begin, self.curr)));
                }

                c if OPERATOR_START.contains(&c) => return Ok(self.scan_operator()),

                c if is_identifier_start(c) => return Ok(self.scan_word()),

                _ => return Err(self.unexpected_char()),
            }
        }
    }

    /// Skip `// …` up to (not including) the newline so the line counter
    /// still sees it.
    fn skip_line_comment(&mut self) {
        match memchr(b'\n', &self.bytes[self.curr..]) {
            Some(pos) => {
                let end = self.curr + pos;
                self.column += self.src[self.curr..end].chars().count();
                self.curr = end;
            }
            None => self.curr = self.bytes.len(),
        }
    }

    /// Quoted string with `\n`, `\t`, `\r` escapes.  Strings may not span
    /// lines.
    fn scan_string(&mut self) -> Result<Token<'a>> {
        let quote = self.advance();
        let begin = self.curr;
        let mut decoded: Option<String> = None;

        loop {
            match self.peek() {
                _ if self.is_at_end() => {
                    return Err(self.error("Unterminated string constant"));
                }

                b'\n' => return Err(self.error("Unterminated string constant")),

                c if c == quote => break,

                b'\\' => {
                    let seen = self.slice(begin, self.curr);
                    let value = decoded.get_or_insert_with(|| seen.to_owned());
                    self.advance();

                    match self.advance_char() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some(other) => value.push(other),
                        None => return Err(self.error("Unterminated string constant")),
                    }
                }

                _ => match self.advance_char() {
                    Some(c) => {
                        if let Some(value) = decoded.as_mut() {
                            value.push(c);
                        }
                    }
                    None => {
                        self.advance();
                    }
                },
            }
        }

        let end = self.curr;
        self.advance(); // closing quote

        let text: Cow<'a, str> = match decoded {
            Some(value) => Cow::Owned(value),
            None => Cow::Borrowed(self.slice(begin, end)),
        };

        Ok(self.emit(TokenKind::String, text))
    }

    /// Numeric literal: digits with at most one decimal point, possibly
    /// leading (`.5`).
    fn scan_number(&mut self) -> Result<Token<'a>> {
        let begin = self.curr;
        let mut seen_dot = false;

        loop {
            match self.peek() {
                b'.' if !seen_dot => {
                    seen_dot = true;
                    self.advance();
                }
                b'0'..=b'9' => {
                    self.advance();
                }
                _ => break,
            }
        }

        let lexeme: &'a str = self.slice(begin, self.curr);

        if lexeme.parse::<f64>().is_err() {
            return Err(self.error(format!("Invalid number literal: {}", lexeme)));
        }

        Ok(self.emit(TokenKind::Number, lexeme))
    }

    /// Grow the operator greedily into the longest valid one.
    fn scan_operator(&mut self) -> Token<'a> {
        let begin = self.curr;
        self.advance();

        while let Some(candidate) = self.src.get(begin..self.curr + 1) {
            if !OPERATORS.contains(candidate) {
                break;
            }
            self.advance();
        }

        self.emit(TokenKind::Operator, self.slice(begin, self.curr))
    }

    /// Identifier‑shaped word, classified against the AL tables.
    fn scan_word(&mut self) -> Token<'a> {
        let word = self.read_word();
        let kind = AL_WORDS.get(word).copied().unwrap_or(TokenKind::Identifier);

        self.emit(kind, word)
    }

    fn read_word(&mut self) -> &'a str {
        let begin = self.curr;

        while is_identifier_char(self.peek()) {
            self.advance();
        }

        self.slice(begin, self.curr)
    }
}

#[inline(always)]
fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

#[inline(always)]
fn is_identifier_char(c: u8) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}

// ───────────────────────── Iterator implementation ─────────────────────────

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_token() {
            Ok(token) => {
                debug!("Scanned token {} in {:?} mode", token, self.mode);

                if token.kind == TokenKind::EndOfInput {
                    self.done = true;
                }

                Some(Ok(token))
            }

            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> FusedIterator for Lexer<'a> {}

/// Lex the whole document, stopping at the first error.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>> {
    Lexer::new(src).collect()
}
