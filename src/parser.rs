/*!
Recursive‑descent parser for survey documents
=============================================

The parser pulls tokens one at a time from any `Iterator<Item = Result<Token>>`
(normally a [`Lexer`]) and keeps exactly one token of lookahead in `current`.
Lexer errors surface unchanged through the first parser call that needs the
failing token.

### Cost

| Phase / function              | Cost | Rationale                                         |
|-------------------------------|-----:|---------------------------------------------------|
| `Parser::parse` main loop     | Θ(n) | Each token is pulled once via `advance()`.        |
| Binary expressions            | Θ(k) | Precedence climbing, one recursion per level.     |

Call‑stack depth grows with syntactic nesting and is capped by
[`ParserConfig::max_nesting`].  Operator and `.property` chains are folded in a
loop but still produce one tree level per link, so each link is charged against
[`ParserConfig::max_expression_depth`]; together the two limits bound every
later walk over the tree.

### Logging Policy

| Location                      | Level  | Purpose                                   |
|-------------------------------|--------|-------------------------------------------|
| `Parser::new`, `parse`        | `info` | Lifecycle milestones.                     |
| component and statement rules | `debug`| Descent into grammar branches.            |

--------------------------------------------------------------------------------
Grammar (EBNF, condensed)
-------------------------

```text
document       → ( question | section | interlude )* EOF ;
section        → "<<" attribute* ">>"               (followed by "<<", "<%")
question       → "<<" attribute* ">>" text* option* ;
option         → "[" attribute* "]" text* ;
text           → TEXT | embedded ;
embedded       → "${" expression "}" ;
attribute      → IDENT | "@"WORD ( "=" ( STRING | embedded ) )? ;
interlude      → "<%" statement* "%>" ;

statement      → ( ruleDef | actionDef | conditionsDef | symbolDec
               | evaluate | do | command | expression ) ";"? ;
ruleDef        → "rule" IDENT ":" condition+ block ;
actionDef      → "action" IDENT block ;
conditionsDef  → "conditions" IDENT ":" condition+ "end" ;
condition      → "|" expression ;
symbolDec      → "def" IDENT ( "=" binary )? ;
evaluate       → "evaluate" IDENT ;
do             → "do" IDENT ;
command        → CALL "(" ( expression ( "," expression )* )? ")" ;
block          → "{" statement* "}" ;

expression     → binary ( "=" binary )? ;        (left side must be a bare name)
binary         → atom ( OP atom )* ;             (precedence climbing)
atom           → NUMBER | STRING | "true" | "false" | "undefined"
               | reference | "(" expression ")" property*
               | "answer" "for" IDENT ( "has" | "has_not" | "only_has" ) arguments ;
reference      → IDENT property* ;
property       → "." IDENT ;
```

| Operator              | Precedence |
|-----------------------|-----------:|
| `and`                 | 1          |
| `==` `!=`             | 2          |
| `<` `>` `<=` `>=`     | 3          |
| `+` `-`               | 4          |
| `*` `/` `%`           | 5          |

All binary operators are left‑associative.
*/

use crate::ast::{
    ActionDef, AnswerMode, AnswerOption, BinaryOp, Attribute, AttributeValue, BlockStatement,
    BuiltInCommandCall, ConditionSetDef, Document, Expr, ExprKind, Interlude, Invocation,
    Question, RuleDef, Section, SimpleStatement, Span, Statement, SurveyComponent, SymbolDec,
    SymbolRef, TextPart,
};
use crate::error::{Result, SurveyError};
use crate::lexer::Lexer;
use crate::token::{Position, Token, TokenKind};

use log::{debug, info};

/// Parser limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Deepest allowed nesting of blocks, parentheses, embedded expressions and
    /// argument lists.
    pub max_nesting: usize,

    /// Most binary operators and property links on one path of an expression
    /// tree.
    pub max_expression_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_nesting: 64,
            max_expression_depth: 256,
        }
    }
}

/// Streaming parser producing a [`Document`].
pub struct Parser<'a, I>
where
    I: Iterator<Item = Result<Token<'a>>>,
{
    tokens: I,
    current: Token<'a>,
    previous: Token<'a>,
    started: bool,
    config: ParserConfig,
    depth: usize,
    expression_depth: usize,
}

impl<'a> Parser<'a, Lexer<'a>> {
    /// Parser reading straight from source text.
    pub fn from_source(source: &'a str) -> Self {
        Self::new(Lexer::new(source))
    }
}

impl<'a, I> Parser<'a, I>
where
    I: Iterator<Item = Result<Token<'a>>>,
{
    /// Construct a new parser with the default [`ParserConfig`].
    pub fn new(tokens: I) -> Self {
        Self::with_config(tokens, ParserConfig::default())
    }

    pub fn with_config(tokens: I, config: ParserConfig) -> Self {
        info!(
            "Parser created (max nesting {}, max expression depth {})",
            config.max_nesting, config.max_expression_depth
        );

        // Placeholder until the first token is pulled by `parse`.
        let origin = Token::new(TokenKind::EndOfInput, "", Position::new(1, 1));

        Self {
            tokens,
            current: origin.clone(),
            previous: origin,
            started: false,
            config,
            depth: 0,
            expression_depth: 0,
        }
    }

    // ───────────────────────── public API ─────────────────────────

    /// Parse a whole document.  The first error aborts the parse.
    pub fn parse(&mut self) -> Result<Document<'a>> {
        info!("Beginning parse phase");

        if !self.started {
            self.started = true;
            self.current = self.pull()?;
        }

        let mut components: Vec<SurveyComponent<'a>> = Vec::new();

        while !self.check(TokenKind::EndOfInput, None) {
            let component = match self.current.kind {
                TokenKind::QuestionAttrStart => self.question()?,
                TokenKind::LogicBlockStart => SurveyComponent::Interlude(self.interlude()?),
                _ => return Err(self.unexpected()),
            };

            components.push(component);
        }

        info!("Parsed {} survey component(s)", components.len());

        Ok(Document { components })
    }

    // ──────────────────────── survey components ───────────────────

    fn question(&mut self) -> Result<SurveyComponent<'a>> {
        debug!("Entering question at {}", self.current.position);

        let start = self.current.clone();
        let attributes = self.attribute_block(TokenKind::QuestionAttrStart, TokenKind::QuestionAttrEnd)?;

        if self.check_any(&[TokenKind::QuestionAttrStart, TokenKind::LogicBlockStart]) {
            debug!("Attribute block has no text, treating it as a section");

            return Ok(SurveyComponent::Section(Section {
                attributes,
                span: self.span_from(start),
            }));
        }

        let texts = self.texts()?;

        let mut options: Vec<AnswerOption<'a>> = Vec::new();

        while !self.check_any(&[
            TokenKind::EndOfInput,
            TokenKind::QuestionAttrStart,
            TokenKind::LogicBlockStart,
        ]) {
            options.push(self.option()?);
        }

        let (columns, rows): (Vec<_>, Vec<_>) =
            options.into_iter().partition(AnswerOption::is_column);

        Ok(SurveyComponent::Question(Question {
            texts,
            attributes,
            rows,
            columns,
            span: self.span_from(start),
        }))
    }

    fn option(&mut self) -> Result<AnswerOption<'a>> {
        let start = self.current.clone();
        let attributes = self.attribute_block(TokenKind::OptionAttrStart, TokenKind::OptionAttrEnd)?;
        let texts = self.texts()?;

        Ok(AnswerOption {
            texts,
            attributes,
            span: self.span_from(start),
        })
    }

    fn texts(&mut self) -> Result<Vec<TextPart<'a>>> {
        let mut texts: Vec<TextPart<'a>> = Vec::new();

        loop {
            match self.current.kind {
                TokenKind::TextRun => {
                    texts.push(TextPart::Text(self.current.clone()));
                    self.advance()?;
                }
                TokenKind::EmbeddedExprStart => texts.push(TextPart::Embedded(self.embedded()?)),
                _ => return Ok(texts),
            }
        }
    }

    fn attribute_block(&mut self, open: TokenKind, close: TokenKind) -> Result<Vec<Attribute<'a>>> {
        self.consume(open, None)?;

        let mut attributes: Vec<Attribute<'a>> = Vec::new();

        while !self.check(close, None) {
            if self.check(TokenKind::EndOfInput, None) {
                return Err(self.expectation(close, None));
            }

            attributes.push(self.attribute()?);
        }

        self.consume(close, None)?;

        Ok(attributes)
    }

    fn attribute(&mut self) -> Result<Attribute<'a>> {
        match self.current.kind {
            TokenKind::Identifier => {
                let name = self.current.clone();
                self.advance()?;

                Ok(Attribute {
                    name: name.text.clone(),
                    value: None,
                    is_custom: true,
                    span: Span::single(name),
                })
            }

            TokenKind::AttributeKeyword => {
                let name = self.current.clone();
                self.advance()?;

                let value = if self.matches(TokenKind::Punctuation, Some("="))? {
                    Some(self.attribute_value()?)
                } else {
                    None
                };

                Ok(Attribute {
                    name: name.text.clone(),
                    value,
                    is_custom: false,
                    span: self.span_from(name),
                })
            }

            _ => Err(self.error_here(format!(
                "Invalid attribute name {}",
                self.current.found()
            ))),
        }
    }

    fn attribute_value(&mut self) -> Result<AttributeValue<'a>> {
        match self.current.kind {
            TokenKind::String => {
                let value = self.current.clone();
                self.advance()?;

                Ok(AttributeValue::Str(value))
            }
            TokenKind::EmbeddedExprStart => Ok(AttributeValue::Embedded(self.embedded()?)),
            _ => Err(self.error_here(format!(
                "value of an attribute must be either a string or an embedded expression, but found {}",
                self.current.found()
            ))),
        }
    }

    fn embedded(&mut self) -> Result<SimpleStatement<'a>> {
        self.nested(|p| {
            let start = p.consume(TokenKind::EmbeddedExprStart, None)?;
            let expression = p.root(Self::expression)?;
            p.consume(TokenKind::EmbeddedExprEnd, None)?;

            Ok(SimpleStatement {
                expression,
                span: p.span_from(start),
            })
        })
    }

    fn interlude(&mut self) -> Result<Interlude<'a>> {
        debug!("Entering interlude at {}", self.current.position);

        let start = self.consume(TokenKind::LogicBlockStart, None)?;
        let statements = self.statements_until(TokenKind::LogicBlockEnd, None)?;

        Ok(Interlude {
            statements,
            span: self.span_from(start),
        })
    }

    // ───────────────────────── statement rules ────────────────────

    /// Statements up to and including the closing token.
    fn statements_until(&mut self, close: TokenKind, value: Option<&str>) -> Result<Vec<Statement<'a>>> {
        let mut statements: Vec<Statement<'a>> = Vec::new();

        while !self.check(close, value) {
            if self.check(TokenKind::EndOfInput, None) {
                return Err(self.expectation(close, value));
            }

            statements.push(self.statement()?);
        }

        self.consume(close, value)?;

        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement<'a>> {
        debug!("Entering statement at {}", self.current);

        let statement = match self.current.kind {
            TokenKind::String
            | TokenKind::Number
            | TokenKind::ValueKeyword
            | TokenKind::Identifier => Statement::Simple(self.simple_statement()?),

            TokenKind::Punctuation if self.current.text == "(" => {
                Statement::Simple(self.simple_statement()?)
            }

            TokenKind::CallKeyword => match &*self.current.text {
                "evaluate" => Statement::Evaluate(self.invocation()?),
                "do" => Statement::Do(self.invocation()?),
                "has" | "has_not" | "only_has" => return Err(self.unexpected()),
                _ => Statement::Command(self.command()?),
            },

            TokenKind::Keyword => match &*self.current.text {
                "rule" => Statement::Rule(self.rule()?),
                "action" => Statement::Action(self.action()?),
                "conditions" => Statement::ConditionSet(self.condition_set()?),
                "def" => Statement::Declaration(self.symbol_declaration()?),
                "answer" => Statement::Simple(self.simple_statement()?),
                _ => return Err(self.unexpected()),
            },

            _ => return Err(self.unexpected()),
        };

        self.matches(TokenKind::Punctuation, Some(";"))?;

        Ok(statement)
    }

    fn simple_statement(&mut self) -> Result<SimpleStatement<'a>> {
        let start = self.current.clone();
        let expression = self.root(Self::expression)?;

        Ok(SimpleStatement {
            expression,
            span: self.span_from(start),
        })
    }

    fn block(&mut self) -> Result<BlockStatement<'a>> {
        self.nested(|p| {
            let start = p.consume(TokenKind::Punctuation, Some("{"))?;
            let statements = p.statements_until(TokenKind::Punctuation, Some("}"))?;

            Ok(BlockStatement {
                statements,
                span: p.span_from(start),
            })
        })
    }

    fn condition(&mut self) -> Result<SimpleStatement<'a>> {
        self.consume(TokenKind::Punctuation, Some("|"))?;
        self.simple_statement()
    }

    fn rule(&mut self) -> Result<RuleDef<'a>> {
        debug!("Entering rule definition");

        let start = self.consume(TokenKind::Keyword, Some("rule"))?;
        let name = self.consume(TokenKind::Identifier, None)?;
        self.consume(TokenKind::Punctuation, Some(":"))?;

        let mut conditions = vec![self.condition()?];

        while !self.check(TokenKind::Punctuation, Some("{")) {
            conditions.push(self.condition()?);
        }

        let action = self.block()?;

        Ok(RuleDef {
            name,
            conditions,
            action,
            span: self.span_from(start),
        })
    }

    fn action(&mut self) -> Result<ActionDef<'a>> {
        debug!("Entering action definition");

        let start = self.consume(TokenKind::Keyword, Some("action"))?;
        let name = self.consume(TokenKind::Identifier, None)?;
        let action = self.block()?;

        Ok(ActionDef {
            name,
            action,
            span: self.span_from(start),
        })
    }

    fn condition_set(&mut self) -> Result<ConditionSetDef<'a>> {
        debug!("Entering condition set definition");

        let start = self.consume(TokenKind::Keyword, Some("conditions"))?;
        let name = self.consume(TokenKind::Identifier, None)?;
        self.consume(TokenKind::Punctuation, Some(":"))?;

        let mut conditions = vec![self.condition()?];

        while !self.check(TokenKind::Keyword, Some("end")) {
            conditions.push(self.condition()?);
        }

        self.consume(TokenKind::Keyword, Some("end"))?;

        Ok(ConditionSetDef {
            name,
            conditions,
            span: self.span_from(start),
        })
    }

    fn symbol_declaration(&mut self) -> Result<SymbolDec<'a>> {
        let start = self.consume(TokenKind::Keyword, Some("def"))?;
        let name = self.consume(TokenKind::Identifier, None)?;

        let initializer = if self.matches(TokenKind::Operator, Some("="))? {
            Some(self.root(Self::binary)?)
        } else {
            None
        };

        Ok(SymbolDec {
            name,
            initializer,
            span: self.span_from(start),
        })
    }

    /// `evaluate NAME` / `do NAME`
    fn invocation(&mut self) -> Result<Invocation<'a>> {
        let start = self.current.clone();
        self.advance()?;

        let target = SymbolRef {
            token: self.consume(TokenKind::Identifier, None)?,
        };

        Ok(Invocation {
            target,
            span: self.span_from(start),
        })
    }

    fn command(&mut self) -> Result<BuiltInCommandCall<'a>> {
        let name = self.consume(TokenKind::CallKeyword, None)?;
        let args = self.root(Self::arguments)?;

        Ok(BuiltInCommandCall {
            span: self.span_from(name.clone()),
            name,
            args,
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr<'a>>> {
        self.nested(|p| {
            p.consume(TokenKind::Punctuation, Some("("))?;

            let mut args: Vec<Expr<'a>> = Vec::new();

            if !p.check(TokenKind::Punctuation, Some(")")) {
                loop {
                    args.push(p.expression()?);

                    if !p.matches(TokenKind::Punctuation, Some(","))? {
                        break;
                    }
                }
            }

            p.consume(TokenKind::Punctuation, Some(")"))?;

            Ok(args)
        })
    }

    // ───────────────────────── expression rules ───────────────────

    fn expression(&mut self) -> Result<Expr<'a>> {
        let left = self.binary()?;

        if !self.check(TokenKind::Operator, Some("=")) {
            return Ok(left);
        }

        let target = match left.kind {
            ExprKind::Symbol(target) => target,
            _ => return Err(self.error_here("Invalid assignment")),
        };

        self.advance()?;

        let value = self.binary()?;
        let span = Span::new(left.span.start, value.span.end.clone());

        Ok(Expr::new(
            ExprKind::Assign {
                target,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn binary(&mut self) -> Result<Expr<'a>> {
        let left = self.atom()?;
        self.climb(left, 0)
    }

    /// Fold operators binding tighter than `min_precedence` onto `left`.
    fn climb(&mut self, mut left: Expr<'a>, min_precedence: u8) -> Result<Expr<'a>> {
        while let Some(op) = self.binary_operator() {
            let precedence = op.precedence();
            if precedence <= min_precedence {
                break;
            }

            self.deepen()?;
            self.advance()?;

            let atom = self.atom()?;
            let right = self.climb(atom, precedence)?;
            let span = Span::new(left.span.start.clone(), right.span.end.clone());

            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn atom(&mut self) -> Result<Expr<'a>> {
        let token = self.current.clone();

        match token.kind {
            TokenKind::Punctuation if token.text == "(" => {
                let grouped = self.nested(|p| {
                    p.advance()?;
                    let mut inner = p.expression()?;
                    let close = p.consume(TokenKind::Punctuation, Some(")"))?;
                    inner.span = Span::new(token, close);

                    Ok(inner)
                })?;

                self.properties(grouped)
            }

            TokenKind::Identifier => {
                self.advance()?;

                let symbol = Expr::new(
                    ExprKind::Symbol(SymbolRef {
                        token: token.clone(),
                    }),
                    Span::single(token),
                );

                self.properties(symbol)
            }

            TokenKind::Number => {
                self.advance()?;

                let value: f64 = token.text.parse().map_err(|_| {
                    SurveyError::syntax(
                        token.line(),
                        token.column(),
                        format!("Invalid number literal: {}", token.text),
                    )
                })?;

                Ok(Expr::new(ExprKind::Number(value), Span::single(token)))
            }

            TokenKind::String => {
                self.advance()?;

                Ok(Expr::new(
                    ExprKind::String(token.text.clone()),
                    Span::single(token),
                ))
            }

            TokenKind::ValueKeyword => {
                self.advance()?;

                let kind = match &*token.text {
                    "true" => ExprKind::Boolean(true),
                    "false" => ExprKind::Boolean(false),
                    _ => ExprKind::Undefined,
                };

                Ok(Expr::new(kind, Span::single(token)))
            }

            TokenKind::Keyword if token.text == "answer" => self.has_answer(),

            _ => Err(self.unexpected()),
        }
    }

    /// `.name` chain on a reference; other expressions are returned as is.
    fn properties(&mut self, mut container: Expr<'a>) -> Result<Expr<'a>> {
        while container.is_reference() && self.check(TokenKind::Punctuation, Some(".")) {
            self.deepen()?;
            self.advance()?;

            if self.current.kind != TokenKind::Identifier {
                return Err(self.error_here("invalid property name"));
            }

            let property = self.current.clone();
            self.advance()?;

            let span = Span::new(container.span.start.clone(), property.clone());

            container = Expr::new(
                ExprKind::PropertyAccess {
                    container: Box::new(container),
                    property,
                },
                span,
            );
        }

        Ok(container)
    }

    /// `answer for q1 has (r1, r2)`
    fn has_answer(&mut self) -> Result<Expr<'a>> {
        let start = self.consume(TokenKind::Keyword, Some("answer"))?;
        self.consume(TokenKind::Keyword, Some("for"))?;

        let question = SymbolRef {
            token: self.consume(TokenKind::Identifier, None)?,
        };

        let mode = match AnswerMode::from_keyword(&self.current.text) {
            Some(mode) if self.current.kind == TokenKind::CallKeyword => mode,
            _ => return Err(self.unexpected()),
        };

        self.advance()?;

        let answers = self.arguments()?;

        Ok(Expr::new(
            ExprKind::HasAnswer {
                question,
                mode,
                answers,
            },
            self.span_from(start),
        ))
    }

    // ────────────────────── utility helpers ───────────────────────

    /// Next token from the underlying stream.  A stream that stops without an
    /// end‑of‑input marker is reported at the last known position.
    fn pull(&mut self) -> Result<Token<'a>> {
        match self.tokens.next() {
            Some(token) => token,
            None => Err(SurveyError::syntax(
                self.current.line(),
                self.current.column(),
                "token stream ended before end of input",
            )),
        }
    }

    /// Move to the next token.  Never moves past the end‑of‑input marker.
    fn advance(&mut self) -> Result<()> {
        if self.current.kind == TokenKind::EndOfInput {
            return Ok(());
        }

        let next = self.pull()?;

        self.previous = std::mem::replace(&mut self.current, next);

        Ok(())
    }

    #[inline(always)]
    fn check(&self, kind: TokenKind, value: Option<&str>) -> bool {
        self.current.is(kind, value)
    }

    #[inline(always)]
    fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current.kind)
    }

    #[inline(always)]
    fn matches(&mut self, kind: TokenKind, value: Option<&str>) -> Result<bool> {
        if self.check(kind, value) {
            self.advance()?;

            return Ok(true);
        }

        Ok(false)
    }

    /// Take the current token if it matches, else fail with an expectation
    /// error.
    fn consume(&mut self, kind: TokenKind, value: Option<&str>) -> Result<Token<'a>> {
        if !self.check(kind, value) {
            return Err(self.expectation(kind, value));
        }

        let token = self.current.clone();
        self.advance()?;

        Ok(token)
    }

    fn binary_operator(&self) -> Option<BinaryOp> {
        if self.current.kind != TokenKind::Operator {
            return None;
        }

        BinaryOp::from_lexeme(&self.current.text)
    }

    /// Run a nested production under the depth limit.
    fn nested<T>(&mut self, production: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.config.max_nesting {
            return Err(self.error_here("nesting too deep"));
        }

        self.depth += 1;
        let result = production(self);
        self.depth -= 1;

        result
    }

    /// Parse an expression that no other expression contains.  Every link
    /// charged inside it counts against one budget, which bounds the height
    /// of its tree.
    fn root<T>(&mut self, production: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = std::mem::replace(&mut self.expression_depth, 0);
        let result = production(self);
        self.expression_depth = saved;

        result
    }

    /// Charge one more level of expression tree.
    fn deepen(&mut self) -> Result<()> {
        if self.expression_depth >= self.config.max_expression_depth {
            return Err(self.error_here("nesting too deep"));
        }

        self.expression_depth += 1;

        Ok(())
    }

    /// Span from `start` to the last consumed token.
    fn span_from(&self, start: Token<'a>) -> Span<'a> {
        Span::new(start, self.previous.clone())
    }

    fn error_here(&self, message: impl Into<String>) -> SurveyError {
        SurveyError::syntax(self.current.line(), self.current.column(), message)
    }

    fn expectation(&self, kind: TokenKind, value: Option<&str>) -> SurveyError {
        let expected = value.unwrap_or_else(|| kind.describe());

        debug!("Expected {} at {}", expected, self.current);

        self.error_here(format!(
            "expecting {} but found {}",
            expected,
            self.current.found()
        ))
    }

    fn unexpected(&self) -> SurveyError {
        self.error_here(format!("unexpected token: {}", self.current.found()))
    }
}
