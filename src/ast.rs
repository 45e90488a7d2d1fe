//! **Abstract syntax tree** of a survey document.
//!
//! Every node carries a [`Span`] made of the first and last tokens it was built
//! from; both are taken from the real token stream so diagnostics can point at
//! either end of a construct.  Lifetimes `'a` tie token text back to the source.
//!
//! Two legality rules are enforced by the types themselves:
//! * a [`SimpleStatement`] wraps an [`Expr`], so its body can never be another
//!   statement;
//! * the target of an assignment is a [`SymbolRef`], so a property access (a
//!   member of a survey‑managed handle) can never be assigned to.

use crate::token::Token;
use phf::phf_map;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// First and last token of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span<'a> {
    pub start: Token<'a>,
    pub end: Token<'a>,
}

impl<'a> Span<'a> {
    pub fn new(start: Token<'a>, end: Token<'a>) -> Self {
        Self { start, end }
    }

    /// A node made of a single token.
    pub fn single(token: Token<'a>) -> Self {
        Self {
            start: token.clone(),
            end: token,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Survey components
// ─────────────────────────────────────────────────────────────────────────────

/// Root of the tree: survey components in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document<'a> {
    pub components: Vec<SurveyComponent<'a>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SurveyComponent<'a> {
    Question(Question<'a>),
    Section(Section<'a>),
    Interlude(Interlude<'a>),
}

impl<'a> SurveyComponent<'a> {
    pub fn span(&self) -> &Span<'a> {
        match self {
            SurveyComponent::Question(q) => &q.span,
            SurveyComponent::Section(s) => &s.span,
            SurveyComponent::Interlude(i) => &i.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question<'a> {
    pub texts: Vec<TextPart<'a>>,
    pub attributes: Vec<Attribute<'a>>,
    pub rows: Vec<AnswerOption<'a>>,
    pub columns: Vec<AnswerOption<'a>>,
    pub span: Span<'a>,
}

/// An attribute block that is not followed by question text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section<'a> {
    pub attributes: Vec<Attribute<'a>>,
    pub span: Span<'a>,
}

/// A top‑level logic block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interlude<'a> {
    pub statements: Vec<Statement<'a>>,
    pub span: Span<'a>,
}

/// A row or a column of a question; which one is decided by the `col`
/// attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOption<'a> {
    pub texts: Vec<TextPart<'a>>,
    pub attributes: Vec<Attribute<'a>>,
    pub span: Span<'a>,
}

impl<'a> AnswerOption<'a> {
    pub fn is_column(&self) -> bool {
        self.attributes.iter().any(|a| !a.is_custom && a.name == "col")
    }
}

/// Anything that owns an attribute list.
pub trait Attributed<'a> {
    fn attributes(&self) -> &[Attribute<'a>];

    fn attribute(&self, name: &str) -> Option<&Attribute<'a>> {
        self.attributes().iter().find(|a| a.name == name)
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// The declared name: the value of the single custom attribute.
    fn name<'s>(&'s self) -> Option<&'s str>
    where
        'a: 's,
    {
        let mut custom = self.attributes().iter().filter(|a| a.is_custom);

        match (custom.next(), custom.next()) {
            (Some(only), None) => Some(only.name.as_ref()),
            _ => None,
        }
    }
}

impl<'a> Attributed<'a> for Question<'a> {
    fn attributes(&self) -> &[Attribute<'a>] {
        &self.attributes
    }
}

impl<'a> Attributed<'a> for Section<'a> {
    fn attributes(&self) -> &[Attribute<'a>] {
        &self.attributes
    }
}

impl<'a> Attributed<'a> for AnswerOption<'a> {
    fn attributes(&self) -> &[Attribute<'a>] {
        &self.attributes
    }
}

/// One fragment of question or option text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TextPart<'a> {
    /// A trimmed text run.
    Text(Token<'a>),

    /// `${ expression }`
    Embedded(SimpleStatement<'a>),
}

/// `name`, `@name`, `@name="value"` or `@name=${expression}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute<'a> {
    pub name: Cow<'a, str>,
    pub value: Option<AttributeValue<'a>>,

    /// Bare identifiers are custom attributes and name their owner.
    pub is_custom: bool,
    pub span: Span<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeValue<'a> {
    /// A quoted string; the token text is the decoded value.
    Str(Token<'a>),

    /// `${ expression }`
    Embedded(SimpleStatement<'a>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement<'a> {
    Simple(SimpleStatement<'a>),
    Rule(RuleDef<'a>),
    Action(ActionDef<'a>),
    ConditionSet(ConditionSetDef<'a>),
    Declaration(SymbolDec<'a>),
    Command(BuiltInCommandCall<'a>),
    Evaluate(Invocation<'a>),
    Do(Invocation<'a>),
}

impl<'a> Statement<'a> {
    pub fn span(&self) -> &Span<'a> {
        match self {
            Statement::Simple(s) => &s.span,
            Statement::Rule(r) => &r.span,
            Statement::Action(a) => &a.span,
            Statement::ConditionSet(c) => &c.span,
            Statement::Declaration(d) => &d.span,
            Statement::Command(c) => &c.span,
            Statement::Evaluate(i) | Statement::Do(i) => &i.span,
        }
    }
}

/// An expression used as a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimpleStatement<'a> {
    pub expression: Expr<'a>,
    pub span: Span<'a>,
}

/// `{ statement* }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatement<'a> {
    pub statements: Vec<Statement<'a>>,
    pub span: Span<'a>,
}

/// `rule NAME : | cond | cond { … }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDef<'a> {
    pub name: Token<'a>,
    pub conditions: Vec<SimpleStatement<'a>>,
    pub action: BlockStatement<'a>,
    pub span: Span<'a>,
}

/// `action NAME { … }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDef<'a> {
    pub name: Token<'a>,
    pub action: BlockStatement<'a>,
    pub span: Span<'a>,
}

/// `conditions NAME : | cond | cond end`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSetDef<'a> {
    pub name: Token<'a>,
    pub conditions: Vec<SimpleStatement<'a>>,
    pub span: Span<'a>,
}

/// `def NAME [= expression]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDec<'a> {
    pub name: Token<'a>,
    pub initializer: Option<Expr<'a>>,
    pub span: Span<'a>,
}

/// `hide(q1, q2)`, `go_to(q3)`, `terminate()` …
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltInCommandCall<'a> {
    pub name: Token<'a>,
    pub args: Vec<Expr<'a>>,
    pub span: Span<'a>,
}

/// `evaluate NAME` or `do NAME`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation<'a> {
    pub target: SymbolRef<'a>,
    pub span: Span<'a>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────────

/// A bare name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolRef<'a> {
    pub token: Token<'a>,
}

impl<'a> SymbolRef<'a> {
    pub fn name(&self) -> &str {
        &self.token.text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr<'a> {
    pub kind: ExprKind<'a>,
    pub span: Span<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind<'a> {
    Binary {
        left: Box<Expr<'a>>,
        op: BinaryOp,
        right: Box<Expr<'a>>,
    },

    /// `name = value`; the operator is always `=`.
    Assign {
        target: SymbolRef<'a>,
        value: Box<Expr<'a>>,
    },

    Symbol(SymbolRef<'a>),

    /// `container.property`, chained left to right.
    PropertyAccess {
        container: Box<Expr<'a>>,
        property: Token<'a>,
    },

    Number(f64),

    String(Cow<'a, str>),

    Boolean(bool),

    Undefined,

    /// `answer for q1 has (r1, r2)`
    HasAnswer {
        question: SymbolRef<'a>,
        mode: AnswerMode,
        answers: Vec<Expr<'a>>,
    },
}

impl<'a> Expr<'a> {
    pub fn new(kind: ExprKind<'a>, span: Span<'a>) -> Self {
        Self { kind, span }
    }

    /// Is this a plain name or a chain of member accesses on one?
    pub fn is_reference(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Symbol(_) | ExprKind::PropertyAccess { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerMode {
    #[serde(rename = "has")]
    Has,
    #[serde(rename = "has_not")]
    HasNot,
    #[serde(rename = "only_has")]
    OnlyHas,
}

impl AnswerMode {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "has" => Some(AnswerMode::Has),
            "has_not" => Some(AnswerMode::HasNot),
            "only_has" => Some(AnswerMode::OnlyHas),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            AnswerMode::Has => "has",
            AnswerMode::HasNot => "has_not",
            AnswerMode::OnlyHas => "only_has",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    #[serde(rename = "and")]
    And,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "%")]
    Modulo,
}

static BINARY_OPS: phf::Map<&'static str, BinaryOp> = phf_map! {
    "and" => BinaryOp::And,
    "=="  => BinaryOp::Equal,
    "!="  => BinaryOp::NotEqual,
    "<"   => BinaryOp::Less,
    "<="  => BinaryOp::LessEqual,
    ">"   => BinaryOp::Greater,
    ">="  => BinaryOp::GreaterEqual,
    "+"   => BinaryOp::Add,
    "-"   => BinaryOp::Subtract,
    "*"   => BinaryOp::Multiply,
    "/"   => BinaryOp::Divide,
    "%"   => BinaryOp::Modulo,
};

impl BinaryOp {
    /// The binary operator spelled `lexeme`, if any (`=` and `!` are not).
    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        BINARY_OPS.get(lexeme).copied()
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::And => 1,
            BinaryOp::Equal | BinaryOp::NotEqual => 2,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => 3,
            BinaryOp::Add | BinaryOp::Subtract => 4,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 5,
        }
    }

    pub fn lexeme(self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lexeme())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_lexeme_maps_back_to_its_operator() {
        for (lexeme, op) in BINARY_OPS.entries() {
            assert_eq!(op.lexeme(), *lexeme);
        }
        assert_eq!(BinaryOp::from_lexeme("="), None);
        assert_eq!(BinaryOp::from_lexeme("!"), None);
    }

    #[test]
    fn and_binds_loosest_and_multiplicative_tightest() {
        assert!(BinaryOp::And.precedence() < BinaryOp::Equal.precedence());
        assert!(BinaryOp::Equal.precedence() < BinaryOp::Less.precedence());
        assert!(BinaryOp::Less.precedence() < BinaryOp::Add.precedence());
        assert!(BinaryOp::Add.precedence() < BinaryOp::Modulo.precedence());
    }
}
