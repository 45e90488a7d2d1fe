//! Generic depth‑first walk over a [`Document`].
//!
//! [`walk`] calls [`Visitor::enter`] on a node, walks its children in source
//! order, then calls [`Visitor::leave`].  The first error returned by a
//! callback stops the walk and is handed back to the caller.
//!
//! Nodes are passed as [`NodeRef`], one variant per kind of AST node.  Every
//! `match` in this module is exhaustive, so a new AST variant cannot be added
//! without deciding how it is walked.

use crate::ast::{
    ActionDef, AnswerOption, Attribute, AttributeValue, BlockStatement, BuiltInCommandCall,
    ConditionSetDef, Document, Expr, ExprKind, Interlude, Invocation, Question, RuleDef,
    Section, SimpleStatement, Statement, SurveyComponent, SymbolDec, SymbolRef, TextPart,
};
use crate::error::Result;
use crate::token::{Position, Token};

use log::info;

/// A borrowed view of one AST node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'n, 'a> {
    Question(&'n Question<'a>),
    Section(&'n Section<'a>),
    Interlude(&'n Interlude<'a>),
    Row(&'n AnswerOption<'a>),
    Column(&'n AnswerOption<'a>),
    Attribute(&'n Attribute<'a>),
    Text(&'n Token<'a>),
    SimpleStatement(&'n SimpleStatement<'a>),
    BlockStatement(&'n BlockStatement<'a>),
    RuleDef(&'n RuleDef<'a>),
    ActionDef(&'n ActionDef<'a>),
    ConditionSetDef(&'n ConditionSetDef<'a>),
    SymbolDec(&'n SymbolDec<'a>),
    BuiltInCommandCall(&'n BuiltInCommandCall<'a>),
    Evaluate(&'n Invocation<'a>),
    Do(&'n Invocation<'a>),
    Binary(&'n Expr<'a>),
    Assign(&'n Expr<'a>),
    SymbolRef(&'n SymbolRef<'a>),
    PropertyAccess(&'n Expr<'a>),
    Number(&'n Expr<'a>),
    String(&'n Expr<'a>),
    Boolean(&'n Expr<'a>),
    Undefined(&'n Expr<'a>),
    HasAnswer(&'n Expr<'a>),
}

impl<'n, 'a> NodeRef<'n, 'a> {
    /// First and last token of the node.
    pub fn bounds(&self) -> (&'n Token<'a>, &'n Token<'a>) {
        let span = match *self {
            NodeRef::Question(q) => &q.span,
            NodeRef::Section(s) => &s.span,
            NodeRef::Interlude(i) => &i.span,
            NodeRef::Row(o) | NodeRef::Column(o) => &o.span,
            NodeRef::Attribute(a) => &a.span,
            NodeRef::Text(t) => return (t, t),
            NodeRef::SimpleStatement(s) => &s.span,
            NodeRef::BlockStatement(b) => &b.span,
            NodeRef::RuleDef(r) => &r.span,
            NodeRef::ActionDef(a) => &a.span,
            NodeRef::ConditionSetDef(c) => &c.span,
            NodeRef::SymbolDec(d) => &d.span,
            NodeRef::BuiltInCommandCall(c) => &c.span,
            NodeRef::Evaluate(i) | NodeRef::Do(i) => &i.span,
            NodeRef::SymbolRef(s) => return (&s.token, &s.token),
            NodeRef::Binary(e)
            | NodeRef::Assign(e)
            | NodeRef::PropertyAccess(e)
            | NodeRef::Number(e)
            | NodeRef::String(e)
            | NodeRef::Boolean(e)
            | NodeRef::Undefined(e)
            | NodeRef::HasAnswer(e) => &e.span,
        };

        (&span.start, &span.end)
    }

    /// Where the node starts in the source.
    pub fn position(&self) -> Position {
        self.bounds().0.position
    }
}

impl<'n, 'a> From<&'n SurveyComponent<'a>> for NodeRef<'n, 'a> {
    fn from(component: &'n SurveyComponent<'a>) -> Self {
        match component {
            SurveyComponent::Question(q) => NodeRef::Question(q),
            SurveyComponent::Section(s) => NodeRef::Section(s),
            SurveyComponent::Interlude(i) => NodeRef::Interlude(i),
        }
    }
}

impl<'n, 'a> From<&'n TextPart<'a>> for NodeRef<'n, 'a> {
    fn from(part: &'n TextPart<'a>) -> Self {
        match part {
            TextPart::Text(token) => NodeRef::Text(token),
            TextPart::Embedded(s) => NodeRef::SimpleStatement(s),
        }
    }
}

impl<'n, 'a> From<&'n Statement<'a>> for NodeRef<'n, 'a> {
    fn from(statement: &'n Statement<'a>) -> Self {
        match statement {
            Statement::Simple(s) => NodeRef::SimpleStatement(s),
            Statement::Rule(r) => NodeRef::RuleDef(r),
            Statement::Action(a) => NodeRef::ActionDef(a),
            Statement::ConditionSet(c) => NodeRef::ConditionSetDef(c),
            Statement::Declaration(d) => NodeRef::SymbolDec(d),
            Statement::Command(c) => NodeRef::BuiltInCommandCall(c),
            Statement::Evaluate(i) => NodeRef::Evaluate(i),
            Statement::Do(i) => NodeRef::Do(i),
        }
    }
}

impl<'n, 'a> From<&'n Expr<'a>> for NodeRef<'n, 'a> {
    fn from(expr: &'n Expr<'a>) -> Self {
        match &expr.kind {
            ExprKind::Binary { .. } => NodeRef::Binary(expr),
            ExprKind::Assign { .. } => NodeRef::Assign(expr),
            ExprKind::Symbol(symbol) => NodeRef::SymbolRef(symbol),
            ExprKind::PropertyAccess { .. } => NodeRef::PropertyAccess(expr),
            ExprKind::Number(_) => NodeRef::Number(expr),
            ExprKind::String(_) => NodeRef::String(expr),
            ExprKind::Boolean(_) => NodeRef::Boolean(expr),
            ExprKind::Undefined => NodeRef::Undefined(expr),
            ExprKind::HasAnswer { .. } => NodeRef::HasAnswer(expr),
        }
    }
}

/// Callbacks invoked by [`walk`].  Both default to doing nothing.
pub trait Visitor<'n, 'a> {
    fn enter(&mut self, _node: NodeRef<'n, 'a>) -> Result<()> {
        Ok(())
    }

    fn leave(&mut self, _node: NodeRef<'n, 'a>) -> Result<()> {
        Ok(())
    }
}

/// Walk every component of `document` in source order.
pub fn walk<'n, 'a, V>(document: &'n Document<'a>, visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    info!("Walking {} survey component(s)", document.components.len());

    for component in &document.components {
        walk_node(component.into(), visitor)?;
    }

    Ok(())
}

/// Walk one node and everything below it.
pub fn walk_node<'n, 'a, V>(node: NodeRef<'n, 'a>, visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    visitor.enter(node)?;

    match node {
        NodeRef::Question(q) => {
            walk_texts(&q.texts, visitor)?;
            walk_attributes(&q.attributes, visitor)?;

            for row in &q.rows {
                walk_node(NodeRef::Row(row), visitor)?;
            }
            for column in &q.columns {
                walk_node(NodeRef::Column(column), visitor)?;
            }
        }

        NodeRef::Section(s) => walk_attributes(&s.attributes, visitor)?,

        NodeRef::Interlude(i) => walk_statements(&i.statements, visitor)?,

        NodeRef::Row(o) | NodeRef::Column(o) => {
            walk_texts(&o.texts, visitor)?;
            walk_attributes(&o.attributes, visitor)?;
        }

        NodeRef::Attribute(a) => match &a.value {
            Some(AttributeValue::Embedded(s)) => walk_node(NodeRef::SimpleStatement(s), visitor)?,
            Some(AttributeValue::Str(_)) | None => {}
        },

        NodeRef::Text(_) => {}

        NodeRef::SimpleStatement(s) => walk_node((&s.expression).into(), visitor)?,

        NodeRef::BlockStatement(b) => walk_statements(&b.statements, visitor)?,

        NodeRef::RuleDef(r) => {
            walk_conditions(&r.conditions, visitor)?;
            walk_node(NodeRef::BlockStatement(&r.action), visitor)?;
        }

        NodeRef::ActionDef(a) => walk_node(NodeRef::BlockStatement(&a.action), visitor)?,

        NodeRef::ConditionSetDef(c) => walk_conditions(&c.conditions, visitor)?,

        NodeRef::SymbolDec(d) => {
            if let Some(init) = &d.initializer {
                walk_node(init.into(), visitor)?;
            }
        }

        NodeRef::BuiltInCommandCall(c) => {
            for arg in &c.args {
                walk_node(arg.into(), visitor)?;
            }
        }

        NodeRef::Evaluate(i) | NodeRef::Do(i) => walk_node(NodeRef::SymbolRef(&i.target), visitor)?,

        NodeRef::SymbolRef(_) => {}

        NodeRef::Binary(e)
        | NodeRef::Assign(e)
        | NodeRef::PropertyAccess(e)
        | NodeRef::Number(e)
        | NodeRef::String(e)
        | NodeRef::Boolean(e)
        | NodeRef::Undefined(e)
        | NodeRef::HasAnswer(e) => walk_expression_children(e, visitor)?,
    }

    visitor.leave(node)
}

fn walk_expression_children<'n, 'a, V>(expr: &'n Expr<'a>, visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    match &expr.kind {
        ExprKind::Binary { left, right, .. } => {
            walk_node((&**left).into(), visitor)?;
            walk_node((&**right).into(), visitor)
        }

        ExprKind::Assign { target, value } => {
            walk_node(NodeRef::SymbolRef(target), visitor)?;
            walk_node((&**value).into(), visitor)
        }

        ExprKind::PropertyAccess { container, .. } => walk_node((&**container).into(), visitor),

        ExprKind::HasAnswer {
            question, answers, ..
        } => {
            walk_node(NodeRef::SymbolRef(question), visitor)?;

            for answer in answers {
                walk_node(answer.into(), visitor)?;
            }

            Ok(())
        }

        ExprKind::Symbol(_)
        | ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Boolean(_)
        | ExprKind::Undefined => Ok(()),
    }
}

fn walk_texts<'n, 'a, V>(texts: &'n [TextPart<'a>], visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    texts.iter().try_for_each(|part| walk_node(part.into(), visitor))
}

fn walk_attributes<'n, 'a, V>(attributes: &'n [Attribute<'a>], visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    attributes
        .iter()
        .try_for_each(|a| walk_node(NodeRef::Attribute(a), visitor))
}

fn walk_statements<'n, 'a, V>(statements: &'n [Statement<'a>], visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    statements
        .iter()
        .try_for_each(|s| walk_node(s.into(), visitor))
}

fn walk_conditions<'n, 'a, V>(conditions: &'n [SimpleStatement<'a>], visitor: &mut V) -> Result<()>
where
    V: Visitor<'n, 'a> + ?Sized,
{
    conditions
        .iter()
        .try_for_each(|c| walk_node(NodeRef::SimpleStatement(c), visitor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
        depth: isize,
    }

    impl<'n, 'a> Visitor<'n, 'a> for Trace {
        fn enter(&mut self, node: NodeRef<'n, 'a>) -> Result<()> {
            self.depth += 1;
            let label = match node {
                NodeRef::SymbolRef(s) => format!("sym {}", s.name()),
                NodeRef::Binary(_) => "binary".to_string(),
                NodeRef::Number(_) => "number".to_string(),
                NodeRef::Interlude(_) => "interlude".to_string(),
                NodeRef::SimpleStatement(_) => "stmt".to_string(),
                NodeRef::Assign(_) => "assign".to_string(),
                other => format!("{:?}", std::mem::discriminant(&other)),
            };
            self.events.push(label);
            Ok(())
        }

        fn leave(&mut self, _node: NodeRef<'n, 'a>) -> Result<()> {
            self.depth -= 1;
            Ok(())
        }
    }

    #[test]
    fn expressions_are_visited_left_to_right() {
        let doc = Parser::from_source("<% x = a + 1 %>").parse().unwrap();
        let mut trace = Trace::default();

        walk(&doc, &mut trace).unwrap();

        assert_eq!(
            trace.events,
            ["interlude", "stmt", "assign", "sym x", "binary", "sym a", "number"]
        );
        assert_eq!(trace.depth, 0);
    }

    #[test]
    fn first_error_stops_the_walk() {
        struct FailOnSymbol(usize);

        impl<'n, 'a> Visitor<'n, 'a> for FailOnSymbol {
            fn enter(&mut self, node: NodeRef<'n, 'a>) -> Result<()> {
                if let NodeRef::SymbolRef(s) = node {
                    self.0 += 1;
                    let pos = s.token.position;
                    return Err(crate::error::SurveyError::semantic(pos.line, pos.column, "stop"));
                }
                Ok(())
            }
        }

        let doc = Parser::from_source("<% a b c %>").parse().unwrap();
        let mut visitor = FailOnSymbol(0);

        let err = walk(&doc, &mut visitor).unwrap_err();
        assert_eq!(err.column(), 4);
        assert_eq!(visitor.0, 1);
    }
}
