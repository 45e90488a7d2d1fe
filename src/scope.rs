//! Scopes and symbols of a survey document.
//!
//! A [`SymbolTable`] is an arena of scopes and symbols addressed by
//! [`ScopeId`] and [`SymbolId`].  It borrows the document it was built from
//! (`'n`), so no scope can outlive the node that owns it.
//!
//! Scope chain, innermost first:
//! 1. the member scope of a question, row or column (dotted access `q1.r1`);
//! 2. the block of a `rule` or `action`;
//! 3. the logic block (`<% … %>`) the statement lives in;
//! 4. the global scope holding every named question.
//!
//! [`SymbolTable::build`] walks the document once and enforces one static
//! rule: names managed by the survey (questions, rows, columns) can be neither
//! redeclared nor assigned to.

use crate::ast::{
    ActionDef, AnswerOption, Attributed, BlockStatement, ConditionSetDef, Document, ExprKind,
    Interlude, Question, RuleDef, SurveyComponent, SymbolDec,
};
use crate::error::{Result, SurveyError};
use crate::token::{Position, Token};
use crate::walker::{self, NodeRef, Visitor};

use log::{debug, info};
use std::collections::HashMap;
use std::ptr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(usize);

/// What a scope belongs to.
#[derive(Debug, Clone, Copy)]
pub enum ScopeOwner<'n, 'a> {
    Global,
    Interlude(&'n Interlude<'a>),
    Block(&'n BlockStatement<'a>),

    /// Members of a question, row or column.
    Members(SymbolId),
}

#[derive(Debug, Clone)]
pub struct Scope<'n, 'a> {
    owner: ScopeOwner<'n, 'a>,
    enclosing: Option<ScopeId>,
    symbols: HashMap<&'n str, SymbolId>,
}

impl<'n, 'a> Scope<'n, 'a> {
    pub fn owner(&self) -> ScopeOwner<'n, 'a> {
        self.owner
    }

    pub fn enclosing(&self) -> Option<ScopeId> {
        self.enclosing
    }

    /// Names defined directly in this scope.
    pub fn names(&self) -> impl Iterator<Item = &'n str> + '_ {
        self.symbols.keys().copied()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SymbolKind<'n, 'a> {
    Variable(&'n SymbolDec<'a>),
    Rule(&'n RuleDef<'a>),
    Action(&'n ActionDef<'a>),
    ConditionSet(&'n ConditionSetDef<'a>),
    Question {
        question: &'n Question<'a>,
        members: ScopeId,
    },
    Row {
        option: &'n AnswerOption<'a>,
        members: ScopeId,
    },
    Column {
        option: &'n AnswerOption<'a>,
        members: ScopeId,
    },
}

impl<'n, 'a> SymbolKind<'n, 'a> {
    /// Member scope of a question, row or column.
    pub fn members(&self) -> Option<ScopeId> {
        match *self {
            SymbolKind::Question { members, .. }
            | SymbolKind::Row { members, .. }
            | SymbolKind::Column { members, .. } => Some(members),
            _ => None,
        }
    }

    /// Questions, rows and columns belong to the survey, not to the script.
    pub fn is_managed(&self) -> bool {
        self.members().is_some()
    }

    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Variable(_) => "variable",
            SymbolKind::Rule(_) => "rule",
            SymbolKind::Action(_) => "action",
            SymbolKind::ConditionSet(_) => "conditions",
            SymbolKind::Question { .. } => "question",
            SymbolKind::Row { .. } => "row",
            SymbolKind::Column { .. } => "column",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol<'n, 'a> {
    pub name: &'n str,
    pub defined_in: ScopeId,
    pub kind: SymbolKind<'n, 'a>,
    pub position: Position,
}

/// Arena of every scope and symbol of one document.
#[derive(Debug, Clone)]
pub struct SymbolTable<'n, 'a> {
    scopes: Vec<Scope<'n, 'a>>,
    symbols: Vec<Symbol<'n, 'a>>,
}

impl<'n, 'a> Default for SymbolTable<'n, 'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'n, 'a> SymbolTable<'n, 'a> {
    /// An empty table holding only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                owner: ScopeOwner::Global,
                enclosing: None,
                symbols: HashMap::new(),
            }],
            symbols: Vec::new(),
        }
    }

    /// Build the table for `document`.
    pub fn build(document: &'n Document<'a>) -> Result<Self> {
        info!("Building symbol table");

        let mut builder = TableBuilder {
            table: Self::new(),
            stack: vec![Self::GLOBAL],
        };

        for component in &document.components {
            if let SurveyComponent::Question(question) = component {
                builder.table.define_question(question);
            }
        }

        walker::walk(document, &mut builder)?;

        info!(
            "Symbol table built: {} scope(s), {} live symbol(s)",
            builder.table.scopes.len(),
            builder.table.len()
        );

        Ok(builder.table)
    }

    pub const GLOBAL: ScopeId = ScopeId(0);

    // ───────────────────────── scopes ─────────────────────────

    pub fn add_scope(&mut self, owner: ScopeOwner<'n, 'a>, enclosing: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());

        self.scopes.push(Scope {
            owner,
            enclosing: Some(enclosing),
            symbols: HashMap::new(),
        });

        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope<'n, 'a> {
        &self.scopes[id.0]
    }

    /// Scope opened by a logic block of this document.
    pub fn scope_of_interlude(&self, interlude: &Interlude<'a>) -> Option<ScopeId> {
        self.scopes
            .iter()
            .position(|s| matches!(s.owner, ScopeOwner::Interlude(i) if ptr::eq(i, interlude)))
            .map(ScopeId)
    }

    /// Scope opened by a `rule` or `action` block of this document.
    pub fn scope_of_block(&self, block: &BlockStatement<'a>) -> Option<ScopeId> {
        self.scopes
            .iter()
            .position(|s| matches!(s.owner, ScopeOwner::Block(b) if ptr::eq(b, block)))
            .map(ScopeId)
    }

    // ───────────────────────── symbols ────────────────────────

    /// Define `name` in `scope`.  A later definition of the same name in the
    /// same scope replaces the earlier one.
    pub fn define(
        &mut self,
        scope: ScopeId,
        name: &'n str,
        kind: SymbolKind<'n, 'a>,
        position: Position,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len());

        debug!("Defining {} '{}' in scope {}", kind.label(), name, scope.0);

        self.symbols.push(Symbol {
            name,
            defined_in: scope,
            kind,
            position,
        });

        if let Some(replaced) = self.scopes[scope.0].symbols.insert(name, id) {
            debug!("'{}' replaces symbol {}", name, replaced.0);
        }

        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol<'n, 'a> {
        &self.symbols[id.0]
    }

    /// Look `name` up in `scope`, then in each enclosing scope.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);

        while let Some(id) = current {
            let scope = &self.scopes[id.0];

            if let Some(&symbol) = scope.symbols.get(name) {
                debug!("Resolved '{}' in scope {}", name, id.0);
                return Some(symbol);
            }

            current = scope.enclosing;
        }

        debug!("'{}' is not defined", name);

        None
    }

    /// Look `name` up among the members of a question, row or column only.
    pub fn resolve_member(&self, symbol: SymbolId, name: &str) -> Option<SymbolId> {
        let members = self.symbol(symbol).kind.members()?;

        self.scopes[members.0].symbols.get(name).copied()
    }

    /// Resolve a dotted path such as `["q1", "r1"]` from `scope`.
    pub fn resolve_path(&self, scope: ScopeId, path: &[&str]) -> Option<SymbolId> {
        let (head, rest) = path.split_first()?;

        rest.iter()
            .try_fold(self.resolve(scope, head)?, |symbol, member| {
                self.resolve_member(symbol, member)
            })
    }

    /// Symbols still reachable by name.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol<'n, 'a>> + '_ {
        self.scopes
            .iter()
            .flat_map(|scope| scope.symbols.values())
            .map(|id| &self.symbols[id.0])
    }

    pub fn len(&self) -> usize {
        self.scopes.iter().map(|s| s.symbols.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Define a named question with its named rows and columns.
    fn define_question(&mut self, question: &'n Question<'a>) {
        let Some(name) = question.name() else {
            return;
        };

        let members = self.next_member_scope(Self::GLOBAL);
        let id = self.define(
            Self::GLOBAL,
            name,
            SymbolKind::Question { question, members },
            question.span.start.position,
        );
        debug_assert!(matches!(self.scopes[members.0].owner, ScopeOwner::Members(owner) if owner == id));

        let options = question
            .rows
            .iter()
            .map(|o| (o, false))
            .chain(question.columns.iter().map(|o| (o, true)));

        for (option, is_column) in options {
            let Some(option_name) = option.name() else {
                continue;
            };

            let option_members = self.next_member_scope(members);
            let kind = if is_column {
                SymbolKind::Column {
                    option,
                    members: option_members,
                }
            } else {
                SymbolKind::Row {
                    option,
                    members: option_members,
                }
            };

            self.define(members, option_name, kind, option.span.start.position);
        }
    }

    /// Member scope owned by the next symbol to be defined.
    fn next_member_scope(&mut self, enclosing: ScopeId) -> ScopeId {
        let pending = SymbolId(self.symbols.len());

        self.add_scope(ScopeOwner::Members(pending), enclosing)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Table construction
// ─────────────────────────────────────────────────────────────────────────────

struct TableBuilder<'n, 'a> {
    table: SymbolTable<'n, 'a>,
    stack: Vec<ScopeId>,
}

impl<'n, 'a> TableBuilder<'n, 'a> {
    fn innermost(&self) -> ScopeId {
        self.stack
            .last()
            .copied()
            .unwrap_or(SymbolTable::GLOBAL)
    }

    fn managed(&self, name: &str) -> bool {
        self.table
            .resolve(self.innermost(), name)
            .map_or(false, |id| self.table.symbol(id).kind.is_managed())
    }

    fn declare(&mut self, name: &'n Token<'a>, kind: SymbolKind<'n, 'a>) -> Result<()> {
        if self.managed(&name.text) {
            return Err(SurveyError::semantic(
                name.line(),
                name.column(),
                format!(
                    "{} is managed by the survey and cannot be redeclared",
                    name.text
                ),
            ));
        }

        let scope = self.innermost();
        self.table.define(scope, &name.text, kind, name.position);

        Ok(())
    }

    fn open(&mut self, owner: ScopeOwner<'n, 'a>) {
        let scope = self.table.add_scope(owner, self.innermost());
        self.stack.push(scope);
    }
}

impl<'n, 'a> Visitor<'n, 'a> for TableBuilder<'n, 'a> {
    fn enter(&mut self, node: NodeRef<'n, 'a>) -> Result<()> {
        match node {
            NodeRef::Interlude(interlude) => self.open(ScopeOwner::Interlude(interlude)),
            NodeRef::BlockStatement(block) => self.open(ScopeOwner::Block(block)),
            NodeRef::RuleDef(rule) => self.declare(&rule.name, SymbolKind::Rule(rule))?,
            NodeRef::ActionDef(action) => self.declare(&action.name, SymbolKind::Action(action))?,
            NodeRef::ConditionSetDef(set) => {
                self.declare(&set.name, SymbolKind::ConditionSet(set))?
            }
            NodeRef::SymbolDec(dec) => self.declare(&dec.name, SymbolKind::Variable(dec))?,
            NodeRef::Assign(expr) => {
                if let ExprKind::Assign { target, .. } = &expr.kind {
                    if self.managed(target.name()) {
                        let token = &target.token;

                        return Err(SurveyError::semantic(
                            token.line(),
                            token.column(),
                            format!("{} is managed by the survey and is read-only", token.text),
                        ));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn leave(&mut self, node: NodeRef<'n, 'a>) -> Result<()> {
        if matches!(node, NodeRef::Interlude(_) | NodeRef::BlockStatement(_)) {
            self.stack.pop();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn later_definition_replaces_earlier_one() {
        let doc = Parser::from_source("<% def a = 1 def a = 2 %>").parse().unwrap();
        let table = SymbolTable::build(&doc).unwrap();

        let SurveyComponent::Interlude(interlude) = &doc.components[0] else {
            panic!("expected interlude");
        };
        let scope = table.scope_of_interlude(interlude).unwrap();
        let id = table.resolve(scope, "a").unwrap();

        assert_eq!(table.symbol(id).position.column, 18);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn member_scopes_are_owned_by_their_symbol() {
        let doc = Parser::from_source("<< q1 @single_choice >> Pick [r1] One")
            .parse()
            .unwrap();
        let table = SymbolTable::build(&doc).unwrap();

        let q1 = table.resolve(SymbolTable::GLOBAL, "q1").unwrap();
        let members = table.symbol(q1).kind.members().unwrap();

        assert!(matches!(table.scope(members).owner(), ScopeOwner::Members(id) if id == q1));

        let r1 = table.resolve_member(q1, "r1").unwrap();
        assert_eq!(table.symbol(r1).kind.label(), "row");
        assert_eq!(table.symbol(r1).defined_in, members);
    }
}
