use crate::ast::{Expr, ExprKind, Statement};
use std::fmt;

/// Renders expressions and logic statements in parenthesised prefix form,
/// e.g. `(+ 1 (* 2 3))`.  Used by the driver and by tests to compare trees
/// without spelling out spans.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr<'_>) -> String {
        match &expr.kind {
            // ── literals ────────────────────────────────────────────────
            ExprKind::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    // 3.0 → 3
                    format!("{:.0}", n)
                } else {
                    n.to_string()
                }
            }

            ExprKind::String(s) => format!("{:?}", s),

            ExprKind::Boolean(b) => b.to_string(),

            ExprKind::Undefined => "undefined".into(),

            // ── names ───────────────────────────────────────────────────
            ExprKind::Symbol(symbol) => symbol.name().into(),

            ExprKind::PropertyAccess {
                container,
                property,
            } => format!("(. {} {})", Self::print(container), property.text),

            // ── operators ───────────────────────────────────────────────
            ExprKind::Binary { left, op, right } => {
                format!("({} {} {})", op, Self::print(left), Self::print(right))
            }

            ExprKind::Assign { target, value } => {
                format!("(= {} {})", target.name(), Self::print(value))
            }

            ExprKind::HasAnswer {
                question,
                mode,
                answers,
            } => {
                let mut s = format!("({} {}", mode.keyword(), question.name());
                for answer in answers {
                    s.push(' ');
                    s.push_str(&Self::print(answer));
                }
                s.push(')');
                s
            }
        }
    }

    pub fn print_statement(statement: &Statement<'_>) -> String {
        match statement {
            Statement::Simple(simple) => Self::print(&simple.expression),

            Statement::Declaration(dec) => match &dec.initializer {
                Some(init) => format!("(def {} {})", dec.name.text, Self::print(init)),
                None => format!("(def {})", dec.name.text),
            },

            Statement::Command(call) => {
                let mut s = format!("({}", call.name.text);
                for arg in &call.args {
                    s.push(' ');
                    s.push_str(&Self::print(arg));
                }
                s.push(')');
                s
            }

            Statement::Evaluate(inv) => format!("(evaluate {})", inv.target.name()),

            Statement::Do(inv) => format!("(do {})", inv.target.name()),

            Statement::Rule(rule) => {
                let mut s = format!("(rule {}", rule.name.text);
                for cond in &rule.conditions {
                    s.push_str(" | ");
                    s.push_str(&Self::print(&cond.expression));
                }
                s.push(' ');
                s.push_str(&Self::print_block(&rule.action.statements));
                s.push(')');
                s
            }

            Statement::Action(action) => format!(
                "(action {} {})",
                action.name.text,
                Self::print_block(&action.action.statements)
            ),

            Statement::ConditionSet(set) => {
                let mut s = format!("(conditions {}", set.name.text);
                for cond in &set.conditions {
                    s.push_str(" | ");
                    s.push_str(&Self::print(&cond.expression));
                }
                s.push(')');
                s
            }
        }
    }

    fn print_block(statements: &[Statement<'_>]) -> String {
        let inner: Vec<String> = statements.iter().map(Self::print_statement).collect();

        format!("{{{}}}", inner.join(" "))
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&AstPrinter::print(self))
    }
}

impl fmt::Display for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&AstPrinter::print_statement(self))
    }
}
