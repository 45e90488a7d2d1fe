//! Semantic checks run after a successful parse.
//!
//! * **Structure**: every question and option is named exactly once, carries
//!   only attributes that make sense for it, and declares a single question
//!   type compatible with its rows, columns and bounds.
//! * **Attribute values**: order attributes take no value or an embedded
//!   expression, bounds take an integer string or an embedded expression, and
//!   `data` takes a string.
//!
//! Both passes are [`Visitor`]s over the document; the first violation aborts
//! the check.

use crate::ast::{AnswerOption, Attribute, AttributeValue, Document, Question, Section};
use crate::error::{Result, SurveyError};
use crate::lexer::is_attribute_keyword;
use crate::token::Token;
use crate::walker::{self, NodeRef, Visitor};

use log::{debug, info};

const QUESTION_TYPES: &[&str] = &[
    "single_choice",
    "multiple_choice",
    "single_choice_matrix",
    "multi_choice_matrix",
    "text",
    "number",
];

const ROW_ORDER: &[&str] = &["rotate_rows", "randomize_rows"];

const COLUMN_ORDER: &[&str] = &["rotate_columns", "randomize_columns"];

const SELECTION_BOUNDS: &[&str] = &["minimal_selections", "maximum_selections"];

const VALUE_BOUNDS: &[&str] = &["minimal_value", "maximum_value"];

const OPTION_ATTRIBUTES: &[&str] = &["fixed", "data", "xor", "all", "col"];

const OPTION_EXCLUSIVE: &[&str] = &["xor", "all"];

/// Run the structural and attribute‑value passes over `document`.
pub fn check(document: &Document<'_>) -> Result<()> {
    info!("Checking survey structure");

    walker::walk(document, &mut StructureCheck)?;

    info!("Checking attribute values");

    walker::walk(document, &mut ValueCheck)?;

    info!("Semantic checks passed");

    Ok(())
}

#[inline]
fn error_at(token: &Token<'_>, message: impl Into<String>) -> SurveyError {
    SurveyError::semantic(token.line(), token.column(), message)
}

#[inline]
fn builtin<'q, 'a>(attributes: &'q [Attribute<'a>]) -> impl Iterator<Item = &'q Attribute<'a>> {
    attributes.iter().filter(|a| !a.is_custom)
}

// ─────────────────────────────────────────────────────────────────────────────
// Structure
// ─────────────────────────────────────────────────────────────────────────────

struct StructureCheck;

impl<'n, 'a> Visitor<'n, 'a> for StructureCheck {
    fn enter(&mut self, node: NodeRef<'n, 'a>) -> Result<()> {
        match node {
            NodeRef::Question(question) => check_question(question),
            NodeRef::Section(section) => check_section(section),
            NodeRef::Row(option) => check_option(option, "Row"),
            NodeRef::Column(option) => check_option(option, "Column"),
            _ => Ok(()),
        }
    }
}

fn check_question(question: &Question<'_>) -> Result<()> {
    debug!("Checking question at {}", question.span.start.position);

    check_name(&question.attributes, &question.span.start, "Question")?;

    for attribute in builtin(&question.attributes) {
        if !is_attribute_keyword(&attribute.name) {
            return Err(error_at(
                &attribute.span.start,
                format!("{} is not a recognised attribute", attribute.name),
            ));
        }
    }

    check_duplicates(&question.attributes)?;
    check_exclusive(&question.attributes, ROW_ORDER)?;
    check_exclusive(&question.attributes, COLUMN_ORDER)?;
    check_exclusive(&question.attributes, QUESTION_TYPES)?;

    let kind = match builtin(&question.attributes).find(|a| QUESTION_TYPES.contains(&&*a.name)) {
        Some(attribute) => &*attribute.name,
        None => {
            return Err(error_at(
                &question.span.start,
                "You need to specify question type",
            ))
        }
    };

    let open_ended = matches!(kind, "number" | "text");
    let single_axis = open_ended || matches!(kind, "single_choice" | "multiple_choice");

    if open_ended {
        if let Some(row) = question.rows.first() {
            return Err(error_at(
                &row.span.start,
                format!("{} questions cannot have rows", kind),
            ));
        }

        forbid(question, ROW_ORDER, kind)?;
    }

    if single_axis {
        if let Some(column) = question.columns.first() {
            return Err(error_at(
                &column.span.start,
                format!("{} questions cannot have columns", kind),
            ));
        }

        forbid(question, COLUMN_ORDER, kind)?;
    }

    if open_ended {
        forbid(question, SELECTION_BOUNDS, kind)?;
        forbid(question, VALUE_BOUNDS, kind)?;
    }

    if matches!(kind, "single_choice_matrix" | "multi_choice_matrix") {
        for row in &question.rows {
            for attribute in builtin(&row.attributes) {
                match &*attribute.name {
                    "xor" => {
                        return Err(error_at(
                            &attribute.span.start,
                            "xor attribute does not apply to rows in matrix questions",
                        ))
                    }
                    "all" => {
                        return Err(error_at(
                            &attribute.span.start,
                            "'all' attribute does not apply to rows in matrix questions",
                        ))
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

fn check_section(section: &Section<'_>) -> Result<()> {
    debug!("Checking section at {}", section.span.start.position);

    for attribute in builtin(&section.attributes) {
        if !is_attribute_keyword(&attribute.name) {
            return Err(error_at(
                &attribute.span.start,
                format!("{} is not a recognised attribute", attribute.name),
            ));
        }
    }

    check_duplicates(&section.attributes)
}

fn check_option(option: &AnswerOption<'_>, what: &str) -> Result<()> {
    check_name(&option.attributes, &option.span.start, what)?;

    for attribute in builtin(&option.attributes) {
        if !OPTION_ATTRIBUTES.contains(&&*attribute.name) {
            return Err(error_at(
                &attribute.span.start,
                format!("{} does not apply to option", attribute.name),
            ));
        }
    }

    check_duplicates(&option.attributes)?;
    check_exclusive(&option.attributes, OPTION_EXCLUSIVE)
}

/// Exactly one custom attribute names the owner.
fn check_name(attributes: &[Attribute<'_>], owner: &Token<'_>, what: &str) -> Result<()> {
    let names: Vec<&Attribute<'_>> = attributes.iter().filter(|a| a.is_custom).collect();

    match names.as_slice() {
        [] => Err(error_at(owner, format!("{} has no name", what))),
        [_] => Ok(()),
        [_, second, ..] => {
            let listed: Vec<&str> = names.iter().map(|a| &*a.name).collect();

            Err(error_at(
                &second.span.start,
                format!("more than one name found: {}", listed.join(", ")),
            ))
        }
    }
}

/// Reports the second occurrence of the first repeated name.
fn check_duplicates(attributes: &[Attribute<'_>]) -> Result<()> {
    for (i, attribute) in attributes.iter().enumerate() {
        if attributes[..i].iter().any(|a| a.name == attribute.name) {
            return Err(error_at(
                &attribute.span.start,
                format!("Duplicate attributes: {}", attribute.name),
            ));
        }
    }

    Ok(())
}

/// At most one attribute of `group`; the message lists them in source order.
fn check_exclusive(attributes: &[Attribute<'_>], group: &[&str]) -> Result<()> {
    let present: Vec<&Attribute<'_>> = builtin(attributes)
        .filter(|a| group.contains(&&*a.name))
        .collect();

    if let [_, second, ..] = present.as_slice() {
        let listed: Vec<&str> = present.iter().map(|a| &*a.name).collect();

        return Err(error_at(
            &second.span.start,
            format!("Duplicate kinds of attributes: {}", listed.join(", ")),
        ));
    }

    Ok(())
}

fn forbid(question: &Question<'_>, names: &[&str], kind: &str) -> Result<()> {
    match builtin(&question.attributes).find(|a| names.contains(&&*a.name)) {
        Some(attribute) => Err(error_at(
            &attribute.span.start,
            format!("{} does not apply to {} questions", attribute.name, kind),
        )),
        None => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attribute values
// ─────────────────────────────────────────────────────────────────────────────

struct ValueCheck;

impl<'n, 'a> Visitor<'n, 'a> for ValueCheck {
    fn enter(&mut self, node: NodeRef<'n, 'a>) -> Result<()> {
        match node {
            NodeRef::Attribute(attribute) if !attribute.is_custom => check_value(attribute),
            _ => Ok(()),
        }
    }
}

fn check_value(attribute: &Attribute<'_>) -> Result<()> {
    let name = &*attribute.name;

    if ROW_ORDER.contains(&name) || COLUMN_ORDER.contains(&name) {
        if let Some(AttributeValue::Str(_)) = attribute.value {
            return Err(error_at(
                &attribute.span.end,
                format!(
                    "{} either does not have value or has a simple expression as value",
                    name
                ),
            ));
        }
    } else if SELECTION_BOUNDS.contains(&name) || VALUE_BOUNDS.contains(&name) {
        match &attribute.value {
            Some(AttributeValue::Str(value)) if parse_integer(&value.text).is_none() => {
                return Err(error_at(
                    value,
                    format!("cannot parse the value of {} to an integer", name),
                ))
            }
            Some(_) => {}
            None => {
                return Err(error_at(
                    &attribute.span.start,
                    format!(
                        "{} needs to have a string or a simple expression as value",
                        name
                    ),
                ))
            }
        }
    } else if name == "data" && !matches!(attribute.value, Some(AttributeValue::Str(_))) {
        return Err(error_at(
            &attribute.span.start,
            "data needs to have a string as value",
        ));
    }

    Ok(())
}

/// `" 12 "`, `"-3"` and `"4.0"` are integers; `"1.5"`, `"abc"` and `"1e999"`
/// are not.
fn parse_integer(text: &str) -> Option<i64> {
    let value: f64 = text.trim().parse().ok()?;

    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}
