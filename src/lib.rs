//! Front end for a survey‑authoring language.
//!
//! A survey document interleaves question blocks (`<< … >>` attributes,
//! free text, `[ … ]` answer options) with logic blocks (`<% … %>`) written in
//! a small rule language.  The pipeline is
//!
//! ```text
//! source ─▶ Lexer ─▶ Parser ─▶ checker::check ─▶ SymbolTable::build
//! ```
//!
//! and stops at the first error.

pub mod ast;
pub mod checker;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod scope;
pub mod token;
pub mod walker;

use ast::Document;
use error::Result;
use lexer::Lexer;
use parser::{Parser, ParserConfig};
use scope::SymbolTable;

use log::info;

/// Run the semantic checks and build the symbol table of a parsed document.
pub fn analyze<'n, 'a>(document: &'n Document<'a>) -> Result<SymbolTable<'n, 'a>> {
    checker::check(document)?;
    SymbolTable::build(document)
}

/// Lex, parse and analyze `source` with the default parser limits.
pub fn compile(source: &str) -> Result<Document<'_>> {
    compile_with(source, ParserConfig::default())
}

pub fn compile_with(source: &str, config: ParserConfig) -> Result<Document<'_>> {
    info!("Compiling {} byte(s) of survey source", source.len());

    let document = Parser::with_config(Lexer::new(source), config).parse()?;
    analyze(&document)?;

    Ok(document)
}
