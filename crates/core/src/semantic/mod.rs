//! Source parsing and declaration extraction.
//!
//! The semantic layer turns one version of a source file into a
//! [`DeclarationSet`] so the refiner can tell whether two branches touching
//! the same file actually touched the same functions, classes, or methods.

pub mod extract;
pub mod parser;
pub mod syntax;

pub use extract::{extract, extract_source, Declaration, DeclarationKind, DeclarationSet};
pub use parser::{Language, SourceParser, TreeSitterParser};
pub use syntax::{Field, NodeId, SyntaxKind, SyntaxTree};

use crate::errors::ParseError;

/// Parse `source` with the grammar implied by `path` and collect its
/// declarations.
pub fn declarations_for(path: &str, source: &str) -> Result<DeclarationSet, ParseError> {
    let parser = TreeSitterParser::for_path(path)?;
    let decls = extract_source(&parser, source)?;
    Ok(DeclarationSet::from_declarations(&decls))
}
