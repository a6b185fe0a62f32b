//! Source parsers producing [`SyntaxTree`]s.
//!
//! [`TreeSitterParser`] wraps the tree-sitter JavaScript and TypeScript
//! grammars and lowers their concrete syntax tree into the arena form used by
//! the extractor. Only named nodes are kept.

use std::path::Path;

use tracing::debug;

use super::syntax::{Field, NodeId, SyntaxKind, SyntaxTree};
use crate::errors::ParseError;

/// Anything that can turn source text into a [`SyntaxTree`].
pub trait SourceParser {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError>;
}

/// Source languages with a bundled grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    /// Pick a language from a file extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JavaScript => write!(f, "javascript"),
            Self::TypeScript => write!(f, "typescript"),
            Self::Tsx => write!(f, "tsx"),
        }
    }
}

/// Tree-sitter backed parser for one [`Language`].
#[derive(Debug, Clone, Copy)]
pub struct TreeSitterParser {
    language: Language,
}

impl TreeSitterParser {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Parser for the language implied by `path`'s extension.
    pub fn for_path(path: &str) -> Result<Self, ParseError> {
        Language::from_path(path)
            .map(Self::new)
            .ok_or_else(|| ParseError::UnsupportedLanguage(path.to_string()))
    }
}

impl SourceParser for TreeSitterParser {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language.grammar())
            .map_err(|e| ParseError::Language(e.to_string()))?;
        let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            let (line, column) = first_error_position(root);
            debug!(language = %self.language, line, column, "source has syntax errors");
            return Err(ParseError::Syntax { line, column });
        }

        Ok(lower(root))
    }
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

/// Copy the named nodes under `root` into a [`SyntaxTree`], walking with a
/// tree cursor so arbitrarily deep sources do not grow the call stack.
fn lower(root: tree_sitter::Node<'_>) -> SyntaxTree {
    let mut tree = SyntaxTree::new(classify(root), root.byte_range());
    let mut cursor = root.walk();
    // Top of the stack is the arena node whose children are being visited.
    let mut parents: Vec<NodeId> = vec![tree.root()];

    if !cursor.goto_first_child() {
        return tree;
    }

    loop {
        let node = cursor.node();
        let parent = *parents.last().unwrap_or(&tree.root());
        let id = if node.is_named() {
            tree.push(
                parent,
                classify(node),
                cursor.field_name().map(field),
                node.byte_range(),
            )
        } else {
            parent
        };

        if cursor.goto_first_child() {
            parents.push(id);
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return tree;
            }
            parents.pop();
        }
    }
}

fn classify(node: tree_sitter::Node<'_>) -> SyntaxKind {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => SyntaxKind::Function,
        "class_declaration" | "abstract_class_declaration" => SyntaxKind::Class,
        "method_definition" => SyntaxKind::Method,
        "variable_declarator" if binds_function(node) => SyntaxKind::Function,
        "identifier"
        | "property_identifier"
        | "private_property_identifier"
        | "type_identifier" => SyntaxKind::Identifier,
        _ => SyntaxKind::Other,
    }
}

/// `const name = function () {}` / `const name = () => {}`.
fn binds_function(declarator: tree_sitter::Node<'_>) -> bool {
    let named = declarator
        .child_by_field_name("name")
        .is_some_and(|n| n.kind() == "identifier");
    let value_is_function = declarator.child_by_field_name("value").is_some_and(|v| {
        matches!(
            v.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        )
    });
    named && value_is_function
}

fn field(name: &str) -> Field {
    match name {
        "name" => Field::Name,
        "body" => Field::Body,
        _ => Field::Other,
    }
}

/// 1-based line and column of the first error or missing node.
fn first_error_position(root: tree_sitter::Node<'_>) -> (usize, usize) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return (pos.row + 1, pos.column + 1);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    let pos = root.start_position();
    (pos.row + 1, pos.column + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tree: &SyntaxTree) -> Vec<SyntaxKind> {
        let mut out = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            out.push(tree.node(id).kind);
            stack.extend(tree.children(id).iter().rev());
        }
        out
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path("src/app.js"), Some(Language::JavaScript));
        assert_eq!(Language::from_path("src/App.JSX"), Some(Language::JavaScript));
        assert_eq!(Language::from_path("lib/x.mts"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("ui/View.tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn test_unsupported_path() {
        assert!(matches!(
            TreeSitterParser::for_path("main.rs"),
            Err(ParseError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_parse_javascript_declarations() {
        let src = "function f() { return 1; }\nclass A { m() {} }\nconst g = () => 2;\n";
        let tree = TreeSitterParser::new(Language::JavaScript).parse(src).unwrap();
        let kinds = kinds(&tree);
        assert!(kinds.contains(&SyntaxKind::Function));
        assert!(kinds.contains(&SyntaxKind::Class));
        assert!(kinds.contains(&SyntaxKind::Method));
        assert_eq!(kinds.iter().filter(|k| **k == SyntaxKind::Function).count(), 2);
    }

    #[test]
    fn test_name_field_is_recorded() {
        let src = "function hello() {}";
        let tree = TreeSitterParser::new(Language::JavaScript).parse(src).unwrap();
        let func = tree.children(tree.root())[0];
        assert_eq!(tree.node(func).kind, SyntaxKind::Function);
        let name = tree.child_by_field(func, Field::Name).unwrap();
        assert_eq!(tree.text(name, src), "hello");
    }

    #[test]
    fn test_parse_typescript() {
        let src = "export function add(a: number, b: number): number { return a + b; }\n";
        let tree = TreeSitterParser::new(Language::TypeScript).parse(src).unwrap();
        assert!(kinds(&tree).contains(&SyntaxKind::Function));
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let src = "function ok() {}\nfunction broken( {\n";
        let err = TreeSitterParser::new(Language::JavaScript).parse(src).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line, .. } if line >= 1));
    }
}
