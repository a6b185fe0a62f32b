//! Declaration extraction.
//!
//! Walks a [`SyntaxTree`] depth-first in pre-order and emits one
//! [`Declaration`] per named function, class, or method, nested ones
//! included. Each declaration carries a SHA-256 fingerprint of its source so
//! that two versions of a file can be compared declaration by declaration.
//!
//! Fingerprints are textual: reformatting or renaming a local variable
//! changes them even though the code is equivalent.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::parser::SourceParser;
use super::syntax::{Field, NodeId, SyntaxKind, SyntaxTree};
use crate::errors::ParseError;

/// Category of an extracted declaration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Function,
    Class,
    Method,
}

impl DeclarationKind {
    fn from_syntax(kind: SyntaxKind) -> Option<Self> {
        match kind {
            SyntaxKind::Function => Some(Self::Function),
            SyntaxKind::Class => Some(Self::Class),
            SyntaxKind::Method => Some(Self::Method),
            SyntaxKind::Identifier | SyntaxKind::Other => None,
        }
    }
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Class => write!(f, "class"),
            Self::Method => write!(f, "method"),
        }
    }
}

/// A named declaration found in one version of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    /// Hex SHA-256 of the declaration's source text.
    pub fingerprint: String,
    #[serde(skip)]
    pub span: Range<usize>,
}

/// Lookup key of a declaration within one file.
pub type DeclarationKey = (String, DeclarationKind);

/// `(name, kind)` → fingerprint for one file version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationSet {
    entries: BTreeMap<DeclarationKey, String>,
}

impl DeclarationSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from extracted declarations.
    ///
    /// Declarations sharing a key (two classes each with a `render` method)
    /// fold into one entry whose fingerprint covers all of them in document
    /// order, so a change to any of them changes the entry.
    pub fn from_declarations(decls: &[Declaration]) -> Self {
        let mut grouped: BTreeMap<DeclarationKey, Vec<&str>> = BTreeMap::new();
        for d in decls {
            grouped
                .entry((d.name.clone(), d.kind))
                .or_default()
                .push(&d.fingerprint);
        }
        let entries = grouped
            .into_iter()
            .map(|(key, fps)| {
                let fp = match fps.as_slice() {
                    [single] => single.to_string(),
                    many => fingerprint(many.join("\n").as_bytes()),
                };
                (key, fp)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str, kind: DeclarationKind) -> Option<&str> {
        self.entries
            .get(&(name.to_string(), kind))
            .map(String::as_str)
    }

    pub(crate) fn fingerprint_of(&self, key: &DeclarationKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DeclarationKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Every named declaration in `tree`, in document order.
pub fn extract(tree: &SyntaxTree, source: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    let mut visited = 0usize;
    let mut stack = vec![tree.root()];

    while let Some(id) = stack.pop() {
        visited += 1;
        if let Some(decl) = declaration_at(tree, id, source) {
            out.push(decl);
        }
        // Reverse so the leftmost child is visited first.
        stack.extend(tree.children(id).iter().rev().copied());
    }

    debug!(nodes = visited, declarations = out.len(), "extracted declarations");
    out
}

/// Parse `source` with `parser` and extract its declarations.
pub fn extract_source(
    parser: &dyn SourceParser,
    source: &str,
) -> Result<Vec<Declaration>, ParseError> {
    let tree = parser.parse(source)?;
    Ok(extract(&tree, source))
}

fn declaration_at(tree: &SyntaxTree, id: NodeId, source: &str) -> Option<Declaration> {
    let node = tree.node(id);
    let kind = DeclarationKind::from_syntax(node.kind)?;
    let name_id = tree.child_by_field(id, Field::Name)?;
    let name = tree.text(name_id, source).to_string();
    if name.is_empty() {
        return None;
    }

    let fingerprint = match kind {
        DeclarationKind::Class => class_fingerprint(tree, id, source),
        DeclarationKind::Function | DeclarationKind::Method => {
            fingerprint(tree.text(id, source).as_bytes())
        }
    };

    Some(Declaration {
        name,
        kind,
        fingerprint,
        span: node.span.clone(),
    })
}

/// Fingerprint a class with each nested named declaration replaced by its
/// name, so the class only changes when its own text (header, fields,
/// member list) does.
fn class_fingerprint(tree: &SyntaxTree, class: NodeId, source: &str) -> String {
    let span = tree.node(class).span.clone();
    let mut nested: Vec<(Range<usize>, &str)> = Vec::new();

    let mut stack: Vec<NodeId> = tree.children(class).iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if node.kind.is_declaration() {
            if let Some(name_id) = tree.child_by_field(id, Field::Name) {
                nested.push((node.span.clone(), tree.text(name_id, source)));
                continue;
            }
        }
        stack.extend(tree.children(id).iter().rev().copied());
    }

    let mut hasher = Sha256::new();
    let mut cursor = span.start;
    for (range, name) in nested {
        hasher.update(source.get(cursor..range.start).unwrap_or_default().as_bytes());
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        cursor = range.end;
    }
    hasher.update(source.get(cursor..span.end).unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::parser::{Language, TreeSitterParser};

    fn js(src: &str) -> Vec<Declaration> {
        extract_source(&TreeSitterParser::new(Language::JavaScript), src).unwrap()
    }

    fn summary(decls: &[Declaration]) -> Vec<(String, DeclarationKind)> {
        decls.iter().map(|d| (d.name.clone(), d.kind)).collect()
    }

    #[test]
    fn test_document_order_and_nesting() {
        let src = r#"
function outer() {
    function inner() { return 1; }
    return inner();
}
class Widget {
    render() {
        function helper() {}
        return helper;
    }
    static create() { return new Widget(); }
}
const arrow = () => 42;
"#;
        let decls = js(src);
        assert_eq!(
            summary(&decls),
            vec![
                ("outer".to_string(), DeclarationKind::Function),
                ("inner".to_string(), DeclarationKind::Function),
                ("Widget".to_string(), DeclarationKind::Class),
                ("render".to_string(), DeclarationKind::Method),
                ("helper".to_string(), DeclarationKind::Function),
                ("create".to_string(), DeclarationKind::Method),
                ("arrow".to_string(), DeclarationKind::Function),
            ]
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let src = "function f(a) { return a + 1; }\nclass C { m() { return 2; } }\n";
        let first = js(src);
        let second = js(src);
        assert_eq!(first, second);
        assert_eq!(
            DeclarationSet::from_declarations(&first),
            DeclarationSet::from_declarations(&second)
        );
    }

    #[test]
    fn test_fingerprint_tracks_body_changes() {
        let a = DeclarationSet::from_declarations(&js("function f() { return 1; }\nfunction g() {}"));
        let b = DeclarationSet::from_declarations(&js("function f() { return 2; }\nfunction g() {}"));
        assert_ne!(
            a.get("f", DeclarationKind::Function),
            b.get("f", DeclarationKind::Function)
        );
        assert_eq!(
            a.get("g", DeclarationKind::Function),
            b.get("g", DeclarationKind::Function)
        );
    }

    #[test]
    fn test_class_fingerprint_ignores_method_bodies() {
        let v1 = js("class A {\n  a() { return 1; }\n  b() { return 1; }\n}\n");
        let v2 = js("class A {\n  a() { return 2; }\n  b() { return 1; }\n}\n");
        let s1 = DeclarationSet::from_declarations(&v1);
        let s2 = DeclarationSet::from_declarations(&v2);
        assert_eq!(s1.get("A", DeclarationKind::Class), s2.get("A", DeclarationKind::Class));
        assert_ne!(s1.get("a", DeclarationKind::Method), s2.get("a", DeclarationKind::Method));

        let v3 = js("class A extends Base {\n  a() { return 1; }\n  b() { return 1; }\n}\n");
        let s3 = DeclarationSet::from_declarations(&v3);
        assert_ne!(s1.get("A", DeclarationKind::Class), s3.get("A", DeclarationKind::Class));
    }

    #[test]
    fn test_duplicate_keys_fold() {
        let src = "class A { render() { return 1; } }\nclass B { render() { return 2; } }\n";
        let set = DeclarationSet::from_declarations(&js(src));
        assert_eq!(set.len(), 3);
        let changed = "class A { render() { return 1; } }\nclass B { render() { return 3; } }\n";
        let other = DeclarationSet::from_declarations(&js(changed));
        assert_ne!(
            set.get("render", DeclarationKind::Method),
            other.get("render", DeclarationKind::Method)
        );
    }

    #[test]
    fn test_visits_deeply_nested_trees() {
        // Hand-built chain far deeper than any recursive walk would like.
        let depth = 50_000;
        let source = "f".repeat(depth + 1);
        let mut tree = SyntaxTree::new(SyntaxKind::Other, 0..source.len());
        let mut parent = tree.root();
        for i in 0..depth {
            parent = tree.push(parent, SyntaxKind::Function, None, i..source.len());
            tree.push(parent, SyntaxKind::Identifier, Some(Field::Name), i..i + 1);
        }
        let decls = extract(&tree, &source);
        assert_eq!(decls.len(), depth);
        assert!(decls.iter().all(|d| d.name == "f"));
    }

    #[test]
    fn test_malformed_source_is_parse_error() {
        let err = extract_source(
            &TreeSitterParser::new(Language::JavaScript),
            "function (((",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_anonymous_declarations_skipped() {
        let decls = js("export default function () {}\n");
        assert!(decls.is_empty());
    }
}
