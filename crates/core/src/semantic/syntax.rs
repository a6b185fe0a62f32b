//! Owned syntax tree handed from a parser to the declaration extractor.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Each node carries
//! a grammatical category ([`SyntaxKind`]), the field it occupies in its
//! parent ([`Field`]), its byte span in the source, and its children.

use std::ops::Range;

/// Grammatical category of a node, reduced to what extraction needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    /// A named function declaration (including `const f = () => ..`).
    Function,
    /// A named class declaration.
    Class,
    /// A method definition inside a class body or object literal.
    Method,
    /// Any identifier-like leaf.
    Identifier,
    Other,
}

impl SyntaxKind {
    /// `true` for the categories the extractor emits.
    pub fn is_declaration(self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Method)
    }
}

/// The role a child plays in its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Body,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub field: Option<Field>,
    pub span: Range<usize>,
    children: Vec<NodeId>,
}

/// Arena-backed syntax tree. The root is always node 0.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    /// Create a tree containing only a root node.
    pub fn new(kind: SyntaxKind, span: Range<usize>) -> Self {
        Self {
            nodes: vec![SyntaxNode {
                kind,
                field: None,
                span,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child under `parent` and return its id.
    pub fn push(
        &mut self,
        parent: NodeId,
        kind: SyntaxKind,
        field: Option<Field>,
        span: Range<usize>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SyntaxNode {
            kind,
            field,
            span,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// First child of `id` occupying `field`.
    pub fn child_by_field(&self, id: NodeId, field: Field) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].field == Some(field))
    }

    /// Source text covered by `id`; empty if the span does not fit `source`.
    pub fn text<'s>(&self, id: NodeId, source: &'s str) -> &'s str {
        source.get(self.nodes[id.0].span.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
