//! Arena-backed YAML node tree.
//!
//! Nodes live in a growable arena owned by [`Tree`] and refer to each other by
//! [`NodeId`]. Parsed nodes remember the byte span they came from so the
//! emitter can copy everything that was not touched straight from the source.

use crate::yaml::errors::PatchError;
use std::fmt;

/// Index of a node inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A [`NodeId`] captured together with the tree generation it was taken from.
///
/// Structural edits bump the generation, so a reference captured before one of
/// them is rejected instead of pointing at a node that moved out of its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub id: NodeId,
    pub generation: u64,
}

/// 1-based line and column of a node's first token. Synthetic nodes use `0:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Mark {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Byte range `[start, end)` in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Document,
    Mapping,
    Sequence,
    Scalar,
    Alias,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Document => "DocumentNode",
            Kind::Mapping => "MappingNode",
            Kind::Sequence => "SequenceNode",
            Kind::Scalar => "ScalarNode",
            Kind::Alias => "AliasNode",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStyle {
    Block,
    Flow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

/// Resolved type of a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarTag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Custom(String),
}

impl ScalarTag {
    /// Map an explicit tag as written in the source (`!!int`, `!custom`).
    pub fn from_explicit(tag: &str) -> Self {
        match tag {
            "!!null" | "tag:yaml.org,2002:null" => ScalarTag::Null,
            "!!bool" | "tag:yaml.org,2002:bool" => ScalarTag::Bool,
            "!!int" | "tag:yaml.org,2002:int" => ScalarTag::Int,
            "!!float" | "tag:yaml.org,2002:float" => ScalarTag::Float,
            "!!str" | "tag:yaml.org,2002:str" => ScalarTag::Str,
            other => ScalarTag::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ScalarTag::Null => "!!null",
            ScalarTag::Bool => "!!bool",
            ScalarTag::Int => "!!int",
            ScalarTag::Float => "!!float",
            ScalarTag::Str => "!!str",
            ScalarTag::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for ScalarTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    /// Decoded value (quotes, escapes and folding already applied)
    pub value: String,
    pub tag: ScalarTag,
    pub style: ScalarStyle,
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        self.tag == ScalarTag::Null
    }
}

/// Mapping content: alternating key and value nodes.
///
/// Entries can only be added pair-wise, so the content length is always even.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    content: Vec<NodeId>,
    pub style: CollectionStyle,
    /// Column of the keys for block mappings
    pub indent: usize,
    /// Byte offset where entries appended after parsing are rendered
    pub(crate) append_at: Option<usize>,
    /// Number of pairs that came from the source
    pub(crate) parsed_pairs: usize,
    /// Single pair written inside a flow sequence without braces
    pub(crate) bare: bool,
}

impl Mapping {
    pub(crate) fn new(style: CollectionStyle, indent: usize) -> Self {
        Self {
            content: Vec::new(),
            style,
            indent,
            append_at: None,
            parsed_pairs: 0,
            bare: false,
        }
    }

    pub fn content(&self) -> &[NodeId] {
        &self.content
    }

    pub fn pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.content.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }

    pub fn len(&self) -> usize {
        self.content.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub(crate) fn push_pair(&mut self, key: NodeId, value: NodeId) {
        self.content.push(key);
        self.content.push(value);
    }

    /// Pairs added after parsing.
    pub(crate) fn appended(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.pairs().skip(self.parsed_pairs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub items: Vec<NodeId>,
    pub style: CollectionStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document { root: NodeId },
    Mapping(Mapping),
    Sequence(Sequence),
    Scalar(Scalar),
    Alias { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub mark: Mark,
    pub anchor: Option<String>,
    pub explicit_tag: Option<String>,
    pub(crate) span: Option<Span>,
    pub(crate) comment: Option<String>,
    pub(crate) comment_span: Option<Span>,
    pub(crate) dirty: bool,
    pub(crate) comment_dirty: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, mark: Mark, span: Option<Span>) -> Self {
        Self {
            kind,
            mark,
            anchor: None,
            explicit_tag: None,
            span,
            comment: None,
            comment_span: None,
            dirty: false,
            comment_dirty: false,
        }
    }

    pub(crate) fn synthetic(kind: NodeKind) -> Self {
        Self::new(kind, Mark::default(), None)
    }

    pub fn kind(&self) -> Kind {
        match self.kind {
            NodeKind::Document { .. } => Kind::Document,
            NodeKind::Mapping(_) => Kind::Mapping,
            NodeKind::Sequence(_) => Kind::Sequence,
            NodeKind::Scalar(_) => Kind::Scalar,
            NodeKind::Alias { .. } => Kind::Alias,
        }
    }

    /// Trailing same-line comment, including the leading `#`.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match &self.kind {
            NodeKind::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match &self.kind {
            NodeKind::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// True for nodes created after parsing.
    pub fn is_synthetic(&self) -> bool {
        self.span.is_none()
    }
}

/// A parsed document: the source text plus the node arena describing it.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) source: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) document: NodeId,
    /// Root as parsed; the emitter replaces its span when the root is swapped
    pub(crate) parsed_root: NodeId,
    pub(crate) generation: u64,
}

impl Tree {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> NodeId {
        self.document
    }

    /// The document's single child.
    pub fn root(&self) -> NodeId {
        match self.nodes[self.document.0].kind {
            NodeKind::Document { root } => root,
            // the parser always places a Document node at `document`
            _ => self.document,
        }
    }

    /// Access a node.
    ///
    /// # Panics
    ///
    /// Panics when `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn node_ref(&self, id: NodeId) -> NodeRef {
        NodeRef {
            id,
            generation: self.generation,
        }
    }

    /// Turn a captured reference back into an id, rejecting stale ones.
    pub fn resolve(&self, node: NodeRef) -> Result<NodeId, PatchError> {
        if node.generation != self.generation || node.id.0 >= self.nodes.len() {
            return Err(PatchError::StaleReference {
                captured: node.generation,
                current: self.generation,
            });
        }
        Ok(node.id)
    }

    /// Scalar value of `id`, if it is a scalar.
    pub fn scalar_value(&self, id: NodeId) -> Option<&str> {
        self.node(id).as_scalar().map(|scalar| scalar.value.as_str())
    }

    /// First value in `mapping` whose key is a scalar equal to `key`.
    pub fn mapping_get(&self, mapping: NodeId, key: &str) -> Option<NodeId> {
        let mapping = self.node(mapping).as_mapping()?;
        mapping
            .pairs()
            .find(|(k, _)| self.scalar_value(*k) == Some(key))
            .map(|(_, v)| v)
    }

    /// True once any scalar, comment or structure differs from the source.
    pub fn is_modified(&self) -> bool {
        self.parsed_root != self.root()
            || self
                .nodes
                .iter()
                .any(|node| node.dirty || node.comment_dirty || node.is_synthetic())
    }

    /// Replace or remove the trailing comment of a node.
    ///
    /// Text without a leading `#` gets `# ` prepended. Only scalars, aliases
    /// and flow collections end on a line that can carry a comment.
    pub fn set_comment(&mut self, id: NodeId, comment: Option<&str>) -> Result<(), PatchError> {
        let comment = comment.map(|text| {
            let text = text.lines().next().unwrap_or_default();
            if text.starts_with('#') {
                text.to_string()
            } else {
                format!("# {text}")
            }
        });
        let node = &mut self.nodes[id.0];
        let accepts = match &node.kind {
            NodeKind::Scalar(_) | NodeKind::Alias { .. } => true,
            NodeKind::Mapping(mapping) => mapping.style == CollectionStyle::Flow,
            NodeKind::Sequence(sequence) => sequence.style == CollectionStyle::Flow,
            NodeKind::Document { .. } => false,
        };
        if !accepts {
            return Err(PatchError::NotScalar {
                kind: node.kind(),
                mark: node.mark,
            });
        }
        if node.comment != comment {
            node.comment = comment;
            node.comment_dirty = true;
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Overwrite a scalar's value and tag. Returns whether anything changed.
    pub(crate) fn write_scalar(
        &mut self,
        id: NodeId,
        value: String,
        tag: ScalarTag,
    ) -> Result<bool, PatchError> {
        let node = &mut self.nodes[id.0];
        let kind = node.kind();
        let mark = node.mark;
        let NodeKind::Scalar(scalar) = &mut node.kind else {
            return Err(PatchError::NotScalar { kind, mark });
        };
        if scalar.value == value && scalar.tag == tag {
            return Ok(false);
        }
        scalar.value = value;
        scalar.tag = tag;
        node.dirty = true;
        Ok(true)
    }

    /// Append a key/value pair to a mapping. This is a structural edit.
    pub(crate) fn append_pair(&mut self, mapping: NodeId, key: NodeId, value: NodeId) {
        if let NodeKind::Mapping(map) = &mut self.nodes[mapping.0].kind {
            map.push_pair(key, value);
            self.generation += 1;
        }
    }

    /// Swap the document's root for `root`. This is a structural edit.
    pub(crate) fn replace_root(&mut self, root: NodeId) {
        if let NodeKind::Document { root: current } = &mut self.nodes[self.document.0].kind {
            *current = root;
            self.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(value: &str) -> Node {
        Node::synthetic(NodeKind::Scalar(Scalar {
            value: value.to_string(),
            tag: ScalarTag::Str,
            style: ScalarStyle::Plain,
        }))
    }

    fn tree_with_mapping() -> (Tree, NodeId) {
        let mut tree = Tree {
            source: String::new(),
            nodes: Vec::new(),
            document: NodeId(0),
            parsed_root: NodeId(1),
            generation: 0,
        };
        tree.push(Node::synthetic(NodeKind::Document { root: NodeId(1) }));
        let mapping = tree.push(Node::synthetic(NodeKind::Mapping(Mapping::new(
            CollectionStyle::Block,
            0,
        ))));
        (tree, mapping)
    }

    #[test]
    fn mapping_lookup_uses_first_match() {
        let (mut tree, mapping) = tree_with_mapping();
        for (key, value) in [("a", "1"), ("b", "2"), ("a", "3")] {
            let k = tree.push(scalar(key));
            let v = tree.push(scalar(value));
            tree.append_pair(mapping, k, v);
        }

        let found = tree.mapping_get(mapping, "a").unwrap();
        assert_eq!(tree.scalar_value(found), Some("1"));
        assert_eq!(tree.node(mapping).as_mapping().unwrap().len(), 3);
        assert_eq!(tree.node(mapping).as_mapping().unwrap().content().len(), 6);
    }

    #[test]
    fn structural_edit_invalidates_references() {
        let (mut tree, mapping) = tree_with_mapping();
        let captured = tree.node_ref(mapping);
        assert!(tree.resolve(captured).is_ok());

        let k = tree.push(scalar("k"));
        let v = tree.push(scalar("v"));
        tree.append_pair(mapping, k, v);

        assert!(matches!(
            tree.resolve(captured),
            Err(PatchError::StaleReference { captured: 0, current: 1 })
        ));
    }

    #[test]
    fn write_scalar_rejects_mappings() {
        let (mut tree, mapping) = tree_with_mapping();
        let result = tree.write_scalar(mapping, "x".to_string(), ScalarTag::Str);
        assert!(matches!(
            result,
            Err(PatchError::NotScalar { kind: Kind::Mapping, .. })
        ));
    }

    #[test]
    fn explicit_tags_resolve() {
        assert_eq!(ScalarTag::from_explicit("!!int"), ScalarTag::Int);
        assert_eq!(
            ScalarTag::from_explicit("!Ref"),
            ScalarTag::Custom("!Ref".to_string())
        );
        assert_eq!(ScalarTag::Bool.to_string(), "!!bool");
    }

    #[test]
    fn set_comment_normalizes_prefix() {
        let (mut tree, _) = tree_with_mapping();
        let value = tree.push(scalar("v"));
        tree.set_comment(value, Some("managed")).unwrap();
        assert_eq!(tree.node(value).comment(), Some("# managed"));
        assert!(tree.node(value).comment_dirty);
    }

    #[test]
    fn set_comment_rejects_block_collections() {
        let (mut tree, mapping) = tree_with_mapping();
        assert!(tree.set_comment(mapping, Some("x")).is_err());
        assert!(!tree.node(mapping).comment_dirty);
    }
}
