//! Lossless YAML parser.
//!
//! `saphyr_parser` turns the first document into events carrying source
//! spans. [`TreeBuilder`] replays those events into the node arena and reads
//! back from the source what events leave out: anchor names, tag spellings,
//! the offset of empty nodes and the trailing comment on a node's line.

use crate::yaml::errors::DecodeError;
use crate::yaml::node::{
    CollectionStyle, Mapping, Mark, Node, NodeId, NodeKind, Scalar, ScalarStyle, ScalarTag,
    Sequence, Span, Tree,
};
use crate::yaml::scalar::resolve_plain;
use saphyr_parser::{Event, Parser, ScalarStyle as EventStyle, ScanError, Span as EventSpan};

pub(crate) fn parse(source: &str) -> Result<Tree, DecodeError> {
    let events = collect_events(source)?;
    TreeBuilder::new(source, &events).build()
}

/// Check that the first document of `source` is well-formed.
pub(crate) fn validate_syntax(source: &str) -> Result<(), DecodeError> {
    collect_events(source)?;
    Ok(())
}

/// Events of the stream up to the end of its first document.
fn collect_events(source: &str) -> Result<Vec<(Event<'_>, EventSpan)>, DecodeError> {
    let mut events = Vec::new();
    for result in Parser::new_from_str(source) {
        let (event, span) = result.map_err(syntax_error)?;
        let document_end = matches!(event, Event::DocumentEnd);
        events.push((event, span));
        if document_end {
            break;
        }
    }
    Ok(events)
}

fn syntax_error(err: ScanError) -> DecodeError {
    let marker = err.marker();
    DecodeError::Syntax {
        message: err.info().to_string(),
        line: marker.line(),
        column: marker.col() + 1,
    }
}

/// Where a node sits in its parent. Decides where an empty node is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Root,
    Key,
    Value,
    Entry,
}

impl Slot {
    /// Indicator that introduces a node in this slot.
    fn indicator(self) -> Option<u8> {
        match self {
            Slot::Root => None,
            Slot::Key => Some(b'?'),
            Slot::Value => Some(b':'),
            Slot::Entry => Some(b'-'),
        }
    }
}

/// What a node-opening event reports, in byte offsets.
struct Opening {
    start: usize,
    end: usize,
    anchored: bool,
    /// Resolved tag, used when the source spelling cannot be found
    tag: Option<String>,
}

#[derive(Debug, Default)]
struct Properties {
    anchor: Option<String>,
    tag: Option<String>,
}

fn is_break_or_end(b: Option<&u8>) -> bool {
    matches!(b, None | Some(b'\n' | b'\r'))
}

fn is_flow_indicator(b: u8) -> bool {
    matches!(b, b',' | b'[' | b']' | b'{' | b'}')
}

fn explicit_tag(tag: &str) -> ScalarTag {
    if tag == "!" {
        ScalarTag::Str
    } else {
        ScalarTag::from_explicit(tag)
    }
}

struct TreeBuilder<'a> {
    src: &'a str,
    bytes: &'a [u8],
    events: &'a [(Event<'a>, EventSpan)],
    next: usize,
    /// Byte offset just past the source consumed so far
    cursor: usize,
    /// Event markers count characters; this maps them to byte offsets
    char_to_byte: Vec<usize>,
    line_starts: Vec<usize>,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(src: &'a str, events: &'a [(Event<'a>, EventSpan)]) -> Self {
        let mut char_to_byte: Vec<usize> = src.char_indices().map(|(idx, _)| idx).collect();
        char_to_byte.push(src.len());
        let line_starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self {
            src,
            bytes: src.as_bytes(),
            events,
            next: 0,
            cursor: 0,
            char_to_byte,
            line_starts,
            nodes: Vec::new(),
        }
    }

    fn build(mut self) -> Result<Tree, DecodeError> {
        let document = self.push(Node::new(
            NodeKind::Document { root: NodeId(0) },
            Mark { line: 1, column: 1 },
            Some(Span::new(0, self.src.len())),
        ));

        let root = loop {
            match self.advance() {
                Some((Event::StreamStart, _)) => continue,
                Some((Event::DocumentStart(explicit), span)) => {
                    let start = self.byte(span.start.index());
                    self.nodes[document.0].mark = self.mark(start);
                    if *explicit && self.src[start..].starts_with("---") {
                        self.cursor = start + 3;
                    }
                    break self.build_node(Slot::Root, false)?;
                }
                // no document at all: blank or comment-only input
                _ => break self.empty_scalar(self.src.len()),
            }
        };

        self.nodes[document.0].kind = NodeKind::Document { root };
        Ok(Tree {
            source: self.src.to_string(),
            nodes: self.nodes,
            document,
            parsed_root: root,
            generation: 0,
        })
    }

    fn build_node(&mut self, slot: Slot, flow: bool) -> Result<NodeId, DecodeError> {
        let Some((event, span)) = self.advance() else {
            return Err(self.truncated());
        };
        let start = self.byte(span.start.index());
        let end = self.byte(span.end.index()).max(start);
        let opening = |anchor: usize, tag: Option<String>| Opening {
            start,
            end,
            anchored: anchor > 0,
            tag,
        };

        match event {
            Event::Scalar(value, style, anchor, tag) => {
                let tag = tag.as_ref().map(|tag| format!("{}{}", tag.handle, tag.suffix));
                Ok(self.build_scalar(value.to_string(), *style, opening(*anchor, tag), slot, flow))
            }
            Event::SequenceStart(anchor, tag) => {
                let tag = tag.as_ref().map(|tag| format!("{}{}", tag.handle, tag.suffix));
                self.build_sequence(opening(*anchor, tag), slot, flow)
            }
            Event::MappingStart(anchor, tag) => {
                let tag = tag.as_ref().map(|tag| format!("{}{}", tag.handle, tag.suffix));
                self.build_mapping(opening(*anchor, tag), slot, flow)
            }
            Event::Alias(_) => Ok(self.build_alias(start, slot, flow)),
            _ => Err(self.truncated()),
        }
    }

    fn build_scalar(
        &mut self,
        value: String,
        style: EventStyle,
        opening: Opening,
        slot: Slot,
        flow: bool,
    ) -> NodeId {
        // a plain scalar always has text, so an empty one is an empty node
        if value.is_empty() && matches!(style, EventStyle::Plain) {
            let at = self.empty_at(slot);
            let props = self.properties(&opening, at);
            let tag = props.tag.as_deref().map_or(ScalarTag::Null, explicit_tag);
            let id = self.push_scalar(String::new(), tag, ScalarStyle::Plain, at, at);
            self.cursor = at;
            return self.apply_properties(id, props);
        }

        let (style, start, end) = match style {
            EventStyle::SingleQuoted => (
                ScalarStyle::SingleQuoted,
                self.after_properties(opening.start),
                opening.end,
            ),
            EventStyle::DoubleQuoted => (
                ScalarStyle::DoubleQuoted,
                self.after_properties(opening.start),
                opening.end,
            ),
            EventStyle::Literal | EventStyle::Folded => {
                let start = self.block_indicator(opening.start);
                let style = if self.bytes.get(start) == Some(&b'|') {
                    ScalarStyle::Literal
                } else {
                    ScalarStyle::Folded
                };
                (style, start, self.block_scalar_end(start, opening.end))
            }
            _ => (
                ScalarStyle::Plain,
                self.after_properties(opening.start),
                opening.end,
            ),
        };

        let props = self.properties(&opening, start);
        let tag = match (&props.tag, style) {
            (Some(tag), _) => explicit_tag(tag),
            (None, ScalarStyle::Plain) => resolve_plain(&value),
            (None, _) => ScalarTag::Str,
        };
        let id = self.push_scalar(value, tag, style, start, end);
        self.apply_properties(id, props);

        match style {
            ScalarStyle::Literal | ScalarStyle::Folded => {
                let header = self.block_header_end(start);
                self.take_comment(id, header, false);
            }
            _ if slot != Slot::Key => self.take_comment(id, end, flow),
            _ => {}
        }
        self.cursor = end;
        id
    }

    fn build_alias(&mut self, start: usize, slot: Slot, flow: bool) -> NodeId {
        let star = self.src[start..]
            .find('*')
            .map_or(start, |idx| start + idx);
        let end = self.name_end(star + 1);
        let name = self.src[star + 1..end].to_string();
        let id = self.push_node(NodeKind::Alias { name }, star, end);
        if slot != Slot::Key {
            self.take_comment(id, end, flow);
        }
        self.cursor = end;
        id
    }

    fn build_sequence(
        &mut self,
        opening: Opening,
        slot: Slot,
        flow: bool,
    ) -> Result<NodeId, DecodeError> {
        let body = self.after_properties(opening.start);
        let bracketed = self.bytes.get(body) == Some(&b'[');
        let start = if bracketed { body } else { opening.start };
        let props = self.properties(&opening, start);
        self.cursor = if bracketed { start + 1 } else { start };

        let mut items = Vec::new();
        while !matches!(self.events.get(self.next), Some((Event::SequenceEnd, _))) {
            items.push(self.build_node(Slot::Entry, flow || bracketed)?);
        }
        let reported = self.close_offset();

        let (style, end) = if bracketed {
            (CollectionStyle::Flow, self.closing(b']', reported) + 1)
        } else {
            (CollectionStyle::Block, self.cursor.max(start))
        };
        let id = self.push_node(NodeKind::Sequence(Sequence { items, style }), start, end);
        self.apply_properties(id, props);
        if bracketed && slot != Slot::Key {
            self.take_comment(id, end, flow);
        }
        self.cursor = end;
        Ok(id)
    }

    fn build_mapping(
        &mut self,
        opening: Opening,
        slot: Slot,
        flow: bool,
    ) -> Result<NodeId, DecodeError> {
        let body = self.after_properties(opening.start);
        let braced = self.bytes.get(body) == Some(&b'{');
        let start = if braced { body } else { opening.start };
        let props = self.properties(&opening, start);
        self.cursor = if braced { start + 1 } else { start };

        let style = if braced || flow {
            CollectionStyle::Flow
        } else {
            CollectionStyle::Block
        };
        let mut mapping = Mapping::new(style, start - self.line_start_of(start));
        // `[key: value]` holds a single-pair mapping without braces
        mapping.bare = flow && !braced;
        let inner_flow = style == CollectionStyle::Flow;

        while !matches!(self.events.get(self.next), Some((Event::MappingEnd, _))) {
            let key = self.build_node(Slot::Key, inner_flow)?;
            if !inner_flow {
                self.take_key_comment(key);
            }
            let value = self.build_node(Slot::Value, inner_flow)?;
            mapping.push_pair(key, value);
        }
        let reported = self.close_offset();
        mapping.parsed_pairs = mapping.len();

        let end = if braced {
            let close = self.closing(b'}', reported);
            mapping.append_at = Some(close);
            close + 1
        } else if inner_flow {
            mapping.append_at = Some(self.cursor);
            self.cursor
        } else {
            mapping.append_at = Some(self.next_line_start(self.cursor));
            self.cursor.max(start)
        };

        let id = self.push_node(NodeKind::Mapping(mapping), start, end);
        self.apply_properties(id, props);
        if braced && slot != Slot::Key {
            self.take_comment(id, end, flow);
        }
        self.cursor = end;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // source lookups
    // ------------------------------------------------------------------

    /// Anchor and tag written between the consumed source and `start`.
    fn properties(&self, opening: &Opening, start: usize) -> Properties {
        let mut props = Properties::default();
        if !opening.anchored && opening.tag.is_none() {
            return props;
        }

        let gap = &self.src[self.cursor.min(start)..start];
        for line in gap.lines() {
            for token in strip_comment(line).split_whitespace() {
                let token = token.trim_start_matches([',', '[', '{', ':', '-', '?']);
                if let Some(name) = token.strip_prefix('&') {
                    let end = name.find(|c| ",[]{}".contains(c)).unwrap_or(name.len());
                    props.anchor = Some(name[..end].to_string());
                } else if token.starts_with("!<") {
                    let end = token.find('>').map_or(token.len(), |idx| idx + 1);
                    props.tag = Some(token[..end].to_string());
                } else if token.starts_with('!') {
                    let end = token.find(|c| ",[]{}".contains(c)).unwrap_or(token.len());
                    props.tag = Some(token[..end].to_string());
                }
            }
        }

        if !opening.anchored {
            props.anchor = None;
        }
        props.tag = match opening.tag {
            Some(_) if props.tag.is_some() => props.tag,
            ref resolved => resolved.clone(),
        };
        props
    }

    /// Offset of an empty node: after the indicator that introduced it and
    /// any properties, before trailing whitespace or a comment.
    fn empty_at(&self, slot: Slot) -> usize {
        let mut at = self.cursor;
        if let Some(indicator) = slot.indicator() {
            let next = self.skip_gap(at);
            if self.bytes.get(next) == Some(&indicator) {
                at = next + 1;
            }
        }
        at = self.skip_properties(at);

        if slot == Slot::Root {
            // an empty document body goes after the comment on its `---` line
            let rest = self.skip_inline_ws(at);
            if self.at_comment(rest) || is_break_or_end(self.bytes.get(rest)) {
                at = self.line_end_of(at);
            }
        }
        at
    }

    /// Attach the comment after `key:` when the value starts on a later line.
    fn take_key_comment(&mut self, key: NodeId) {
        let at = self.skip_inline_ws(self.cursor);
        if self.bytes.get(at) != Some(&b':') {
            return;
        }
        let at = self.skip_properties(at + 1);
        self.take_comment(key, at, false);
    }

    /// Attach a `# ...` comment following `from` on the same line to `owner`.
    fn take_comment(&mut self, owner: NodeId, from: usize, flow: bool) {
        let mut at = self.skip_inline_ws(from);
        if flow && self.bytes.get(at) == Some(&b',') {
            at = self.skip_inline_ws(at + 1);
        }
        if !self.at_comment(at) {
            return;
        }
        let end = self.line_end_of(at);
        let text = self.src[at..end].trim_end().to_string();
        let node = &mut self.nodes[owner.0];
        node.comment_span = Some(Span::new(at, at + text.len()));
        node.comment = Some(text);
    }

    /// The `|` or `>` of a block scalar at or after `start`.
    fn block_indicator(&self, start: usize) -> usize {
        if matches!(self.bytes.get(start), Some(b'|' | b'>')) {
            return start;
        }
        self.src[self.cursor.min(start)..]
            .find(['|', '>'])
            .map_or(start, |idx| self.cursor.min(start) + idx)
    }

    /// Past the indentation and chomping indicators of a block scalar header.
    fn block_header_end(&self, indicator: usize) -> usize {
        let mut at = indicator + 1;
        while matches!(self.bytes.get(at), Some(b'+' | b'-' | b'1'..=b'9')) {
            at += 1;
        }
        at
    }

    /// End of the last line holding block scalar content.
    ///
    /// The reported span also covers trailing blank lines, which stay
    /// outside the node so that a rewrite keeps them.
    fn block_scalar_end(&self, start: usize, reported: usize) -> usize {
        let end = reported.clamp(start, self.src.len());
        let body = self.src[start..end].trim_end();
        self.line_end_of(start + body.len())
    }

    /// Offset of the bracket closing a flow collection, falling back to the
    /// offset the end event reported.
    fn closing(&self, bracket: u8, reported: usize) -> usize {
        let mut at = self.cursor;
        loop {
            at = self.skip_gap(at);
            match self.bytes.get(at) {
                Some(b',') => at += 1,
                Some(&b) if b == bracket => return at,
                _ => return reported,
            }
        }
    }

    /// Consume a collection end event and return where it starts.
    fn close_offset(&mut self) -> usize {
        match self.advance() {
            Some((_, span)) => self.byte(span.start.index()),
            None => self.src.len(),
        }
    }

    /// First offset of node content when `start` points at an anchor or tag.
    fn after_properties(&self, start: usize) -> usize {
        match self.bytes.get(start) {
            Some(b'&' | b'!') => self.skip_gap(self.skip_properties(start)),
            _ => start,
        }
    }

    fn skip_properties(&self, mut at: usize) -> usize {
        loop {
            let next = self.skip_inline_ws(at);
            match self.bytes.get(next) {
                Some(b'&' | b'!') => at = self.property_end(next),
                _ => return at,
            }
        }
    }

    fn property_end(&self, start: usize) -> usize {
        if self.src[start..].starts_with("!<") {
            if let Some(idx) = self.src[start..].find('>') {
                return start + idx + 1;
            }
        }
        self.name_end(start + 1)
    }

    fn name_end(&self, mut at: usize) -> usize {
        while let Some(&b) = self.bytes.get(at) {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r') || is_flow_indicator(b) {
                break;
            }
            at += 1;
        }
        at
    }

    /// Skip whitespace, line breaks and comments.
    fn skip_gap(&self, mut at: usize) -> usize {
        loop {
            match self.bytes.get(at) {
                Some(b' ' | b'\t' | b'\n' | b'\r') => at += 1,
                Some(b'#') if self.at_comment(at) => at = self.line_end_of(at),
                _ => return at,
            }
        }
    }

    fn skip_inline_ws(&self, mut at: usize) -> usize {
        while matches!(self.bytes.get(at), Some(b' ' | b'\t')) {
            at += 1;
        }
        at
    }

    fn at_comment(&self, at: usize) -> bool {
        self.bytes.get(at) == Some(&b'#')
            && (at == 0 || matches!(self.bytes[at - 1], b' ' | b'\t' | b'\n' | b'\r'))
    }

    fn line_start_of(&self, pos: usize) -> usize {
        let line = self.line_starts.partition_point(|&start| start <= pos);
        self.line_starts[line.saturating_sub(1)]
    }

    /// End of the line containing `pos`, line break excluded.
    fn line_end_of(&self, pos: usize) -> usize {
        let end = self.src[pos..].find('\n').map_or(self.src.len(), |idx| pos + idx);
        if end > pos && self.bytes[end - 1] == b'\r' {
            end - 1
        } else {
            end
        }
    }

    fn next_line_start(&self, pos: usize) -> usize {
        self.src[pos..]
            .find('\n')
            .map_or(self.src.len(), |idx| pos + idx + 1)
    }

    // ------------------------------------------------------------------
    // events and nodes
    // ------------------------------------------------------------------

    fn advance(&mut self) -> Option<&'a (Event<'a>, EventSpan)> {
        let item = self.events.get(self.next)?;
        self.next += 1;
        Some(item)
    }

    fn byte(&self, char_index: usize) -> usize {
        self.char_to_byte
            .get(char_index)
            .copied()
            .unwrap_or(self.src.len())
    }

    fn truncated(&self) -> DecodeError {
        let mark = self.mark(self.cursor);
        DecodeError::Syntax {
            message: "unexpected end of the event stream".to_string(),
            line: mark.line,
            column: mark.column,
        }
    }

    fn mark(&self, pos: usize) -> Mark {
        let line = self.line_starts.partition_point(|&start| start <= pos).max(1);
        let line_start = self.line_starts[line - 1];
        Mark {
            line,
            column: self.src[line_start..pos].chars().count() + 1,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn push_node(&mut self, kind: NodeKind, start: usize, end: usize) -> NodeId {
        let node = Node::new(kind, self.mark(start), Some(Span::new(start, end)));
        self.push(node)
    }

    fn push_scalar(
        &mut self,
        value: String,
        tag: ScalarTag,
        style: ScalarStyle,
        start: usize,
        end: usize,
    ) -> NodeId {
        self.push_node(NodeKind::Scalar(Scalar { value, tag, style }), start, end)
    }

    fn empty_scalar(&mut self, at: usize) -> NodeId {
        self.push_scalar(String::new(), ScalarTag::Null, ScalarStyle::Plain, at, at)
    }

    fn apply_properties(&mut self, id: NodeId, props: Properties) -> NodeId {
        let node = &mut self.nodes[id.0];
        node.anchor = props.anchor;
        node.explicit_tag = props.tag;
        id
    }
}

/// `line` without a trailing `# ...` comment.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let comment = bytes
        .iter()
        .enumerate()
        .find(|(idx, b)| **b == b'#' && (*idx == 0 || matches!(bytes[idx - 1], b' ' | b'\t')))
        .map(|(idx, _)| idx);
    match comment {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::node::Kind;

    fn tree(source: &str) -> Tree {
        parse(source).unwrap()
    }

    fn value_at<'t>(tree: &'t Tree, path: &[&str]) -> &'t Node {
        let mut current = tree.root();
        for key in path {
            current = tree.mapping_get(current, key).unwrap();
        }
        tree.node(current)
    }

    #[test]
    fn parses_nested_mapping_with_comments() {
        let tree = tree(
            "app:\n  image: my.registry.com/project/app # {\"$rebase\": \"my-app:name\"}\n  tag: 1.2.3 # {\"$rebase\": \"my-app:tag\"}\n",
        );
        let image = value_at(&tree, &["app", "image"]);
        assert_eq!(image.as_scalar().unwrap().value, "my.registry.com/project/app");
        assert_eq!(image.comment(), Some("# {\"$rebase\": \"my-app:name\"}"));
        assert_eq!(image.mark, Mark { line: 2, column: 10 });

        let tag = value_at(&tree, &["app", "tag"]);
        assert_eq!(tag.as_scalar().unwrap().value, "1.2.3");
        assert_eq!(tag.as_scalar().unwrap().tag, ScalarTag::Str);
        assert_eq!(tag.mark.line, 3);
    }

    #[test]
    fn empty_input_is_null_root() {
        for source in ["", "   \n", "# only a comment\n"] {
            let tree = tree(source);
            let root = tree.node(tree.root());
            assert_eq!(root.as_scalar().unwrap().tag, ScalarTag::Null);
        }
    }

    #[test]
    fn rejects_invalid_yaml() {
        let result = parse("key: value: invalid");
        assert!(matches!(result, Err(DecodeError::Syntax { .. })));
        assert!(validate_syntax("a: [unclosed\n").is_err());
    }

    #[test]
    fn parses_explicit_keys() {
        let tree = tree("? a\n: b\nc: d\n");
        let a = tree.mapping_get(tree.root(), "a").unwrap();
        assert_eq!(tree.scalar_value(a), Some("b"));
        assert_eq!(value_at(&tree, &["c"]).as_scalar().unwrap().value, "d");
    }

    #[test]
    fn parses_sequences_and_compact_mappings() {
        let tree = tree("images:\n- name: app\n  tag: 1.0.0\n- name: db\n  tag: 2.0.0\nother: x\n");
        let images = value_at(&tree, &["images"]);
        let items = &images.as_sequence().unwrap().items;
        assert_eq!(items.len(), 2);
        let second = tree.mapping_get(items[1], "tag").unwrap();
        assert_eq!(tree.scalar_value(second), Some("2.0.0"));
        assert_eq!(value_at(&tree, &["other"]).as_scalar().unwrap().value, "x");
    }

    #[test]
    fn parses_flow_collections() {
        let tree = tree("list: [a, 'b', \"c\"]\nmap: {x: 1, y: true}\n");
        let list = value_at(&tree, &["list"]);
        assert_eq!(list.as_sequence().unwrap().items.len(), 3);
        let y = value_at(&tree, &["map", "y"]);
        assert_eq!(y.as_scalar().unwrap().tag, ScalarTag::Bool);
        let map = value_at(&tree, &["map"]).as_mapping().unwrap();
        assert_eq!(map.style, CollectionStyle::Flow);
        assert_eq!(map.append_at, Some(39));
    }

    #[test]
    fn single_pair_inside_flow_sequence() {
        let tree = tree("list: [a: 1, b]\n");
        let items = &value_at(&tree, &["list"]).as_sequence().unwrap().items;
        assert_eq!(items.len(), 2);
        let pair = tree.node(items[0]).as_mapping().unwrap();
        assert!(pair.bare);
        assert_eq!(tree.node(items[0]).span(), Some(Span::new(7, 11)));
        let a = tree.mapping_get(items[0], "a").unwrap();
        assert_eq!(tree.node(a).as_scalar().unwrap().tag, ScalarTag::Int);
        assert_eq!(tree.scalar_value(items[1]), Some("b"));
    }

    #[test]
    fn decodes_quoted_scalars() {
        let tree = tree("a: 'it''s'\nb: \"tab\\there\"\nc: \"folded\n  line\"\n");
        assert_eq!(value_at(&tree, &["a"]).as_scalar().unwrap().value, "it's");
        assert_eq!(value_at(&tree, &["b"]).as_scalar().unwrap().value, "tab\there");
        assert_eq!(value_at(&tree, &["c"]).as_scalar().unwrap().value, "folded line");
        assert_eq!(value_at(&tree, &["a"]).span(), Some(Span::new(3, 10)));
    }

    #[test]
    fn parses_block_scalars() {
        let source = "script: | # shell\n  echo one\n  echo two\n\nfolded: >-\n  a\n  b\n\n  c\nnext: 1\n";
        let tree = tree(source);
        let script = value_at(&tree, &["script"]);
        assert_eq!(script.as_scalar().unwrap().value, "echo one\necho two\n");
        assert_eq!(script.comment(), Some("# shell"));
        // trailing blank line stays outside the span
        let span = script.span().unwrap();
        assert_eq!(&source[span.start..span.end], "| # shell\n  echo one\n  echo two");

        assert_eq!(value_at(&tree, &["folded"]).as_scalar().unwrap().value, "a b\nc");
        assert_eq!(value_at(&tree, &["next"]).as_scalar().unwrap().tag, ScalarTag::Int);
    }

    #[test]
    fn parses_multiline_plain_scalars() {
        let tree = tree("text: first\n  second\n\n  third\nnext: 1\n");
        assert_eq!(
            value_at(&tree, &["text"]).as_scalar().unwrap().value,
            "first second\nthird"
        );
    }

    #[test]
    fn records_anchors_aliases_and_tags() {
        let tree = tree("base: &base\n  a: 1\ncopy: *base\nid: !!str 123\nempty: !!str\n");
        assert_eq!(value_at(&tree, &["base"]).anchor.as_deref(), Some("base"));
        let copy = value_at(&tree, &["copy"]);
        assert_eq!(copy.kind(), Kind::Alias);
        assert!(matches!(&copy.kind, NodeKind::Alias { name } if name == "base"));

        let id = value_at(&tree, &["id"]);
        assert_eq!(id.explicit_tag.as_deref(), Some("!!str"));
        assert_eq!(id.as_scalar().unwrap().tag, ScalarTag::Str);
        assert_eq!(id.as_scalar().unwrap().value, "123");

        let empty = value_at(&tree, &["empty"]);
        assert_eq!(empty.as_scalar().unwrap().tag, ScalarTag::Str);
        assert!(empty.span().unwrap().is_empty());
    }

    #[test]
    fn empty_value_attaches_comment_to_key() {
        let tree = tree("key: # note\nother: 1\n");
        let root = tree.node(tree.root()).as_mapping().unwrap();
        let (key, value) = root.pairs().next().unwrap();
        assert_eq!(tree.node(key).comment(), Some("# note"));
        assert_eq!(tree.node(value).as_scalar().unwrap().tag, ScalarTag::Null);
        assert_eq!(tree.node(value).span(), Some(Span::new(4, 4)));
        assert_eq!(tree.node(value).comment(), None);
    }

    #[test]
    fn nested_mapping_key_takes_comment() {
        let tree = tree("app: # settings\n  replicas: 1\n");
        let root = tree.node(tree.root()).as_mapping().unwrap();
        let (key, _) = root.pairs().next().unwrap();
        assert_eq!(tree.node(key).comment(), Some("# settings"));
    }

    #[test]
    fn flow_items_take_comments_after_commas() {
        let tree = tree("list: [\n  a, # first\n  b\n] # list\n");
        let list = value_at(&tree, &["list"]);
        let items = &list.as_sequence().unwrap().items;
        assert_eq!(tree.node(items[0]).comment(), Some("# first"));
        assert_eq!(list.comment(), Some("# list"));
    }

    #[test]
    fn sequence_at_parent_indent() {
        let tree = tree("key:\n- a\n-\n- b\nother: 1\n");
        let items = &value_at(&tree, &["key"]).as_sequence().unwrap().items;
        assert_eq!(items.len(), 3);
        assert_eq!(tree.node(items[1]).span(), Some(Span::new(10, 10)));
        assert_eq!(value_at(&tree, &["other"]).as_scalar().unwrap().value, "1");
    }

    #[test]
    fn keeps_only_first_document() {
        let tree = tree("a: 1\n---\nb: 2\n");
        assert!(tree.mapping_get(tree.root(), "a").is_some());
        assert!(tree.mapping_get(tree.root(), "b").is_none());
    }

    #[test]
    fn explicit_document_start() {
        let tree = tree("--- # header\nkey: value\n");
        assert_eq!(value_at(&tree, &["key"]).as_scalar().unwrap().value, "value");

        let empty = self::tree("--- # header\n");
        assert_eq!(empty.node(empty.root()).span(), Some(Span::new(12, 12)));
    }

    #[test]
    fn multibyte_text_keeps_byte_spans() {
        let source = "name: héllo wörld # ünïcode\nnext: 1\n";
        let tree = tree(source);
        let name = value_at(&tree, &["name"]);
        let span = name.span().unwrap();
        assert_eq!(&source[span.start..span.end], "héllo wörld");
        assert_eq!(name.comment(), Some("# ünïcode"));
        assert_eq!(value_at(&tree, &["next"]).mark, Mark { line: 2, column: 7 });
    }

    #[test]
    fn crlf_line_breaks() {
        let source = "a:\r\n  x: 1 # one\r\n";
        let tree = tree(source);
        let x = value_at(&tree, &["a", "x"]);
        assert_eq!(x.comment(), Some("# one"));
        let a = value_at(&tree, &["a"]).as_mapping().unwrap();
        assert_eq!(a.append_at, Some(source.len()));
    }

    #[test]
    fn append_offsets_follow_last_entry() {
        let source = "app:\n  tag: 1\nother: 2";
        let tree = tree(source);
        let app = value_at(&tree, &["app"]).as_mapping().unwrap();
        assert_eq!(app.append_at, Some(14));
        let root = tree.node(tree.root()).as_mapping().unwrap();
        assert_eq!(root.append_at, Some(source.len()));
    }
}
