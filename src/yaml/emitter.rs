//! Serializes a [`Tree`] back to text.
//!
//! Nothing is pretty-printed. The encoder compiles every change recorded in
//! the tree into byte-span [`Edit`]s against the original source and applies
//! them in one pass, so untouched bytes are copied through unchanged.

use crate::edit::Edit;
use crate::yaml::errors::EncodeError;
use crate::yaml::node::{CollectionStyle, Mapping, Node, NodeId, NodeKind, ScalarStyle, ScalarTag, Tree};
use crate::yaml::parser::validate_syntax;
use crate::yaml::scalar::render_scalar;
use std::cmp::Reverse;
use tracing::trace;

/// Width of one indentation level for rendered content.
const INDENT: usize = 2;

pub(crate) fn encode(tree: &Tree) -> Result<String, EncodeError> {
    let modified = tree.is_modified();
    let mut output = if modified {
        let edits = collect_edits(tree)?;
        trace!(edits = edits.len(), "applying encoder edits");
        Edit::apply_all(tree.source(), &edits)?
    } else {
        tree.source().to_string()
    };

    if !output.is_empty() && !output.ends_with('\n') {
        output.push_str(line_break(tree.source()));
    }

    if modified {
        validate_syntax(&output).map_err(|err| EncodeError::InvalidOutput {
            message: err.to_string(),
        })?;
    }
    Ok(output)
}

/// Ordering among edits that start and end at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EditKind {
    Value,
    Comment,
    Append,
}

struct Pending {
    edit: Edit,
    depth: usize,
    kind: EditKind,
}

fn collect_edits(tree: &Tree) -> Result<Vec<Edit>, EncodeError> {
    let mut collector = Collector {
        tree,
        source: tree.source(),
        eol: line_break(tree.source()),
        pending: Vec::new(),
    };

    let root = tree.root();
    if root == tree.parsed_root {
        collector.visit(root, 1, false, None)?;
    } else {
        collector.replace_root(root)?;
    }

    let mut pending = collector.pending;
    pending.sort_by_key(|p| {
        (
            p.edit.byte_start,
            p.edit.byte_end,
            Reverse(p.depth),
            p.kind,
        )
    });
    Ok(pending.into_iter().map(|p| p.edit).collect())
}

struct Collector<'t> {
    tree: &'t Tree,
    source: &'t str,
    /// Line terminator of the source, used for every inserted line
    eol: &'static str,
    pending: Vec<Pending>,
}

impl<'t> Collector<'t> {
    fn push(&mut self, edit: Edit, depth: usize, kind: EditKind) {
        self.pending.push(Pending { edit, depth, kind });
    }

    /// Walk parsed nodes; `value_of` is set when `id` is a mapping key.
    fn visit(
        &mut self,
        id: NodeId,
        depth: usize,
        flow: bool,
        value_of: Option<NodeId>,
    ) -> Result<(), EncodeError> {
        let tree = self.tree;
        let node = tree.node(id);
        if node.is_synthetic() {
            return Ok(());
        }

        match &node.kind {
            NodeKind::Document { root } => self.visit(*root, depth + 1, false, None)?,
            NodeKind::Scalar(_) => {
                let block_rewrite = node.dirty && self.rewrite_scalar(id, depth, flow)?;
                if !block_rewrite {
                    self.comment_edit(id, depth, value_of)?;
                }
            }
            NodeKind::Alias { .. } => self.comment_edit(id, depth, value_of)?,
            NodeKind::Mapping(mapping) => {
                let flow = flow || mapping.style == CollectionStyle::Flow;
                for (key, value) in mapping.pairs().take(mapping.parsed_pairs) {
                    self.visit(key, depth + 1, flow, Some(value))?;
                    self.visit(value, depth + 1, flow, None)?;
                }
                self.append_pairs(id, mapping, depth, flow)?;
                if flow {
                    self.comment_edit(id, depth, value_of)?;
                }
            }
            NodeKind::Sequence(sequence) => {
                let flow = flow || sequence.style == CollectionStyle::Flow;
                for item in &sequence.items {
                    self.visit(*item, depth + 1, flow, None)?;
                }
                if flow {
                    self.comment_edit(id, depth, value_of)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrite a dirty scalar's span. Returns true when the span also covered
    /// the node's comment (block scalar headers), which is then re-emitted here.
    fn rewrite_scalar(&mut self, id: NodeId, depth: usize, flow: bool) -> Result<bool, EncodeError> {
        let tree = self.tree;
        let node = tree.node(id);
        let (Some(span), Some(scalar)) = (node.span, node.as_scalar()) else {
            return Ok(false);
        };

        let mut text = render_scalar(&scalar.value, &scalar.tag, scalar.style, flow);
        if span.is_empty() && self.needs_separator(span.start) {
            text.insert(0, ' ');
        }

        let block = matches!(scalar.style, ScalarStyle::Literal | ScalarStyle::Folded);
        if block {
            if let Some(comment) = node.comment() {
                text.push(' ');
                text.push_str(comment);
            }
        }

        let edit = Edit::replacing(self.source, span.start, span.end, text)?;
        self.push(edit, depth, EditKind::Value);
        Ok(block)
    }

    fn comment_edit(
        &mut self,
        id: NodeId,
        depth: usize,
        value_of: Option<NodeId>,
    ) -> Result<(), EncodeError> {
        let tree = self.tree;
        let node = tree.node(id);
        if !node.comment_dirty {
            return Ok(());
        }

        let edit = match (node.comment_span, node.comment()) {
            (Some(span), Some(text)) => Edit::replacing(self.source, span.start, span.end, text)?,
            (Some(span), None) => {
                let start = self.source[..span.start].trim_end_matches([' ', '\t']).len();
                Edit::replacing(self.source, start, span.end, "")?
            }
            (None, Some(text)) => {
                let at = self.comment_anchor(node, value_of);
                Edit::insertion(at, format!(" {text}"))
            }
            (None, None) => return Ok(()),
        };
        self.push(edit, depth, EditKind::Comment);
        Ok(())
    }

    /// Where a new trailing comment goes for a node that had none.
    fn comment_anchor(&self, node: &Node, value_of: Option<NodeId>) -> usize {
        let Some(span) = node.span else {
            return self.source.len();
        };

        if let Some(scalar) = node.as_scalar() {
            if matches!(scalar.style, ScalarStyle::Literal | ScalarStyle::Folded) {
                return line_end(self.source, span.start);
            }
        }

        if let Some(value) = value_of {
            // a key whose value starts on a later line takes the comment after its colon
            let colon = self.source[span.end..]
                .find(':')
                .map_or(span.end, |idx| span.end + idx + 1);
            let value_span = self.tree.node(value).span;
            let value_on_later_line = value_span.map_or(true, |value_span| {
                value_span.start == colon || self.source[colon..value_span.start].contains('\n')
            });
            if value_on_later_line {
                return colon;
            }
        }
        span.end
    }

    fn needs_separator(&self, at: usize) -> bool {
        at > 0
            && !matches!(
                self.source.as_bytes()[at - 1],
                b' ' | b'\t' | b'\n' | b'\r' | b'[' | b'{'
            )
    }

    fn append_pairs(
        &mut self,
        id: NodeId,
        mapping: &Mapping,
        depth: usize,
        flow: bool,
    ) -> Result<(), EncodeError> {
        let appended: Vec<(NodeId, NodeId)> = mapping.appended().collect();
        if appended.is_empty() {
            return Ok(());
        }
        let Some(at) = mapping.append_at else {
            return Ok(());
        };

        if flow || mapping.style == CollectionStyle::Flow {
            self.flow_append(id, mapping, &appended, at, depth)?;
        } else {
            let renderer = Renderer { tree: self.tree };
            let mut lines = Vec::new();
            renderer.block_pairs(&appended, mapping.indent, &mut lines);

            let mut text = String::new();
            if at > 0 && !self.source[..at].ends_with('\n') {
                text.push_str(self.eol);
            }
            for line in lines {
                text.push_str(&line);
                text.push_str(self.eol);
            }
            self.push(Edit::insertion(at, text), depth, EditKind::Append);
        }

        trace!(mapping = id.index(), pairs = appended.len(), "rendering appended entries");
        Ok(())
    }

    /// Append entries to a flow mapping before its closing brace.
    fn flow_append(
        &mut self,
        id: NodeId,
        mapping: &Mapping,
        appended: &[(NodeId, NodeId)],
        at: usize,
        depth: usize,
    ) -> Result<(), EncodeError> {
        let renderer = Renderer { tree: self.tree };
        let entries: Vec<String> = appended
            .iter()
            .map(|(key, value)| renderer.flow_pair(*key, *value))
            .collect();
        let entries = entries.join(", ");

        if mapping.bare {
            // a lone `key: value` in a flow sequence gets braces to hold more pairs
            let start = self.tree.node(id).span.map_or(at, |span| span.start);
            self.push(Edit::insertion(start, "{"), depth, EditKind::Append);
            self.push(Edit::insertion(at, format!(", {entries}}}")), depth, EditKind::Append);
            return Ok(());
        }

        let head = self.source[..at].trim_end();
        let last_line = &head[head.rfind('\n').map_or(0, |idx| idx + 1)..];
        if !has_comment(last_line) {
            let separator = if head.ends_with('{') {
                ""
            } else if head.ends_with(',') {
                " "
            } else {
                ", "
            };
            let edit = Edit::insertion(head.len(), format!("{separator}{entries}"));
            self.push(edit, depth, EditKind::Append);
            return Ok(());
        }

        // the last entry ends in a comment: its separator goes before the
        // comment and the new entries on their own line above the brace
        let last_value = mapping
            .pairs()
            .take(mapping.parsed_pairs)
            .last()
            .and_then(|(_, value)| self.tree.node(value).span);
        if let Some(span) = last_value {
            if !self.source[span.end..].trim_start_matches([' ', '\t']).starts_with(',') {
                self.push(Edit::insertion(span.end, ","), depth + 1, EditKind::Append);
            }
        }

        let line_start = self.source[..at].rfind('\n').map_or(0, |idx| idx + 1);
        let pad = " ".repeat(at - line_start + INDENT);
        let text = format!("{pad}{entries}{}", self.eol);
        self.push(Edit::insertion(line_start, text), depth, EditKind::Append);
        Ok(())
    }

    /// Render a root that replaced the parsed one over the parsed root's span.
    fn replace_root(&mut self, root: NodeId) -> Result<(), EncodeError> {
        let Some(span) = self.tree.node(self.tree.parsed_root).span else {
            return Ok(());
        };

        let renderer = Renderer { tree: self.tree };
        let mut body = match &self.tree.node(root).kind {
            NodeKind::Mapping(mapping) if !mapping.is_empty() => {
                let pairs: Vec<(NodeId, NodeId)> = mapping.pairs().collect();
                let mut lines = Vec::new();
                renderer.block_pairs(&pairs, 0, &mut lines);
                lines.join(self.eol)
            }
            _ => renderer.inline(root, false),
        };

        let at_line_start = span.start == 0 || self.source[..span.start].ends_with('\n');
        if !at_line_start {
            body.insert_str(0, self.eol);
        }
        if span.end < self.source.len() && !self.source[span.end..].starts_with(['\n', '\r']) {
            body.push_str(self.eol);
        }

        let edit = Edit::replacing(self.source, span.start, span.end, body)?;
        self.push(edit, 0, EditKind::Value);
        Ok(())
    }
}

/// Renders nodes that have no source text of their own.
struct Renderer<'t> {
    tree: &'t Tree,
}

impl<'t> Renderer<'t> {
    fn block_pairs(&self, pairs: &[(NodeId, NodeId)], indent: usize, lines: &mut Vec<String>) {
        let pad = " ".repeat(indent);
        for (key, value) in pairs {
            let key_text = self.inline(*key, false);
            let node = self.tree.node(*value);
            match &node.kind {
                NodeKind::Mapping(mapping) if node.is_synthetic() && !mapping.is_empty() => {
                    lines.push(format!("{pad}{key_text}:"));
                    let nested: Vec<(NodeId, NodeId)> = mapping.pairs().collect();
                    self.block_pairs(&nested, indent + INDENT, lines);
                }
                NodeKind::Sequence(sequence) if node.is_synthetic() && !sequence.items.is_empty() => {
                    lines.push(format!("{pad}{key_text}:"));
                    let item_pad = " ".repeat(indent + INDENT);
                    for item in &sequence.items {
                        lines.push(format!("{item_pad}- {}", self.inline(*item, false)));
                    }
                }
                NodeKind::Scalar(scalar)
                    if scalar.tag == ScalarTag::Null && scalar.value.is_empty() =>
                {
                    lines.push(format!("{pad}{key_text}:{}", self.trailing_comment(node)));
                }
                _ => lines.push(format!(
                    "{pad}{key_text}: {}{}",
                    self.inline(*value, false),
                    self.trailing_comment(node)
                )),
            }
        }
    }

    fn flow_pair(&self, key: NodeId, value: NodeId) -> String {
        format!("{}: {}", self.inline(key, true), self.inline(value, true))
    }

    /// Single-line rendering; collections use flow style.
    fn inline(&self, id: NodeId, flow: bool) -> String {
        let node = self.tree.node(id);
        if let Some(span) = node.span {
            if !node.dirty {
                return self.tree.source()[span.start..span.end].to_string();
            }
        }

        match &node.kind {
            NodeKind::Scalar(scalar) if scalar.tag == ScalarTag::Null && scalar.value.is_empty() => {
                "null".to_string()
            }
            NodeKind::Scalar(scalar) => render_scalar(&scalar.value, &scalar.tag, scalar.style, flow),
            NodeKind::Alias { name } => format!("*{name}"),
            NodeKind::Mapping(mapping) => {
                let entries: Vec<String> = mapping
                    .pairs()
                    .map(|(key, value)| self.flow_pair(key, value))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            NodeKind::Sequence(sequence) => {
                let items: Vec<String> = sequence
                    .items
                    .iter()
                    .map(|item| self.inline(*item, true))
                    .collect();
                format!("[{}]", items.join(", "))
            }
            NodeKind::Document { root } => self.inline(*root, flow),
        }
    }

    fn trailing_comment(&self, node: &Node) -> String {
        node.comment()
            .map(|comment| format!(" {comment}"))
            .unwrap_or_default()
    }
}

/// `\r\n` when the first line of `source` ends with one, `\n` otherwise.
fn line_break(source: &str) -> &'static str {
    match source.find('\n') {
        Some(idx) if source[..idx].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Whether `line` carries a `# ...` comment outside quoted text.
fn has_comment(line: &str) -> bool {
    let mut quote = None;
    let mut prev = b' ';
    for &b in line.as_bytes() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'#' && matches!(prev, b' ' | b'\t') => return true,
            None => {}
        }
        prev = b;
    }
    false
}

fn line_end(source: &str, pos: usize) -> usize {
    let end = source[pos..].find('\n').map_or(source.len(), |idx| pos + idx);
    if end > pos && source.as_bytes()[end - 1] == b'\r' {
        end - 1
    } else {
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parser::parse;

    #[test]
    fn unmodified_tree_round_trips() {
        let source = "# header\napp:\n  image: x # {\"$rebase\": \"a:name\"}\n\n  list: [1, 2]\n";
        let tree = parse(source).unwrap();
        assert_eq!(encode(&tree).unwrap(), source);
    }

    #[test]
    fn adds_missing_final_newline() {
        let tree = parse("key: value # hey there").unwrap();
        assert_eq!(encode(&tree).unwrap(), "key: value # hey there\n");
    }

    #[test]
    fn empty_input_stays_empty() {
        let tree = parse("").unwrap();
        assert_eq!(encode(&tree).unwrap(), "");
    }

    #[test]
    fn rewrites_only_the_scalar_span() {
        let source = "a:\n  tag: 1.0.0   # keep me\n  other: 'x'\n";
        let mut tree = parse(source).unwrap();
        let a = tree.mapping_get(tree.root(), "a").unwrap();
        let tag = tree.mapping_get(a, "tag").unwrap();
        tree.write_scalar(tag, "2.0.0".to_string(), ScalarTag::Str).unwrap();
        assert_eq!(
            encode(&tree).unwrap(),
            "a:\n  tag: 2.0.0   # keep me\n  other: 'x'\n"
        );
    }

    #[test]
    fn keeps_quote_style() {
        let mut tree = parse("name: 'old'\n").unwrap();
        let name = tree.mapping_get(tree.root(), "name").unwrap();
        tree.write_scalar(name, "it's new".to_string(), ScalarTag::Str).unwrap();
        assert_eq!(encode(&tree).unwrap(), "name: 'it''s new'\n");
    }

    #[test]
    fn fills_empty_value() {
        let mut tree = parse("key: # note\nnext: 1\n").unwrap();
        let key = tree.mapping_get(tree.root(), "key").unwrap();
        tree.write_scalar(key, "v".to_string(), ScalarTag::Str).unwrap();
        assert_eq!(encode(&tree).unwrap(), "key: v # note\nnext: 1\n");
    }

    #[test]
    fn rewrites_block_scalar_inline() {
        let mut tree = parse("script: | # shell\n  echo hi\nnext: 1\n").unwrap();
        let script = tree.mapping_get(tree.root(), "script").unwrap();
        tree.write_scalar(script, "echo bye".to_string(), ScalarTag::Str).unwrap();
        assert_eq!(encode(&tree).unwrap(), "script: echo bye # shell\nnext: 1\n");
    }

    #[test]
    fn replaces_and_removes_comments() {
        let mut tree = parse("a: 1 # old\nb: 2   # gone\nc: 3\n").unwrap();
        let a = tree.mapping_get(tree.root(), "a").unwrap();
        let b = tree.mapping_get(tree.root(), "b").unwrap();
        let c = tree.mapping_get(tree.root(), "c").unwrap();
        tree.set_comment(a, Some("new")).unwrap();
        tree.set_comment(b, None).unwrap();
        tree.set_comment(c, Some("# added")).unwrap();
        assert_eq!(encode(&tree).unwrap(), "a: 1 # new\nb: 2\nc: 3 # added\n");
    }

    #[test]
    fn flow_append_after_trailing_comment() {
        let mut tree = parse("a: {x: 1 # c\n}\n").unwrap();
        let a = tree.mapping_get(tree.root(), "a").unwrap();
        let key = tree.push(Node::synthetic(scalar_kind("y")));
        let value = tree.push(Node::synthetic(scalar_kind("v")));
        tree.append_pair(a, key, value);
        assert_eq!(encode(&tree).unwrap(), "a: {x: 1, # c\n  y: v\n}\n");
    }

    #[test]
    fn bare_flow_pair_gets_braces() {
        let mut tree = parse("list: [a: 1, b]\n").unwrap();
        let list = tree.mapping_get(tree.root(), "list").unwrap();
        let pair = tree.node(list).as_sequence().unwrap().items[0];
        let key = tree.push(Node::synthetic(scalar_kind("c")));
        let value = tree.push(Node::synthetic(scalar_kind("2")));
        tree.append_pair(pair, key, value);
        assert_eq!(encode(&tree).unwrap(), "list: [{a: 1, c: 2}, b]\n");
    }

    #[test]
    fn detects_line_breaks() {
        assert_eq!(line_break("a: 1\r\nb: 2\r\n"), "\r\n");
        assert_eq!(line_break("a: 1\nb: 2\r\n"), "\n");
        assert_eq!(line_break("a: 1"), "\n");
    }

    fn scalar_kind(value: &str) -> NodeKind {
        NodeKind::Scalar(crate::yaml::node::Scalar {
            value: value.to_string(),
            tag: crate::yaml::scalar::resolve_plain(value),
            style: ScalarStyle::Plain,
        })
    }

    #[test]
    fn keeps_later_documents() {
        let mut tree = parse("a: 1\n---\nb: 2\n").unwrap();
        let a = tree.mapping_get(tree.root(), "a").unwrap();
        tree.write_scalar(a, "5".to_string(), ScalarTag::Int).unwrap();
        assert_eq!(encode(&tree).unwrap(), "a: 5\n---\nb: 2\n");
    }
}
