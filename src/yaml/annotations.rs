//! `$rebase` annotations carried in trailing comments.
//!
//! A scalar opts in with a JSON object in its same-line comment:
//!
//! ```yaml
//! app:
//!   image: my.registry.com/project/app # {"$rebase": "my-app:name"}
//!   tag: 1.2.3 # {"$rebase": "my-app:tag"}
//! ```
//!
//! Both scalars share the identifier `my-app` and are grouped into one
//! [`RebaseAnnotation`].

use crate::yaml::errors::{AnnotationError, AnnotationIssue, PatchError};
use crate::yaml::node::{NodeId, NodeKind, NodeRef, Tree};
use crate::yaml::patcher::{Patcher, SetOutcome};
use std::collections::HashMap;
use tracing::{debug, trace};

const REBASE_KEY: &str = "$rebase";

/// An image reference split over a name scalar and a tag scalar.
///
/// Either half may be missing when only one of the two annotations exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseAnnotation {
    pub identifier: String,
    pub name: String,
    pub tag: String,
    pub name_node: Option<NodeRef>,
    pub tag_node: Option<NodeRef>,
}

impl RebaseAnnotation {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            ..Self::default()
        }
    }

    /// The tag up to (not including) the first `@`.
    pub fn tag_without_digest(&self) -> &str {
        match self.tag.find('@') {
            Some(idx) => &self.tag[..idx],
            None => &self.tag,
        }
    }

    /// The digest currently pinned on the tag, if any.
    pub fn digest(&self) -> Option<&str> {
        self.tag.split_once('@').map(|(_, digest)| digest)
    }

    /// `name:tag` without the digest, for reporting.
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.name, self.tag_without_digest())
    }

    /// Pin `digest` on the tag scalar: the tag becomes `<tag>@<digest>`.
    ///
    /// The new value is built from the tag captured during the scan.
    pub fn update_tag_digest(
        &self,
        patcher: &mut Patcher,
        digest: &str,
    ) -> Result<SetOutcome, PatchError> {
        let node = self.tag_node.ok_or_else(|| PatchError::MissingPart {
            identifier: self.identifier.clone(),
            part: "tag",
        })?;
        let value = format!("{}@{}", self.tag_without_digest(), digest);
        debug!(identifier = %self.identifier, tag = %value, "updating tag digest");
        patcher.set_node(node, value.as_str())
    }
}

/// Result of one annotation scan: every record found plus every malformed
/// annotation skipped along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Records in order of first discovery
    pub annotations: Vec<RebaseAnnotation>,
    pub issues: Vec<AnnotationIssue>,
}

impl Scan {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn error(&self) -> Option<AnnotationError> {
        if self.issues.is_empty() {
            None
        } else {
            Some(AnnotationError {
                issues: self.issues.clone(),
            })
        }
    }

    pub fn into_result(self) -> Result<Vec<RebaseAnnotation>, AnnotationError> {
        if self.issues.is_empty() {
            Ok(self.annotations)
        } else {
            Err(AnnotationError {
                issues: self.issues,
            })
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&RebaseAnnotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.identifier == identifier)
    }
}

pub(crate) fn scan(tree: &Tree) -> Scan {
    let mut scanner = Scanner {
        tree,
        scan: Scan::default(),
        index: HashMap::new(),
    };
    scanner.visit(tree.root());
    scanner.scan
}

struct Scanner<'t> {
    tree: &'t Tree,
    scan: Scan,
    index: HashMap<String, usize>,
}

impl<'t> Scanner<'t> {
    /// Mapping values only: keys and sequence items are never candidates.
    fn visit(&mut self, id: NodeId) {
        let tree = self.tree;
        match &tree.node(id).kind {
            NodeKind::Mapping(mapping) => {
                for (_, value) in mapping.pairs() {
                    self.visit(value);
                }
            }
            NodeKind::Scalar(_) => self.inspect(id),
            _ => {}
        }
    }

    fn inspect(&mut self, id: NodeId) {
        let tree = self.tree;
        let node = tree.node(id);
        let Some(comment) = node.comment() else {
            return;
        };
        let text = comment.trim_start_matches('#').trim();
        if !text.starts_with('{') {
            return;
        }
        let line = node.mark.line;
        trace!(line, annotation = text, "inspecting comment");

        let object: HashMap<String, String> = match serde_json::from_str(text) {
            Ok(object) => object,
            Err(err) => {
                self.issue(AnnotationIssue::InvalidJson {
                    line,
                    message: err.to_string(),
                });
                return;
            }
        };

        let Some(value) = object.get(REBASE_KEY) else {
            debug!(annotation = text, line, "ignoring annotation");
            return;
        };

        let parts: Vec<&str> = value.split(':').collect();
        let [identifier, part] = parts.as_slice() else {
            self.issue(AnnotationIssue::InvalidValue {
                line,
                value: value.clone(),
            });
            return;
        };
        if !matches!(*part, "name" | "tag") {
            self.issue(AnnotationIssue::InvalidPart {
                line,
                part: part.to_string(),
            });
            return;
        }

        let scalar = node.as_scalar().map(|scalar| scalar.value.clone()).unwrap_or_default();
        let node_ref = tree.node_ref(id);
        let record = self.record(identifier);
        if *part == "name" {
            record.name = scalar;
            record.name_node = Some(node_ref);
        } else {
            record.tag = scalar;
            record.tag_node = Some(node_ref);
        }
    }

    fn record(&mut self, identifier: &str) -> &mut RebaseAnnotation {
        let idx = match self.index.get(identifier) {
            Some(idx) => *idx,
            None => {
                self.scan.annotations.push(RebaseAnnotation::new(identifier));
                let idx = self.scan.annotations.len() - 1;
                self.index.insert(identifier.to_string(), idx);
                idx
            }
        };
        &mut self.scan.annotations[idx]
    }

    fn issue(&mut self, issue: AnnotationIssue) {
        debug!(line = issue.line(), "{issue}");
        self.scan.issues.push(issue);
    }
}
