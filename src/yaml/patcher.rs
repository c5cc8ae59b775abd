//! Owns a parsed document and applies field updates to it.

use crate::yaml::annotations::{self, Scan};
use crate::yaml::emitter;
use crate::yaml::errors::{DecodeError, EncodeError, PatchError};
use crate::yaml::node::{
    CollectionStyle, Mapping, Node, NodeId, NodeKind, NodeRef, Scalar, ScalarStyle, ScalarTag,
    Tree,
};
use crate::yaml::parser;
use crate::yaml::path::PathExpr;
use crate::yaml::scalar::{encode_scalar, EncodedScalar};
use serde::Serialize;
use std::io::{Read, Write};
use tracing::debug;

/// What a successful write did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// An existing scalar received a new value
    Updated,
    /// Missing keys were created and the new scalar written
    Created,
    /// The scalar already held this value and tag
    Unchanged,
}

/// A document open for patching.
#[derive(Debug, Clone)]
pub struct Patcher {
    tree: Tree,
}

/// Read-only outcome of walking a literal key path.
enum CreationPlan {
    /// Every key exists; write to this scalar
    Existing(NodeId),
    /// Append `missing` keys below `parent`; `None` bootstraps a mapping root
    Append {
        parent: Option<NodeId>,
        missing: Vec<String>,
    },
}

impl Patcher {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let tree = parser::parse(text)?;
        Ok(Self { tree })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, DecodeError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    pub fn is_modified(&self) -> bool {
        self.tree.is_modified()
    }

    /// Scan trailing comments for `$rebase` annotations.
    pub fn find_rebase_annotations(&self) -> Scan {
        annotations::scan(&self.tree)
    }

    /// Write `value` to the single scalar addressed by `path`.
    ///
    /// `path` is a path expression. When it matches nothing and
    /// `create_missing` is set, it is instead split on `.` into literal keys and
    /// the missing mapping levels are created. On error the tree is unchanged.
    pub fn set_field<T: Serialize + ?Sized>(
        &mut self,
        path: &str,
        value: &T,
        create_missing: bool,
    ) -> Result<SetOutcome, PatchError> {
        let encoded = encode_scalar(value)?;
        let expr = PathExpr::parse(path)?;
        let matches = expr.find(&self.tree);

        match matches.as_slice() {
            [] if create_missing => {
                debug!(path, "no node matched, creating missing keys");
                let keys: Vec<&str> = path.split('.').collect();
                match self.plan_creation(&keys)? {
                    CreationPlan::Existing(target) => self.write(target, encoded),
                    CreationPlan::Append { parent, missing } => {
                        let target = self.create(parent, &missing);
                        self.write(target, encoded)?;
                        Ok(SetOutcome::Created)
                    }
                }
            }
            [] => Err(PatchError::NoMatch {
                path: path.to_string(),
            }),
            [target] => self.write(*target, encoded),
            many => Err(PatchError::AmbiguousMatch {
                path: path.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Write `value` to a scalar captured earlier, e.g. by an annotation scan.
    pub fn set_node<T: Serialize + ?Sized>(
        &mut self,
        node: NodeRef,
        value: &T,
    ) -> Result<SetOutcome, PatchError> {
        let encoded = encode_scalar(value)?;
        let id = self.tree.resolve(node)?;
        self.write(id, encoded)
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        emitter::encode(&self.tree)
    }

    pub fn encode_to<W: Write>(&self, mut writer: W) -> Result<(), EncodeError> {
        let text = self.encode()?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn write(&mut self, id: NodeId, encoded: EncodedScalar) -> Result<SetOutcome, PatchError> {
        if self.tree.write_scalar(id, encoded.value, encoded.tag)? {
            Ok(SetOutcome::Updated)
        } else {
            Ok(SetOutcome::Unchanged)
        }
    }

    fn plan_creation(&self, keys: &[&str]) -> Result<CreationPlan, PatchError> {
        let tree = &self.tree;
        let root = tree.root();

        if tree.node(root).as_scalar().is_some_and(Scalar::is_null) {
            return Ok(CreationPlan::Append {
                parent: None,
                missing: keys.iter().map(|key| key.to_string()).collect(),
            });
        }

        let mut current = root;
        for (idx, key) in keys.iter().enumerate() {
            let node = tree.node(current);
            if node.as_mapping().is_none() {
                return Err(PatchError::StructureMismatch {
                    kind: node.kind(),
                    mark: node.mark,
                });
            }
            match tree.mapping_get(current, key) {
                Some(value) => current = value,
                None => {
                    return Ok(CreationPlan::Append {
                        parent: Some(current),
                        missing: keys[idx..].iter().map(|key| key.to_string()).collect(),
                    })
                }
            }
        }

        let node = tree.node(current);
        if node.as_scalar().is_none() {
            return Err(PatchError::NotScalar {
                kind: node.kind(),
                mark: node.mark,
            });
        }
        Ok(CreationPlan::Existing(current))
    }

    /// Apply a creation plan and return the new, empty target scalar.
    fn create(&mut self, parent: Option<NodeId>, missing: &[String]) -> NodeId {
        let mut current = match parent {
            Some(parent) => parent,
            None => {
                let mapping = self.push_mapping();
                self.tree.replace_root(mapping);
                mapping
            }
        };

        for (idx, key) in missing.iter().enumerate() {
            let key_node = self.push_scalar(key, ScalarTag::Str);
            let value = if idx + 1 == missing.len() {
                self.push_scalar("", ScalarTag::Null)
            } else {
                self.push_mapping()
            };
            self.tree.append_pair(current, key_node, value);
            current = value;
        }
        current
    }

    fn push_mapping(&mut self) -> NodeId {
        let mapping = Mapping::new(CollectionStyle::Block, 0);
        self.tree.push(Node::synthetic(NodeKind::Mapping(mapping)))
    }

    fn push_scalar(&mut self, value: &str, tag: ScalarTag) -> NodeId {
        self.tree.push(Node::synthetic(NodeKind::Scalar(Scalar {
            value: value.to_string(),
            tag,
            style: ScalarStyle::Plain,
        })))
    }
}
