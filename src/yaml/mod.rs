//! Format-preserving YAML editing.
//!
//! A document is parsed into a comment-aware node [`Tree`], edited through a
//! [`Patcher`], and encoded back so that everything outside the edited scalars
//! stays byte-identical.

pub mod annotations;
mod emitter;
pub mod errors;
pub mod node;
mod parser;
pub mod path;
pub mod patcher;
pub mod scalar;

pub use annotations::{RebaseAnnotation, Scan};
pub use errors::{AnnotationError, AnnotationIssue, DecodeError, EncodeError, PatchError};
pub use node::{
    CollectionStyle, Kind, Mapping, Mark, Node, NodeId, NodeKind, NodeRef, Scalar, ScalarStyle,
    ScalarTag, Sequence, Span, Tree,
};
pub use path::{Filter, FilterOp, PathExpr, Segment};
pub use patcher::{Patcher, SetOutcome};
pub use scalar::{encode_scalar, render_scalar, resolve_plain, EncodedScalar};
