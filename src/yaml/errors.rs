use crate::edit::EditError;
use crate::yaml::node::{Kind, Mark};
use std::fmt;
use thiserror::Error;

/// Failure to turn input text into a tree. There is never a partial tree.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid YAML syntax at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single `set_field` or `update_tag_digest` call.
///
/// The tree is left exactly as it was before the call.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("invalid path '{input}': {message}")]
    InvalidPath { input: String, message: String },

    #[error("no nodes matched path '{path}'")]
    NoMatch { path: String },

    #[error("multiple nodes matched path '{path}' ({count} matches, expected 1)")]
    AmbiguousMatch { path: String, count: usize },

    #[error("unexpected node of kind {kind} while creating path (at {mark})")]
    StructureMismatch { kind: Kind, mark: Mark },

    #[error("expected scalar node, got {kind} (at {mark})")]
    NotScalar { kind: Kind, mark: Mark },

    #[error("value cannot be written to a scalar: {message}")]
    UnsupportedValue { message: String },

    #[error("annotation '{identifier}' has no {part} node")]
    MissingPart {
        identifier: String,
        part: &'static str,
    },

    #[error("node reference from generation {captured} used on tree at generation {current}; scan again")]
    StaleReference { captured: u64, current: u64 },
}

/// Failure to serialize the tree back to text.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("edit error: {0}")]
    Edit(#[from] EditError),

    #[error("encoder produced invalid YAML: {message}")]
    InvalidOutput { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One malformed rebase annotation found while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationIssue {
    InvalidJson { line: usize, message: String },
    InvalidValue { line: usize, value: String },
    InvalidPart { line: usize, part: String },
}

impl AnnotationIssue {
    pub fn line(&self) -> usize {
        match self {
            AnnotationIssue::InvalidJson { line, .. }
            | AnnotationIssue::InvalidValue { line, .. }
            | AnnotationIssue::InvalidPart { line, .. } => *line,
        }
    }
}

impl fmt::Display for AnnotationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationIssue::InvalidJson { line, message } => {
                write!(f, "parsing JSON from annotation in line {line}: {message}")
            }
            AnnotationIssue::InvalidValue { line, value } => {
                write!(f, "invalid value {value:?} in $rebase annotation of line {line}")
            }
            AnnotationIssue::InvalidPart { line, part } => write!(
                f,
                "invalid part {part:?} in $rebase annotation of line {line}, expected \"name\" or \"tag\""
            ),
        }
    }
}

/// Every issue collected during one annotation scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationError {
    pub issues: Vec<AnnotationIssue>,
}

impl fmt::Display for AnnotationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.len() > 1 {
            writeln!(f, "{} errors occurred:", self.issues.len())?;
            for (idx, issue) in self.issues.iter().enumerate() {
                if idx > 0 {
                    writeln!(f)?;
                }
                write!(f, "  * {issue}")?;
            }
            return Ok(());
        }
        for issue in &self.issues {
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AnnotationError {}
