use crate::config::schema::{FieldUpdate, PlanConfig};
use crate::edit::{write_if_changed, EditError, WriteResult};
use crate::yaml::{AnnotationIssue, DecodeError, EncodeError, Patcher, RebaseAnnotation, SetOutcome};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Whether changed documents are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Write,
    /// Compute every change but leave files untouched
    DryRun,
}

/// Result of one pin or field operation within a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Digest was written onto the annotated tag
    Pinned {
        identifier: String,
        image: String,
        digest: String,
    },
    /// Tag already carried this digest
    AlreadyPinned { identifier: String, image: String },
    /// Existing scalar got a new value
    Set { path: String },
    /// Missing keys were created for the value
    Created { path: String },
    /// Scalar already held the value
    Unchanged { path: String },
    /// Operation failed; the document is otherwise still processed
    Failed { target: String, reason: String },
}

impl StepResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepResult::Failed { .. })
    }

    fn from_set(path: &str, outcome: SetOutcome) -> Self {
        let path = path.to_string();
        match outcome {
            SetOutcome::Updated => StepResult::Set { path },
            SetOutcome::Created => StepResult::Created { path },
            SetOutcome::Unchanged => StepResult::Unchanged { path },
        }
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepResult::Pinned {
                identifier,
                image,
                digest,
            } => write!(f, "Pinned {identifier} ({image}) to {digest}"),
            StepResult::AlreadyPinned { identifier, image } => {
                write!(f, "Already pinned: {identifier} ({image})")
            }
            StepResult::Set { path } => write!(f, "Set {path}"),
            StepResult::Created { path } => write!(f, "Created {path}"),
            StepResult::Unchanged { path } => write!(f, "Unchanged: {path}"),
            StepResult::Failed { target, reason } => write!(f, "Failed {target}: {reason}"),
        }
    }
}

/// Everything that happened to one document.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub file: PathBuf,
    pub steps: Vec<StepResult>,
    /// Malformed annotations skipped during the scan
    pub scan_issues: Vec<AnnotationIssue>,
    pub original: String,
    pub updated: String,
    /// True when the updated text was written to disk
    pub written: bool,
}

impl DocumentReport {
    pub fn is_changed(&self) -> bool {
        self.original != self.updated
    }

    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(StepResult::is_failure)
    }
}

/// Failure that stops processing of a whole document.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", file.display())]
    Decode { file: PathBuf, source: DecodeError },

    #[error("failed to encode {}: {source}", file.display())]
    Encode { file: PathBuf, source: EncodeError },

    #[error("failed to write {}: {source}", file.display())]
    Edit { file: PathBuf, source: EditError },
}

/// Run every document of a plan.
///
/// # Arguments
///
/// * `config` - Validated plan
/// * `workspace_root` - Base for relative document paths when `meta.workspace_relative` is set
/// * `mode` - Write changes or only compute them
///
/// # Returns
///
/// One entry per document, keyed by the file as written in the plan. A failing
/// document never stops the ones after it.
pub fn apply_plan(
    config: &PlanConfig,
    workspace_root: &Path,
    mode: ApplyMode,
) -> Vec<(String, Result<DocumentReport, ApplicationError>)> {
    config
        .documents
        .iter()
        .map(|document| {
            let path = if config.meta.workspace_relative {
                workspace_root.join(&document.file)
            } else {
                PathBuf::from(&document.file)
            };
            let digests = document.pin.then_some(&config.digests);
            let result = apply_document(&path, digests, &document.fields, mode);
            if let Err(err) = &result {
                warn!(file = %path.display(), "{err}");
            }
            (document.file.clone(), result)
        })
        .collect()
}

/// Pin `digests` and set `fields` in a single file.
///
/// Pins run first: they only rewrite scalars, so the node references captured
/// by the scan stay valid until the field updates run.
pub fn apply_document(
    path: &Path,
    digests: Option<&BTreeMap<String, String>>,
    fields: &[FieldUpdate],
    mode: ApplyMode,
) -> Result<DocumentReport, ApplicationError> {
    let original = fs::read_to_string(path).map_err(|source| ApplicationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut patcher = Patcher::parse(&original).map_err(|source| ApplicationError::Decode {
        file: path.to_path_buf(),
        source,
    })?;

    let mut steps = Vec::new();
    let mut scan_issues = Vec::new();

    if let Some(digests) = digests {
        let scan = patcher.find_rebase_annotations();
        for issue in &scan.issues {
            warn!(file = %path.display(), line = issue.line(), "{issue}");
        }
        steps.extend(pin_annotations(&mut patcher, &scan.annotations, digests));
        scan_issues = scan.issues;
    }
    steps.extend(set_fields(&mut patcher, fields));

    let updated = patcher.encode().map_err(|source| ApplicationError::Encode {
        file: path.to_path_buf(),
        source,
    })?;

    let written = match mode {
        ApplyMode::DryRun => false,
        ApplyMode::Write => {
            let result = write_if_changed(path, &original, &updated).map_err(|source| {
                ApplicationError::Edit {
                    file: path.to_path_buf(),
                    source,
                }
            })?;
            match result {
                WriteResult::Written { file, bytes } => {
                    info!(file = %file.display(), bytes, "wrote document");
                    true
                }
                WriteResult::Unchanged { file } => {
                    debug!(file = %file.display(), "document unchanged");
                    false
                }
            }
        }
    };

    Ok(DocumentReport {
        file: path.to_path_buf(),
        steps,
        scan_issues,
        original,
        updated,
        written,
    })
}

/// Pin the digest supplied for each annotation's identifier.
///
/// Annotations without a supplied digest are left alone.
pub fn pin_annotations(
    patcher: &mut Patcher,
    annotations: &[RebaseAnnotation],
    digests: &BTreeMap<String, String>,
) -> Vec<StepResult> {
    let mut steps = Vec::new();
    for annotation in annotations {
        let Some(digest) = digests.get(&annotation.identifier) else {
            debug!(identifier = %annotation.identifier, "no digest supplied");
            continue;
        };
        let identifier = annotation.identifier.clone();
        let image = annotation.image_reference();
        let step = match annotation.update_tag_digest(patcher, digest) {
            Ok(SetOutcome::Unchanged) => StepResult::AlreadyPinned { identifier, image },
            Ok(_) => StepResult::Pinned {
                identifier,
                image,
                digest: digest.clone(),
            },
            Err(err) => StepResult::Failed {
                target: identifier,
                reason: err.to_string(),
            },
        };
        steps.push(step);
    }
    steps
}

pub fn set_fields(patcher: &mut Patcher, fields: &[FieldUpdate]) -> Vec<StepResult> {
    fields
        .iter()
        .map(|field| {
            match patcher.set_field(&field.path, &field.value, field.create) {
                Ok(outcome) => StepResult::from_set(&field.path, outcome),
                Err(err) => StepResult::Failed {
                    target: field.path.clone(),
                    reason: err.to_string(),
                },
            }
        })
        .collect()
}
