use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A plan file: digests to pin and fields to set across a set of documents.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PlanConfig {
    #[serde(default)]
    pub meta: Metadata,
    /// Annotation identifier to digest (`algorithm:hex`)
    #[serde(default)]
    pub digests: BTreeMap<String, String>,
    #[serde(default)]
    pub documents: Vec<DocumentPlan>,
}

impl PlanConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.documents.is_empty() {
            issues.push(ValidationIssue::EmptyDocumentList);
        }

        for (identifier, digest) in &self.digests {
            if !is_valid_digest(digest) {
                issues.push(ValidationIssue::InvalidDigest {
                    identifier: identifier.clone(),
                    digest: digest.clone(),
                });
            }
        }

        for document in &self.documents {
            let name = document.file.trim();
            if name.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    document: None,
                    field: "file",
                });
            }
            let label = (!name.is_empty()).then(|| name.to_string());

            for field in &document.fields {
                if field.path.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        document: label.clone(),
                        field: "fields.path",
                    });
                }
            }

            let pins = document.pin && !self.digests.is_empty();
            if !pins && document.fields.is_empty() {
                issues.push(ValidationIssue::NothingToDo { document: label });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub workspace_relative: bool,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            workspace_relative: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentPlan {
    #[serde(default)]
    pub file: String,
    /// Pin `[digests]` onto this document's rebase annotations
    #[serde(default = "default_true")]
    pub pin: bool,
    #[serde(default)]
    pub fields: Vec<FieldUpdate>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldUpdate {
    #[serde(default)]
    pub path: String,
    pub value: FieldValue,
    #[serde(default)]
    pub create: bool,
}

/// A scalar value as written in the plan file.
///
/// TOML types carry over directly: `3` is written as an integer, `"3"` as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::String(value) => write!(f, "{value:?}"),
        }
    }
}

impl FieldValue {
    /// Guess the type of a command-line value the way TOML would read it bare.
    pub fn infer(text: &str) -> Self {
        if let Ok(value) = text.parse::<bool>() {
            FieldValue::Bool(value)
        } else if let Ok(value) = text.parse::<i64>() {
            FieldValue::Int(value)
        } else if let Some(value) = text.parse::<f64>().ok().filter(|v| v.is_finite()) {
            FieldValue::Float(value)
        } else {
            FieldValue::String(text.to_string())
        }
    }
}

fn default_true() -> bool {
    true
}

/// `algorithm:hex`, e.g. `sha256:4f3c...`.
pub fn is_valid_digest(digest: &str) -> bool {
    let Some((algorithm, hex)) = digest.split_once(':') else {
        return false;
    };
    !algorithm.is_empty()
        && algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-'))
        && !hex.is_empty()
        && hex.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyDocumentList,
    MissingField {
        document: Option<String>,
        field: &'static str,
    },
    InvalidDigest {
        identifier: String,
        digest: String,
    },
    NothingToDo {
        document: Option<String>,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyDocumentList => write!(f, "plan contains no documents"),
            ValidationIssue::MissingField { document, field } => match document {
                Some(file) => write!(f, "document '{file}' missing required field '{field}'"),
                None => write!(f, "document missing required field '{field}'"),
            },
            ValidationIssue::InvalidDigest { identifier, digest } => write!(
                f,
                "digest for '{identifier}' must look like 'algorithm:hex', got '{digest}'"
            ),
            ValidationIssue::NothingToDo { document } => match document {
                Some(file) => write!(f, "document '{file}' neither pins digests nor sets fields"),
                None => write!(f, "document neither pins digests nor sets fields"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(file: &str) -> DocumentPlan {
        DocumentPlan {
            file: file.to_string(),
            pin: true,
            fields: Vec::new(),
        }
    }

    #[test]
    fn test_digest_shape() {
        assert!(is_valid_digest("sha256:0123abcdef"));
        assert!(is_valid_digest("sha512:ABCDEF"));
        assert!(!is_valid_digest("sha256"));
        assert!(!is_valid_digest("sha256:"));
        assert!(!is_valid_digest(":abc"));
        assert!(!is_valid_digest("sha256:xyz"));
    }

    #[test]
    fn test_document_without_work_is_rejected() {
        let config = PlanConfig {
            documents: vec![document("values.yaml")],
            ..PlanConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::NothingToDo {
                document: Some("values.yaml".to_string())
            }]
        );
    }

    #[test]
    fn test_issues_are_collected() {
        let mut digests = BTreeMap::new();
        digests.insert("app".to_string(), "latest".to_string());
        let mut unnamed = document("  ");
        unnamed.fields.push(FieldUpdate {
            path: String::new(),
            value: FieldValue::Int(1),
            create: false,
        });
        let config = PlanConfig {
            meta: Metadata::default(),
            digests,
            documents: vec![unnamed],
        };

        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.to_string().contains("algorithm:hex"));
        assert!(err.to_string().contains("'file'"));
        assert!(err.to_string().contains("'fields.path'"));
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Int(3).to_string(), "3");
        assert_eq!(FieldValue::String("3".into()).to_string(), "\"3\"");
        assert_eq!(FieldValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_field_value_infer() {
        assert_eq!(FieldValue::infer("true"), FieldValue::Bool(true));
        assert_eq!(FieldValue::infer("-12"), FieldValue::Int(-12));
        assert_eq!(FieldValue::infer("1.5"), FieldValue::Float(1.5));
        assert_eq!(FieldValue::infer("nan"), FieldValue::String("nan".into()));
        assert_eq!(FieldValue::infer("1.2.3"), FieldValue::String("1.2.3".into()));
    }
}
