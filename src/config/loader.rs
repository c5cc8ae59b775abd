use crate::config::schema::{PlanConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Plan file looked up in the workspace root when none is named.
pub const DEFAULT_PLAN_FILE: &str = "stacker.toml";

/// Where plan text came from, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOrigin {
    Inline,
    File(PathBuf),
}

impl PlanOrigin {
    pub fn path(&self) -> Option<&Path> {
        match self {
            PlanOrigin::Inline => None,
            PlanOrigin::File(path) => Some(path),
        }
    }
}

impl fmt::Display for PlanOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOrigin::Inline => f.write_str("<inline plan>"),
            PlanOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Failure to load a plan. Nothing is applied from a plan that fails here.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no {} in workspace {}", DEFAULT_PLAN_FILE, .workspace.display())]
    NotFound { workspace: PathBuf },

    #[error("failed to read plan from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse plan TOML ({origin}): {source}")]
    Toml {
        origin: PlanOrigin,
        source: toml_edit::de::Error,
    },

    #[error("invalid plan ({origin}): {source}")]
    Validation {
        origin: PlanOrigin,
        source: ValidationError,
    },
}

/// Parse and validate a plan file's contents.
pub fn load_from_str(input: &str) -> Result<PlanConfig, ConfigError> {
    parse_plan(input, PlanOrigin::Inline)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PlanConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_plan(&contents, PlanOrigin::File(path.to_path_buf()))?;
    debug!(
        plan = %path.display(),
        documents = config.documents.len(),
        "loaded plan"
    );
    Ok(config)
}

/// Load `stacker.toml` from the workspace root.
pub fn load_from_workspace(workspace: &Path) -> Result<PlanConfig, ConfigError> {
    let path = workspace.join(DEFAULT_PLAN_FILE);
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            workspace: workspace.to_path_buf(),
        });
    }
    load_from_path(path)
}

fn parse_plan(input: &str, origin: PlanOrigin) -> Result<PlanConfig, ConfigError> {
    let config: PlanConfig = match toml_edit::de::from_str(input) {
        Ok(config) => config,
        Err(source) => return Err(ConfigError::Toml { origin, source }),
    };
    if let Err(source) = config.validate() {
        return Err(ConfigError::Validation { origin, source });
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_plan() {
        let config = load_from_str(
            r#"
[meta]
name = "prod"

[digests]
my-app = "sha256:abc123"

[[documents]]
file = "values.yaml"
"#,
        )
        .unwrap();
        assert_eq!(config.meta.name, "prod");
        assert!(config.meta.workspace_relative);
        assert_eq!(config.documents.len(), 1);
        assert!(config.documents[0].pin);
        assert_eq!(config.digests["my-app"], "sha256:abc123");
    }

    #[test]
    fn test_inline_toml_error() {
        let err = load_from_str("[[documents]\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Toml {
                origin: PlanOrigin::Inline,
                ..
            }
        ));
        assert!(err
            .to_string()
            .starts_with("failed to parse plan TOML (<inline plan>)"));
    }

    #[test]
    fn test_validation_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacker.toml");
        fs::write(&path, "[meta]\nname = \"empty\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        match &err {
            ConfigError::Validation { origin, .. } => assert_eq!(origin.path(), Some(path.as_path())),
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains(&path.display().to_string()));
        assert!(message.contains("plan contains no documents"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_from_path("/nonexistent/stacker.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_workspace_without_plan() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_workspace(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().starts_with("no stacker.toml in workspace"));
    }
}
