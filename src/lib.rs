//! Stacker: format-preserving YAML patching
//!
//! Edits YAML configuration in place while keeping every byte that was not
//! edited, comments included. Image references opt into digest pinning with a
//! `$rebase` annotation in a trailing comment:
//!
//! ```yaml
//! app:
//!   image: my.registry.com/project/app # {"$rebase": "my-app:name"}
//!   tag: 1.2.3 # {"$rebase": "my-app:tag"}
//! ```
//!
//! # Architecture
//!
//! Parsing records a byte span for every node and comment. Encoding compiles
//! the dirty nodes down to [`Edit`]s, verified byte-span replacements applied
//! to the original text, so untouched regions are copied verbatim.
//!
//! # Example
//!
//! ```
//! use stacker::yaml::Patcher;
//!
//! let mut patcher = Patcher::parse("app:\n  tag: 1.2.3 # {\"$rebase\": \"app:tag\"}\n").unwrap();
//! let scan = patcher.find_rebase_annotations();
//! scan.annotations[0]
//!     .update_tag_digest(&mut patcher, "sha256:abc")
//!     .unwrap();
//! patcher.set_field("app.replicas", &3, true).unwrap();
//!
//! assert_eq!(
//!     patcher.encode().unwrap(),
//!     "app:\n  tag: 1.2.3@sha256:abc # {\"$rebase\": \"app:tag\"}\n  replicas: 3\n"
//! );
//! ```

pub mod config;
pub mod edit;
pub mod yaml;

// Re-exports
pub use config::{
    apply_plan, load_from_path, load_from_str, ApplicationError, ApplyMode, ConfigError,
    DocumentReport, PlanConfig, PlanOrigin, StepResult,
};
pub use edit::{Edit, EditError, EditVerification, WriteResult};
pub use yaml::{
    AnnotationError, DecodeError, EncodeError, PatchError, Patcher, RebaseAnnotation, SetOutcome,
    Tree,
};
