pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_document, apply_plan, pin_annotations, set_fields, ApplicationError, ApplyMode,
    DocumentReport, StepResult,
};
pub use loader::{
    load_from_path, load_from_str, load_from_workspace, ConfigError, PlanOrigin, DEFAULT_PLAN_FILE,
};
pub use schema::{
    is_valid_digest, DocumentPlan, FieldUpdate, FieldValue, Metadata, PlanConfig, ValidationError,
    ValidationIssue,
};
