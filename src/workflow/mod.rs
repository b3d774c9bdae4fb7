//! Workflow spec model: types, parsing, validation, and derived names.
//!
//! A workflow instance consists of:
//! - Identity: name, namespace, uid
//! - Registry, manager, and cluster policy
//! - Completion policy and events, carried through to the manager
//! - Ordered job steps

mod naming;
mod parser;
mod types;
mod validator;

pub use naming::{DEFAULT_REGISTRY_NAME, DEFAULT_REGISTRY_PORT, SELECTOR_LABEL};
pub use parser::{parse_workflow, parse_workflow_file};
pub use types::*;
pub use validator::{validate_workflow, SUPPORTED_ARCHES, WORKFLOW_ACTIONS};
