//! Per-stage job assembly.
//!
//! Each job step becomes a rendered stage script plus the YAML document the
//! manager reads for that stage.

mod assembler;
mod document;

pub use assembler::{
    assemble_job_script, AssembledJob, JobAssembler, ResolvedJob, ResolvedRegistry, JOBID_VAR,
};
pub use document::render_document;
