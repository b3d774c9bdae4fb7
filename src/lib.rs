//! stagewright - converge multi-stage workflow specs into cluster objects
//!
//! A workflow instance describes an ordered set of stages, an artifact
//! registry that passes results between them, and a manager process that
//! runs the workflow. stagewright turns that description into:
//!
//! - **Objects**: headless service, access control, registry replica set,
//!   manager configuration and deployment, created idempotently and in
//!   dependency order against a [`store::ResourceStore`]
//! - **Stage scripts**: shell fragments composed per stage and rendered in a
//!   single substitution pass, embedded in the manager's configuration
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: stagewright.dev/v1alpha1
//! kind: Workflow
//! metadata:
//!   name: wf1
//!   namespace: ns1
//! spec:
//!   cluster:
//!     maxSize: 2
//!   workflow:
//!     completed: 4
//!   jobs:
//!     - name: simulate
//!       image: ghcr.io/example/simulate:latest
//!       registry:
//!         push: simulate
//!       script: ./simulate.sh
//!     - name: analyze
//!       image: ghcr.io/example/analyze:latest
//!       registry:
//!         pull: simulate
//!       script: ./analyze.sh
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod jobs;
pub mod manager;
pub mod metrics;
pub mod resources;
pub mod store;
pub mod telemetry;
pub mod templates;
pub mod workflow;

pub use controller::{ConvergeReport, Converger};
pub use error::{Error, Result};
