//! Infrastructure layer: the concrete adapters for the external
//! collaborator ports declared in `pipeline_domain::ports`, plus the
//! ambient stack (config, logging, metrics) that isn't part of the
//! distilled spec but is how the teacher wires every stage.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod object_store;
pub mod unwired;
