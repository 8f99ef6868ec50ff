//! # Pipeline Domain
//!
//! Pure domain layer for the stream-processing pipeline engine: the
//! `Pipe`/`Funnel`/`Pipeline` runtime, the `Stage` contract, and the value
//! objects (`Element`, `S3Object`/`S3ObjectRange`, `Token`,
//! `DataMarkerCollection`, `MergeGroup*`) that flow through them.
//!
//! This crate has no I/O runtime dependency beyond `async-trait`, used only
//! to declare the external collaborator ports in [`ports`] — the concrete
//! adapters (object store, task runner, remote function) live in the
//! `pipeline` engine crate, matching the teacher's domain/engine split.

pub mod element;
pub mod error;
pub mod funnel;
pub mod marker;
pub mod merge_group;
pub mod metrics;
pub mod ndjson;
pub mod pipe;
pub mod pipeline;
pub mod ports;
pub mod s3;
pub mod stage;
pub mod token;

pub use element::{Element, ElementKind};
pub use error::{PipelineError, PipelineResult};
pub use funnel::{stage_handle, Funnel, StageHandle};
pub use marker::{DataMarker, DataMarkerCollection};
pub use merge_group::{MergeGroupCollection, MergeGroupObject, MergeGroupRestricted, Shard};
pub use metrics::{Metadata, MetadataHandle, Metrics};
pub use ndjson::NdjsonIndexed;
pub use pipe::{new_byte_pipe, new_item_pipe, Pipe, PipeHandle};
pub use pipeline::Pipeline;
pub use s3::{S3Object, S3ObjectRange, S3Prefix, S3Target};
pub use stage::{AnyPipe, Stage};
pub use token::{Token, TokenResource};
