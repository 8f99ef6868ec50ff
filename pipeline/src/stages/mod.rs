//! Concrete `Stage` implementations (§4.D-§4.J), grouped by the part of the
//! spec they cover. `pipeline_domain` owns the contract and value objects;
//! everything here is behavior built on top of it.

pub mod basic;
pub mod compress;
pub mod digest;
pub mod envelope;
pub mod foreach;
pub mod ftp;
pub mod ndjson;
pub mod object_store;
pub mod remote;
pub mod sort;
pub mod throttling;
pub mod xml;
